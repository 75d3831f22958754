//! Per-proposal cache of resolved travel legs
//!
//! The recompute pipeline is synchronous; legs are fetched here beforehand
//! and the pipeline reads them through `TravelTimes`.

use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::services::routing::{HaversineTravelProvider, TravelLeg, TravelTimeProvider};
use crate::types::{Coordinates, RouteGeometry, Stop, TourType};

/// Concurrent provider calls per refresh
const MAX_CONCURRENT_LOOKUPS: usize = 8;

/// Synchronous travel-time source. `None` means unknown.
pub trait TravelTimes {
    fn minutes(&self, from: &Stop, to: &Stop) -> Option<u32>;
}

impl<F> TravelTimes for F
where
    F: Fn(&Stop, &Stop) -> Option<u32>,
{
    fn minutes(&self, from: &Stop, to: &Stop) -> Option<u32> {
        self(from, to)
    }
}

type PointKey = (i64, i64);

/// Resolved legs keyed by endpoint coordinates, for a single travel mode
#[derive(Debug, Clone, Default)]
pub struct TravelMatrix {
    mode: TourType,
    legs: HashMap<(PointKey, PointKey), TravelLeg>,
}

/// Outcome of one `refresh_matrix` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    pub requested: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

impl TravelMatrix {
    pub fn new(mode: TourType) -> Self {
        Self {
            mode,
            legs: HashMap::new(),
        }
    }

    pub fn mode(&self) -> TourType {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Switch travel mode, dropping legs resolved for the previous one.
    pub fn set_mode(&mut self, mode: TourType) {
        if self.mode != mode {
            self.legs.clear();
            self.mode = mode;
        }
    }

    pub fn leg(&self, from: &Coordinates, to: &Coordinates) -> Option<&TravelLeg> {
        self.legs.get(&(from.key(), to.key()))
    }

    pub fn insert(&mut self, from: &Coordinates, to: &Coordinates, leg: TravelLeg) {
        self.legs.insert((from.key(), to.key()), leg);
    }

    /// Ordered pairs of distinct located points with no cached leg
    pub fn missing_pairs(&self, stops: &[Stop]) -> Vec<(Coordinates, Coordinates)> {
        let mut points: Vec<Coordinates> = Vec::new();
        for coords in stops.iter().filter_map(|s| s.coordinates) {
            if !points.iter().any(|p| p.key() == coords.key()) {
                points.push(coords);
            }
        }

        let mut missing = Vec::new();
        for from in &points {
            for to in &points {
                if from.key() != to.key() && self.leg(from, to).is_none() {
                    missing.push((*from, *to));
                }
            }
        }
        missing
    }

    /// Fill missing legs from the offline estimator
    pub fn fill_offline(&mut self, stops: &[Stop], provider: &HaversineTravelProvider) {
        for (from, to) in self.missing_pairs(stops) {
            let leg = provider.leg(&from, &to, self.mode);
            self.insert(&from, &to, leg);
        }
    }

    /// Concatenated road shape along `ordered`. Unknown legs are skipped.
    pub fn geometry(&self, ordered: &[Stop]) -> RouteGeometry {
        let mut route = RouteGeometry::empty();
        for pair in ordered.windows(2) {
            if let (Some(from), Some(to)) = (pair[0].coordinates, pair[1].coordinates) {
                if let Some(leg) = self.leg(&from, &to) {
                    route.extend_leg(&leg.geometry);
                }
            }
        }
        route
    }
}

impl TravelTimes for TravelMatrix {
    fn minutes(&self, from: &Stop, to: &Stop) -> Option<u32> {
        let (a, b) = (from.coordinates?, to.coordinates?);
        if a.key() == b.key() {
            return Some(0);
        }
        self.leg(&a, &b).map(|leg| leg.minutes)
    }
}

/// Resolve every missing leg between `stops` through `provider`.
///
/// Each lookup is bounded by `timeout`. Errors, timeouts and "no route"
/// answers are not cached, so they read as unknown and are retried on the
/// next refresh.
pub async fn refresh_matrix(
    matrix: &mut TravelMatrix,
    stops: &[Stop],
    provider: &dyn TravelTimeProvider,
    timeout: Duration,
) -> RefreshStats {
    let missing = matrix.missing_pairs(stops);
    if missing.is_empty() {
        return RefreshStats::default();
    }

    let mode = matrix.mode();
    debug!("Resolving {} {} legs via {}", missing.len(), mode.as_str(), provider.name());

    let results: Vec<_> = stream::iter(missing)
        .map(|(from, to)| async move {
            let result = tokio::time::timeout(timeout, provider.estimate(&from, &to, mode)).await;
            (from, to, result)
        })
        .buffer_unordered(MAX_CONCURRENT_LOOKUPS)
        .collect()
        .await;

    let mut stats = RefreshStats {
        requested: results.len(),
        ..Default::default()
    };
    for (from, to, result) in results {
        match result {
            Ok(Ok(Some(leg))) => {
                matrix.insert(&from, &to, leg);
                stats.resolved += 1;
            }
            Ok(Ok(None)) => stats.unresolved += 1,
            Ok(Err(e)) => {
                warn!("Travel lookup via {} failed: {}", provider.name(), e);
                stats.unresolved += 1;
            }
            Err(_) => {
                warn!("Travel lookup via {} timed out after {:?}", provider.name(), timeout);
                stats.unresolved += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use uuid::Uuid;

    use crate::types::{ActivityType, SubGroup};

    fn stop(name: &str, coordinates: Option<Coordinates>) -> Stop {
        Stop {
            id: Uuid::new_v4(),
            name: name.to_string(),
            location: None,
            coordinates,
            duration_minutes: 60,
            notes: String::new(),
            activity_type: ActivityType::Adventure,
            sub_group: SubGroup::All,
        }
    }

    /// Answers for walking only, never for driving, and hangs for one point
    struct FlakyProvider {
        slow: Coordinates,
    }

    #[async_trait]
    impl TravelTimeProvider for FlakyProvider {
        async fn estimate(&self, from: &Coordinates, to: &Coordinates, mode: TourType) -> Result<Option<TravelLeg>> {
            if from.key() == self.slow.key() || to.key() == self.slow.key() {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            match mode {
                TourType::Walking => Ok(Some(HaversineTravelProvider::new().leg(from, to, mode))),
                TourType::Driving => anyhow::bail!("routing backend down"),
            }
        }

        fn name(&self) -> &str {
            "Flaky"
        }
    }

    #[test]
    fn test_missing_pairs_skip_unlocated_and_duplicates() {
        let a = Coordinates::new(38.70, -9.10);
        let b = Coordinates::new(38.75, -9.20);
        let stops = vec![stop("A", Some(a)), stop("A again", Some(a)), stop("B", Some(b)), stop("X", None)];

        let matrix = TravelMatrix::new(TourType::Walking);
        assert_eq!(matrix.missing_pairs(&stops).len(), 2);
    }

    #[test]
    fn test_unlocated_stop_is_unknown_and_same_point_is_zero() {
        let a = Coordinates::new(38.70, -9.10);
        let matrix = TravelMatrix::new(TourType::Walking);

        assert_eq!(matrix.minutes(&stop("A", Some(a)), &stop("B", Some(a))), Some(0));
        assert_eq!(matrix.minutes(&stop("A", Some(a)), &stop("X", None)), None);
    }

    #[test]
    fn test_set_mode_clears_legs() {
        let a = Coordinates::new(38.70, -9.10);
        let b = Coordinates::new(38.75, -9.20);
        let stops = vec![stop("A", Some(a)), stop("B", Some(b))];

        let mut matrix = TravelMatrix::new(TourType::Walking);
        matrix.fill_offline(&stops, &HaversineTravelProvider::new());
        assert_eq!(matrix.len(), 2);

        matrix.set_mode(TourType::Walking);
        assert_eq!(matrix.len(), 2);
        matrix.set_mode(TourType::Driving);
        assert!(matrix.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_caches_only_successes() {
        let a = Coordinates::new(38.70, -9.10);
        let b = Coordinates::new(38.75, -9.20);
        let stops = vec![stop("A", Some(a)), stop("B", Some(b))];
        let provider = FlakyProvider { slow: Coordinates::new(0.0, 0.0) };

        let mut matrix = TravelMatrix::new(TourType::Driving);
        let stats = refresh_matrix(&mut matrix, &stops, &provider, Duration::from_millis(200)).await;
        assert_eq!(stats.unresolved, 2);
        assert!(matrix.is_empty());

        matrix.set_mode(TourType::Walking);
        let stats = refresh_matrix(&mut matrix, &stops, &provider, Duration::from_millis(200)).await;
        assert_eq!(stats.resolved, 2);
        assert!(matrix.minutes(&stops[0], &stops[1]).is_some());

        // Everything cached, nothing to ask
        let stats = refresh_matrix(&mut matrix, &stops, &provider, Duration::from_millis(200)).await;
        assert_eq!(stats.requested, 0);
    }

    #[tokio::test]
    async fn test_refresh_timeout_reads_as_unknown() {
        let a = Coordinates::new(38.70, -9.10);
        let slow = Coordinates::new(38.75, -9.20);
        let stops = vec![stop("A", Some(a)), stop("Slow", Some(slow))];
        let provider = FlakyProvider { slow };

        let mut matrix = TravelMatrix::new(TourType::Walking);
        let stats = refresh_matrix(&mut matrix, &stops, &provider, Duration::from_millis(50)).await;

        assert_eq!(stats.unresolved, 2);
        assert_eq!(matrix.minutes(&stops[0], &stops[1]), None);
    }

    #[test]
    fn test_geometry_follows_order() {
        let a = Coordinates::new(38.70, -9.10);
        let b = Coordinates::new(38.75, -9.20);
        let c = Coordinates::new(38.80, -9.38);
        let stops = vec![stop("A", Some(a)), stop("B", Some(b)), stop("C", Some(c))];

        let mut matrix = TravelMatrix::new(TourType::Driving);
        matrix.fill_offline(&stops, &HaversineTravelProvider::new());

        let route = matrix.geometry(&stops);
        assert_eq!(route.coordinates.first(), Some(&[a.lng, a.lat]));
        assert_eq!(route.coordinates.last(), Some(&[c.lng, c.lat]));
        assert_eq!(route.coordinates.len(), 3);
    }
}

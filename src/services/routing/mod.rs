//! Travel-time providers
//!
//! Uses Valhalla for production, haversine estimates offline and in tests.

mod valhalla;

pub use valhalla::{ValhallaConfig, ValhallaTravelProvider};

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{info, warn};

use crate::services::geo::{path_distance, travel_time_minutes};
use crate::types::{Coordinates, RouteGeometry, TourType};

/// One resolved travel leg
#[derive(Debug, Clone, PartialEq)]
pub struct TravelLeg {
    /// Whole minutes, rounded up
    pub minutes: u32,
    pub distance_km: f64,
    /// Road shape when the provider has one
    pub geometry: RouteGeometry,
}

/// Travel-time collaborator.
///
/// `Ok(None)` means the provider answered but has no route between the points.
#[async_trait]
pub trait TravelTimeProvider: Send + Sync {
    async fn estimate(
        &self,
        from: &Coordinates,
        to: &Coordinates,
        mode: TourType,
    ) -> Result<Option<TravelLeg>>;

    /// Provider name for logging
    fn name(&self) -> &str;
}

/// Offline provider: straight line x path coefficient at an average speed
#[derive(Debug, Clone, Default)]
pub struct HaversineTravelProvider;

impl HaversineTravelProvider {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous estimate, shared with the offline CLI
    pub fn leg(&self, from: &Coordinates, to: &Coordinates, mode: TourType) -> TravelLeg {
        TravelLeg {
            minutes: travel_time_minutes(from, to, mode).ceil() as u32,
            distance_km: path_distance(from, to, mode),
            geometry: RouteGeometry::straight(from, to),
        }
    }
}

#[async_trait]
impl TravelTimeProvider for HaversineTravelProvider {
    async fn estimate(
        &self,
        from: &Coordinates,
        to: &Coordinates,
        mode: TourType,
    ) -> Result<Option<TravelLeg>> {
        Ok(Some(self.leg(from, to, mode)))
    }

    fn name(&self) -> &str {
        "Haversine"
    }
}

/// Create travel provider with automatic Valhalla detection and fallback
///
/// Tries to connect to Valhalla if URL is provided. Falls back to the
/// haversine estimate if Valhalla is unavailable or not configured.
pub async fn create_travel_provider_with_fallback(
    valhalla_url: Option<String>,
) -> Arc<dyn TravelTimeProvider> {
    if let Some(url) = valhalla_url {
        match check_valhalla_health(&url).await {
            Ok(()) => match ValhallaTravelProvider::new(ValhallaConfig::new(&url)) {
                Ok(provider) => {
                    info!("Valhalla routing service available at {}", url);
                    return Arc::new(provider);
                }
                Err(e) => warn!("Failed to build Valhalla client: {}", e),
            },
            Err(e) => {
                warn!("Valhalla not available at {}: {}. Falling back to haversine estimates.", url, e);
            }
        }
    }

    info!("Using haversine travel estimates (Valhalla not configured or unavailable)");
    Arc::new(HaversineTravelProvider::new())
}

/// Check if Valhalla is healthy by making a simple status request
async fn check_valhalla_health(base_url: &str) -> Result<()> {
    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(5))
        .build()?;

    let url = format!("{}/status", base_url);
    let response = client.get(&url).send().await?;

    if response.status().is_success() {
        Ok(())
    } else {
        anyhow::bail!("Valhalla returned status {}", response.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn belem() -> Coordinates {
        Coordinates { lat: 38.6916, lng: -9.2160 }
    }

    fn baixa() -> Coordinates {
        Coordinates { lat: 38.7107, lng: -9.1366 }
    }

    #[tokio::test]
    async fn test_haversine_same_point_is_zero() {
        let provider = HaversineTravelProvider::new();
        let leg = provider
            .estimate(&belem(), &belem(), TourType::Driving)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(leg.minutes, 0);
        assert!(leg.distance_km.abs() < 0.001);
    }

    #[tokio::test]
    async fn test_haversine_is_symmetric() {
        let provider = HaversineTravelProvider::new();
        let there = provider.estimate(&belem(), &baixa(), TourType::Walking).await.unwrap().unwrap();
        let back = provider.estimate(&baixa(), &belem(), TourType::Walking).await.unwrap().unwrap();

        assert_eq!(there.minutes, back.minutes);
    }

    #[tokio::test]
    async fn test_haversine_mode_changes_minutes() {
        let provider = HaversineTravelProvider::new();
        let drive = provider.estimate(&belem(), &baixa(), TourType::Driving).await.unwrap().unwrap();
        let walk = provider.estimate(&belem(), &baixa(), TourType::Walking).await.unwrap().unwrap();

        // ~7 km straight line
        assert!(drive.minutes >= 10 && drive.minutes <= 20, "drive {}", drive.minutes);
        assert!(walk.minutes > 90, "walk {}", walk.minutes);
        assert_eq!(drive.geometry.coordinates.len(), 2);
    }

    #[test]
    fn test_provider_name() {
        assert_eq!(HaversineTravelProvider::new().name(), "Haversine");
    }

    #[tokio::test]
    async fn test_fallback_no_url() {
        let provider = create_travel_provider_with_fallback(None).await;
        assert_eq!(provider.name(), "Haversine");
    }

    #[tokio::test]
    async fn test_fallback_invalid_url() {
        let provider = create_travel_provider_with_fallback(Some("http://localhost:99999".to_string())).await;
        assert_eq!(provider.name(), "Haversine");
    }

    #[tokio::test]
    #[ignore = "Requires running Valhalla server"]
    async fn test_fallback_valhalla_available() {
        let provider = create_travel_provider_with_fallback(Some("http://localhost:8002".to_string())).await;
        assert_eq!(provider.name(), "Valhalla");
    }
}

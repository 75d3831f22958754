//! Geographic types

use serde::{Deserialize, Serialize};

/// WGS84 point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both components are finite and inside WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Stable hashable key (micro-degree precision) used for travel-leg caching.
    pub fn key(&self) -> (i64, i64) {
        (
            (self.lat * 1_000_000.0).round() as i64,
            (self.lng * 1_000_000.0).round() as i64,
        )
    }
}

/// Route geometry as GeoJSON coordinates
/// Coordinates are in [longitude, latitude] order (GeoJSON standard)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RouteGeometry {
    pub coordinates: Vec<[f64; 2]>,
}

impl RouteGeometry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Straight segment between two points (used when no road shape is known)
    pub fn straight(from: &Coordinates, to: &Coordinates) -> Self {
        Self {
            coordinates: vec![[from.lng, from.lat], [to.lng, to.lat]],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Append a leg, skipping its first point when it repeats our last one.
    pub fn extend_leg(&mut self, leg: &RouteGeometry) {
        let skip = match (self.coordinates.last(), leg.coordinates.first()) {
            (Some(last), Some(first)) if last == first => 1,
            _ => 0,
        };
        self.coordinates.extend(leg.coordinates.iter().skip(skip).copied());
    }
}

//! Valhalla routing engine client
//!
//! Valhalla API documentation:
//! https://valhalla.github.io/valhalla/api/turn-by-turn/api-reference/

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{TravelLeg, TravelTimeProvider};
use crate::types::{Coordinates, RouteGeometry, TourType};

/// Valhalla "no route" error codes (no path, no suitable edges near location)
const NO_ROUTE_ERROR_CODES: [u32; 3] = [170, 171, 442];

/// Valhalla client configuration
#[derive(Debug, Clone)]
pub struct ValhallaConfig {
    /// Base URL of Valhalla server (e.g., "http://localhost:8002")
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for ValhallaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8002".to_string(),
            timeout_seconds: 10,
        }
    }
}

impl ValhallaConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ..Default::default()
        }
    }
}

/// Travel times and road shapes from Valhalla `/route`
pub struct ValhallaTravelProvider {
    client: Client,
    config: ValhallaConfig,
}

impl ValhallaTravelProvider {
    pub fn new(config: ValhallaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client, config })
    }

    fn build_route_request(&self, from: &Coordinates, to: &Coordinates, mode: TourType) -> RouteRequest {
        let location = |c: &Coordinates| ValhallaLocation {
            lat: c.lat,
            lon: c.lng,
            // Geocoded points are often building centroids, off the road edge
            radius: Some(500),
        };

        RouteRequest {
            locations: vec![location(from), location(to)],
            costing: costing(mode).to_string(),
            directions_type: "none".to_string(),
            units: "kilometers".to_string(),
        }
    }
}

fn costing(mode: TourType) -> &'static str {
    match mode {
        TourType::Walking => "pedestrian",
        TourType::Driving => "auto",
    }
}

#[async_trait]
impl TravelTimeProvider for ValhallaTravelProvider {
    async fn estimate(
        &self,
        from: &Coordinates,
        to: &Coordinates,
        mode: TourType,
    ) -> Result<Option<TravelLeg>> {
        let request = self.build_route_request(from, to, mode);
        let url = format!("{}/route", self.config.base_url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send route request to Valhalla")?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST {
            let body: ValhallaError = response.json().await.unwrap_or_default();
            if body.error_code.is_some_and(|code| NO_ROUTE_ERROR_CODES.contains(&code)) {
                debug!("Valhalla has no {} route: {}", request.costing, body.error.unwrap_or_default());
                return Ok(None);
            }
            anyhow::bail!("Valhalla route returned error {}: {:?}", status, body.error);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Valhalla route returned error {}: {}", status, body);
        }

        let route: RouteResponse = response
            .json()
            .await
            .context("Failed to parse Valhalla route response")?;

        let mut geometry = RouteGeometry::empty();
        for leg in &route.trip.legs {
            geometry.extend_leg(&RouteGeometry {
                coordinates: decode_polyline(&leg.shape, 6)?,
            });
        }

        Ok(Some(TravelLeg {
            minutes: (route.trip.summary.time / 60.0).ceil() as u32,
            distance_km: route.trip.summary.length,
            geometry,
        }))
    }

    fn name(&self) -> &str {
        "Valhalla"
    }
}

// Valhalla API types

#[derive(Debug, Serialize)]
struct RouteRequest {
    locations: Vec<ValhallaLocation>,
    costing: String,
    directions_type: String,
    units: String,
}

#[derive(Debug, Serialize, Clone)]
struct ValhallaLocation {
    lat: f64,
    lon: f64,
    /// Snap radius in meters
    #[serde(skip_serializing_if = "Option::is_none")]
    radius: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RouteResponse {
    trip: Trip,
}

#[derive(Debug, Deserialize)]
struct Trip {
    legs: Vec<Leg>,
    summary: Summary,
}

#[derive(Debug, Deserialize)]
struct Summary {
    /// Seconds
    time: f64,
    /// Kilometers (units = "kilometers")
    length: f64,
}

#[derive(Debug, Deserialize)]
struct Leg {
    /// Encoded polyline shape
    shape: String,
}

#[derive(Debug, Default, Deserialize)]
struct ValhallaError {
    error_code: Option<u32>,
    error: Option<String>,
}

/// Decode Valhalla's encoded polyline format into GeoJSON `[lng, lat]` pairs.
/// Precision is 6 decimal places for Valhalla (vs 5 for Google)
fn decode_polyline(encoded: &str, precision: u32) -> Result<Vec<[f64; 2]>> {
    let factor = 10_f64.powi(precision as i32);
    let mut bytes = encoded.bytes();
    let mut coordinates = Vec::new();
    let (mut lat, mut lng) = (0i64, 0i64);

    while let Some(dlat) = next_delta(&mut bytes)? {
        let dlng = next_delta(&mut bytes)?.context("Invalid polyline encoding")?;
        lat += dlat;
        lng += dlng;
        coordinates.push([lng as f64 / factor, lat as f64 / factor]);
    }

    Ok(coordinates)
}

/// Read one zig-zag encoded varint. `Ok(None)` at a clean end of input.
fn next_delta(bytes: &mut impl Iterator<Item = u8>) -> Result<Option<i64>> {
    let mut result = 0i64;
    let mut shift = 0;
    let mut started = false;

    loop {
        let Some(byte) = bytes.next() else {
            if started {
                anyhow::bail!("Invalid polyline encoding");
            }
            return Ok(None);
        };
        started = true;
        let chunk = byte as i64 - 63;
        if !(0..64).contains(&chunk) || shift > 60 {
            anyhow::bail!("Invalid polyline encoding");
        }
        result |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk < 0x20 {
            break;
        }
    }

    Ok(Some(if result & 1 != 0 { !(result >> 1) } else { result >> 1 }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sintra() -> Coordinates {
        Coordinates { lat: 38.8029, lng: -9.3817 }
    }

    fn cascais() -> Coordinates {
        Coordinates { lat: 38.6979, lng: -9.4215 }
    }

    #[test]
    fn test_valhalla_config_default() {
        let config = ValhallaConfig::default();
        assert_eq!(config.base_url, "http://localhost:8002");
        assert_eq!(config.timeout_seconds, 10);
    }

    #[test]
    fn test_valhalla_config_trims_trailing_slash() {
        let config = ValhallaConfig::new("http://valhalla:8002/");
        assert_eq!(config.base_url, "http://valhalla:8002");
    }

    #[test]
    fn test_build_route_request_costing_per_mode() {
        let provider = ValhallaTravelProvider::new(ValhallaConfig::default()).unwrap();

        let drive = provider.build_route_request(&sintra(), &cascais(), TourType::Driving);
        assert_eq!(drive.costing, "auto");
        assert_eq!(drive.locations.len(), 2);
        assert!((drive.locations[0].lat - 38.8029).abs() < 0.0001);
        assert!((drive.locations[1].lon + 9.4215).abs() < 0.0001);

        let walk = provider.build_route_request(&sintra(), &cascais(), TourType::Walking);
        assert_eq!(walk.costing, "pedestrian");
        assert_eq!(walk.directions_type, "none");
    }

    #[test]
    fn test_decode_polyline_precision_5() {
        // Reference example from the Google polyline documentation
        let points = decode_polyline("_p~iF~ps|U_ulLnnqC_mqNvxq`@", 5).unwrap();

        assert_eq!(points.len(), 3);
        assert!((points[0][1] - 38.5).abs() < 1e-9);
        assert!((points[0][0] + 120.2).abs() < 1e-9);
        assert!((points[2][1] - 43.252).abs() < 1e-9);
        assert!((points[2][0] + 126.453).abs() < 1e-9);
    }

    #[test]
    fn test_decode_polyline_empty_and_truncated() {
        assert!(decode_polyline("", 6).unwrap().is_empty());
        assert!(decode_polyline("_p~iF", 5).is_err());
    }

    #[test]
    fn test_valhalla_provider_name() {
        let provider = ValhallaTravelProvider::new(ValhallaConfig::default()).unwrap();
        assert_eq!(provider.name(), "Valhalla");
    }

    #[tokio::test]
    #[ignore = "Requires running Valhalla server"]
    async fn test_valhalla_integration_sintra_cascais() {
        let provider = ValhallaTravelProvider::new(ValhallaConfig::new("http://localhost:8002")).unwrap();

        let leg = provider
            .estimate(&sintra(), &cascais(), TourType::Driving)
            .await
            .unwrap()
            .expect("route between Sintra and Cascais");

        assert!(leg.minutes > 10 && leg.minutes < 45, "got {} min", leg.minutes);
        assert!(leg.geometry.coordinates.len() > 10);
    }
}

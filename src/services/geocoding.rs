//! Geocoding collaborator
//!
//! Backend selected via `GEOCODER_BACKEND`:
//! - "mock" → MockGeocoder (tests, development, no network)
//! - "nominatim" → NominatimGeocoder (rate limited, 1 request per interval)

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::types::{Coordinates, EditCommand, NewEvent};

/// Geocoder trait - resolves free-text places to coordinates
#[async_trait]
pub trait Geocoder: Send + Sync {
    /// `None` if the place cannot be found
    async fn resolve(&self, query: &str) -> Result<Option<GeocodingResult>>;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodingResult {
    pub coordinates: Coordinates,
    pub display_name: String,
}

// ==========================================================================
// MockGeocoder
// ==========================================================================

/// Deterministic fake coordinates inside the Lisbon / Sintra / Cascais area
#[derive(Debug, Default)]
pub struct MockGeocoder;

impl MockGeocoder {
    pub fn new() -> Self {
        Self
    }

    fn hash_to_coordinates(query: &str) -> Coordinates {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        query.trim().to_lowercase().hash(&mut hasher);
        let hash = hasher.finish();

        const LAT_MIN: f64 = 38.65;
        const LAT_MAX: f64 = 38.82;
        const LNG_MIN: f64 = -9.48;
        const LNG_MAX: f64 = -9.10;

        let lat_normalized = ((hash >> 32) as f64) / (u32::MAX as f64);
        let lng_normalized = ((hash & 0xFFFF_FFFF) as f64) / (u32::MAX as f64);

        Coordinates {
            lat: LAT_MIN + lat_normalized * (LAT_MAX - LAT_MIN),
            lng: LNG_MIN + lng_normalized * (LNG_MAX - LNG_MIN),
        }
    }
}

#[async_trait]
impl Geocoder for MockGeocoder {
    async fn resolve(&self, query: &str) -> Result<Option<GeocodingResult>> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(GeocodingResult {
            coordinates: Self::hash_to_coordinates(query),
            display_name: format!("{}, Portugal", query.trim()),
        }))
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

// ==========================================================================
// NominatimGeocoder
// ==========================================================================

pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org";

/// Public Nominatim allows one request per second
const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(1100);

#[derive(Debug, Deserialize)]
struct NominatimResult {
    lat: String,
    lon: String,
    display_name: String,
}

/// Nominatim search client, restricted to Portugal
pub struct NominatimGeocoder {
    base_url: String,
    client: reqwest::Client,
    last_call: Mutex<Option<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("quote-worker/0.1")
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            last_call: Mutex::new(None),
        })
    }

    fn search_url(&self, query: &str) -> String {
        format!(
            "{}/search?q={}&format=json&countrycodes=pt&limit=1",
            self.base_url,
            urlencoding::encode(query.trim())
        )
    }

    /// Hold the caller until the request interval has passed
    async fn throttle(&self) {
        let mut last = self.last_call.lock().await;
        if let Some(at) = *last {
            let elapsed = at.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn resolve(&self, query: &str) -> Result<Option<GeocodingResult>> {
        if query.trim().is_empty() {
            return Ok(None);
        }
        self.throttle().await;

        let response = self
            .client
            .get(self.search_url(query))
            .send()
            .await
            .context("Failed to send geocoding request")?;

        if !response.status().is_success() {
            warn!("Nominatim returned {} for '{}'", response.status(), query);
            return Ok(None);
        }

        let results: Vec<NominatimResult> = response
            .json()
            .await
            .context("Failed to parse geocoding response")?;

        match results.into_iter().next() {
            Some(result) => {
                let lat: f64 = result.lat.parse().context("Invalid latitude")?;
                let lng: f64 = result.lon.parse().context("Invalid longitude")?;
                Ok(Some(GeocodingResult {
                    coordinates: Coordinates { lat, lng },
                    display_name: result.display_name,
                }))
            }
            None => Ok(None),
        }
    }

    fn name(&self) -> &'static str {
        "nominatim"
    }
}

// ==========================================================================
// Factory and helpers
// ==========================================================================

/// Create geocoder for the configured backend; unknown names fall back to mock
pub fn create_geocoder(backend: &str, nominatim_url: &str) -> Box<dyn Geocoder> {
    match backend {
        "nominatim" => match NominatimGeocoder::new(nominatim_url) {
            Ok(geocoder) => {
                info!("Using Nominatim geocoder at {}", nominatim_url);
                return Box::new(geocoder);
            }
            Err(e) => warn!("Failed to build Nominatim client: {}, using mock", e),
        },
        "mock" => {}
        other => warn!("Unknown GEOCODER_BACKEND '{}', using mock", other),
    }
    info!("Using MockGeocoder");
    Box::new(MockGeocoder::new())
}

async fn lookup(geocoder: &dyn Geocoder, query: &str) -> Option<Coordinates> {
    match geocoder.resolve(query).await {
        Ok(Some(result)) => {
            debug!("Geocoded '{}' via {} -> {}", query, geocoder.name(), result.display_name);
            Some(result.coordinates)
        }
        Ok(None) => {
            debug!("No geocoding result for '{}'", query);
            None
        }
        Err(e) => {
            warn!("Geocoding '{}' via {} failed: {}", query, geocoder.name(), e);
            None
        }
    }
}

/// Fill coordinates the client left out from the location text.
///
/// Failures leave the coordinates empty; the stop is then flagged as
/// unlocated instead of rejecting the edit.
pub async fn locate_command(command: &mut EditCommand, geocoder: &dyn Geocoder) {
    match command {
        EditCommand::AddStop { stop } if stop.coordinates.is_none() => {
            let query = stop.location.clone().unwrap_or_else(|| stop.name.clone());
            stop.coordinates = lookup(geocoder, &query).await;
        }
        EditCommand::SetStopLocation {
            location: Some(location),
            coordinates,
            ..
        } if coordinates.is_none() => {
            *coordinates = lookup(geocoder, location).await;
        }
        _ => {}
    }
}

/// Resolve the event's base location when no coordinates were given
pub async fn locate_event(request: &mut NewEvent, geocoder: &dyn Geocoder) {
    if request.coordinates.is_none() {
        request.coordinates = lookup(geocoder, &request.location).await;
    }
}

//! Pricing catalog types

use serde::{Deserialize, Serialize};

use super::{Money, TourType};

/// Closed set of catalog transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogKey {
    Jeeps,
    Walking,
    Rzr,
}

/// How a catalog entry turns group size and event length into billable units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingMode {
    /// `ceil(group / capacity) * ceil(hours / block)` units
    PerCapacityBlock,
    /// `group * ceil(hours)` person-hours
    PerPersonPerHour,
}

/// Immutable reference entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub key: CatalogKey,
    pub name: &'static str,
    pub display: &'static str,
    /// People per unit (vehicle). Ignored for per-person pricing.
    pub capacity_per_unit: u32,
    pub time_block_hours: u32,
    pub price_per_unit: Money,
    pub mode: PricingMode,
    /// Travel mode implied by selecting this transport
    pub tour_type: TourType,
}

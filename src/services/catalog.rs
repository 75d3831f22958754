//! Static pricing catalog and billable-unit derivation

use once_cell::sync::Lazy;

use crate::types::{CatalogEntry, CatalogKey, Money, PricingMode, TourType};

/// Shared, read-only catalog
pub static STANDARD_CATALOG: Lazy<Catalog> = Lazy::new(Catalog::standard);

#[derive(Debug, Clone)]
pub struct Catalog {
    /// Indexed by `CatalogKey` declaration order
    entries: [CatalogEntry; 3],
}

/// Billable units for one catalog line plus a human-readable derivation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDerivation {
    pub units: i64,
    pub notes: String,
}

impl Catalog {
    pub fn standard() -> Self {
        Self {
            entries: [
                CatalogEntry {
                    key: CatalogKey::Jeeps,
                    name: "Jeeps",
                    display: "Jeeps - €400/jeep per 4h block, 6 ppl/jeep",
                    capacity_per_unit: 6,
                    time_block_hours: 4,
                    price_per_unit: Money::from_euros(400),
                    mode: PricingMode::PerCapacityBlock,
                    tour_type: TourType::Driving,
                },
                CatalogEntry {
                    key: CatalogKey::Walking,
                    name: "Walking",
                    display: "Walking - €10/person per hour",
                    capacity_per_unit: 1,
                    time_block_hours: 1,
                    price_per_unit: Money::from_euros(10),
                    mode: PricingMode::PerPersonPerHour,
                    tour_type: TourType::Walking,
                },
                CatalogEntry {
                    key: CatalogKey::Rzr,
                    name: "RZR",
                    display: "RZR - €200/car per 2h block, 2 ppl/car",
                    capacity_per_unit: 2,
                    time_block_hours: 2,
                    price_per_unit: Money::from_euros(200),
                    mode: PricingMode::PerCapacityBlock,
                    tour_type: TourType::Driving,
                },
            ],
        }
    }

    pub fn get(&self, key: CatalogKey) -> &CatalogEntry {
        let index = match key {
            CatalogKey::Jeeps => 0,
            CatalogKey::Walking => 1,
            CatalogKey::Rzr => 2,
        };
        &self.entries[index]
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }
}

impl CatalogEntry {
    /// Billing item name, e.g. "Jeeps Tour"
    pub fn item_name(&self) -> String {
        format!("{} Tour", self.name)
    }

    /// Billable units for a group over `duration_hours`.
    ///
    /// Time is always rounded up to whole blocks with a minimum of one.
    pub fn derive_units(&self, group_size: u32, duration_hours: f64) -> UnitDerivation {
        let blocks = time_blocks(duration_hours, self.time_block_hours);
        match self.mode {
            PricingMode::PerCapacityBlock => {
                let capacity = self.capacity_per_unit.max(1);
                let vehicles = group_size.div_ceil(capacity) as i64;
                UnitDerivation {
                    units: vehicles.saturating_mul(blocks),
                    notes: format!(
                        "{} vehicle(s) x {} block(s) of {}h",
                        vehicles, blocks, self.time_block_hours
                    ),
                }
            }
            PricingMode::PerPersonPerHour => UnitDerivation {
                units: i64::from(group_size).saturating_mul(blocks),
                notes: format!(
                    "{} ppl x {} block(s) of {}h",
                    group_size, blocks, self.time_block_hours
                ),
            },
        }
    }
}

/// `max(1, ceil(hours / block))`
fn time_blocks(duration_hours: f64, block_hours: u32) -> i64 {
    let block = block_hours.max(1) as f64;
    if !duration_hours.is_finite() || duration_hours <= 0.0 {
        return 1;
    }
    ((duration_hours / block).ceil() as i64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_keys() {
        let catalog = Catalog::standard();
        assert_eq!(catalog.entries().len(), 3);
        for key in [CatalogKey::Jeeps, CatalogKey::Walking, CatalogKey::Rzr] {
            assert_eq!(catalog.get(key).key, key);
        }
    }

    #[test]
    fn test_jeeps_20_people_8_hours() {
        let jeeps = STANDARD_CATALOG.get(CatalogKey::Jeeps);
        let derived = jeeps.derive_units(20, 8.0);

        // 4 jeeps x 2 blocks
        assert_eq!(derived.units, 8);
        assert_eq!(derived.notes, "4 vehicle(s) x 2 block(s) of 4h");
        assert_eq!(jeeps.price_per_unit.checked_mul(derived.units), Some(Money::from_euros(3200)));
    }

    #[test]
    fn test_walking_6_people_3_hours() {
        let walking = STANDARD_CATALOG.get(CatalogKey::Walking);
        let derived = walking.derive_units(6, 3.0);

        assert_eq!(derived.units, 18);
        assert_eq!(derived.notes, "6 ppl x 3 block(s) of 1h");
        assert_eq!(walking.price_per_unit.checked_mul(derived.units), Some(Money::from_euros(180)));
    }

    #[test]
    fn test_partial_blocks_round_up() {
        let rzr = STANDARD_CATALOG.get(CatalogKey::Rzr);
        // 5 people -> 3 cars, 2.5h -> 2 blocks of 2h
        let derived = rzr.derive_units(5, 2.5);
        assert_eq!(derived.units, 6);

        let walking = STANDARD_CATALOG.get(CatalogKey::Walking);
        assert_eq!(walking.derive_units(4, 0.5).units, 4);
    }

    #[test]
    fn test_zero_duration_bills_one_block() {
        let jeeps = STANDARD_CATALOG.get(CatalogKey::Jeeps);
        assert_eq!(jeeps.derive_units(6, 0.0).units, 1);
    }

    #[test]
    fn test_transport_implies_tour_type() {
        assert_eq!(STANDARD_CATALOG.get(CatalogKey::Walking).tour_type, TourType::Walking);
        assert_eq!(STANDARD_CATALOG.get(CatalogKey::Jeeps).tour_type, TourType::Driving);
        assert_eq!(STANDARD_CATALOG.get(CatalogKey::Rzr).tour_type, TourType::Driving);
    }

    #[test]
    fn test_item_name() {
        assert_eq!(STANDARD_CATALOG.get(CatalogKey::Rzr).item_name(), "RZR Tour");
    }
}

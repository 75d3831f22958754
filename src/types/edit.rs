//! Edit commands accepted by `apply_edit`

use serde::{Deserialize, Serialize};

use super::{ActivityType, CatalogKey, Coordinates, ItemId, ItemType, Money, StopId, SubGroup, TourType};

/// Stop payload for `AddStop`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStop {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    /// Minutes; defaults to 60
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub activity_type: ActivityType,
    #[serde(default)]
    pub sub_group: SubGroup,
}

/// Custom billing item payload for `AddCustomItem`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustomItem {
    pub name: String,
    #[serde(default)]
    pub item_type: ItemType,
    pub unit_price: Money,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub sub_group: SubGroup,
}

/// Single user edit on one proposal
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum EditCommand {
    AddStop {
        stop: NewStop,
    },
    RemoveStop {
        stop_id: StopId,
    },
    /// Full permutation of the current stop ids
    ReorderStops {
        new_order: Vec<StopId>,
    },
    SetDuration {
        stop_id: StopId,
        minutes: i64,
    },
    /// `HH:MM`, must sit on a 15-minute boundary
    SetStartTime {
        start_time: String,
    },
    /// Add the catalog item if absent, remove it if present
    ToggleCatalogItem {
        key: CatalogKey,
    },
    AddCustomItem {
        item: NewCustomItem,
    },
    SetOverride {
        item_id: ItemId,
        unit_price: Money,
    },
    RemoveOverride {
        item_id: ItemId,
    },
    RemoveBillingItem {
        item_id: ItemId,
    },
    SetCustomUnitPrice {
        item_id: ItemId,
        unit_price: Money,
    },
    /// Coordinates resolved by the geocoding collaborator (or cleared)
    SetStopLocation {
        stop_id: StopId,
        location: Option<String>,
        coordinates: Option<Coordinates>,
    },
    SetAnchor {
        stop_id: Option<StopId>,
    },
    SetTourType {
        tour_type: TourType,
    },
    /// Hand the stop order back to the sequencer
    OptimizeRoute,
    RenameProposal {
        name: String,
    },
}

/// Which stage of the recompute chain an edit re-enters
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Staleness {
    Clean,
    NeedsPricing,
    NeedsTiming,
    NeedsSequencing,
}

impl EditCommand {
    /// Entry point of the recompute chain for this edit, before
    /// any state-dependent escalation (e.g. a toggle that changes tour type).
    pub fn staleness(&self) -> Staleness {
        match self {
            EditCommand::AddStop { .. }
            | EditCommand::RemoveStop { .. }
            | EditCommand::ReorderStops { .. }
            | EditCommand::SetAnchor { .. }
            | EditCommand::SetTourType { .. }
            | EditCommand::OptimizeRoute => Staleness::NeedsSequencing,
            EditCommand::SetDuration { .. }
            | EditCommand::SetStartTime { .. }
            | EditCommand::SetStopLocation { .. } => Staleness::NeedsTiming,
            EditCommand::ToggleCatalogItem { .. }
            | EditCommand::AddCustomItem { .. }
            | EditCommand::SetOverride { .. }
            | EditCommand::RemoveOverride { .. }
            | EditCommand::RemoveBillingItem { .. }
            | EditCommand::SetCustomUnitPrice { .. } => Staleness::NeedsPricing,
            EditCommand::RenameProposal { .. } => Staleness::Clean,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            EditCommand::AddStop { .. } => "add_stop",
            EditCommand::RemoveStop { .. } => "remove_stop",
            EditCommand::ReorderStops { .. } => "reorder_stops",
            EditCommand::SetDuration { .. } => "set_duration",
            EditCommand::SetStartTime { .. } => "set_start_time",
            EditCommand::ToggleCatalogItem { .. } => "toggle_catalog_item",
            EditCommand::AddCustomItem { .. } => "add_custom_item",
            EditCommand::SetOverride { .. } => "set_override",
            EditCommand::RemoveOverride { .. } => "remove_override",
            EditCommand::RemoveBillingItem { .. } => "remove_billing_item",
            EditCommand::SetCustomUnitPrice { .. } => "set_custom_unit_price",
            EditCommand::SetStopLocation { .. } => "set_stop_location",
            EditCommand::SetAnchor { .. } => "set_anchor",
            EditCommand::SetTourType { .. } => "set_tour_type",
            EditCommand::OptimizeRoute => "optimize_route",
            EditCommand::RenameProposal { .. } => "rename_proposal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_edit_command_json_shape() {
        let json = r#"{"type":"set_duration","stopId":"00000000-0000-0000-0000-000000000001","minutes":90}"#;
        let cmd: EditCommand = serde_json::from_str(json).unwrap();
        match cmd {
            EditCommand::SetDuration { stop_id, minutes } => {
                assert_eq!(stop_id, Uuid::from_u128(1));
                assert_eq!(minutes, 90);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_toggle_catalog_json() {
        let cmd: EditCommand = serde_json::from_str(r#"{"type":"toggle_catalog_item","key":"jeeps"}"#).unwrap();
        assert!(matches!(cmd, EditCommand::ToggleCatalogItem { key: CatalogKey::Jeeps }));
    }

    #[test]
    fn test_staleness_entry_points() {
        assert_eq!(EditCommand::OptimizeRoute.staleness(), Staleness::NeedsSequencing);
        assert_eq!(
            EditCommand::SetStartTime { start_time: "10:00".into() }.staleness(),
            Staleness::NeedsTiming
        );
        assert_eq!(
            EditCommand::RemoveOverride { item_id: Uuid::nil() }.staleness(),
            Staleness::NeedsPricing
        );
        assert!(Staleness::NeedsSequencing > Staleness::NeedsTiming);
        assert!(Staleness::NeedsTiming > Staleness::NeedsPricing);
    }
}

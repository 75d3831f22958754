//! Computed proposal state: timeline, price breakdown, advisories

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use super::{
    Event, ItemId, Money, Proposal, RouteGeometry, SequencingMode, Staleness, Stop, StopId, SubGroup,
};

/// Stop annotated by the timeline builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimedStop {
    #[serde(flatten)]
    pub stop: Stop,
    pub arrival: NaiveTime,
    pub departure: NaiveTime,
    /// Minutes since midnight; can exceed 1440 when the schedule rolls over
    pub arrival_minute: u32,
    pub departure_minute: u32,
    /// 0 for the last stop
    pub travel_to_next_minutes: u32,
    /// Travel into this stop was not resolved and the default was used
    pub estimated: bool,
}

/// Advisory schedule problem. Never blocks recomputation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Conflict {
    /// The itinerary runs through lunch but no food stop overlaps 12:00-14:00
    NoMealInWindow,
    ExceedsEventDuration { total_minutes: u32, max_minutes: u32 },
    PastMidnight { end_minute: u32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub stops: Vec<TimedStop>,
    pub conflicts: Vec<Conflict>,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub total_minutes: u32,
    pub total_travel_minutes: u32,
    pub total_stop_minutes: u32,
}

impl Timeline {
    pub fn estimated_stops(&self) -> Vec<StopId> {
        self.stops.iter().filter(|s| s.estimated).map(|s| s.stop.id).collect()
    }

    pub fn has_conflict(&self, conflict: &Conflict) -> bool {
        self.conflicts.contains(conflict)
    }
}

/// One priced billing item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceLine {
    pub item_id: ItemId,
    pub name: String,
    pub sub_group: SubGroup,
    pub quantity: i64,
    pub unit_price: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_price: Option<Money>,
    pub total: Money,
    /// How the quantity was derived, e.g. "4 vehicle(s) x 2 block(s) of 4h"
    pub notes: String,
}

impl PriceLine {
    pub fn effective_unit_price(&self) -> Money {
        self.override_price.unwrap_or(self.unit_price)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubGroupTotal {
    pub sub_group: SubGroup,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetCheck {
    pub budget_per_person: Money,
    pub within_budget: bool,
    /// Zero when within budget
    pub over_by_per_person: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceBreakdown {
    pub lines: Vec<PriceLine>,
    pub subtotal: Money,
    pub discount: Money,
    pub total: Money,
    pub per_person: Money,
    /// Empty when "All" items are not attributed to any group
    pub per_sub_group: Vec<SubGroupTotal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget: Option<BudgetCheck>,
}

impl PriceBreakdown {
    pub fn sub_group_total(&self, group: SubGroup) -> Option<Money> {
        self.per_sub_group
            .iter()
            .find(|g| g.sub_group == group)
            .map(|g| g.total)
    }
}

/// Which search produced the stop order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequencingStrategy {
    Exact,
    /// Nearest neighbour + 2-opt
    Heuristic,
}

/// Where the best-placed food stop lands relative to 12:00-14:00
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LunchFit {
    /// A food stop arrives inside the window
    Inside,
    /// A food stop is open during part of the window
    Overlapping,
    Missed,
    NoFoodStop,
}

impl LunchFit {
    /// Sort rank, lower is better. Without food stops there is nothing to place.
    pub const fn rank(self) -> u8 {
        match self {
            LunchFit::Inside | LunchFit::NoFoodStop => 0,
            LunchFit::Overlapping => 1,
            LunchFit::Missed => 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SequencingSummary {
    pub mode: SequencingMode,
    pub strategy: SequencingStrategy,
    pub lunch: LunchFit,
    pub total_travel_minutes: u32,
}

/// Non-fatal condition attached to a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Advisory {
    /// Travel into these stops used the default duration
    EstimatedTravel { stop_ids: Vec<StopId> },
    /// Stop order came from the heuristic, not the exact search
    SequencingDegraded { stop_count: usize },
    /// Manual order; the sequencer found a cheaper one
    ShorterOrderAvailable {
        current_travel_minutes: u32,
        suggested_travel_minutes: u32,
        suggested_order: Vec<StopId>,
    },
    UnlocatedStops { stop_ids: Vec<StopId> },
    OverBudget { over_by_per_person: Money },
}

/// Event fields a proposal view needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventContext {
    pub client_name: String,
    pub group_size: u32,
    /// dd/mm/yyyy
    pub date: String,
    pub duration_hours: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_per_person: Option<Money>,
}

impl From<&Event> for EventContext {
    fn from(event: &Event) -> Self {
        Self {
            client_name: event.client_name.clone(),
            group_size: event.group_size,
            date: event.date_display(),
            duration_hours: event.duration_hours,
            budget_per_person: event.budget_per_person,
        }
    }
}

/// Immutable, point-in-time view of one proposal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalSnapshot {
    /// Increments on every applied edit
    pub version: u64,
    pub proposal: Proposal,
    pub event: EventContext,
    pub sequencing: SequencingSummary,
    pub timeline: Timeline,
    pub pricing: PriceBreakdown,
    pub advisories: Vec<Advisory>,
    #[serde(skip_serializing_if = "RouteGeometry::is_empty", default)]
    pub geometry: RouteGeometry,
    /// Stage the last edit re-entered the recompute chain at
    pub recomputed_from: Staleness,
}

impl ProposalSnapshot {
    pub fn has_advisory(&self, predicate: impl Fn(&Advisory) -> bool) -> bool {
        self.advisories.iter().any(predicate)
    }
}

//! Per-proposal edit orchestration
//!
//! An edit is validated and applied to a copy of the proposal, then the
//! recompute chain runs from the stage the edit invalidated:
//! sequencer -> timeline -> pricing. Only a fully recomputed copy is
//! committed, so a rejected edit leaves the proposal untouched.

use std::time::{Duration, Instant};

use chrono::{NaiveTime, Timelike};
use tracing::{debug, info};
use uuid::Uuid;

use crate::defaults::{DEFAULT_STOP_DURATION_MINUTES, START_TIME_QUANTUM_MINUTES, TRAVEL_TIMEOUT_MS};
use crate::error::EditError;
use crate::services::catalog::Catalog;
use crate::services::pricing::{self, AllSplitPolicy, PricingInput};
use crate::services::routing::TravelTimeProvider;
use crate::services::sequencer::{self, SequencerPolicy};
use crate::services::timeline;
use crate::services::travel_matrix::{refresh_matrix, TravelMatrix};
use crate::types::{
    Advisory, BillingItem, Coordinates, EditCommand, Event, ItemPricing, ItemType, Money, Proposal,
    ProposalSnapshot, SequencingMode, SequencingStrategy, SequencingSummary, Staleness, Stop,
    StopId,
};

/// Longest accepted stop duration
const MAX_STOP_DURATION_MINUTES: i64 = 24 * 60;

/// Worker-wide recompute settings
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub sequencer: SequencerPolicy,
    pub split_policy: AllSplitPolicy,
    /// Per-call travel lookup timeout
    pub travel_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            sequencer: SequencerPolicy::default(),
            split_policy: AllSplitPolicy::default(),
            travel_timeout: Duration::from_millis(TRAVEL_TIMEOUT_MS),
        }
    }
}

/// `HH:MM` on a 15-minute boundary
pub fn parse_start_time(value: &str) -> Result<NaiveTime, EditError> {
    let time = NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| EditError::invalid(format!("start time '{}' is not HH:MM", value)))?;
    if time.minute() % START_TIME_QUANTUM_MINUTES != 0 {
        return Err(EditError::invalid(format!(
            "start time '{}' is not on a {}-minute boundary",
            value, START_TIME_QUANTUM_MINUTES
        )));
    }
    Ok(time)
}

pub(crate) fn non_negative_price(price: Money, what: &str) -> Result<Money, EditError> {
    if price.is_negative() {
        return Err(EditError::invalid(format!("{} must not be negative, got {}", what, price)));
    }
    Ok(price)
}

pub(crate) fn required_name(name: &str, what: &str) -> Result<String, EditError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(EditError::invalid(format!("{} name must not be empty", what)));
    }
    Ok(trimmed.to_string())
}

pub(crate) fn stop_duration(minutes: i64) -> Result<u32, EditError> {
    if !(0..=MAX_STOP_DURATION_MINUTES).contains(&minutes) {
        return Err(EditError::invalid(format!(
            "duration must be between 0 and {} minutes, got {}",
            MAX_STOP_DURATION_MINUTES, minutes
        )));
    }
    Ok(minutes as u32)
}

pub(crate) fn located(coordinates: Option<Coordinates>) -> Result<Option<Coordinates>, EditError> {
    match coordinates {
        Some(coords) if !coords.is_valid() => Err(EditError::invalid("stop coordinates out of range")),
        other => Ok(other),
    }
}

fn stop_index(proposal: &Proposal, id: StopId) -> Result<usize, EditError> {
    proposal
        .stops
        .iter()
        .position(|s| s.id == id)
        .ok_or_else(|| EditError::invalid(format!("unknown stop {}", id)))
}

fn item_index(proposal: &Proposal, id: Uuid) -> Result<usize, EditError> {
    proposal
        .items
        .iter()
        .position(|i| i.id == id)
        .ok_or_else(|| EditError::invalid(format!("unknown billing item {}", id)))
}

/// Move the anchored stop to the front, keeping everything else in order.
fn pin_anchor(proposal: &mut Proposal) {
    if let Some(anchor) = proposal.anchor {
        if let Some(index) = proposal.stops.iter().position(|s| s.id == anchor) {
            let stop = proposal.stops.remove(index);
            proposal.stops.insert(0, stop);
        }
    }
}

/// Validate `command` and apply it to `proposal`.
///
/// Returns the recompute stage the edit invalidated. On error `proposal`
/// may be partially modified; callers apply edits to a copy.
pub fn apply_command(
    proposal: &mut Proposal,
    command: &EditCommand,
    catalog: &Catalog,
) -> Result<Staleness, EditError> {
    let mut staleness = command.staleness();

    match command {
        EditCommand::AddStop { stop } => {
            let coordinates = located(stop.coordinates)?;
            proposal.stops.push(Stop {
                id: Uuid::new_v4(),
                name: required_name(&stop.name, "stop")?,
                location: stop.location.clone(),
                coordinates,
                duration_minutes: match stop.duration_minutes {
                    Some(minutes) => stop_duration(minutes)?,
                    None => DEFAULT_STOP_DURATION_MINUTES,
                },
                notes: stop.notes.clone(),
                activity_type: stop.activity_type,
                sub_group: stop.sub_group,
            });
        }
        EditCommand::RemoveStop { stop_id } => {
            let index = stop_index(proposal, *stop_id)?;
            proposal.stops.remove(index);
            if proposal.anchor == Some(*stop_id) {
                proposal.anchor = None;
            }
        }
        EditCommand::ReorderStops { new_order } => {
            if new_order.len() != proposal.stops.len() {
                return Err(EditError::invalid(format!(
                    "reorder lists {} stops, proposal has {}",
                    new_order.len(),
                    proposal.stops.len()
                )));
            }
            let mut remaining = proposal.stops.clone();
            let mut reordered = Vec::with_capacity(new_order.len());
            for id in new_order {
                let index = remaining
                    .iter()
                    .position(|s| s.id == *id)
                    .ok_or_else(|| EditError::invalid(format!("reorder references unknown or repeated stop {}", id)))?;
                reordered.push(remaining.remove(index));
            }
            if let Some(anchor) = proposal.anchor {
                if new_order.first() != Some(&anchor) {
                    return Err(EditError::invalid("the anchored stop must stay first"));
                }
            }
            proposal.stops = reordered;
            proposal.sequencing = SequencingMode::Manual;
        }
        EditCommand::SetDuration { stop_id, minutes } => {
            let minutes = stop_duration(*minutes)?;
            let index = stop_index(proposal, *stop_id)?;
            proposal.stops[index].duration_minutes = minutes;
        }
        EditCommand::SetStartTime { start_time } => {
            proposal.start_time = parse_start_time(start_time)?;
        }
        EditCommand::ToggleCatalogItem { key } => {
            if let Some(index) = proposal.items.iter().position(|i| i.catalog_key() == Some(*key)) {
                let removed = proposal.items.remove(index);
                proposal.overrides.remove(&removed.id);
            } else {
                let entry = catalog.get(*key);
                proposal.items.push(BillingItem {
                    id: Uuid::new_v4(),
                    name: entry.item_name(),
                    item_type: ItemType::Transport,
                    pricing: ItemPricing::Catalog { key: *key },
                    unit_price: entry.price_per_unit,
                    notes: String::new(),
                    sub_group: Default::default(),
                });
                if proposal.tour_type != entry.tour_type {
                    proposal.tour_type = entry.tour_type;
                    staleness = Staleness::NeedsSequencing;
                }
            }
        }
        EditCommand::AddCustomItem { item } => {
            proposal.items.push(BillingItem {
                id: Uuid::new_v4(),
                name: required_name(&item.name, "billing item")?,
                item_type: item.item_type,
                pricing: ItemPricing::Custom,
                unit_price: non_negative_price(item.unit_price, "unit price")?,
                notes: item.notes.clone(),
                sub_group: item.sub_group,
            });
        }
        EditCommand::SetOverride { item_id, unit_price } => {
            item_index(proposal, *item_id)?;
            let price = non_negative_price(*unit_price, "override")?;
            proposal.overrides.insert(*item_id, price);
        }
        EditCommand::RemoveOverride { item_id } => {
            item_index(proposal, *item_id)?;
            proposal.overrides.remove(item_id);
        }
        EditCommand::RemoveBillingItem { item_id } => {
            let index = item_index(proposal, *item_id)?;
            proposal.items.remove(index);
            proposal.overrides.remove(item_id);
        }
        EditCommand::SetCustomUnitPrice { item_id, unit_price } => {
            let index = item_index(proposal, *item_id)?;
            let price = non_negative_price(*unit_price, "unit price")?;
            let item = &mut proposal.items[index];
            if item.catalog_key().is_some() {
                return Err(EditError::invalid(format!(
                    "unit price of catalog item '{}' is locked; use an override",
                    item.name
                )));
            }
            item.unit_price = price;
        }
        EditCommand::SetStopLocation { stop_id, location, coordinates } => {
            let coordinates = located(*coordinates)?;
            let index = stop_index(proposal, *stop_id)?;
            let stop = &mut proposal.stops[index];
            stop.location = location.clone();
            stop.coordinates = coordinates;
        }
        EditCommand::SetAnchor { stop_id } => {
            if let Some(id) = stop_id {
                stop_index(proposal, *id)?;
            }
            proposal.anchor = *stop_id;
            pin_anchor(proposal);
        }
        EditCommand::SetTourType { tour_type } => {
            proposal.tour_type = *tour_type;
        }
        EditCommand::OptimizeRoute => {
            proposal.sequencing = SequencingMode::Auto;
        }
        EditCommand::RenameProposal { name } => {
            proposal.name = required_name(name, "proposal")?;
        }
    }

    Ok(staleness)
}

/// Inputs shared by every stage of one recompute
pub struct RecomputeContext<'a> {
    pub event: &'a Event,
    pub travel: &'a TravelMatrix,
    pub catalog: &'a Catalog,
    pub settings: &'a PipelineSettings,
}

/// Run the recompute chain from `staleness` and build the next snapshot.
///
/// Stages below the entry point are reused from `previous`. In `Auto`
/// mode the sequencer reorders `proposal.stops`; in `Manual` mode it only
/// suggests. Pure given its inputs: no I/O.
pub fn recompute(
    proposal: &mut Proposal,
    ctx: &RecomputeContext<'_>,
    staleness: Staleness,
    previous: Option<&ProposalSnapshot>,
) -> Result<ProposalSnapshot, EditError> {
    let started = Instant::now();
    let staleness = if previous.is_none() { Staleness::NeedsSequencing } else { staleness };
    let mut sequencing_advisories = Vec::new();

    let strategy = if staleness >= Staleness::NeedsSequencing {
        let outcome = sequencer::sequence(
            &proposal.stops,
            ctx.travel,
            proposal.anchor,
            proposal.start_time,
            &ctx.settings.sequencer,
        );
        if outcome.degraded {
            sequencing_advisories.push(Advisory::SequencingDegraded {
                stop_count: proposal.stops.len(),
            });
        }
        match proposal.sequencing {
            SequencingMode::Auto => reorder(&mut proposal.stops, &outcome.order),
            SequencingMode::Manual => {
                sequencing_advisories.extend(better_order(proposal, ctx.travel, &outcome.order));
            }
        }
        outcome.strategy
    } else {
        // Stop order unchanged; keep what the last sequencing run reported,
        // re-scoring its suggestion against the current start and durations
        for advisory in previous.iter().flat_map(|p| p.advisories.iter()) {
            match advisory {
                Advisory::SequencingDegraded { .. } => sequencing_advisories.push(advisory.clone()),
                Advisory::ShorterOrderAvailable { suggested_order, .. } => {
                    sequencing_advisories.extend(better_order(proposal, ctx.travel, suggested_order));
                }
                _ => {}
            }
        }
        previous.map_or(SequencingStrategy::Exact, |p| p.sequencing.strategy)
    };

    let (timeline, geometry) = match previous {
        Some(prev) if staleness < Staleness::NeedsTiming => (prev.timeline.clone(), prev.geometry.clone()),
        _ => (
            timeline::build(
                &proposal.stops,
                proposal.start_time,
                ctx.travel,
                ctx.event.max_itinerary_minutes(),
            ),
            ctx.travel.geometry(&proposal.stops),
        ),
    };

    let pricing = match previous {
        Some(prev) if staleness < Staleness::NeedsPricing => prev.pricing.clone(),
        _ => {
            let sub_groups = proposal.active_sub_groups();
            pricing::price(
                &PricingInput {
                    items: &proposal.items,
                    sub_groups: &sub_groups,
                    group_size: i64::from(ctx.event.group_size),
                    duration_hours: ctx.event.duration_hours,
                    overrides: &proposal.overrides,
                    budget_per_person: ctx.event.budget_per_person,
                    split_policy: ctx.settings.split_policy,
                },
                ctx.catalog,
            )?
        }
    };

    let (lunch, total_travel_minutes) =
        sequencer::evaluate_order(&proposal.stops, ctx.travel, proposal.start_time);

    let mut advisories = Vec::new();
    let estimated = timeline.estimated_stops();
    if !estimated.is_empty() {
        advisories.push(Advisory::EstimatedTravel { stop_ids: estimated });
    }
    let unlocated: Vec<StopId> = proposal
        .stops
        .iter()
        .filter(|s| s.coordinates.is_none())
        .map(|s| s.id)
        .collect();
    if !unlocated.is_empty() {
        advisories.push(Advisory::UnlocatedStops { stop_ids: unlocated });
    }
    advisories.extend(sequencing_advisories);
    if let Some(budget) = &pricing.budget {
        if !budget.within_budget {
            advisories.push(Advisory::OverBudget {
                over_by_per_person: budget.over_by_per_person,
            });
        }
    }

    debug!(
        "Recomputed proposal {} from {:?} in {:?}: {} stops, total {}",
        proposal.label,
        staleness,
        started.elapsed(),
        proposal.stops.len(),
        pricing.total
    );

    Ok(ProposalSnapshot {
        version: previous.map_or(0, |p| p.version + 1),
        proposal: proposal.clone(),
        event: ctx.event.into(),
        sequencing: SequencingSummary {
            mode: proposal.sequencing,
            strategy,
            lunch,
            total_travel_minutes,
        },
        timeline,
        pricing,
        advisories,
        geometry,
        recomputed_from: staleness,
    })
}

/// Reorder `stops` to follow `order` (a permutation of their ids).
/// `ShorterOrderAvailable` when `order` beats the current stop order on
/// (lunch rank, travel) from the current start time.
fn better_order(proposal: &Proposal, travel: &TravelMatrix, order: &[StopId]) -> Option<Advisory> {
    let current: Vec<StopId> = proposal.stops.iter().map(|s| s.id).collect();
    if order == current.as_slice() {
        return None;
    }
    let mut suggested = proposal.stops.clone();
    reorder(&mut suggested, order);

    let (lunch, current_travel) = sequencer::evaluate_order(&proposal.stops, travel, proposal.start_time);
    let (suggested_lunch, suggested_travel) = sequencer::evaluate_order(&suggested, travel, proposal.start_time);
    ((suggested_lunch.rank(), suggested_travel) < (lunch.rank(), current_travel)).then(|| {
        Advisory::ShorterOrderAvailable {
            current_travel_minutes: current_travel,
            suggested_travel_minutes: suggested_travel,
            suggested_order: order.to_vec(),
        }
    })
}

fn reorder(stops: &mut Vec<Stop>, order: &[StopId]) {
    let mut remaining = std::mem::take(stops);
    for id in order {
        if let Some(index) = remaining.iter().position(|s| s.id == *id) {
            stops.push(remaining.remove(index));
        }
    }
    // Nothing is dropped even if `order` were incomplete
    stops.append(&mut remaining);
}

/// Editable proposal plus its travel cache. Owned by one edit gate.
#[derive(Debug)]
pub struct ProposalState {
    proposal: Proposal,
    matrix: TravelMatrix,
}

impl ProposalState {
    pub fn new(proposal: Proposal) -> Self {
        let matrix = TravelMatrix::new(proposal.tour_type);
        Self { proposal, matrix }
    }

    pub fn proposal(&self) -> &Proposal {
        &self.proposal
    }

    /// Resolve missing legs for the current stops and build the first snapshot.
    pub async fn initialize(
        &mut self,
        event: &Event,
        provider: &dyn TravelTimeProvider,
        catalog: &Catalog,
        settings: &PipelineSettings,
    ) -> Result<ProposalSnapshot, EditError> {
        self.matrix.set_mode(self.proposal.tour_type);
        refresh_matrix(&mut self.matrix, &self.proposal.stops, provider, settings.travel_timeout).await;

        let mut proposal = self.proposal.clone();
        let ctx = RecomputeContext {
            event,
            travel: &self.matrix,
            catalog,
            settings,
        };
        let snapshot = recompute(&mut proposal, &ctx, Staleness::NeedsSequencing, None)?;
        self.proposal = proposal;
        Ok(snapshot)
    }

    /// Apply one edit to completion: validate, refresh travel, recompute, commit.
    pub async fn apply(
        &mut self,
        command: &EditCommand,
        previous: &ProposalSnapshot,
        event: &Event,
        provider: &dyn TravelTimeProvider,
        catalog: &Catalog,
        settings: &PipelineSettings,
    ) -> Result<ProposalSnapshot, EditError> {
        let mut candidate = self.proposal.clone();
        let staleness = apply_command(&mut candidate, command, catalog)?;

        if staleness >= Staleness::NeedsTiming {
            self.matrix.set_mode(candidate.tour_type);
            let stats = refresh_matrix(&mut self.matrix, &candidate.stops, provider, settings.travel_timeout).await;
            if stats.requested > 0 {
                debug!(
                    "Travel refresh for proposal {}: {} requested, {} resolved",
                    candidate.label, stats.requested, stats.resolved
                );
            }
        }

        let ctx = RecomputeContext {
            event,
            travel: &self.matrix,
            catalog,
            settings,
        };
        let snapshot = recompute(&mut candidate, &ctx, staleness, Some(previous))?;
        info!(
            "Applied {} to proposal {} ({}), version {}",
            command.name(),
            candidate.label,
            candidate.id,
            snapshot.version
        );
        self.proposal = candidate;
        Ok(snapshot)
    }
}

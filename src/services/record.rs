//! Serializable proposal record for the persistence collaborator

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{EditError, RecordError};
use crate::services::proposal_state::{
    located, non_negative_price, parse_start_time, required_name, stop_duration,
};
use crate::types::{
    BillingItem, EventId, ItemId, Money, Proposal, ProposalId, ProposalLabel, SequencingMode,
    Stop, StopId, TourType,
};

pub const RECORD_VERSION: u32 = 1;

/// Stored form of a proposal. Derived values (timeline, pricing) are not
/// stored; they are recomputed on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalRecord {
    pub version: u32,
    pub id: ProposalId,
    pub event_id: EventId,
    pub label: ProposalLabel,
    pub name: String,
    /// HH:MM
    pub start_time: String,
    pub tour_type: TourType,
    pub sequencing: SequencingMode,
    #[serde(default)]
    pub anchor: Option<StopId>,
    #[serde(default)]
    pub stops: Vec<Stop>,
    #[serde(default)]
    pub items: Vec<BillingItem>,
    #[serde(default)]
    pub overrides: BTreeMap<ItemId, Money>,
}

pub fn serialize(proposal: &Proposal) -> ProposalRecord {
    ProposalRecord {
        version: RECORD_VERSION,
        id: proposal.id,
        event_id: proposal.event_id,
        label: proposal.label,
        name: proposal.name.clone(),
        start_time: proposal.start_time.format("%H:%M").to_string(),
        tour_type: proposal.tour_type,
        sequencing: proposal.sequencing,
        anchor: proposal.anchor,
        stops: proposal.stops.clone(),
        items: proposal.items.clone(),
        overrides: proposal.overrides.clone(),
    }
}

/// Rebuild a proposal, rejecting records whose references do not resolve.
pub fn deserialize(record: ProposalRecord) -> Result<Proposal, RecordError> {
    if record.version != RECORD_VERSION {
        return Err(RecordError::UnsupportedVersion(record.version));
    }
    let start_time =
        parse_start_time(&record.start_time).map_err(|_| RecordError::InvalidStartTime(record.start_time.clone()))?;

    let mut seen = HashSet::new();
    for id in record.stops.iter().map(|s| s.id).chain(record.items.iter().map(|i| i.id)) {
        if !seen.insert(id) {
            return Err(RecordError::DuplicateId(id));
        }
    }
    if let Some(anchor) = record.anchor {
        if !record.stops.iter().any(|s| s.id == anchor) {
            return Err(RecordError::DanglingAnchor(anchor));
        }
    }
    if let Some(id) = record.overrides.keys().find(|id| !record.items.iter().any(|i| i.id == **id)) {
        return Err(RecordError::DanglingOverride(*id));
    }
    check_fields(&record).map_err(RecordError::Rejected)?;

    Ok(Proposal {
        id: record.id,
        event_id: record.event_id,
        label: record.label,
        name: record.name,
        start_time,
        tour_type: record.tour_type,
        sequencing: record.sequencing,
        anchor: record.anchor,
        stops: record.stops,
        items: record.items,
        overrides: record.overrides,
    })
}

/// Same field rules as `AddStop`, `AddCustomItem` and `SetOverride`
fn check_fields(record: &ProposalRecord) -> Result<(), EditError> {
    for stop in &record.stops {
        required_name(&stop.name, "stop")?;
        stop_duration(i64::from(stop.duration_minutes))?;
        located(stop.coordinates)?;
    }
    for item in &record.items {
        required_name(&item.name, "billing item")?;
        non_negative_price(item.unit_price, "unit price")?;
    }
    for price in record.overrides.values() {
        non_negative_price(*price, "override")?;
    }
    Ok(())
}

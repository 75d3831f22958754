//! In-memory event and proposal store
//!
//! Each proposal has its own edit gate (`tokio::sync::Mutex`) so edits on
//! one proposal run to completion one at a time, while readers take the
//! published `Arc<ProposalSnapshot>` without waiting for the gate.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{EditError, RecordError};
use crate::services::catalog::{Catalog, STANDARD_CATALOG};
use crate::services::proposal_state::{PipelineSettings, ProposalState};
use crate::services::record::{self, ProposalRecord};
use crate::services::routing::TravelTimeProvider;
use crate::types::{
    EditCommand, Event, EventId, EventResponse, NewEvent, Proposal, ProposalId, ProposalLabel,
    ProposalSnapshot, ProposalSummary,
};

struct ProposalEntry {
    event_id: EventId,
    gate: Mutex<ProposalState>,
    snapshot: RwLock<Arc<ProposalSnapshot>>,
}

impl ProposalEntry {
    fn current(&self) -> Arc<ProposalSnapshot> {
        self.snapshot.read().clone()
    }
}

struct EventEntry {
    event: Arc<Event>,
    /// Creation order; labels are unique within the event
    proposals: Vec<(ProposalId, ProposalLabel)>,
}

impl EventEntry {
    /// Letter after the highest label in use
    fn next_label(&self) -> Option<ProposalLabel> {
        match self.proposals.iter().map(|(_, label)| *label).max() {
            Some(highest) => highest.next(),
            None => Some(ProposalLabel::FIRST),
        }
    }

    fn has_label(&self, label: ProposalLabel) -> bool {
        self.proposals.iter().any(|(_, l)| *l == label)
    }

    fn forget(&mut self, proposal_id: ProposalId) {
        self.proposals.retain(|(id, _)| *id != proposal_id);
    }
}

/// Owner of all events and their proposals
pub struct EventStore {
    events: RwLock<HashMap<EventId, EventEntry>>,
    proposals: RwLock<HashMap<ProposalId, Arc<ProposalEntry>>>,
    provider: Arc<dyn TravelTimeProvider>,
    catalog: &'static Catalog,
    settings: PipelineSettings,
}

impl EventStore {
    pub fn new(provider: Arc<dyn TravelTimeProvider>, settings: PipelineSettings) -> Self {
        Self {
            events: RwLock::new(HashMap::new()),
            proposals: RwLock::new(HashMap::new()),
            provider,
            catalog: &STANDARD_CATALOG,
            settings,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        self.catalog
    }

    /// Validate and store a new event. It starts without proposals.
    pub fn create_event(&self, request: NewEvent) -> Result<Arc<Event>, EditError> {
        let event = Arc::new(request.into_event()?);
        info!(
            "Created event {} for {} ({} people, {})",
            event.id,
            event.client_name,
            event.group_size,
            event.date_display()
        );
        self.events.write().insert(
            event.id,
            EventEntry {
                event: event.clone(),
                proposals: Vec::new(),
            },
        );
        Ok(event)
    }

    fn event(&self, event_id: EventId) -> Result<Arc<Event>, EditError> {
        self.events
            .read()
            .get(&event_id)
            .map(|e| e.event.clone())
            .ok_or(EditError::EventNotFound(event_id))
    }

    fn entry(&self, proposal_id: ProposalId) -> Result<Arc<ProposalEntry>, EditError> {
        self.proposals
            .read()
            .get(&proposal_id)
            .cloned()
            .ok_or(EditError::ProposalNotFound(proposal_id))
    }

    /// Event with a summary line per proposal, in label order
    pub fn get_event(&self, event_id: EventId) -> Result<EventResponse, EditError> {
        let (event, ids) = {
            let events = self.events.read();
            let entry = events.get(&event_id).ok_or(EditError::EventNotFound(event_id))?;
            let mut listed = entry.proposals.clone();
            listed.sort_by_key(|(_, label)| *label);
            (entry.event.clone(), listed)
        };

        let proposals = ids
            .into_iter()
            .filter_map(|(id, _)| self.entry(id).ok())
            .map(|entry| {
                let snapshot = entry.current();
                ProposalSummary {
                    id: snapshot.proposal.id,
                    label: snapshot.proposal.label,
                    name: snapshot.proposal.name.clone(),
                    stop_count: snapshot.proposal.stops.len(),
                    total: snapshot.pricing.total,
                    per_person: snapshot.pricing.per_person,
                }
            })
            .collect();

        Ok(EventResponse {
            event: (*event).clone(),
            proposals,
        })
    }

    /// Append an empty proposal labelled after the highest existing one
    pub async fn create_proposal(&self, event_id: EventId) -> Result<Arc<ProposalSnapshot>, EditError> {
        let event = self.event(event_id)?;
        let proposal = {
            let mut events = self.events.write();
            let entry = events.get_mut(&event_id).ok_or(EditError::EventNotFound(event_id))?;
            let label = entry.next_label().ok_or(EditError::TooManyProposals(event_id))?;
            let proposal = Proposal::new(event_id, label);
            entry.proposals.push((proposal.id, label));
            proposal
        };
        self.publish(&event, proposal).await
    }

    /// Restore a persisted proposal under its event.
    ///
    /// The record's label is kept when free; otherwise the proposal takes
    /// the next label, as a new one would.
    pub async fn import(&self, record: ProposalRecord) -> Result<Arc<ProposalSnapshot>, EditError> {
        let mut proposal = record::deserialize(record).map_err(|e| match e {
            RecordError::Rejected(edit) => edit,
            other => EditError::invalid(other.to_string()),
        })?;
        let event = self.event(proposal.event_id)?;
        {
            let mut events = self.events.write();
            let entry = events.get_mut(&event.id).ok_or(EditError::EventNotFound(event.id))?;
            if entry.proposals.iter().any(|(id, _)| *id == proposal.id)
                || self.proposals.read().contains_key(&proposal.id)
            {
                return Err(EditError::invalid(format!("proposal {} already exists", proposal.id)));
            }
            if entry.has_label(proposal.label) {
                let label = entry.next_label().ok_or(EditError::TooManyProposals(event.id))?;
                info!("Imported proposal {} relabelled {} -> {}", proposal.id, proposal.label, label);
                if proposal.name == Proposal::default_name(proposal.label) {
                    proposal.name = Proposal::default_name(label);
                }
                proposal.label = label;
            }
            entry.proposals.push((proposal.id, proposal.label));
        }
        self.publish(&event, proposal).await
    }

    /// Build the first snapshot of a proposal whose id is already listed
    /// under its event, and make it reachable.
    async fn publish(&self, event: &Event, proposal: Proposal) -> Result<Arc<ProposalSnapshot>, EditError> {
        let proposal_id = proposal.id;
        let label = proposal.label;
        let mut state = ProposalState::new(proposal);
        let snapshot = match state
            .initialize(event, self.provider.as_ref(), self.catalog, &self.settings)
            .await
        {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                if let Some(entry) = self.events.write().get_mut(&event.id) {
                    entry.forget(proposal_id);
                }
                return Err(e);
            }
        };

        self.proposals.write().insert(
            proposal_id,
            Arc::new(ProposalEntry {
                event_id: event.id,
                gate: Mutex::new(state),
                snapshot: RwLock::new(snapshot.clone()),
            }),
        );

        info!("Created proposal {} ({}) for event {}", label, proposal_id, event.id);
        Ok(snapshot)
    }

    /// Apply one edit and publish the resulting snapshot.
    ///
    /// Edits on the same proposal are serialised; a rejected edit leaves
    /// both the proposal and its published snapshot unchanged.
    pub async fn apply_edit(
        &self,
        proposal_id: ProposalId,
        command: &EditCommand,
    ) -> Result<Arc<ProposalSnapshot>, EditError> {
        let entry = self.entry(proposal_id)?;
        let event = self.event(entry.event_id)?;

        let mut state = entry.gate.lock().await;
        let previous = entry.current();
        let snapshot = Arc::new(
            state
                .apply(command, &previous, &event, self.provider.as_ref(), self.catalog, &self.settings)
                .await?,
        );
        *entry.snapshot.write() = snapshot.clone();
        Ok(snapshot)
    }

    pub fn get_snapshot(&self, proposal_id: ProposalId) -> Result<Arc<ProposalSnapshot>, EditError> {
        Ok(self.entry(proposal_id)?.current())
    }

    /// Persistable record of the current proposal state
    pub fn export(&self, proposal_id: ProposalId) -> Result<ProposalRecord, EditError> {
        let snapshot = self.get_snapshot(proposal_id)?;
        Ok(record::serialize(&snapshot.proposal))
    }
}

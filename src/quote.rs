//! Offline quoting from a JSON file.
//!
//! Runs the same store and recompute pipeline as the worker, with the
//! haversine travel estimate and the mock geocoder, and prints the snapshot.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use crate::services::geocoding::{locate_command, locate_event, MockGeocoder};
use crate::services::proposal_state::PipelineSettings;
use crate::services::routing::HaversineTravelProvider;
use crate::services::store::EventStore;
use crate::types::{CatalogKey, EditCommand, NewCustomItem, NewEvent, NewStop, ProposalSnapshot};

/// Quote file contents
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub event: NewEvent,
    /// `HH:MM`
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub stops: Vec<NewStop>,
    /// Catalog transports to include
    #[serde(default)]
    pub catalog: Vec<CatalogKey>,
    #[serde(default)]
    pub items: Vec<NewCustomItem>,
    /// Further edits applied after the above, in order
    #[serde(default)]
    pub edits: Vec<EditCommand>,
}

impl QuoteRequest {
    /// The request as a sequence of edits on an empty proposal
    pub fn commands(&self) -> Vec<EditCommand> {
        let start = self
            .start_time
            .iter()
            .map(|start_time| EditCommand::SetStartTime { start_time: start_time.clone() });
        let catalog = self.catalog.iter().map(|key| EditCommand::ToggleCatalogItem { key: *key });
        let stops = self.stops.iter().map(|stop| EditCommand::AddStop { stop: stop.clone() });
        let items = self.items.iter().map(|item| EditCommand::AddCustomItem { item: item.clone() });

        start
            .chain(catalog)
            .chain(stops)
            .chain(items)
            .chain(self.edits.iter().cloned())
            .collect()
    }
}

/// Price and schedule one request without network access
pub async fn run(request: QuoteRequest, settings: PipelineSettings) -> Result<Arc<ProposalSnapshot>> {
    let geocoder = MockGeocoder::new();
    let store = EventStore::new(Arc::new(HaversineTravelProvider::new()), settings);

    let commands = request.commands();
    let mut new_event = request.event;
    locate_event(&mut new_event, &geocoder).await;
    let event = store.create_event(new_event).context("Invalid event")?;
    let mut snapshot = store.create_proposal(event.id).await?;
    let proposal_id = snapshot.proposal.id;

    for (index, mut command) in commands.into_iter().enumerate() {
        locate_command(&mut command, &geocoder).await;
        snapshot = store
            .apply_edit(proposal_id, &command)
            .await
            .with_context(|| format!("Edit #{} ({}) rejected", index + 1, command.name()))?;
    }

    info!(
        "Quoted {} stops for {}: total {}, {} per person",
        snapshot.proposal.stops.len(),
        event.client_name,
        snapshot.pricing.total,
        snapshot.pricing.per_person
    );
    Ok(snapshot)
}

/// Read a `QuoteRequest` from disk
pub fn load(path: &Path) -> Result<QuoteRequest> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Invalid quote request in {}", path.display()))
}

//! NATS message handlers

pub mod catalog;
pub mod event;
pub mod ping;
pub mod proposal;

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subject};
use serde::Serialize;
use tokio::select;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::EditError;
use crate::services::geocoding::{create_geocoder, Geocoder};
use crate::services::routing::create_travel_provider_with_fallback;
use crate::services::store::EventStore;
use crate::types::{ErrorResponse, SuccessResponse};

/// Reply with the payload, or with an `ErrorResponse` carrying the error's code
pub(crate) async fn publish_result<T: Serialize>(
    client: &Client,
    reply: Subject,
    request_id: Uuid,
    result: Result<T, EditError>,
) -> Result<()> {
    let bytes = match result {
        Ok(payload) => serde_json::to_vec(&SuccessResponse::new(request_id, payload))?,
        Err(e) => {
            if matches!(e, EditError::Pricing(_)) {
                error!("Request {} hit a pricing inconsistency: {}", request_id, e);
            }
            serde_json::to_vec(&ErrorResponse::new(request_id, e.code(), e.to_string()))?
        }
    };
    let _ = client.publish(reply, bytes.into()).await;
    Ok(())
}

/// Start all message handlers
pub async fn start_handlers(client: Client, config: &Config) -> Result<()> {
    info!("Starting message handlers...");

    let geocoder: Arc<dyn Geocoder> = Arc::from(create_geocoder(&config.geocoder_backend, &config.nominatim_url));
    info!("Geocoder initialized: {}", geocoder.name());

    let provider = create_travel_provider_with_fallback(config.valhalla_url.clone()).await;
    info!("Travel provider initialized: {}", provider.name());

    let store = Arc::new(EventStore::new(provider, config.pipeline_settings()));

    // Subscribe to all subjects
    let ping_sub = client.subscribe("quote.ping").await?;
    let catalog_list_sub = client.subscribe("quote.catalog.list").await?;
    let event_create_sub = client.subscribe("quote.event.create").await?;
    let event_get_sub = client.subscribe("quote.event.get").await?;
    let proposal_create_sub = client.subscribe("quote.proposal.create").await?;
    let proposal_edit_sub = client.subscribe("quote.proposal.edit").await?;
    let proposal_get_sub = client.subscribe("quote.proposal.get").await?;
    let proposal_export_sub = client.subscribe("quote.proposal.export").await?;
    let proposal_import_sub = client.subscribe("quote.proposal.import").await?;

    info!("Subscribed to NATS subjects");

    let ping_handle = tokio::spawn(ping::handle_ping(client.clone(), ping_sub));
    let catalog_list_handle = tokio::spawn(catalog::handle_list(client.clone(), catalog_list_sub, store.clone()));
    let event_create_handle = tokio::spawn(event::handle_create(
        client.clone(),
        event_create_sub,
        store.clone(),
        geocoder.clone(),
    ));
    let event_get_handle = tokio::spawn(event::handle_get(client.clone(), event_get_sub, store.clone()));
    let proposal_create_handle = tokio::spawn(proposal::handle_create(client.clone(), proposal_create_sub, store.clone()));
    let proposal_edit_handle = tokio::spawn(proposal::handle_edit(
        client.clone(),
        proposal_edit_sub,
        store.clone(),
        geocoder.clone(),
    ));
    let proposal_get_handle = tokio::spawn(proposal::handle_get(client.clone(), proposal_get_sub, store.clone()));
    let proposal_export_handle = tokio::spawn(proposal::handle_export(client.clone(), proposal_export_sub, store.clone()));
    let proposal_import_handle = tokio::spawn(proposal::handle_import(client, proposal_import_sub, store));

    info!("All handlers started, waiting for messages...");

    // Wait for any handler to finish (which would indicate an error)
    select! {
        result = ping_handle => {
            error!("Ping handler finished: {:?}", result);
        }
        result = catalog_list_handle => {
            error!("Catalog list handler finished: {:?}", result);
        }
        result = event_create_handle => {
            error!("Event create handler finished: {:?}", result);
        }
        result = event_get_handle => {
            error!("Event get handler finished: {:?}", result);
        }
        result = proposal_create_handle => {
            error!("Proposal create handler finished: {:?}", result);
        }
        result = proposal_edit_handle => {
            error!("Proposal edit handler finished: {:?}", result);
        }
        result = proposal_get_handle => {
            error!("Proposal get handler finished: {:?}", result);
        }
        result = proposal_export_handle => {
            error!("Proposal export handler finished: {:?}", result);
        }
        result = proposal_import_handle => {
            error!("Proposal import handler finished: {:?}", result);
        }
    }

    Ok(())
}

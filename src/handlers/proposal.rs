//! Proposal message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::handlers::publish_result;
use crate::services::geocoding::{locate_command, Geocoder};
use crate::services::record::ProposalRecord;
use crate::services::store::EventStore;
use crate::types::{
    CreateProposalRequest, EditProposalRequest, ErrorResponse, GetProposalRequest, Request,
};

/// Handle quote.proposal.create messages
pub async fn handle_create(client: Client, mut subscriber: Subscriber, store: Arc<EventStore>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received proposal.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<CreateProposalRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse proposal.create request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let result = store.create_proposal(request.payload.event_id).await;
        publish_result(&client, reply, request.id, result).await?;
    }

    Ok(())
}

/// Handle quote.proposal.edit messages
///
/// Location text without coordinates is geocoded before the edit is applied.
/// The reply carries the full snapshot after recomputation.
pub async fn handle_edit(
    client: Client,
    mut subscriber: Subscriber,
    store: Arc<EventStore>,
    geocoder: Arc<dyn Geocoder>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received proposal.edit message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<EditProposalRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse proposal.edit request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let EditProposalRequest { proposal_id, mut command } = request.payload;
        locate_command(&mut command, geocoder.as_ref()).await;

        let result = store.apply_edit(proposal_id, &command).await;
        if let Err(ref e) = result {
            warn!("Rejected {} on proposal {}: {}", command.name(), proposal_id, e);
        }
        publish_result(&client, reply, request.id, result).await?;
    }

    Ok(())
}

/// Handle quote.proposal.get messages
pub async fn handle_get(client: Client, mut subscriber: Subscriber, store: Arc<EventStore>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received proposal.get message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<GetProposalRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse proposal.get request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let result = store.get_snapshot(request.payload.proposal_id);
        publish_result(&client, reply, request.id, result).await?;
    }

    Ok(())
}

/// Handle quote.proposal.export messages - persistable record of the proposal
pub async fn handle_export(client: Client, mut subscriber: Subscriber, store: Arc<EventStore>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received proposal.export message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<GetProposalRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse proposal.export request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let result = store.export(request.payload.proposal_id);
        publish_result(&client, reply, request.id, result).await?;
    }

    Ok(())
}

/// Handle quote.proposal.import messages - restore an exported record
pub async fn handle_import(client: Client, mut subscriber: Subscriber, store: Arc<EventStore>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received proposal.import message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<ProposalRecord> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse proposal.import request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let result = store.import(request.payload).await;
        publish_result(&client, reply, request.id, result).await?;
    }

    Ok(())
}

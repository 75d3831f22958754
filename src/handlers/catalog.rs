//! Catalog message handler

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::services::store::EventStore;
use crate::types::{CatalogListResponse, EmptyPayload, ErrorResponse, Request, SuccessResponse};

/// Handle quote.catalog.list messages
pub async fn handle_list(client: Client, mut subscriber: Subscriber, store: Arc<EventStore>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received catalog.list message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<EmptyPayload> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse catalog.list request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let response = CatalogListResponse {
            entries: store.catalog().entries().to_vec(),
        };
        let success = SuccessResponse::new(request.id, response);
        let _ = client.publish(reply, serde_json::to_vec(&success)?.into()).await;
    }

    Ok(())
}

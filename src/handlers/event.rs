//! Event message handlers

use std::sync::Arc;

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::handlers::publish_result;
use crate::services::geocoding::{locate_event, Geocoder};
use crate::services::store::EventStore;
use crate::types::{ErrorResponse, GetEventRequest, NewEvent, Request};

/// Handle quote.event.create messages
pub async fn handle_create(
    client: Client,
    mut subscriber: Subscriber,
    store: Arc<EventStore>,
    geocoder: Arc<dyn Geocoder>,
) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received event.create message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<NewEvent> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse event.create request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let mut new_event = request.payload;
        locate_event(&mut new_event, geocoder.as_ref()).await;

        let result = store.create_event(new_event).map(|event| (*event).clone());
        publish_result(&client, reply, request.id, result).await?;
    }

    Ok(())
}

/// Handle quote.event.get messages - event plus one summary per proposal
pub async fn handle_get(client: Client, mut subscriber: Subscriber, store: Arc<EventStore>) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received event.get message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                warn!("Message without reply subject");
                continue;
            }
        };

        let request: Request<GetEventRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse event.get request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", e.to_string());
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let result = store.get_event(request.payload.event_id);
        publish_result(&client, reply, request.id, result).await?;
    }

    Ok(())
}

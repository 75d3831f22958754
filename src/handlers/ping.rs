//! Ping handler for health checks

use anyhow::Result;
use async_nats::{Client, Subscriber};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};
use uuid::Uuid;

use crate::types::{ErrorResponse, Request, SuccessResponse};

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct PingRequest {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PongResponse {
    pub message: String,
    pub service: String,
    pub version: String,
}

impl PongResponse {
    fn answer(request: PingRequest) -> Self {
        Self {
            message: request
                .message
                .map(|m| format!("Pong: {}", m))
                .unwrap_or_else(|| "Pong".to_string()),
            service: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Handle quote.ping messages
pub async fn handle_ping(client: Client, mut subscriber: Subscriber) -> Result<()> {
    while let Some(msg) = subscriber.next().await {
        debug!("Received ping message");

        let reply = match msg.reply {
            Some(ref reply) => reply.clone(),
            None => {
                error!("Ping message without reply subject");
                continue;
            }
        };

        let request: Request<PingRequest> = match serde_json::from_slice(&msg.payload) {
            Ok(req) => req,
            Err(e) => {
                error!("Failed to parse ping request: {}", e);
                let error = ErrorResponse::new(Uuid::nil(), "INVALID_REQUEST", format!("Failed to parse request: {}", e));
                let _ = client.publish(reply, serde_json::to_vec(&error)?.into()).await;
                continue;
            }
        };

        let response = SuccessResponse::new(request.id, PongResponse::answer(request.payload));
        client.publish(reply, serde_json::to_vec(&response)?.into()).await?;

        debug!("Sent pong response");
    }

    Ok(())
}

//! Axum HTTP handlers for the SSE transport
//!
//! Event-stream subscription, inbound message submission, and the public
//! health and discovery endpoints.

use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap},
    response::{sse::Sse, IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use super::{HttpState, MESSAGE_ENDPOINT, SSE_ENDPOINT};
use crate::{errors::AppError, mcp::server::SUPPORTED_PROTOCOL_VERSION};

#[derive(Debug, Default, Deserialize)]
pub struct ClientQuery {
    pub client_id: Option<String>,
}

impl ClientQuery {
    fn client_id(&self) -> &str {
        self.client_id.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub transport: &'static str,
    pub clients: usize,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub protocol_version: &'static str,
    pub sse_endpoint: &'static str,
    pub message_endpoint: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MessageAccepted {
    pub status: &'static str,
}

pub async fn health(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        transport: "http-sse",
        clients: state.hub.connected_clients(),
    })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        protocol_version: SUPPORTED_PROTOCOL_VERSION,
        sse_endpoint: SSE_ENDPOINT,
        message_endpoint: MESSAGE_ENDPOINT,
    })
}

pub async fn sse_connect(
    State(state): State<HttpState>,
    Query(query): Query<ClientQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let mut metadata = HashMap::new();
    if let Some(user_agent) = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
    {
        metadata.insert("user_agent".to_string(), user_agent.to_string());
    }

    let subscription = state.hub.subscribe(query.client_id(), metadata)?;
    info!(client_id = %subscription.client_id(), "SSE client connecting");

    Ok((
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Sse::new(subscription.into_event_stream()),
    )
        .into_response())
}

pub async fn post_message(
    State(state): State<HttpState>,
    Query(query): Query<ClientQuery>,
    body: Bytes,
) -> Result<Json<MessageAccepted>, AppError> {
    let client_id = query.client_id();
    if client_id.trim().is_empty() {
        return Err(AppError::bad_request(
            "missing_client_id",
            "client_id parameter required",
        ));
    }

    if let Err(err) = serde_json::from_slice::<Value>(&body) {
        warn!(client_id, error = %err, "failed to parse JSON message");
        return Err(AppError::bad_request("invalid_json", "Invalid JSON"));
    }

    state.hub.submit(client_id, body.to_vec())?;
    Ok(Json(MessageAccepted { status: "received" }))
}

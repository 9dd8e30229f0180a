//! HTTP surface of the SSE transport
//!
//! Clients open an event stream on `/mcp/sse` and submit messages with
//! `POST /mcp/message`. `/health` and `/.well-known/mcp` are public.

pub mod handlers;

use std::sync::Arc;

use crate::transport::sse::SseHub;

pub const SSE_ENDPOINT: &str = "/mcp/sse";
pub const MESSAGE_ENDPOINT: &str = "/mcp/message";

#[derive(Clone)]
pub struct HttpState {
    pub hub: Arc<SseHub>,
    pub api_token: Option<Arc<str>>,
}

impl HttpState {
    pub fn new(hub: Arc<SseHub>, api_token: Option<String>) -> Self {
        Self {
            hub,
            api_token: api_token.map(Arc::from),
        }
    }
}

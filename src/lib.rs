use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod mcp;
pub mod resources;
pub mod transport;

use http::HttpState;
use mcp::tools::ToolBackend;
use resources::ResourceManager;

/// What the JSON-RPC dispatcher serves: resources and tools.
#[derive(Clone)]
pub struct AppState {
    pub resources: Arc<ResourceManager>,
    pub tools: Arc<dyn ToolBackend>,
}

impl AppState {
    pub fn new(resources: Arc<ResourceManager>, tools: Arc<dyn ToolBackend>) -> Self {
        Self { resources, tools }
    }
}

pub fn build_app(state: HttpState) -> Router {
    let protected = Router::new()
        .route(http::SSE_ENDPOINT, get(http::handlers::sse_connect))
        .route(http::MESSAGE_ENDPOINT, post(http::handlers::post_message))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/health", get(http::handlers::health))
        .route("/.well-known/mcp", get(http::handlers::discovery))
        .merge(protected)
        .layer(middleware::from_fn(logging::request_logging_middleware))
        .with_state(state)
}

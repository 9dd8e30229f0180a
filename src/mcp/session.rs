//! Message loop between a transport and the JSON-RPC dispatcher

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{errors::TransportError, mcp::server::handle_message_bytes, transport::Transport, AppState};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    EndOfStream,
    Closed,
    Cancelled,
    ReadFailed,
}

/// Reads messages from `transport`, dispatches them, and writes responses back
/// until the peer goes away, the transport closes, or `cancel` fires.
///
/// Read timeouts are retried. A failed write is logged and the loop goes on, so
/// a broadcast with no listeners does not end the session.
pub async fn serve(
    transport: Arc<dyn Transport>,
    state: AppState,
    cancel: CancellationToken,
) -> SessionEnd {
    let transport_type = transport.transport_type();
    info!(transport_type = %transport_type, "mcp session started");

    let end = loop {
        let read = tokio::select! {
            _ = cancel.cancelled() => break SessionEnd::Cancelled,
            read = transport.read_message() => read,
        };

        let message = match read {
            Ok(message) => message,
            Err(TransportError::Timeout { .. }) => continue,
            Err(TransportError::EndOfStream { .. }) => break SessionEnd::EndOfStream,
            Err(TransportError::Closed { .. }) => break SessionEnd::Closed,
            Err(TransportError::Cancelled { .. }) => break SessionEnd::Cancelled,
            Err(err) => {
                warn!(transport_type = %transport_type, error = %err, "failed to read message");
                break SessionEnd::ReadFailed;
            }
        };

        let Some(response) = handle_message_bytes(&state, &message).await else {
            debug!(message_length = message.len(), "no response for message");
            continue;
        };

        if let Err(err) = transport.write_json(&response).await {
            if matches!(err, TransportError::Closed { .. }) {
                break SessionEnd::Closed;
            }
            warn!(transport_type = %transport_type, error = %err, "failed to write response");
        }
    };

    info!(transport_type = %transport_type, reason = ?end, "mcp session ended");
    end
}

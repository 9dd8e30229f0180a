//! Bidirectional message transports for the Model Context Protocol
//!
//! A transport moves raw, already-framed JSON-RPC payloads between the server and its
//! peers. Two implementations exist: a point-to-point line-delimited stream
//! ([`stdio::StdioTransport`]) and a multi-client Server-Sent Events broadcast stream
//! with a POST inbox ([`sse::SseTransport`]). [`manager::TransportManager`] picks one
//! per process.

pub mod manager;
pub mod sse;
pub mod stdio;

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    str::FromStr,
    sync::atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::errors::TransportError;

pub use manager::{TransportManager, TransportSelection, SelectionSource};
pub use sse::SseTransport;
pub use stdio::StdioTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TransportKind {
    #[serde(rename = "stdio")]
    Stdio,
    #[serde(rename = "http-sse")]
    HttpSse,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stdio => "stdio",
            Self::HttpSse => "http-sse",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransportKind {
    type Err = TransportError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(Self::Stdio),
            "http" | "http-sse" | "sse" => Ok(Self::HttpSse),
            other => Err(TransportError::UnsupportedTransport(other.to_string())),
        }
    }
}

/// Lifecycle notifications a transport publishes about its peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Connected {
        client_id: String,
        metadata: HashMap<String, String>,
    },
    Activity {
        client_id: String,
    },
    Disconnected {
        client_id: String,
    },
}

/// Observability record for a connected client, kept by the transport manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    pub id: String,
    pub transport_type: TransportKind,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

/// Contract shared by every transport implementation.
///
/// Transports are used through `Arc<dyn Transport>`, so every method takes `&self`:
/// `close` must be callable while another task is blocked in `read_message`, and must
/// make that read (and every later call) fail fast.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Makes the transport ready. Succeeds once; a second call, or a call after
    /// `close`, fails with [`TransportError::Closed`]. Cancelling `ctx` has the same
    /// effect on pending reads as `close`.
    async fn start(&self, ctx: CancellationToken) -> Result<(), TransportError>;

    /// Returns one complete logical message.
    async fn read_message(&self) -> Result<Vec<u8>, TransportError>;

    async fn write_message(&self, message: &[u8]) -> Result<(), TransportError>;

    async fn write_json(&self, value: &Value) -> Result<(), TransportError> {
        let payload = serde_json::to_vec(value)?;
        self.write_message(&payload).await
    }

    /// Idempotent: only the first call has an effect.
    async fn close(&self) -> Result<(), TransportError>;

    fn is_closed(&self) -> bool;

    fn transport_type(&self) -> TransportKind;

    /// Peer lifecycle feed, for transports that track more than one peer.
    fn client_events(&self) -> Option<broadcast::Receiver<ClientEvent>> {
        None
    }
}

/// Start/close bookkeeping shared by the transport implementations.
///
/// `closing` fires once on `close`; `context` is the token handed to `start`. Pending
/// operations race against both so either one unblocks them.
pub(crate) struct Lifecycle {
    transport: &'static str,
    started: AtomicBool,
    closed: AtomicBool,
    closing: CancellationToken,
    context: Mutex<CancellationToken>,
}

impl Lifecycle {
    pub(crate) fn new(transport: &'static str) -> Self {
        Self {
            transport,
            started: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            closing: CancellationToken::new(),
            context: Mutex::new(CancellationToken::new()),
        }
    }

    pub(crate) fn begin_start(&self, ctx: &CancellationToken) -> Result<(), TransportError> {
        let mut context = self.context.lock();
        if self.is_closed() || self.started.swap(true, Ordering::SeqCst) {
            return Err(self.closed_error());
        }

        *context = ctx.clone();
        Ok(())
    }

    /// Rolls back a start that failed before the transport became ready.
    pub(crate) fn abort_start(&self) {
        self.started.store(false, Ordering::SeqCst);
    }

    /// Returns true for the single call that actually performs the close.
    pub(crate) fn begin_close(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }

        self.closing.cancel();
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_open(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            Err(self.closed_error())
        } else {
            Ok(())
        }
    }

    pub(crate) fn closed_error(&self) -> TransportError {
        TransportError::Closed {
            transport: self.transport,
        }
    }

    /// Resolves once the transport is closed or its start context is cancelled.
    pub(crate) fn stopped(&self) -> impl Future<Output = ()> + Send + 'static {
        let closing = self.closing.clone();
        let context = self.context.lock().clone();
        async move {
            tokio::select! {
                _ = closing.cancelled() => {}
                _ = context.cancelled() => {}
            }
        }
    }

    /// Waits like [`Lifecycle::stopped`] and reports why the wait ended.
    pub(crate) async fn interrupted(&self) -> TransportError {
        self.stopped().await;
        if self.is_closed() {
            self.closed_error()
        } else {
            TransportError::Cancelled {
                transport: self.transport,
            }
        }
    }
}

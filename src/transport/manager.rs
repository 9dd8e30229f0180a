//! Transport selection and lifecycle
//!
//! [`TransportManager`] picks one transport per process, starts it, and keeps an
//! observability mirror of connected clients. The mirror is fed from the transport's
//! [`ClientEvent`] feed and is never consulted for message delivery.

use std::{
    collections::HashMap,
    env, fmt,
    io::{stdin, IsTerminal},
    sync::Arc,
};

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    sse::{SseSettings, SseTransport},
    ClientEvent, ClientInfo, StdioTransport, Transport, TransportKind,
};
use crate::{config::Config, errors::TransportError};

pub const TRANSPORT_ENV: &str = "MCP_TRANSPORT";
pub const STDIO_CLIENT_ID: &str = "stdio";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionSource {
    Flag,
    Environment,
    Configuration,
    Terminal,
    Default,
}

impl fmt::Display for SelectionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Flag => "command-line flag",
            Self::Environment => "MCP_TRANSPORT environment variable",
            Self::Configuration => "configuration",
            Self::Terminal => "terminal detection",
            Self::Default => "default",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSelection {
    pub kind: TransportKind,
    pub source: SelectionSource,
}

/// Everything transport selection looks at, gathered up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectionInputs<'a> {
    pub flag: Option<TransportKind>,
    pub env: Option<&'a str>,
    pub config: Option<TransportKind>,
    pub is_terminal: bool,
}

/// Flag, then environment, then configuration, then the terminal heuristic, then stdio.
pub fn select_transport(inputs: SelectionInputs<'_>) -> TransportSelection {
    if let Some(kind) = inputs.flag {
        return TransportSelection {
            kind,
            source: SelectionSource::Flag,
        };
    }

    if let Some(raw) = inputs.env.map(str::trim).filter(|raw| !raw.is_empty()) {
        match raw.parse::<TransportKind>() {
            Ok(kind) => {
                return TransportSelection {
                    kind,
                    source: SelectionSource::Environment,
                }
            }
            Err(_) => warn!(transport_type = raw, "unknown transport type in MCP_TRANSPORT"),
        }
    }

    if let Some(kind) = inputs.config {
        return TransportSelection {
            kind,
            source: SelectionSource::Configuration,
        };
    }

    TransportSelection {
        kind: TransportKind::Stdio,
        source: if inputs.is_terminal {
            SelectionSource::Terminal
        } else {
            SelectionSource::Default
        },
    }
}

/// Connected-client metadata, keyed by client id.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    clients: Arc<RwLock<HashMap<String, ClientInfo>>>,
}

impl ClientRegistry {
    pub fn register(
        &self,
        client_id: &str,
        transport_type: TransportKind,
        metadata: HashMap<String, String>,
    ) {
        let now = Utc::now();
        self.clients.write().insert(
            client_id.to_string(),
            ClientInfo {
                id: client_id.to_string(),
                transport_type,
                connected_at: now,
                last_activity: now,
                metadata,
            },
        );
        info!(client_id, transport_type = %transport_type, "MCP client registered");
    }

    pub fn unregister(&self, client_id: &str) -> Option<ClientInfo> {
        let removed = self.clients.write().remove(client_id)?;
        let duration = Utc::now() - removed.connected_at;
        info!(
            client_id,
            transport_type = %removed.transport_type,
            duration_secs = duration.num_seconds(),
            "MCP client unregistered"
        );
        Some(removed)
    }

    pub fn touch(&self, client_id: &str) {
        if let Some(client) = self.clients.write().get_mut(client_id) {
            client.last_activity = Utc::now();
        }
    }

    /// Snapshot ordered by client id.
    pub fn snapshot(&self) -> Vec<ClientInfo> {
        let mut clients: Vec<ClientInfo> = self.clients.read().values().cloned().collect();
        clients.sort_by(|left, right| left.id.cmp(&right.id));
        clients
    }

    pub fn len(&self) -> usize {
        self.clients.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.clients.write().clear();
    }
}

pub struct TransportManager {
    config: Config,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    registry: ClientRegistry,
    mirror_stop: Mutex<Option<CancellationToken>>,
}

impl TransportManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: Mutex::new(None),
            registry: ClientRegistry::default(),
            mirror_stop: Mutex::new(None),
        }
    }

    /// Reads the process environment and stdin to choose a transport.
    pub fn detect(&self, flag: Option<TransportKind>) -> TransportSelection {
        let env_value = env::var(TRANSPORT_ENV).ok();
        let selection = select_transport(SelectionInputs {
            flag,
            env: env_value.as_deref(),
            config: self.config.transport,
            is_terminal: stdin().is_terminal(),
        });

        info!(
            transport_type = %selection.kind,
            source = %selection.source,
            "selected MCP transport"
        );
        selection
    }

    pub fn create_transport(&self, kind: TransportKind) -> Arc<dyn Transport> {
        match kind {
            TransportKind::Stdio => {
                info!("creating stdio transport");
                Arc::new(StdioTransport::new())
            }
            TransportKind::HttpSse => {
                let settings = SseSettings::from_config(&self.config);
                info!(address = %settings.bind_address, "creating HTTP SSE transport");
                Arc::new(SseTransport::new(settings))
            }
        }
    }

    /// Detects, creates, and starts the process transport.
    pub async fn start_transport(
        &self,
        flag: Option<TransportKind>,
        ctx: CancellationToken,
    ) -> Result<Arc<dyn Transport>, TransportError> {
        let selection = self.detect(flag);
        let transport = self.create_transport(selection.kind);
        self.activate(Arc::clone(&transport), ctx).await?;
        Ok(transport)
    }

    /// Starts `transport` and makes it the active one. A transport that fails to
    /// start is closed before the error is returned.
    pub async fn activate(
        &self,
        transport: Arc<dyn Transport>,
        ctx: CancellationToken,
    ) -> Result<(), TransportError> {
        if let Err(err) = transport.start(ctx.clone()).await {
            error!(error = %err, transport_type = %transport.transport_type(), "failed to start transport");
            if let Err(close_err) = transport.close().await {
                warn!(error = %close_err, "failed to close transport after start failure");
            }
            return Err(err);
        }

        let kind = transport.transport_type();
        match transport.client_events() {
            Some(events) => {
                let stop = ctx.child_token();
                *self.mirror_stop.lock() = Some(stop.clone());
                tokio::spawn(mirror_clients(self.registry.clone(), kind, events, stop));
            }
            None => self
                .registry
                .register(STDIO_CLIENT_ID, kind, HashMap::new()),
        }

        *self.transport.lock() = Some(transport);
        info!(transport_type = %kind, "transport started successfully");
        Ok(())
    }

    pub fn active_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.lock().clone()
    }

    pub fn register_client(
        &self,
        client_id: &str,
        transport_type: TransportKind,
        metadata: HashMap<String, String>,
    ) {
        self.registry.register(client_id, transport_type, metadata);
    }

    pub fn unregister_client(&self, client_id: &str) -> Option<ClientInfo> {
        self.registry.unregister(client_id)
    }

    pub fn update_client_activity(&self, client_id: &str) {
        self.registry.touch(client_id);
    }

    pub fn clients(&self) -> Vec<ClientInfo> {
        self.registry.snapshot()
    }

    /// Closes the active transport and forgets every client. Only the first caller
    /// performs the close; later callers return `Ok` immediately.
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        let Some(transport) = self.transport.lock().take() else {
            debug!("transport manager already shut down");
            return Ok(());
        };

        info!("shutting down transport manager");
        if let Some(stop) = self.mirror_stop.lock().take() {
            stop.cancel();
        }

        let result = transport.close().await;
        self.registry.clear();
        match &result {
            Ok(()) => info!("transport manager shutdown complete"),
            Err(err) => error!(error = %err, "error closing transport"),
        }
        result
    }
}

async fn mirror_clients(
    registry: ClientRegistry,
    kind: TransportKind,
    mut events: broadcast::Receiver<ClientEvent>,
    stop: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(ClientEvent::Connected {
                client_id,
                metadata,
            }) => registry.register(&client_id, kind, metadata),
            Ok(ClientEvent::Activity { client_id }) => registry.touch(&client_id),
            Ok(ClientEvent::Disconnected { client_id }) => {
                registry.unregister(&client_id);
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "client mirror fell behind transport events");
            }
            Err(RecvError::Closed) => break,
        }
    }
    debug!("client mirror stopped");
}

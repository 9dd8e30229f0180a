//! Multi-client broadcast transport over Server-Sent Events
//!
//! Clients subscribe with `GET /mcp/sse?client_id=...` and receive every outbound
//! message as a `data:` frame. Inbound messages arrive through
//! `POST /mcp/message?client_id=...` and wait in one bounded queue for the single
//! consumer calling [`Transport::read_message`].

use std::{
    collections::HashMap,
    convert::Infallible,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::response::sse::Event;
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use tokio::{
    net::TcpListener,
    sync::{
        broadcast,
        mpsc::{self, error::TrySendError},
        Mutex as AsyncMutex,
    },
    task::JoinHandle,
    time::{interval_at, Instant, Interval, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ClientEvent, Lifecycle, Transport, TransportKind};
use crate::{config::Config, errors::TransportError, http::HttpState};

pub const CLIENT_CHANNEL_CAPACITY: usize = 50;
pub const INBOUND_QUEUE_CAPACITY: usize = 100;
pub const KEEP_ALIVE_FRAME: &str = r#"{"type":"ping"}"#;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);
const EVENT_FEED_CAPACITY: usize = 256;
const TRANSPORT: &str = "http-sse";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseSettings {
    pub bind_address: String,
    pub max_clients: usize,
    pub keep_alive_interval: Duration,
    pub read_timeout: Duration,
    pub api_token: Option<String>,
}

impl SseSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bind_address: config.bind_address(),
            max_clients: config.max_clients,
            keep_alive_interval: config.keep_alive_interval,
            read_timeout: config.read_timeout,
            api_token: config.api_token.clone(),
        }
    }
}

impl Default for SseSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// A message posted by a client, waiting for the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub client_id: String,
    pub data: Vec<u8>,
}

/// Outcome of one fan-out. Drops are logged, never returned as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub attempted: usize,
    pub delivered: usize,
    pub dropped: usize,
}

struct ClientHandle {
    generation: u64,
    outbound: mpsc::Sender<Arc<[u8]>>,
    done: CancellationToken,
}

/// Client registry and inbound queue shared by the transport and its HTTP handlers.
pub struct SseHub {
    clients: Mutex<HashMap<String, ClientHandle>>,
    next_generation: AtomicU64,
    inbound: mpsc::Sender<InboundMessage>,
    events: broadcast::Sender<ClientEvent>,
    closed: AtomicBool,
    max_clients: usize,
    keep_alive_interval: Duration,
}

impl SseHub {
    pub fn new(
        max_clients: usize,
        keep_alive_interval: Duration,
    ) -> (Arc<Self>, mpsc::Receiver<InboundMessage>) {
        let (inbound, inbound_rx) = mpsc::channel(INBOUND_QUEUE_CAPACITY);
        let (events, _) = broadcast::channel(EVENT_FEED_CAPACITY);

        let hub = Arc::new(Self {
            clients: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            inbound,
            events,
            closed: AtomicBool::new(false),
            max_clients,
            keep_alive_interval,
        });
        (hub, inbound_rx)
    }

    /// Registers `client_id`, replacing any live client with the same id.
    pub fn subscribe(
        self: &Arc<Self>,
        client_id: &str,
        metadata: HashMap<String, String>,
    ) -> Result<ClientSubscription, TransportError> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(TransportError::MissingClientId);
        }

        let (outbound, outbound_rx) = mpsc::channel(CLIENT_CHANNEL_CAPACITY);
        let done = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        let replaced = {
            let mut clients = self.clients.lock();
            if self.closed.load(Ordering::SeqCst) {
                return Err(TransportError::Closed {
                    transport: TRANSPORT,
                });
            }
            if !clients.contains_key(client_id) && clients.len() >= self.max_clients {
                warn!(client_id, max_clients = self.max_clients, "rejecting SSE client, limit reached");
                return Err(TransportError::TooManyClients {
                    client_id: client_id.to_string(),
                    max: self.max_clients,
                });
            }
            clients.insert(
                client_id.to_string(),
                ClientHandle {
                    generation,
                    outbound,
                    done: done.clone(),
                },
            )
        };

        if let Some(previous) = replaced {
            previous.done.cancel();
            info!(client_id, "SSE client reconnected, replaced previous stream");
        } else {
            info!(client_id, "SSE client connected");
        }
        let _ = self.events.send(ClientEvent::Connected {
            client_id: client_id.to_string(),
            metadata,
        });

        Ok(ClientSubscription {
            hub: Arc::clone(self),
            client_id: client_id.to_string(),
            generation,
            outbound: outbound_rx,
            done,
            keep_alive_period: self.keep_alive_interval,
            keep_alive: None,
        })
    }

    /// Removes the client only if `generation` still owns the id.
    fn unregister(&self, client_id: &str, generation: u64) -> bool {
        let removed = {
            let mut clients = self.clients.lock();
            match clients.get(client_id) {
                Some(handle) if handle.generation == generation => clients.remove(client_id),
                _ => None,
            }
        };

        match removed {
            Some(handle) => {
                handle.done.cancel();
                info!(client_id, "SSE client disconnected");
                let _ = self.events.send(ClientEvent::Disconnected {
                    client_id: client_id.to_string(),
                });
                true
            }
            None => false,
        }
    }

    /// Enqueues an inbound message without waiting for queue space.
    pub fn submit(&self, client_id: &str, data: Vec<u8>) -> Result<(), TransportError> {
        let client_id = client_id.trim();
        if client_id.is_empty() {
            return Err(TransportError::MissingClientId);
        }
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed {
                transport: TRANSPORT,
            });
        }

        let message_length = data.len();
        let message = InboundMessage {
            client_id: client_id.to_string(),
            data,
        };
        match self.inbound.try_send(message) {
            Ok(()) => {
                debug!(client_id, message_length, "queued inbound message");
                let _ = self.events.send(ClientEvent::Activity {
                    client_id: client_id.to_string(),
                });
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!(
                    client_id,
                    capacity = INBOUND_QUEUE_CAPACITY,
                    "inbound message queue full, rejecting message"
                );
                Err(TransportError::QueueFull {
                    client_id: client_id.to_string(),
                    capacity: INBOUND_QUEUE_CAPACITY,
                })
            }
            Err(TrySendError::Closed(_)) => Err(TransportError::Closed {
                transport: TRANSPORT,
            }),
        }
    }

    /// Pushes `message` to every connected client without blocking.
    pub fn broadcast(&self, message: &[u8]) -> Result<BroadcastReport, TransportError> {
        let payload: Arc<[u8]> = Arc::from(message);
        let clients = self.clients.lock();
        if clients.is_empty() {
            return Err(TransportError::NoClients);
        }

        let mut report = BroadcastReport {
            attempted: clients.len(),
            ..BroadcastReport::default()
        };
        for (client_id, handle) in clients.iter() {
            match handle.outbound.try_send(Arc::clone(&payload)) {
                Ok(()) => {
                    report.delivered += 1;
                    debug!(client_id = %client_id, "message queued for client");
                }
                Err(TrySendError::Full(_)) => {
                    report.dropped += 1;
                    warn!(client_id = %client_id, "client message queue full, dropping message");
                }
                Err(TrySendError::Closed(_)) => {
                    report.dropped += 1;
                    debug!(client_id = %client_id, "client stream gone, dropping message");
                }
            }
        }

        Ok(report)
    }

    /// Signals and removes every client; later subscriptions and submissions fail.
    pub fn close_clients(&self) -> usize {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<(String, ClientHandle)> = self.clients.lock().drain().collect();

        for (client_id, handle) in &drained {
            handle.done.cancel();
            let _ = self.events.send(ClientEvent::Disconnected {
                client_id: client_id.clone(),
            });
        }
        if !drained.is_empty() {
            info!(clients = drained.len(), "disconnected all SSE clients");
        }
        drained.len()
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.lock().len()
    }

    pub fn client_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

/// One frame of a client's event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Message(Arc<[u8]>),
    KeepAlive,
}

impl Frame {
    pub fn payload(&self) -> &[u8] {
        match self {
            Self::Message(payload) => payload,
            Self::KeepAlive => KEEP_ALIVE_FRAME.as_bytes(),
        }
    }

    fn into_event(self) -> Event {
        // `Event::data` rejects carriage returns; newlines become extra data lines
        let text = String::from_utf8_lossy(self.payload()).replace('\r', "");
        Event::default().data(text)
    }
}

/// A live client stream. Dropping it unregisters the client.
pub struct ClientSubscription {
    hub: Arc<SseHub>,
    client_id: String,
    generation: u64,
    outbound: mpsc::Receiver<Arc<[u8]>>,
    done: CancellationToken,
    keep_alive_period: Duration,
    keep_alive: Option<Interval>,
}

impl ClientSubscription {
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Waits for the next frame; `None` once the client has been signalled done.
    pub async fn next_frame(&mut self) -> Option<Frame> {
        let period = self.keep_alive_period;
        let keep_alive = self.keep_alive.get_or_insert_with(|| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        tokio::select! {
            biased;
            _ = self.done.cancelled() => None,
            message = self.outbound.recv() => message.map(Frame::Message),
            _ = keep_alive.tick() => Some(Frame::KeepAlive),
        }
    }

    pub fn into_event_stream(self) -> impl Stream<Item = Result<Event, Infallible>> + Send {
        stream::unfold(self, |mut subscription| async move {
            let frame = subscription.next_frame().await?;
            Some((Ok(frame.into_event()), subscription))
        })
    }
}

impl Drop for ClientSubscription {
    fn drop(&mut self) {
        self.hub.unregister(&self.client_id, self.generation);
    }
}

/// Broadcast transport: an axum server fronting an [`SseHub`].
pub struct SseTransport {
    settings: SseSettings,
    hub: Arc<SseHub>,
    inbound: AsyncMutex<mpsc::Receiver<InboundMessage>>,
    lifecycle: Lifecycle,
    server: Mutex<Option<JoinHandle<()>>>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl SseTransport {
    pub fn new(settings: SseSettings) -> Self {
        let (hub, inbound) = SseHub::new(settings.max_clients, settings.keep_alive_interval);
        Self {
            settings,
            hub,
            inbound: AsyncMutex::new(inbound),
            lifecycle: Lifecycle::new(TRANSPORT),
            server: Mutex::new(None),
            local_addr: Mutex::new(None),
        }
    }

    pub fn hub(&self) -> &Arc<SseHub> {
        &self.hub
    }

    /// Address actually bound, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    pub fn connected_clients(&self) -> usize {
        self.hub.connected_clients()
    }

    async fn bind(&self) -> Result<(TcpListener, SocketAddr), TransportError> {
        let address = &self.settings.bind_address;
        let listener = TcpListener::bind(address)
            .await
            .map_err(|source| TransportError::Bind {
                addr: address.clone(),
                source,
            })?;
        let local_addr = listener.local_addr().map_err(|source| TransportError::Io {
            transport: TRANSPORT,
            source,
        })?;
        Ok((listener, local_addr))
    }
}

#[async_trait]
impl Transport for SseTransport {
    async fn start(&self, ctx: CancellationToken) -> Result<(), TransportError> {
        self.lifecycle.begin_start(&ctx)?;

        let (listener, local_addr) = match self.bind().await {
            Ok(bound) => bound,
            Err(err) => {
                self.lifecycle.abort_start();
                error!(error = %err, "failed to start HTTP SSE transport");
                return Err(err);
            }
        };

        let app = crate::build_app(HttpState::new(
            Arc::clone(&self.hub),
            self.settings.api_token.clone(),
        ));
        let stopped = self.lifecycle.stopped();
        let hub = Arc::clone(&self.hub);
        let server = tokio::spawn(async move {
            let shutdown = async move {
                stopped.await;
                hub.close_clients();
            };
            if let Err(err) = axum::serve(listener, app.into_make_service())
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %err, "HTTP SSE server failed");
            }
        });

        *self.server.lock() = Some(server);
        *self.local_addr.lock() = Some(local_addr);
        info!(
            address = %local_addr,
            transport_type = TRANSPORT,
            "HTTP SSE transport started"
        );
        Ok(())
    }

    async fn read_message(&self) -> Result<Vec<u8>, TransportError> {
        self.lifecycle.ensure_open()?;

        let mut inbound = tokio::select! {
            guard = self.inbound.lock() => guard,
            err = self.lifecycle.interrupted() => return Err(err),
        };

        let waited = self.settings.read_timeout;
        tokio::select! {
            received = tokio::time::timeout(waited, inbound.recv()) => match received {
                Ok(Some(message)) => {
                    debug!(
                        client_id = %message.client_id,
                        message_length = message.data.len(),
                        "processing inbound SSE message"
                    );
                    Ok(message.data)
                }
                Ok(None) => Err(self.lifecycle.closed_error()),
                Err(_) => Err(TransportError::Timeout {
                    transport: TRANSPORT,
                    waited,
                }),
            },
            err = self.lifecycle.interrupted() => Err(err),
        }
    }

    async fn write_message(&self, message: &[u8]) -> Result<(), TransportError> {
        self.lifecycle.ensure_open()?;

        let report = self.hub.broadcast(message)?;
        debug!(
            message_length = message.len(),
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast message to SSE clients"
        );
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.lifecycle.begin_close() {
            return Ok(());
        }

        self.hub.close_clients();
        let server = self.server.lock().take();
        if let Some(mut server) = server {
            match tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(error = %err, "HTTP SSE server task ended abnormally"),
                Err(_) => {
                    warn!(
                        grace_secs = SHUTDOWN_GRACE.as_secs(),
                        "HTTP SSE server did not stop within grace period, aborting"
                    );
                    server.abort();
                }
            }
        }

        info!(transport_type = TRANSPORT, "HTTP SSE transport closed");
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }

    fn transport_type(&self) -> TransportKind {
        TransportKind::HttpSse
    }

    fn client_events(&self) -> Option<broadcast::Receiver<ClientEvent>> {
        Some(self.hub.client_events())
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
    };

    use super::*;

    fn hub(max_clients: usize) -> (Arc<SseHub>, mpsc::Receiver<InboundMessage>) {
        SseHub::new(max_clients, Duration::from_secs(30))
    }

    fn local_settings() -> SseSettings {
        SseSettings {
            bind_address: "127.0.0.1:0".to_string(),
            ..SseSettings::default()
        }
    }

    async fn next_message(subscription: &mut ClientSubscription) -> Vec<u8> {
        match subscription.next_frame().await {
            Some(Frame::Message(payload)) => payload.to_vec(),
            other => panic!("expected message frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_client_and_drops_for_full_channel() {
        let (hub, _inbound) = hub(10);
        let mut slow = hub.subscribe("slow", HashMap::new()).expect("subscribe slow");
        for _ in 0..CLIENT_CHANNEL_CAPACITY {
            hub.broadcast(b"backlog").expect("fill slow client");
        }

        let mut first = hub.subscribe("first", HashMap::new()).expect("subscribe first");
        let mut second = hub.subscribe("second", HashMap::new()).expect("subscribe second");

        let report = hub.broadcast(b"fresh").expect("broadcast");
        assert_eq!(
            report,
            BroadcastReport {
                attempted: 3,
                delivered: 2,
                dropped: 1,
            }
        );
        assert_eq!(next_message(&mut first).await, b"fresh");
        assert_eq!(next_message(&mut second).await, b"fresh");
        assert_eq!(next_message(&mut slow).await, b"backlog");
    }

    #[tokio::test]
    async fn broadcast_without_clients_fails() {
        let (hub, _inbound) = hub(10);
        assert!(matches!(hub.broadcast(b"{}"), Err(TransportError::NoClients)));
    }

    #[tokio::test]
    async fn inbound_queue_rejects_when_full() {
        let (hub, mut inbound) = hub(10);

        for index in 0..INBOUND_QUEUE_CAPACITY {
            hub.submit("producer", format!("{{\"id\":{index}}}").into_bytes())
                .expect("queue has room");
        }
        assert!(matches!(
            hub.submit("producer", b"{}".to_vec()),
            Err(TransportError::QueueFull { capacity: INBOUND_QUEUE_CAPACITY, .. })
        ));

        let first = inbound.recv().await.expect("queued message");
        assert_eq!(first.client_id, "producer");
        assert_eq!(first.data, b"{\"id\":0}");
        hub.submit("producer", b"{}".to_vec()).expect("room after drain");
    }

    #[tokio::test]
    async fn missing_client_id_is_rejected() {
        let (hub, _inbound) = hub(10);

        assert!(matches!(
            hub.subscribe("  ", HashMap::new()),
            Err(TransportError::MissingClientId)
        ));
        assert!(matches!(
            hub.submit("", b"{}".to_vec()),
            Err(TransportError::MissingClientId)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_stream_emits_keep_alive() {
        let (hub, _inbound) = hub(10);
        let mut subscription = hub.subscribe("idle", HashMap::new()).expect("subscribe");
        let started = Instant::now();

        let frame = subscription.next_frame().await.expect("frame");
        assert_eq!(frame, Frame::KeepAlive);
        assert_eq!(frame.payload(), KEEP_ALIVE_FRAME.as_bytes());
        assert!(started.elapsed() >= Duration::from_secs(30));

        hub.broadcast(b"{\"id\":1}").expect("broadcast");
        assert_eq!(next_message(&mut subscription).await, b"{\"id\":1}");
    }

    #[tokio::test]
    async fn reconnect_replaces_client_without_losing_new_stream() {
        let (hub, _inbound) = hub(10);
        let mut old = hub.subscribe("agent", HashMap::new()).expect("first subscribe");
        let mut new = hub.subscribe("agent", HashMap::new()).expect("second subscribe");

        assert!(old.next_frame().await.is_none());
        drop(old);

        assert_eq!(hub.connected_clients(), 1);
        hub.broadcast(b"still here").expect("broadcast");
        assert_eq!(next_message(&mut new).await, b"still here");
    }

    #[tokio::test]
    async fn disconnect_is_reported_exactly_once() {
        let (hub, _inbound) = hub(10);
        let mut events = hub.client_events();

        let subscription = hub.subscribe("agent", HashMap::new()).expect("subscribe");
        drop(subscription);
        hub.close_clients();

        assert!(matches!(
            events.recv().await,
            Ok(ClientEvent::Connected { client_id, .. }) if client_id == "agent"
        ));
        assert!(matches!(
            events.recv().await,
            Ok(ClientEvent::Disconnected { client_id }) if client_id == "agent"
        ));
        assert!(events.try_recv().is_err());
        assert_eq!(hub.connected_clients(), 0);
    }

    #[tokio::test]
    async fn client_limit_counts_distinct_ids() {
        let (hub, _inbound) = hub(2);
        let _a = hub.subscribe("a", HashMap::new()).expect("a");
        let _b = hub.subscribe("b", HashMap::new()).expect("b");

        assert!(matches!(
            hub.subscribe("c", HashMap::new()),
            Err(TransportError::TooManyClients { max: 2, .. })
        ));
        let _a_again = hub.subscribe("a", HashMap::new()).expect("reconnect is not a new client");
        assert_eq!(hub.connected_clients(), 2);
    }

    #[tokio::test]
    async fn closing_hub_ends_streams_and_rejects_new_work() {
        let (hub, _inbound) = hub(10);
        let mut subscription = hub.subscribe("agent", HashMap::new()).expect("subscribe");

        assert_eq!(hub.close_clients(), 1);
        assert!(subscription.next_frame().await.is_none());
        assert!(matches!(
            hub.subscribe("late", HashMap::new()),
            Err(TransportError::Closed { .. })
        ));
        assert!(matches!(
            hub.submit("late", b"{}".to_vec()),
            Err(TransportError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn read_returns_queued_message() {
        let transport = SseTransport::new(local_settings());
        transport
            .hub()
            .submit("agent", b"{\"jsonrpc\":\"2.0\"}".to_vec())
            .expect("submit");

        let message = transport.read_message().await.expect("read");
        assert_eq!(message, b"{\"jsonrpc\":\"2.0\"}");
    }

    #[tokio::test(start_paused = true)]
    async fn read_times_out_without_messages() {
        let transport = SseTransport::new(local_settings());

        assert!(matches!(
            transport.read_message().await,
            Err(TransportError::Timeout { waited, .. }) if waited == Duration::from_secs(30)
        ));
    }

    #[tokio::test]
    async fn close_unblocks_pending_read() {
        let transport = Arc::new(SseTransport::new(local_settings()));
        let pending = tokio::spawn({
            let transport = Arc::clone(&transport);
            async move { transport.read_message().await }
        });
        tokio::task::yield_now().await;

        transport.close().await.expect("close");
        let result = tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("read should return promptly")
            .expect("task should not panic");
        assert!(matches!(result, Err(TransportError::Closed { .. })));
    }

    #[tokio::test]
    async fn start_close_lifecycle() {
        let transport = SseTransport::new(local_settings());
        transport
            .start(CancellationToken::new())
            .await
            .expect("start");

        assert!(transport.local_addr().is_some());
        assert_eq!(transport.transport_type(), TransportKind::HttpSse);
        assert!(matches!(
            transport.start(CancellationToken::new()).await,
            Err(TransportError::Closed { .. })
        ));
        assert!(matches!(
            transport.write_message(b"{}").await,
            Err(TransportError::NoClients)
        ));

        for _ in 0..3 {
            transport.close().await.expect("close never fails");
        }
        assert!(transport.is_closed());
        assert!(matches!(
            transport.write_message(b"{}").await,
            Err(TransportError::Closed { .. })
        ));
    }

    #[tokio::test]
    async fn start_reports_bind_failure() {
        let occupied = TcpListener::bind("127.0.0.1:0").await.expect("bind probe");
        let address = occupied.local_addr().expect("probe address");
        let transport = SseTransport::new(SseSettings {
            bind_address: address.to_string(),
            ..SseSettings::default()
        });

        assert!(matches!(
            transport.start(CancellationToken::new()).await,
            Err(TransportError::Bind { .. })
        ));
        assert!(!transport.is_closed());
    }

    #[tokio::test]
    async fn live_server_answers_health_check() {
        let transport = SseTransport::new(local_settings());
        transport
            .start(CancellationToken::new())
            .await
            .expect("start");
        let address = transport.local_addr().expect("bound address");

        let mut stream = TcpStream::connect(address).await.expect("connect");
        stream
            .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .expect("send request");
        let mut response = String::new();
        stream
            .read_to_string(&mut response)
            .await
            .expect("read response");

        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"transport\":\"http-sse\""));
        assert!(response.contains("\"clients\":0"));
        transport.close().await.expect("close");
    }
}

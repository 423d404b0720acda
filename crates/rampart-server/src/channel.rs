//! The per-connection command channel: handshake, inbound pump, and
//! reliable outbound delivery.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{Sink, SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tracing::{debug, info, warn};

use rampart_dispatch::{AgentLink, ConnectionRegistry, DeliveryOutcome, RuleState, SessionLedger};
use rampart_proto::{validate_agent_name, AgentFrame, Directive, TenantId};

use crate::config::{ChannelConfig, ServerConfig};
use crate::error::{ServerError, ServerResult, TransportError};

/// Lifecycle of one agent connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// TCP/WebSocket upgrade finished, nothing received yet.
    Connecting,
    /// Waiting for the one handshake frame carrying the agent's name.
    AwaitingHandshake,
    /// Handshake accepted; the channel is registered and pumping frames.
    Active,
    /// The connection is gone.
    Closed,
}

impl ChannelState {
    /// Whether the channel can carry directives.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

/// Bookkeeping for one agent connection, for logging and state tracking.
#[derive(Debug)]
pub struct ChannelSession {
    id: uuid::Uuid,
    tenant: TenantId,
    state: ChannelState,
    connected_at: DateTime<Utc>,
    last_frame_at: DateTime<Utc>,
}

impl ChannelSession {
    /// Create a session for a freshly upgraded connection.
    #[must_use]
    pub fn new(tenant: TenantId) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4(),
            tenant,
            state: ChannelState::Connecting,
            connected_at: now,
            last_frame_at: now,
        }
    }

    /// The session identifier.
    #[must_use]
    pub const fn id(&self) -> uuid::Uuid {
        self.id
    }

    /// The tenant that authenticated this connection.
    #[must_use]
    pub const fn tenant(&self) -> TenantId {
        self.tenant
    }

    /// The current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> ChannelState {
        self.state
    }

    /// When the connection was established.
    #[must_use]
    pub const fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// When the last frame arrived.
    #[must_use]
    pub const fn last_frame_at(&self) -> DateTime<Utc> {
        self.last_frame_at
    }

    /// Enter the handshake phase.
    pub const fn begin_handshake(&mut self) {
        self.state = ChannelState::AwaitingHandshake;
    }

    /// Enter the active phase.
    pub const fn activate(&mut self) {
        self.state = ChannelState::Active;
    }

    /// Mark the session closed.
    pub const fn close(&mut self) {
        self.state = ChannelState::Closed;
    }

    /// Record an inbound frame.
    pub fn touch(&mut self) {
        self.last_frame_at = Utc::now();
    }
}

/// Outbound half of a channel: one text frame at a time.
///
/// Implementations serialize writers internally; the transport is the
/// channel's write lock.
#[async_trait]
pub trait FrameTransport: Send + Sync {
    /// Write one text frame.
    async fn send_text(&self, text: String) -> Result<(), TransportError>;
}

/// [`FrameTransport`] over the sink half of a WebSocket stream.
pub struct WsTransport<W> {
    sink: AsyncMutex<W>,
}

impl<W> WsTransport<W>
where
    W: Sink<WsMessage, Error = WsError> + Send + Unpin,
{
    /// Wrap a WebSocket sink.
    #[must_use]
    pub fn new(sink: W) -> Self {
        Self {
            sink: AsyncMutex::new(sink),
        }
    }
}

#[async_trait]
impl<W> FrameTransport for WsTransport<W>
where
    W: Sink<WsMessage, Error = WsError> + Send + Unpin + 'static,
{
    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        let mut sink = self.sink.lock().await;
        sink.send(WsMessage::Text(text)).await.map_err(Into::into)
    }
}

#[derive(Debug, Default)]
struct AckTableInner {
    pending: Mutex<HashMap<IpAddr, (u64, oneshot::Sender<bool>)>>,
    seq: AtomicU64,
}

/// Per-ip acknowledgement waits for one channel.
///
/// Each reliable send registers a wait handle scoped to the call: dropping
/// the handle (timeout, abandoned send) removes its entry, so the table
/// cannot leak. A newer send for the same ip supersedes the older waiter.
#[derive(Debug, Clone, Default)]
pub struct AckTable {
    inner: Arc<AckTableInner>,
}

impl AckTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait for `CONFIRM <ip>`, superseding any previous wait
    /// for the same address.
    #[must_use]
    pub fn register(&self, ip: IpAddr) -> AckWait {
        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner.pending.lock().insert(ip, (seq, tx));
        AckWait {
            ip,
            seq,
            rx,
            table: self.clone(),
        }
    }

    /// Resolve the pending wait for `ip`, if any. Returns whether a waiter
    /// existed.
    pub fn resolve(&self, ip: IpAddr) -> bool {
        if let Some((_, tx)) = self.inner.pending.lock().remove(&ip) {
            let _ = tx.send(true);
            true
        } else {
            false
        }
    }

    /// Release every pending wait with failure. Called when the channel
    /// closes so no reliable-send caller blocks forever.
    pub fn fail_all(&self) {
        let drained: Vec<_> = self.inner.pending.lock().drain().collect();
        for (_, (_, tx)) in drained {
            let _ = tx.send(false);
        }
    }

    /// Number of in-flight waits.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    fn remove_if_current(&self, ip: IpAddr, seq: u64) {
        let mut pending = self.inner.pending.lock();
        if pending.get(&ip).is_some_and(|(s, _)| *s == seq) {
            pending.remove(&ip);
        }
    }
}

/// A wait handle for one acknowledgement, scoped to the sending call.
#[derive(Debug)]
pub struct AckWait {
    ip: IpAddr,
    seq: u64,
    rx: oneshot::Receiver<bool>,
    table: AckTable,
}

impl AckWait {
    /// Wait for the acknowledgement. `true` means the agent confirmed;
    /// `false` means the channel released the wait (closing or superseded).
    pub async fn wait(mut self) -> bool {
        (&mut self.rx).await.unwrap_or(false)
    }
}

impl Drop for AckWait {
    fn drop(&mut self) {
        self.table.remove_if_current(self.ip, self.seq);
    }
}

/// A live, registered channel to one tenant's agent.
pub struct AgentChannel {
    tenant: TenantId,
    agent_name: String,
    interface: String,
    config: ChannelConfig,
    transport: Arc<dyn FrameTransport>,
    acks: AckTable,
    rules: RuleState,
}

impl AgentChannel {
    /// Create a channel over an established transport.
    #[must_use]
    pub fn new(
        tenant: TenantId,
        agent_name: impl Into<String>,
        interface: impl Into<String>,
        config: ChannelConfig,
        transport: Arc<dyn FrameTransport>,
    ) -> Self {
        Self {
            tenant,
            agent_name: agent_name.into(),
            interface: interface.into(),
            config,
            transport,
            acks: AckTable::new(),
            rules: RuleState::new(),
        }
    }

    /// The channel's acknowledgement table. The inbound pump resolves
    /// confirmations through it.
    #[must_use]
    pub fn acks(&self) -> &AckTable {
        &self.acks
    }

    /// Send one frame and wait for `CONFIRM <ip>`, retrying up to the
    /// configured bound. A closed transport aborts immediately.
    async fn send_reliable(&self, text: &str, ip: IpAddr) -> DeliveryOutcome {
        for attempt in 1..=self.config.max_attempts {
            // Register before writing so a fast confirmation cannot race
            // past the wait.
            let wait = self.acks.register(ip);

            match self.transport.send_text(text.to_string()).await {
                Ok(()) => {}
                Err(TransportError::Closed) => {
                    warn!(tenant = %self.tenant, ip = %ip, "Transport closed; aborting delivery");
                    return DeliveryOutcome::Closed;
                }
                Err(TransportError::Io(e)) => {
                    warn!(
                        tenant = %self.tenant,
                        ip = %ip,
                        attempt = attempt,
                        error = %e,
                        "Transient send failure"
                    );
                    continue;
                }
            }

            match timeout(self.config.ack_timeout, wait.wait()).await {
                Ok(true) => return DeliveryOutcome::Acknowledged,
                Ok(false) => {
                    // The channel released the wait: it is closing (or a
                    // newer send superseded this one). Retrying is pointless.
                    return DeliveryOutcome::Closed;
                }
                Err(_) => {
                    warn!(
                        tenant = %self.tenant,
                        ip = %ip,
                        attempt = attempt,
                        "No acknowledgement before timeout"
                    );
                }
            }
        }

        DeliveryOutcome::Dropped
    }
}

#[async_trait]
impl AgentLink for AgentChannel {
    fn tenant(&self) -> TenantId {
        self.tenant
    }

    fn agent_name(&self) -> &str {
        &self.agent_name
    }

    fn rules(&self) -> &RuleState {
        &self.rules
    }

    async fn deliver(&self, directive: Directive) -> DeliveryOutcome {
        let text = match directive.render(&self.interface) {
            Ok(text) => text,
            Err(e) => {
                warn!(tenant = %self.tenant, error = %e, "Directive rendering failed");
                return DeliveryOutcome::Dropped;
            }
        };

        match directive.ack_ip() {
            Some(ip) => self.send_reliable(&text, ip).await,
            None => match self.transport.send_text(text).await {
                Ok(()) => DeliveryOutcome::Sent,
                Err(e) => {
                    warn!(tenant = %self.tenant, error = %e, "Advisory send failed");
                    DeliveryOutcome::Dropped
                }
            },
        }
    }
}

impl std::fmt::Debug for AgentChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentChannel")
            .field("tenant", &self.tenant)
            .field("agent_name", &self.agent_name)
            .finish_non_exhaustive()
    }
}

/// Drive one agent connection through its whole life: handshake, registry
/// entry, inbound pump, cleanup.
///
/// A malformed or missing handshake closes the channel before it reaches
/// `Active`; no registry entry is created. On close, the channel unregisters
/// only if it is still the registered instance, marks the tenant offline
/// only when that eviction happened, and releases all pending acks.
///
/// # Errors
///
/// Returns a protocol error for handshake violations. A read error during
/// the active phase ends the session normally (logged, `Ok`).
pub async fn run_channel<S>(
    stream: S,
    tenant: TenantId,
    registry: Arc<ConnectionRegistry>,
    ledger: Arc<SessionLedger>,
    config: Arc<ServerConfig>,
) -> ServerResult<()>
where
    S: Stream<Item = Result<WsMessage, WsError>>
        + Sink<WsMessage, Error = WsError>
        + Send
        + Unpin
        + 'static,
{
    let (sink, mut inbound) = stream.split();
    let mut session = ChannelSession::new(tenant);

    session.begin_handshake();
    debug!(session_id = %session.id(), tenant = %tenant, "Awaiting handshake frame");

    let agent_name = match timeout(config.handshake_timeout, read_text_frame(&mut inbound)).await {
        Err(_) => {
            return Err(ServerError::Protocol("handshake timed out".to_string()));
        }
        Ok(None) => {
            return Err(ServerError::Protocol(
                "connection closed before handshake".to_string(),
            ));
        }
        Ok(Some(Err(e))) => {
            return Err(ServerError::Protocol(format!("handshake read failed: {e}")));
        }
        Ok(Some(Ok(name))) => name,
    };

    validate_agent_name(&agent_name).map_err(|e| ServerError::Protocol(e.to_string()))?;

    session.activate();
    session.touch();

    let transport = Arc::new(WsTransport::new(sink));
    let channel = Arc::new(AgentChannel::new(
        tenant,
        agent_name.clone(),
        config.interface.clone(),
        config.channel,
        transport,
    ));
    let link: Arc<dyn AgentLink> = channel.clone();

    if registry.register(link.clone()).is_some() {
        info!(tenant = %tenant, "Previous channel replaced by new handshake");
    }
    ledger.mark_online(tenant, &agent_name);

    info!(
        session_id = %session.id(),
        tenant = %tenant,
        agent = %agent_name,
        "Agent channel active"
    );

    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                session.touch();
                ledger.touch(tenant);

                match AgentFrame::parse(&text) {
                    AgentFrame::Confirm(ip) => {
                        if channel.acks().resolve(ip) {
                            debug!(tenant = %tenant, ip = %ip, "Rule confirmed");
                        } else {
                            debug!(tenant = %tenant, ip = %ip, "Confirmation with no pending wait");
                        }
                    }
                    AgentFrame::Text(payload) => {
                        debug!(tenant = %tenant, payload = %payload, "Uninterpreted frame");
                    }
                }
            }
            Ok(WsMessage::Close(_)) => {
                debug!(session_id = %session.id(), "Close frame received");
                break;
            }
            Ok(_) => {
                // Ping/pong handled at the WebSocket layer; binary ignored.
            }
            Err(e) => {
                warn!(session_id = %session.id(), error = %e, "Channel read error");
                break;
            }
        }
    }

    session.close();
    if registry.unregister(tenant, &link) {
        ledger.mark_offline(tenant);
    }
    channel.acks().fail_all();

    info!(session_id = %session.id(), tenant = %tenant, "Channel closed");
    Ok(())
}

/// Read the next text frame, skipping ping/pong, until the stream yields
/// text, errors, or ends.
async fn read_text_frame<S>(inbound: &mut S) -> Option<Result<String, WsError>>
where
    S: Stream<Item = Result<WsMessage, WsError>> + Unpin,
{
    while let Some(frame) = inbound.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => return Some(Ok(text)),
            Ok(WsMessage::Close(_)) => return None,
            Ok(_) => continue,
            Err(e) => return Some(Err(e)),
        }
    }
    None
}

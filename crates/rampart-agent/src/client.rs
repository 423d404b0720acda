//! The agent's connection loop.

use std::sync::Arc;

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use rampart_proto::{AgentFrame, Directive};

use crate::backoff::ReconnectPolicy;
use crate::config::AgentConfig;
use crate::error::{AgentError, AgentResult};

/// Applies a directive to the host.
///
/// The coordinator's directive is a description; what it means on this
/// particular host (iptables, nftables, a cloud firewall API) is the
/// executor's business and out of the agent core's scope.
pub trait FirewallExecutor: Send + Sync {
    /// Apply one directive.
    ///
    /// # Errors
    ///
    /// Returns an error if the host rejected the rule change; the directive
    /// will not be confirmed, so the coordinator may retry it.
    fn apply(&self, directive: &Directive) -> AgentResult<()>;
}

/// An executor that logs directives without touching the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingExecutor;

impl FirewallExecutor for LoggingExecutor {
    fn apply(&self, directive: &Directive) -> AgentResult<()> {
        match directive {
            Directive::Block { ip } => info!(ip = %ip, "Would install drop rule"),
            Directive::Unblock { ip } => info!(ip = %ip, "Would remove drop rule"),
            Directive::LowWeight { ip, weight, .. } => {
                info!(ip = %ip, weight = weight, "Low-weight advisory");
            }
        }
        Ok(())
    }
}

/// The agent: connects, handshakes, relays directives, confirms rules,
/// reconnects forever.
pub struct AgentClient {
    config: AgentConfig,
    backoff: ReconnectPolicy,
    executor: Arc<dyn FirewallExecutor>,
}

impl AgentClient {
    /// Create a client with the default backoff policy.
    #[must_use]
    pub fn new(config: AgentConfig, executor: Arc<dyn FirewallExecutor>) -> Self {
        Self {
            config,
            backoff: ReconnectPolicy::default(),
            executor,
        }
    }

    /// Override the reconnection policy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: ReconnectPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Run the agent until the task is dropped. Every lost connection is
    /// re-established with capped exponential backoff; a successful session
    /// resets the backoff.
    pub async fn run(&self) {
        let mut attempt: u32 = 0;

        loop {
            match self.connect().await {
                Ok(stream) => {
                    attempt = 0;
                    info!(
                        url = %self.config.websocket_url(),
                        agent = %self.config.agent_name,
                        "Connected to coordinator"
                    );

                    if let Err(e) = self.run_session(stream).await {
                        warn!(error = %e, "Session ended with error");
                    } else {
                        info!("Connection closed");
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Could not reach coordinator");
                }
            }

            attempt = attempt.saturating_add(1);
            let delay = self.backoff.delay_for_attempt(attempt);
            info!(delay_secs = delay.as_secs(), "Reconnecting");
            tokio::time::sleep(delay).await;
        }
    }

    /// Dial the coordinator with the bearer credential attached.
    async fn connect(&self) -> AgentResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
        let mut request = self
            .config
            .websocket_url()
            .into_client_request()
            .map_err(|e| AgentError::Connect(e.to_string()))?;

        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.config.token))
            .map_err(|e| AgentError::Connect(e.to_string()))?;
        request.headers_mut().insert(AUTHORIZATION, bearer);

        let (stream, _response) = connect_async(request)
            .await
            .map_err(|e| AgentError::Connect(e.to_string()))?;

        Ok(stream)
    }

    /// Drive one established connection: handshake with the agent name,
    /// then relay directives until the stream ends.
    async fn run_session<S>(&self, stream: S) -> AgentResult<()>
    where
        S: Stream<Item = Result<WsMessage, WsError>> + Sink<WsMessage, Error = WsError> + Unpin,
    {
        let (mut sink, mut inbound) = stream.split();

        sink.send(WsMessage::Text(self.config.agent_name.clone()))
            .await
            .map_err(|e| AgentError::Send(e.to_string()))?;

        while let Some(frame) = inbound.next().await {
            match frame {
                Ok(WsMessage::Text(text)) => {
                    if let Some(confirmation) = self.handle_directive(&text) {
                        sink.send(WsMessage::Text(confirmation))
                            .await
                            .map_err(|e| AgentError::Send(e.to_string()))?;
                    }
                }
                Ok(WsMessage::Close(_)) => {
                    debug!("Close frame received");
                    break;
                }
                Ok(_) => {
                    // Ping/pong handled by the WebSocket layer.
                }
                Err(e) => {
                    warn!(error = %e, "Read error");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Apply one received frame; returns the confirmation line to send, if
    /// the directive was applied and wants one.
    fn handle_directive(&self, raw: &str) -> Option<String> {
        let directive = match Directive::parse(raw) {
            Ok(directive) => directive,
            Err(e) => {
                debug!(frame = %raw, error = %e, "Unrecognized frame ignored");
                return None;
            }
        };

        if let Err(e) = self.executor.apply(&directive) {
            // No confirmation: the coordinator's retry is our retry.
            warn!(error = %e, "Executor rejected directive");
            return None;
        }

        directive.ack_ip().map(AgentFrame::confirm_line)
    }
}

impl std::fmt::Debug for AgentClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentClient")
            .field("agent_name", &self.config.agent_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::net::IpAddr;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    fn config() -> AgentConfig {
        AgentConfig {
            server_url: "http://localhost:8080".to_string(),
            token: "tok".to_string(),
            agent_name: "edge-fw-01".to_string(),
            interface: "eth0".to_string(),
        }
    }

    fn ip() -> IpAddr {
        "203.0.113.12".parse().unwrap()
    }

    #[derive(Default)]
    struct RecordingExecutor {
        applied: Mutex<Vec<Directive>>,
        fail: bool,
    }

    impl FirewallExecutor for RecordingExecutor {
        fn apply(&self, directive: &Directive) -> AgentResult<()> {
            if self.fail {
                return Err(AgentError::Executor("iptables exited 1".to_string()));
            }
            self.applied.lock().push(directive.clone());
            Ok(())
        }
    }

    /// Scripted duplex socket; see the server crate's channel tests for the
    /// same shape.
    struct ScriptedSocket {
        incoming: VecDeque<Result<WsMessage, WsError>>,
        sent: Arc<Mutex<Vec<WsMessage>>>,
    }

    impl ScriptedSocket {
        fn new(frames: Vec<Result<WsMessage, WsError>>) -> (Self, Arc<Mutex<Vec<WsMessage>>>) {
            let sent = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    incoming: frames.into(),
                    sent: sent.clone(),
                },
                sent,
            )
        }
    }

    impl Stream for ScriptedSocket {
        type Item = Result<WsMessage, WsError>;

        fn poll_next(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            Poll::Ready(self.get_mut().incoming.pop_front())
        }
    }

    impl Sink<WsMessage> for ScriptedSocket {
        type Error = WsError;

        fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn start_send(self: Pin<&mut Self>, item: WsMessage) -> Result<(), WsError> {
            self.get_mut().sent.lock().push(item);
            Ok(())
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }

        fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<(), WsError>> {
            Poll::Ready(Ok(()))
        }
    }

    fn sent_texts(sent: &Arc<Mutex<Vec<WsMessage>>>) -> Vec<String> {
        sent.lock()
            .iter()
            .filter_map(|m| match m {
                WsMessage::Text(t) => Some(t.clone()),
                _ => None,
            })
            .collect()
    }

    // ==================== handle_directive Tests ====================

    #[test]
    fn test_block_directive_is_applied_and_confirmed() {
        let executor = Arc::new(RecordingExecutor::default());
        let client = AgentClient::new(config(), executor.clone());

        let confirmation =
            client.handle_directive("IPTABLES -A INPUT -i eth0 -s 203.0.113.12 -j DROP");

        assert_eq!(confirmation, Some("CONFIRM 203.0.113.12".to_string()));
        assert_eq!(executor.applied.lock().as_slice(), &[Directive::block(ip())]);
    }

    #[test]
    fn test_advisory_is_applied_without_confirmation() {
        let executor = Arc::new(RecordingExecutor::default());
        let client = AgentClient::new(config(), executor.clone());
        let advisory = Directive::low_weight(ip(), 18).render("eth0").unwrap();

        let confirmation = client.handle_directive(&advisory);

        assert!(confirmation.is_none());
        assert_eq!(executor.applied.lock().len(), 1);
    }

    #[test]
    fn test_unrecognized_frame_is_ignored() {
        let executor = Arc::new(RecordingExecutor::default());
        let client = AgentClient::new(config(), executor.clone());

        assert!(client.handle_directive("hello agent").is_none());
        assert!(executor.applied.lock().is_empty());
    }

    #[test]
    fn test_executor_failure_suppresses_confirmation() {
        let executor = Arc::new(RecordingExecutor {
            fail: true,
            ..Default::default()
        });
        let client = AgentClient::new(config(), executor);

        let confirmation =
            client.handle_directive("IPTABLES -A INPUT -i eth0 -s 203.0.113.12 -j DROP");

        assert!(confirmation.is_none());
    }

    // ==================== run_session Tests ====================

    #[tokio::test]
    async fn test_session_sends_name_first() {
        let executor = Arc::new(RecordingExecutor::default());
        let client = AgentClient::new(config(), executor);
        let (socket, sent) = ScriptedSocket::new(vec![]);

        client.run_session(socket).await.unwrap();

        assert_eq!(sent_texts(&sent), vec!["edge-fw-01".to_string()]);
    }

    #[tokio::test]
    async fn test_session_confirms_block_directive() {
        let executor = Arc::new(RecordingExecutor::default());
        let client = AgentClient::new(config(), executor.clone());
        let (socket, sent) = ScriptedSocket::new(vec![
            Ok(WsMessage::Text(
                "IPTABLES -A INPUT -i eth0 -s 203.0.113.12 -j DROP".to_string(),
            )),
            Ok(WsMessage::Close(None)),
        ]);

        client.run_session(socket).await.unwrap();

        assert_eq!(
            sent_texts(&sent),
            vec![
                "edge-fw-01".to_string(),
                "CONFIRM 203.0.113.12".to_string()
            ]
        );
        assert_eq!(executor.applied.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_session_survives_read_error() {
        let executor = Arc::new(RecordingExecutor::default());
        let client = AgentClient::new(config(), executor);
        let (socket, _sent) = ScriptedSocket::new(vec![Err(WsError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        )))]);

        // A read error ends the session cleanly; reconnection is run()'s
        // job.
        assert!(client.run_session(socket).await.is_ok());
    }

    // ==================== LoggingExecutor Tests ====================

    #[test]
    fn test_logging_executor_accepts_everything() {
        let executor = LoggingExecutor;
        assert!(executor.apply(&Directive::block(ip())).is_ok());
        assert!(executor.apply(&Directive::unblock(ip())).is_ok());
        assert!(executor.apply(&Directive::low_weight(ip(), 15)).is_ok());
    }
}

//! The WebSocket accept loop.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, info, warn};

use rampart_dispatch::{ConnectionRegistry, SessionLedger};
use rampart_proto::TenantId;

use crate::auth::TenantAuthenticator;
use crate::channel::run_channel;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Accepts agent connections, authenticates them during the WebSocket
/// upgrade, and spawns one channel task per connection.
pub struct CoordinatorServer {
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    ledger: Arc<SessionLedger>,
    auth: Arc<dyn TenantAuthenticator>,
    open_connections: Arc<AtomicUsize>,
}

impl CoordinatorServer {
    /// Create a server over shared registry, ledger, and authenticator.
    #[must_use]
    pub fn new(
        config: ServerConfig,
        registry: Arc<ConnectionRegistry>,
        ledger: Arc<SessionLedger>,
        auth: Arc<dyn TenantAuthenticator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            ledger,
            auth,
            open_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The connection registry this server feeds.
    #[must_use]
    pub fn registry(&self) -> Arc<ConnectionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Currently open connections (including ones still in handshake).
    #[must_use]
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Relaxed)
    }

    /// Listen for agent connections until the task is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails. Per-connection failures are
    /// logged, never fatal.
    pub async fn serve(&self) -> ServerResult<()> {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindFailed(addr, e))?;

        info!(addr = %addr, "Coordinator listening for agents");

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Failed to accept connection");
                    continue;
                }
            };

            let open = self.open_connections.load(Ordering::Relaxed);
            if open >= self.config.max_connections {
                warn!(
                    peer = %peer,
                    open = open,
                    max = self.config.max_connections,
                    "Connection rejected: max connections reached"
                );
                continue;
            }

            self.spawn_connection(stream, peer);
        }
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let config = Arc::clone(&self.config);
        let registry = Arc::clone(&self.registry);
        let ledger = Arc::clone(&self.ledger);
        let auth = Arc::clone(&self.auth);
        let open_connections = Arc::clone(&self.open_connections);

        tokio::spawn(async move {
            open_connections.fetch_add(1, Ordering::Relaxed);

            match handle_connection(stream, peer, config, registry, ledger, auth).await {
                Ok(()) => debug!(peer = %peer, "Connection closed normally"),
                Err(e) => debug!(peer = %peer, error = %e, "Connection ended with error"),
            }

            open_connections.fetch_sub(1, Ordering::Relaxed);
        });
    }
}

impl std::fmt::Debug for CoordinatorServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordinatorServer")
            .field("bind_addr", &self.config.bind_addr)
            .finish_non_exhaustive()
    }
}

/// Upgrade one TCP connection, resolving the bearer token to a tenant in
/// the upgrade callback. An unresolvable token rejects the upgrade with
/// 401 before any frame is exchanged.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    config: Arc<ServerConfig>,
    registry: Arc<ConnectionRegistry>,
    ledger: Arc<SessionLedger>,
    auth: Arc<dyn TenantAuthenticator>,
) -> ServerResult<()> {
    let tenant_slot: Arc<Mutex<Option<TenantId>>> = Arc::new(Mutex::new(None));

    let callback = {
        let tenant_slot = Arc::clone(&tenant_slot);
        move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            match resolve_bearer(request, auth.as_ref()) {
                Some(tenant) => {
                    *tenant_slot.lock() = Some(tenant);
                    Ok(response)
                }
                None => {
                    let mut rejection =
                        ErrorResponse::new(Some("invalid bearer credential".to_string()));
                    *rejection.status_mut() = StatusCode::UNAUTHORIZED;
                    Err(rejection)
                }
            }
        }
    };

    let ws_stream = accept_hdr_async(stream, callback)
        .await
        .map_err(|e| ServerError::WebSocket(e.to_string()))?;

    let Some(tenant) = tenant_slot.lock().take() else {
        return Err(ServerError::Internal(
            "upgrade succeeded without tenant resolution".to_string(),
        ));
    };

    info!(peer = %peer, tenant = %tenant, "Agent connection authenticated");

    run_channel(ws_stream, tenant, registry, ledger, config).await
}

/// Extract and resolve the `Authorization: Bearer <token>` header.
fn resolve_bearer(request: &Request, auth: &dyn TenantAuthenticator) -> Option<TenantId> {
    request
        .headers()
        .get("Authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| auth.resolve(token))
}

//! Rampart coordinator binary.
//!
//! Usage: `rampartd [bind_addr] [token_file.json]`
//!
//! The token file maps bearer tokens to tenant UUIDs. Without one, a
//! single development token is generated and logged.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rampart_dispatch::{ConnectionRegistry, Dispatcher, SessionLedger};
use rampart_proto::TenantId;
use rampart_reputation::{
    DecayPolicy, MemoryRequestCounterStore, MemoryWeightStore, WeightPolicy,
};
use rampart_server::{Coordinator, CoordinatorServer, ServerConfig, StaticTokenAuthenticator};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let bind_addr: SocketAddr = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| "0.0.0.0:8080".parse().expect("valid default addr"));

    let auth = match args.get(2) {
        Some(path) => match StaticTokenAuthenticator::from_json_file(path) {
            Ok(auth) => {
                info!(path = %path, tokens = auth.len(), "Loaded token file");
                auth
            }
            Err(e) => {
                error!("Failed to load token file: {e}");
                std::process::exit(1);
            }
        },
        None => {
            let tenant = TenantId::new();
            let token = format!("dev-{}", uuid::Uuid::new_v4());
            info!(tenant = %tenant, token = %token, "No token file; generated development token");
            StaticTokenAuthenticator::new().with_token(token, tenant)
        }
    };

    info!("Starting Rampart coordinator on {bind_addr}");
    info!("  Agents connect via: ws://{bind_addr}/");

    let registry = Arc::new(ConnectionRegistry::new());
    let ledger = Arc::new(SessionLedger::new());
    let dispatcher = Arc::new(Dispatcher::new(Arc::clone(&registry)));

    let coordinator = Arc::new(Coordinator::new(
        Arc::new(MemoryWeightStore::new()),
        Arc::new(MemoryRequestCounterStore::new()),
        Arc::clone(&ledger),
        dispatcher,
        WeightPolicy::default(),
        DecayPolicy::default(),
    ));

    {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move {
            coordinator.run_sweeper().await;
        });
    }

    let server = CoordinatorServer::new(
        ServerConfig::new(bind_addr),
        registry,
        ledger,
        Arc::new(auth),
    );

    if let Err(e) = server.serve().await {
        error!("Coordinator error: {e}");
        std::process::exit(1);
    }
}

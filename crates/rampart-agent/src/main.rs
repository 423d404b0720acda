//! Rampart agent binary.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use rampart_agent::{AgentClient, AgentConfig, LoggingExecutor};

/// Rampart enforcement agent.
#[derive(Debug, Parser)]
#[command(name = "rampart-agent", version, about)]
struct Cli {
    /// Path to the agent configuration file.
    #[arg(short, long, default_value = "agent.json")]
    config: PathBuf,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config = match AgentConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!(path = %cli.config.display(), "Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    info!(
        agent = %config.agent_name,
        server = %config.websocket_url(),
        interface = %config.interface,
        "Starting Rampart agent"
    );

    let client = AgentClient::new(config, Arc::new(LoggingExecutor));
    client.run().await;
}

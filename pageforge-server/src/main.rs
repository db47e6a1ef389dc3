use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use pageforge_server::config::ServerConfig;
use pageforge_server::server::Server;

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (PAGEFORGE_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("PAGEFORGE_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("pageforge_server=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let config = ServerConfig::parse();
    if config.secret.is_empty() {
        tracing::warn!("BUILD_SECRET is empty; requests with an empty secret will be accepted");
    }
    tracing::info!(
        port = config.port,
        model = %config.model,
        pages_propagation_secs = config.pages_propagation_secs,
        "Starting pageforge-server"
    );

    Server::new(config)?.run().await
}

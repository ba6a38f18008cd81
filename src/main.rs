//! DocDesk MCP Server - Entry point

use docdesk::{run_server_with_config, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "docdesk=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServerConfig::from_env();
    tracing::info!(
        resource_dirs = config.resource_dirs.len(),
        batch_workers = config.batch_workers,
        ai_enabled = config.ai.api_key.is_some(),
        "Starting DocDesk MCP Server"
    );

    run_server_with_config(config).await
}

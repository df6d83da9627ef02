use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use metrics_relay::agent;
use metrics_relay::config::AgentArgs;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("metrics_relay=info")),
        )
        .init();

    let config = AgentArgs::parse().agent_config();

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            return;
        }
        info!("shutdown signal received");
        trigger.cancel();
    });

    if let Err(e) = agent::run(config, shutdown).await {
        error!(error = %e, "agent failed");
        std::process::exit(1);
    }
    info!("agent stopped");
}

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use metrics_relay::config::ServerArgs;
use metrics_relay::server::{self, AppState};
use metrics_relay::storage;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("metrics_relay=info")),
        )
        .init();

    let args = ServerArgs::parse();
    let trusted_subnet = match args.trusted_subnet() {
        Ok(subnet) => subnet,
        Err(e) => {
            error!(error = %e, "bad server configuration");
            std::process::exit(1);
        }
    };

    // ── 1. Open storage ──────────────────────────────────────────
    let storage = match storage::open(&args.storage_config()) {
        Ok(storage) => storage,
        Err(e) => {
            error!(error = %e, "cannot configure storage");
            std::process::exit(1);
        }
    };
    // a failed restore or an unreachable database is not fatal: the
    // server starts and /ping reports the state
    if let Err(e) = storage.init().await {
        warn!(error = %e, "storage init failed");
    }

    // ── 2. Build shared state ────────────────────────────────────
    if let Some(subnet) = &trusted_subnet {
        info!(%subnet, "accepting requests from trusted subnet only");
    }
    let state = AppState::with_subnet(storage.clone(), args.hash_key(), trusted_subnet);

    // ── 3. Bind & serve ──────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&args.address)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {e}", args.address));

    if let Err(e) = server::serve(listener, state, shutdown_signal()).await {
        error!(error = %e, "server exited with error");
    }

    // ── 4. Final flush ───────────────────────────────────────────
    storage.close().await;
    info!("server stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

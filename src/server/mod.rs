//! HTTP adapter over a [`Storage`] backend.

pub mod error;
pub mod handlers;
pub mod subnet;
pub mod timing;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware as axum_mw,
    routing::{get, post},
    Router,
};
use ipnet::IpNet;
use tokio::net::TcpListener;
use tower_http::compression::CompressionLayer;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use crate::error::{MetricsError, Result};
use crate::model::HashKey;
use crate::storage::Storage;

/// Shared application state available to every handler via `State<Arc<AppState>>`.
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    /// Verifies incoming hashes and signs every JSON response.
    pub hash_key: HashKey,
    /// When set, only clients inside this network are served.
    pub trusted_subnet: Option<IpNet>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>, hash_key: HashKey) -> Arc<Self> {
        Self::with_subnet(storage, hash_key, None)
    }

    pub fn with_subnet(
        storage: Arc<dyn Storage>,
        hash_key: HashKey,
        trusted_subnet: Option<IpNet>,
    ) -> Arc<Self> {
        Arc::new(Self {
            storage,
            hash_key,
            trusted_subnet,
        })
    }
}

/// Builds the full Axum `Router` with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // ── Read endpoints ──────────────────────────────────────
        .route("/", get(handlers::index))
        .route("/ping", get(handlers::ping))
        .route("/value/:type/:id", get(handlers::value_path))
        .route("/value/", post(handlers::value_json))
        .route("/value", post(handlers::value_json))
        // ── Update endpoints ────────────────────────────────────
        .route("/update/:type/:id/:value", post(handlers::update_path))
        .route("/update/", post(handlers::update_json))
        .route("/update", post(handlers::update_json))
        .route("/updates/", post(handlers::updates_json))
        .route("/updates", post(handlers::updates_json))
        // ── Client filter, ahead of every handler ───────────────
        .layer(axum_mw::from_fn_with_state(state.clone(), subnet::trusted_subnet))
        // ── Provide shared state to all routes above ────────────
        .with_state(state)
        // ── Global middleware (applied bottom-up) ───────────────
        .layer(axum_mw::from_fn(timing::timing_middleware))
        .layer(CompressionLayer::new())
        .layer(RequestDecompressionLayer::new())
}

/// Serves `state` on `listener` until `shutdown` resolves. In-flight
/// requests finish before this returns; the storage is not closed here.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .map_err(|e| MetricsError::Config(format!("listener address: {e}")))?;
    info!(%addr, "server listening");

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| MetricsError::Transport(format!("server: {e}")))
}

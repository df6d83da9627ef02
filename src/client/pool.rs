//! Bounded fan-out used by per-metric delivery.
//!
//! A producer feeds a bounded channel that `workers` tasks drain. The first
//! failing worker cancels the shared token: the producer stops enqueueing
//! and closes the channel, the remaining workers exit before taking another
//! item, and the error is returned. Items already sent stay delivered.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{MetricsError, Result};

// ─── Public entry point ──────────────────────────────────────────

/// Runs `send` on every item with at most `workers` calls in flight.
pub async fn deliver<T, F, Fut>(items: Vec<T>, workers: usize, send: F) -> Result<()>
where
    T: Send + 'static,
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let workers = workers.max(1);
    let cancel = CancellationToken::new();
    let (tx, rx) = mpsc::channel::<T>(workers);
    let rx = Arc::new(Mutex::new(rx));
    let send = Arc::new(send);

    let mut set = JoinSet::new();
    for worker_id in 0..workers {
        set.spawn(worker(worker_id, rx.clone(), send.clone(), cancel.clone()));
    }

    // ── Producer ────────────────────────────────────────────────
    for item in items {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(item) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    // closing the channel lets idle workers finish
    drop(tx);

    // ── Collect ─────────────────────────────────────────────────
    let mut first_error = None;
    while let Some(joined) = set.join_next().await {
        let res = joined
            .unwrap_or_else(|e| Err(MetricsError::Transport(format!("delivery worker failed: {e}"))));
        if let Err(e) = res {
            cancel.cancel();
            first_error.get_or_insert(e);
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

// ─── Worker loop ─────────────────────────────────────────────────

async fn worker<T, F, Fut>(
    id: usize,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
    send: Arc<F>,
    cancel: CancellationToken,
) -> Result<()>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    loop {
        if cancel.is_cancelled() {
            return Ok(());
        }

        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = async { rx.lock().await.recv().await } => item,
        };
        let Some(item) = next else {
            return Ok(());
        };

        if let Err(e) = send(item).await {
            debug!(worker = id, error = %e, "delivery failed, cancelling remaining work");
            cancel.cancel();
            return Err(e);
        }
    }
}

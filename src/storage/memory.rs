use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::buffer::{BufferSnapshot, MetricBuffer};
use super::Storage;
use crate::config::StorageConfig;
use crate::error::{MetricsError, Result};
use crate::model::{Kind, Metric};

/// In-memory backend with JSON snapshot persistence.
///
/// With a non-zero `store_interval` a background task rewrites the snapshot
/// file on every tick; with a zero interval each update writes the file
/// before it returns.
pub struct MemStorage {
    buffer: Arc<MetricBuffer>,
    snapshots: Arc<Snapshotter>,
    config: StorageConfig,
    /// `true` once `close` has started. Updates hold the read side for
    /// their whole duration, so `close` waits for them before flushing.
    closed: RwLock<bool>,
    shutdown: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl MemStorage {
    pub fn new(config: StorageConfig) -> Self {
        let buffer = Arc::new(MetricBuffer::new());
        let snapshots = Arc::new(Snapshotter {
            buffer: buffer.clone(),
            path: config.store_file.clone(),
            write_lock: Mutex::new(()),
        });
        Self {
            buffer,
            snapshots,
            config,
            closed: RwLock::new(false),
            shutdown: CancellationToken::new(),
            flusher: Mutex::new(None),
        }
    }

    pub fn buffer(&self) -> &MetricBuffer {
        &self.buffer
    }

    fn write_through(&self) -> bool {
        self.config.store_interval.is_zero()
    }

    /// Applies `metrics` behind the close gate. In write-through mode the
    /// snapshot write lock is held across apply and save, and a failed save
    /// takes the batch back out of the buffer before the error is returned.
    async fn apply(&self, metrics: &[Metric]) -> Result<Vec<Metric>> {
        let closed = self.closed.read().await;
        if *closed {
            return Err(MetricsError::Closed);
        }
        if !self.write_through() {
            return Ok(self.buffer.apply_all(metrics));
        }

        let _writer = self.snapshots.write_lock.lock().await;
        let (updated, undo) = self.buffer.apply_logged(metrics);
        if let Err(e) = self.snapshots.write().await {
            self.buffer.undo(undo);
            return Err(e);
        }
        Ok(updated)
    }

    async fn restore(&self) -> Result<()> {
        if self.snapshots.path.is_none() {
            return Err(MetricsError::Config(
                "restore requested without a snapshot file".into(),
            ));
        }
        let snapshot = self.snapshots.load().await?;
        info!(
            gauges = snapshot.gauges.len(),
            counters = snapshot.counters.len(),
            "restored metrics from snapshot"
        );
        self.buffer.restore(snapshot);
        Ok(())
    }

    async fn start_flusher(&self) {
        if self.write_through() || self.snapshots.path.is_none() {
            return;
        }
        let mut slot = self.flusher.lock().await;
        if slot.is_some() {
            return;
        }
        let snapshots = self.snapshots.clone();
        let period = self.config.store_interval;
        let shutdown = self.shutdown.clone();
        *slot = Some(tokio::spawn(flush_loop(snapshots, period, shutdown)));
    }
}

#[async_trait]
impl Storage for MemStorage {
    async fn init(&self) -> Result<()> {
        let restored = if self.config.restore {
            self.restore().await
        } else {
            Ok(())
        };
        // the flusher starts even when the restore failed
        self.start_flusher().await;
        restored
    }

    async fn close(&self) {
        {
            let mut closed = self.closed.write().await;
            if *closed {
                return;
            }
            *closed = true;
        }

        self.shutdown.cancel();
        if let Some(handle) = self.flusher.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "snapshot flusher ended abnormally");
            }
        }

        match self.snapshots.save().await {
            Ok(()) => info!("final snapshot written"),
            Err(e) => error!(error = %e, "final snapshot failed"),
        }
    }

    async fn ping(&self) -> bool {
        true
    }

    async fn update_one(&self, metric: Metric) -> Result<Metric> {
        let mut updated = self.apply(std::slice::from_ref(&metric)).await?;
        Ok(updated.remove(0))
    }

    async fn update_batch(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>> {
        self.apply(&metrics).await
    }

    async fn get_one(&self, id: &str, kind: Kind) -> Result<Metric> {
        self.buffer
            .read(id, kind)
            .map(|value| Metric {
                id: id.to_string(),
                value,
                hash: None,
            })
            .ok_or_else(|| MetricsError::NotFound {
                id: id.to_string(),
                kind,
            })
    }

    async fn get_all(&self) -> Result<Vec<Metric>> {
        Ok(self.buffer.metrics())
    }
}

impl Drop for MemStorage {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

// ─── Snapshot file ───────────────────────────────────────────────

struct Snapshotter {
    buffer: Arc<MetricBuffer>,
    path: Option<PathBuf>,
    /// Serializes writers so an older snapshot never lands after a newer one.
    write_lock: Mutex<()>,
}

impl Snapshotter {
    /// Whole-file overwrite with the current buffer content. No-op without
    /// a configured path.
    async fn save(&self) -> Result<()> {
        if self.path.is_none() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;
        self.write().await
    }

    /// The file write itself. Callers hold `write_lock`.
    async fn write(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = self.buffer.to_json()?;
        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| MetricsError::persistence(path, e))?;
        debug!(path = %path.display(), bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    async fn load(&self) -> Result<BufferSnapshot> {
        let Some(path) = &self.path else {
            return Ok(BufferSnapshot::default());
        };
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| MetricsError::persistence(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| MetricsError::persistence(path, e.into()))
    }
}

async fn flush_loop(snapshots: Arc<Snapshotter>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = snapshots.save().await {
                    warn!(error = %e, "periodic snapshot failed, retrying next tick");
                }
            }
        }
    }
    debug!("snapshot flusher stopped");
}

//! Storage abstraction and its two backends.
//!
//! Callers hold an `Arc<dyn Storage>` built by [`open`]; a configured
//! database DSN selects [`SqlStorage`], otherwise [`MemStorage`] is used.
//! Both apply the same update rules: gauges are overwritten, counters
//! accumulate, and every update returns the metric as stored afterwards.

pub mod buffer;
pub mod memory;
pub mod sql;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::StorageConfig;
use crate::error::Result;
use crate::model::{Kind, Metric};

pub use buffer::{BufferSnapshot, MetricBuffer, UndoLog};
pub use memory::MemStorage;
pub use sql::SqlStorage;

#[async_trait]
pub trait Storage: Send + Sync {
    /// Prepares the backend: connect / create schema, or restore the
    /// snapshot and start the flush task.
    async fn init(&self) -> Result<()>;

    /// Final flush and teardown. Failures are logged, not returned.
    async fn close(&self);

    async fn ping(&self) -> bool;

    /// Applies one metric and returns its post-update state.
    async fn update_one(&self, metric: Metric) -> Result<Metric>;

    /// Applies metrics in input order and returns their post-update states
    /// in the same order.
    async fn update_batch(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>>;

    /// Fails with [`crate::MetricsError::NotFound`] for an unknown pair.
    async fn get_one(&self, id: &str, kind: Kind) -> Result<Metric>;

    /// Every stored metric, gauges first.
    async fn get_all(&self) -> Result<Vec<Metric>>;
}

/// Builds the backend selected by `config`. The caller still has to run
/// [`Storage::init`].
pub fn open(config: &StorageConfig) -> Result<Arc<dyn Storage>> {
    match config.database_dsn.as_deref() {
        Some(dsn) if !dsn.trim().is_empty() => {
            info!(backend = "sql", "selected relational storage");
            Ok(Arc::new(SqlStorage::new(dsn, config.operation_timeout)?))
        }
        _ => {
            info!(
                backend = "memory",
                file = ?config.store_file,
                interval_secs = config.store_interval.as_secs(),
                "selected in-memory storage"
            );
            Ok(Arc::new(MemStorage::new(config.clone())))
        }
    }
}

//! Push-based metrics pipeline.
//!
//! An agent samples gauges and counters and delivers them to a server that
//! keeps the latest gauge value and the running counter sum per metric,
//! persisted either to a JSON snapshot file or to a relational table.
//!
//! - [`model`]: metric kinds, canonical form, HMAC signing, wire payload
//! - [`storage`]: the [`Storage`] trait, in-memory and SQL backends
//! - [`client`]: batch and per-metric delivery over HTTP
//! - [`server`]: axum routes over a storage backend
//! - [`agent`]: poll/report scheduler

pub mod agent;
pub mod client;
pub mod config;
pub mod error;
pub mod model;
pub mod server;
pub mod storage;

pub use client::{MetricClient, Report};
pub use error::{MetricsError, Result};
pub use model::{HashKey, Kind, Metric, MetricPayload, MetricValue};
pub use storage::Storage;

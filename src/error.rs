use std::path::PathBuf;

use thiserror::Error;

use crate::model::Kind;

/// Every failure the storage engine, the delivery client or the HTTP
/// adapter can report.
#[derive(Debug, Error)]
pub enum MetricsError {
    // ── Validation (raised before any mutation) ─────────────────
    #[error("invalid metric type: {0:?}")]
    InvalidType(String),

    #[error("invalid metric value for {id:?}: {reason}")]
    InvalidValue { id: String, reason: String },

    #[error("invalid metric hash for {0:?}")]
    InvalidHash(String),

    // ── Lookup ──────────────────────────────────────────────────
    #[error("{kind} metric {id:?} not found")]
    NotFound { id: String, kind: Kind },

    // ── Backends ────────────────────────────────────────────────
    #[error("snapshot file {}: {source}", path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("connection error: {0}")]
    Connection(String),

    /// The database answered but refused the statement or returned
    /// something that does not decode.
    #[error("database error: {0}")]
    Database(String),

    #[error("batch rolled back: {0}")]
    Transaction(String),

    #[error("storage is closed")]
    Closed,

    // ── Delivery ────────────────────────────────────────────────
    #[error("server rejected request: {0}")]
    Transport(String),

    #[error("failed to encode metrics: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, MetricsError>;

impl MetricsError {
    pub(crate) fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persistence {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn invalid_value(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// True for the errors produced by metric validation.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidType(_) | Self::InvalidValue { .. } | Self::InvalidHash(_)
        )
    }
}

impl From<sqlx::Error> for MetricsError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;
        match err {
            E::Io(_)
            | E::Tls(_)
            | E::Protocol(_)
            | E::Configuration(_)
            | E::PoolTimedOut
            | E::PoolClosed
            | E::WorkerCrashed => Self::Connection(err.to_string()),
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for MetricsError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

//! Configuration for the server and the agent.
//!
//! The binaries parse [`ServerArgs`] / [`AgentArgs`] (flags with environment
//! fallbacks) and hand the resulting plain structs to the library, so every
//! component receives its settings through its constructor.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser};
use ipnet::IpNet;

use crate::error::{MetricsError, Result};
use crate::model::HashKey;

// ─── Library-facing config ───────────────────────────────────────

/// Settings for whichever storage backend the factory selects.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Snapshot period for the in-memory backend. Zero means every update
    /// is written through to the snapshot file before returning.
    pub store_interval: Duration,
    /// Snapshot file. `None` disables file persistence.
    pub store_file: Option<PathBuf>,
    /// Load the snapshot file on `init`.
    pub restore: bool,
    /// Non-empty connection string selects the relational backend.
    pub database_dsn: Option<String>,
    /// Deadline for each relational operation (connect, ping, query).
    pub operation_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            store_interval: Duration::from_secs(300),
            store_file: None,
            restore: false,
            database_dsn: None,
            operation_timeout: Duration::from_secs(5),
        }
    }
}

/// Settings for [`crate::client::MetricClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server address, with or without the `http://` scheme.
    pub address: String,
    /// Worker count for per-metric delivery.
    pub rate_limit: usize,
    /// Deadline for every request.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".into(),
            rate_limit: 10,
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub client: ClientConfig,
    pub poll_interval: Duration,
    pub report_interval: Duration,
    pub hash_key: HashKey,
    /// Send one compressed batch per report instead of one request per metric.
    pub batch: bool,
}

// ─── CLI: server ─────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "metrics-server", about = "Metrics collection server", version)]
pub struct ServerArgs {
    /// Listen address.
    #[arg(short = 'a', long, default_value = "127.0.0.1:8080", env = "ADDRESS")]
    pub address: String,

    /// Snapshot interval in seconds (0 = write-through).
    #[arg(short = 'i', long, default_value_t = 300, env = "STORE_INTERVAL")]
    pub store_interval: u64,

    /// Snapshot file (empty disables file persistence).
    #[arg(short = 'f', long, default_value = "/tmp/metrics-db.json", env = "STORE_FILE")]
    pub store_file: String,

    /// Restore the snapshot file on start.
    #[arg(short = 'r', long, default_value_t = true, action = ArgAction::Set, env = "RESTORE")]
    pub restore: bool,

    /// Database connection string; selects the relational backend when set.
    #[arg(short = 'd', long, env = "DATABASE_DSN")]
    pub database_dsn: Option<String>,

    /// Database operation timeout in seconds.
    #[arg(long, default_value_t = 5, env = "DATABASE_TIMEOUT")]
    pub database_timeout: u64,

    /// Shared hash key (empty disables hashing).
    #[arg(short = 'k', long, default_value = "", env = "KEY", hide_env_values = true)]
    pub key: String,

    /// Only accept requests from this CIDR network (empty accepts all).
    #[arg(short = 't', long, default_value = "", env = "TRUSTED_SUBNET")]
    pub trusted_subnet: String,
}

impl ServerArgs {
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            store_interval: Duration::from_secs(self.store_interval),
            store_file: non_empty(&self.store_file).map(PathBuf::from),
            restore: self.restore,
            database_dsn: self.database_dsn.as_deref().and_then(non_empty).map(String::from),
            operation_timeout: Duration::from_secs(self.database_timeout),
        }
    }

    pub fn hash_key(&self) -> HashKey {
        HashKey::new(&self.key)
    }

    pub fn trusted_subnet(&self) -> Result<Option<IpNet>> {
        non_empty(&self.trusted_subnet)
            .map(|s| {
                s.parse::<IpNet>()
                    .map_err(|e| MetricsError::Config(format!("trusted subnet {s:?}: {e}")))
            })
            .transpose()
    }
}

// ─── CLI: agent ──────────────────────────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "metrics-agent", about = "Metrics collection agent", version)]
pub struct AgentArgs {
    /// Server address.
    #[arg(short = 'a', long, default_value = "127.0.0.1:8080", env = "ADDRESS")]
    pub address: String,

    /// Report interval in seconds.
    #[arg(short = 'r', long, default_value_t = 10, env = "REPORT_INTERVAL")]
    pub report_interval: u64,

    /// Poll interval in seconds.
    #[arg(short = 'p', long, default_value_t = 2, env = "POLL_INTERVAL")]
    pub poll_interval: u64,

    /// Shared hash key (empty disables hashing).
    #[arg(short = 'k', long, default_value = "", env = "KEY", hide_env_values = true)]
    pub key: String,

    /// Concurrent requests in per-metric mode.
    #[arg(short = 'l', long, default_value_t = 10, env = "RATE_LIMIT")]
    pub rate_limit: usize,

    /// Request timeout in seconds.
    #[arg(long, default_value_t = 5, env = "REQUEST_TIMEOUT")]
    pub timeout: u64,

    /// Deliver each report as one batch request.
    #[arg(long, default_value_t = true, action = ArgAction::Set, env = "BATCH")]
    pub batch: bool,
}

impl AgentArgs {
    pub fn agent_config(&self) -> AgentConfig {
        AgentConfig {
            client: ClientConfig {
                address: self.address.clone(),
                rate_limit: self.rate_limit,
                timeout: Duration::from_secs(self.timeout),
            },
            poll_interval: Duration::from_secs(self.poll_interval.max(1)),
            report_interval: Duration::from_secs(self.report_interval.max(1)),
            hash_key: HashKey::new(&self.key),
            batch: self.batch,
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    let s = s.trim();
    (!s.is_empty()).then_some(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_defaults() {
        let args = ServerArgs::try_parse_from(["metrics-server"]).unwrap();
        let cfg = args.storage_config();
        assert_eq!(cfg.store_interval, Duration::from_secs(300));
        assert_eq!(cfg.store_file, Some(PathBuf::from("/tmp/metrics-db.json")));
        assert!(cfg.restore);
        assert!(cfg.database_dsn.is_none());
        assert!(!args.hash_key().is_enabled());
    }

    #[test]
    fn server_flags() {
        let args = ServerArgs::try_parse_from([
            "metrics-server",
            "-i",
            "0",
            "-f",
            "",
            "-r",
            "false",
            "-d",
            "postgres://localhost/metrics",
            "-k",
            "secret",
        ])
        .unwrap();
        let cfg = args.storage_config();
        assert_eq!(cfg.store_interval, Duration::ZERO);
        assert_eq!(cfg.store_file, None);
        assert!(!cfg.restore);
        assert_eq!(cfg.database_dsn.as_deref(), Some("postgres://localhost/metrics"));
        assert!(args.hash_key().is_enabled());
    }

    #[test]
    fn blank_dsn_keeps_memory_backend() {
        let args = ServerArgs::try_parse_from(["metrics-server", "-d", "  "]).unwrap();
        assert!(args.storage_config().database_dsn.is_none());
    }

    #[test]
    fn trusted_subnet_is_parsed_as_cidr() {
        let parse = |v: &str| ServerArgs::try_parse_from(["metrics-server", "-t", v]).unwrap();

        let unset = ServerArgs::try_parse_from(["metrics-server"]).unwrap();
        assert_eq!(unset.trusted_subnet().unwrap(), None);
        let net = parse("192.168.0.0/24").trusted_subnet().unwrap().unwrap();
        assert!(net.contains(&"192.168.0.17".parse::<std::net::IpAddr>().unwrap()));
        assert!(parse("fd00::/8").trusted_subnet().unwrap().is_some());

        for bad in ["192.168.0.1", "10.0.0.0/33", "not-a-net"] {
            assert!(matches!(parse(bad).trusted_subnet(), Err(MetricsError::Config(_))), "{bad}");
        }
    }

    #[test]
    fn agent_flags() {
        let args = AgentArgs::try_parse_from([
            "metrics-agent",
            "-a",
            "localhost:9000",
            "-r",
            "0",
            "-l",
            "3",
            "--batch",
            "false",
        ])
        .unwrap();
        let cfg = args.agent_config();
        assert_eq!(cfg.client.address, "localhost:9000");
        assert_eq!(cfg.client.rate_limit, 3);
        // zero-length intervals would spin the scheduler
        assert_eq!(cfg.report_interval, Duration::from_secs(1));
        assert_eq!(cfg.poll_interval, Duration::from_secs(2));
        assert!(!cfg.batch);
    }
}

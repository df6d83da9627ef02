//! Relational backend.
//!
//! Every update is a single `INSERT .. ON CONFLICT (name, type) DO UPDATE ..
//! RETURNING ..` statement, so the database resolves concurrent writers:
//! gauges take the incoming value and counters add it to the stored total in
//! one SQL expression. Batches run inside one transaction.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::{Any, AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Executor, Row};
use tracing::{debug, info, instrument, warn};

use super::Storage;
use crate::error::{MetricsError, Result};
use crate::model::{Kind, Metric, MetricValue};

const MAX_CONNECTIONS: u32 = 5;

const UPSERT_GAUGE: &str = r#"
    INSERT INTO metric (name, type, gauge_value)
    VALUES ($1, 'gauge', $2)
    ON CONFLICT (name, type) DO UPDATE SET gauge_value = excluded.gauge_value
    RETURNING name, type, gauge_value, counter_value
"#;

const UPSERT_COUNTER: &str = r#"
    INSERT INTO metric (name, type, counter_value)
    VALUES ($1, 'counter', $2)
    ON CONFLICT (name, type) DO UPDATE SET counter_value = metric.counter_value + excluded.counter_value
    RETURNING name, type, gauge_value, counter_value
"#;

const SELECT_ONE: &str =
    "SELECT name, type, gauge_value, counter_value FROM metric WHERE name = $1 AND type = $2";

// 'gauge' sorts after 'counter', so DESC lists gauges first
const SELECT_ALL: &str =
    "SELECT name, type, gauge_value, counter_value FROM metric ORDER BY type DESC, name";

/// SQL flavour, derived from the DSN scheme. Only the surrogate key DDL
/// differs; the upserts are shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    fn from_dsn(dsn: &str) -> Self {
        if dsn.starts_with("sqlite:") {
            Self::Sqlite
        } else {
            Self::Postgres
        }
    }

    fn create_table(self) -> String {
        let id = match self {
            Self::Postgres => "id SERIAL PRIMARY KEY",
            Self::Sqlite => "id INTEGER PRIMARY KEY AUTOINCREMENT",
        };
        format!(
            "CREATE TABLE IF NOT EXISTS metric (
                {id},
                name VARCHAR(255) NOT NULL,
                type VARCHAR(15) NOT NULL,
                gauge_value DOUBLE PRECISION,
                counter_value BIGINT,
                UNIQUE (name, type)
            )"
        )
    }
}

pub struct SqlStorage {
    pool: AnyPool,
    dialect: Dialect,
    timeout: Duration,
}

impl SqlStorage {
    /// Creates a lazily connecting pool; no I/O happens until [`Storage::init`]
    /// or the first query. `timeout` bounds every operation (zero = none).
    pub fn new(dsn: &str, timeout: Duration) -> Result<Self> {
        sqlx::any::install_default_drivers();

        let mut options = AnyPoolOptions::new().max_connections(MAX_CONNECTIONS);
        if !timeout.is_zero() {
            options = options.acquire_timeout(timeout);
        }
        let pool = options.connect_lazy(dsn)?;

        Ok(Self {
            pool,
            dialect: Dialect::from_dsn(dsn),
            timeout,
        })
    }

    /// Underlying pool, for maintenance and tests.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn deadline<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.timeout.is_zero() {
            return fut.await;
        }
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(res) => res,
            Err(_) => Err(MetricsError::Connection(format!(
                "{op} timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[async_trait]
impl Storage for SqlStorage {
    #[instrument(skip(self), fields(dialect = ?self.dialect))]
    async fn init(&self) -> Result<()> {
        let ddl = self.dialect.create_table();
        self.deadline("schema setup", async {
            sqlx::query(&ddl).execute(&self.pool).await?;
            Ok::<_, MetricsError>(())
        })
        .await?;
        info!("metric table ready");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("database pool closed");
    }

    async fn ping(&self) -> bool {
        let res = self
            .deadline("ping", async {
                sqlx::query("SELECT 1").execute(&self.pool).await?;
                Ok::<_, MetricsError>(())
            })
            .await;
        if let Err(e) = &res {
            warn!(error = %e, "database ping failed");
        }
        res.is_ok()
    }

    async fn update_one(&self, metric: Metric) -> Result<Metric> {
        self.deadline("update", upsert(&self.pool, &metric)).await
    }

    #[instrument(skip_all, fields(count = metrics.len()))]
    async fn update_batch(&self, metrics: Vec<Metric>) -> Result<Vec<Metric>> {
        if metrics.is_empty() {
            return Ok(Vec::new());
        }

        self.deadline("batch update", async {
            // dropping `tx` on timeout rolls it back as well
            let mut tx = self.pool.begin().await?;
            let mut updated = Vec::with_capacity(metrics.len());

            for (i, metric) in metrics.iter().enumerate() {
                match upsert(&mut *tx, metric).await {
                    Ok(m) => updated.push(m),
                    Err(e) => {
                        if let Err(rb) = tx.rollback().await {
                            warn!(error = %rb, "rollback failed");
                        }
                        return Err(MetricsError::Transaction(format!(
                            "metric #{i} ({metric}): {e}"
                        )));
                    }
                }
            }

            tx.commit()
                .await
                .map_err(|e| MetricsError::Transaction(format!("commit: {e}")))?;
            debug!("batch committed");
            Ok::<_, MetricsError>(updated)
        })
        .await
    }

    async fn get_one(&self, id: &str, kind: Kind) -> Result<Metric> {
        let row = self
            .deadline("select", async {
                Ok::<_, MetricsError>(sqlx::query(SELECT_ONE)
                    .bind(id)
                    .bind(kind.as_str())
                    .fetch_optional(&self.pool)
                    .await?)
            })
            .await?;

        match row {
            Some(row) => row_to_metric(&row),
            None => Err(MetricsError::NotFound {
                id: id.to_string(),
                kind,
            }),
        }
    }

    async fn get_all(&self) -> Result<Vec<Metric>> {
        let rows = self
            .deadline("select all", async {
                Ok::<_, MetricsError>(sqlx::query(SELECT_ALL).fetch_all(&self.pool).await?)
            })
            .await?;
        rows.iter().map(row_to_metric).collect()
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

async fn upsert<'e, E>(executor: E, metric: &Metric) -> Result<Metric>
where
    E: Executor<'e, Database = Any>,
{
    let query = match metric.value {
        MetricValue::Gauge(v) => sqlx::query(UPSERT_GAUGE).bind(metric.id.clone()).bind(v),
        MetricValue::Counter(d) => sqlx::query(UPSERT_COUNTER).bind(metric.id.clone()).bind(d),
    };
    let row = query.fetch_one(executor).await?;
    row_to_metric(&row)
}

fn row_to_metric(row: &AnyRow) -> Result<Metric> {
    let id: String = row.try_get("name")?;
    let kind: Kind = row.try_get::<String, _>("type")?.parse()?;

    match kind {
        Kind::Gauge => {
            let value: Option<f64> = row.try_get("gauge_value")?;
            value
                .map(|v| Metric::gauge(id.as_str(), v))
                .ok_or_else(|| MetricsError::invalid_value(id.as_str(), "stored gauge has no value"))
        }
        Kind::Counter => {
            let delta: Option<i64> = row.try_get("counter_value")?;
            delta
                .map(|d| Metric::counter(id.as_str(), d))
                .ok_or_else(|| MetricsError::invalid_value(id.as_str(), "stored counter has no value"))
        }
    }
}

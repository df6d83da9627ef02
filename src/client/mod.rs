//! HTTP delivery of reports to the metrics server.
//!
//! Two modes:
//! - [`MetricClient::send_batch`]: the whole report as one gzip-compressed
//!   JSON array posted to `updates/`.
//! - [`MetricClient::send_each`]: one JSON request per metric to `update/`,
//!   fanned out over `rate_limit` workers (see [`pool`]).
//!
//! Neither mode retries. A failed report is the caller's to drop or resend.

pub mod pool;
pub mod report;

use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::StatusCode;
use tracing::debug;

use crate::config::ClientConfig;
use crate::error::{MetricsError, Result};
use crate::model::MetricPayload;

pub use report::Report;

#[derive(Debug, Clone)]
pub struct MetricClient {
    http: reqwest::Client,
    base: String,
    rate_limit: usize,
}

impl MetricClient {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        // zero disables the deadline
        if !config.timeout.is_zero() {
            builder = builder.timeout(config.timeout);
        }
        let http = builder
            .build()
            .map_err(|e| MetricsError::Config(format!("http client: {e}")))?;

        Ok(Self {
            http,
            base: base_url(&config.address)?,
            rate_limit: config.rate_limit.max(1),
        })
    }

    /// Base URL every route is joined onto, always with a trailing slash.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Posts the report as one compressed batch and returns the metrics as
    /// the server stored them.
    pub async fn send_batch(&self, report: &Report) -> Result<Vec<MetricPayload>> {
        if report.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::to_vec(&report.payloads())?;
        let body = gzip(&body).map_err(|e| MetricsError::Transport(format!("gzip: {e}")))?;

        let resp = self
            .http
            .post(self.url("updates/"))
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, "gzip")
            .body(body)
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let stored: Vec<MetricPayload> = resp.json().await?;
        debug!(sent = report.len(), "batch delivered");
        Ok(stored)
    }

    /// Posts every metric separately with at most `rate_limit` requests in
    /// flight. Stops at the first failure.
    pub async fn send_each(&self, report: &Report) -> Result<()> {
        let client = self.clone();
        pool::deliver(report.payloads(), self.rate_limit, move |payload| {
            let client = client.clone();
            async move { client.send_one(&payload).await.map(|_| ()) }
        })
        .await?;

        debug!(sent = report.len(), workers = self.rate_limit, "report delivered per metric");
        Ok(())
    }

    /// Posts a single metric to the JSON update route.
    pub async fn send_one(&self, payload: &MetricPayload) -> Result<MetricPayload> {
        let resp = self.http.post(self.url("update/")).json(payload).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path.trim_start_matches('/'))
    }
}

// ─── Helpers ─────────────────────────────────────────────────────

fn base_url(address: &str) -> Result<String> {
    let address = address.trim();
    if address.is_empty() {
        return Err(MetricsError::Config("server address is empty".into()));
    }

    let mut base = if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{address}")
    };
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(base)
}

fn gzip(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status == StatusCode::OK {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(MetricsError::Transport(format!("{status}: {}", body.trim())))
}

//! Metric data model: the two metric kinds, their canonical form and the
//! JSON wire payload exchanged between the agent and the server.

pub mod hash;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MetricsError, Result};

pub use hash::HashKey;

// ─── Kind ────────────────────────────────────────────────────────

/// Time-series kind. Part of a metric's identity: `("x", Gauge)` and
/// `("x", Counter)` are two different metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Gauge,
    Counter,
}

impl Kind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Kind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "gauge" => Ok(Self::Gauge),
            "counter" => Ok(Self::Counter),
            other => Err(MetricsError::InvalidType(other.to_string())),
        }
    }
}

// ─── Metric ──────────────────────────────────────────────────────

/// The payload of a metric. For counters the integer is a delta on the way
/// in and the running total on the way out.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MetricValue {
    Gauge(f64),
    Counter(i64),
}

impl MetricValue {
    pub fn kind(self) -> Kind {
        match self {
            Self::Gauge(_) => Kind::Gauge,
            Self::Counter(_) => Kind::Counter,
        }
    }
}

impl fmt::Display for MetricValue {
    /// Short human form used by the plain-text value endpoint.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gauge(v) => write!(f, "{v}"),
            Self::Counter(d) => write!(f, "{d}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub id: String,
    pub value: MetricValue,
    /// Keyed digest of the canonical form. Never part of identity.
    pub hash: Option<String>,
}

impl Metric {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Gauge(value),
            hash: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            value: MetricValue::Counter(delta),
            hash: None,
        }
    }

    /// Builds a metric from the three path segments of the plain-text
    /// update route.
    pub fn parse(kind: &str, id: &str, raw: &str) -> Result<Self> {
        match kind.parse::<Kind>()? {
            Kind::Gauge => {
                let value: f64 = raw
                    .parse()
                    .map_err(|_| MetricsError::invalid_value(id, format!("{raw:?} is not a float")))?;
                check_finite(id, value)?;
                Ok(Self::gauge(id, value))
            }
            Kind::Counter => {
                let delta: i64 = raw
                    .parse()
                    .map_err(|_| MetricsError::invalid_value(id, format!("{raw:?} is not an integer")))?;
                Ok(Self::counter(id, delta))
            }
        }
    }

    pub fn kind(&self) -> Kind {
        self.value.kind()
    }

    /// Returns the metric with `hash` set from `key` (cleared when hashing
    /// is disabled).
    pub fn signed(mut self, key: &HashKey) -> Self {
        self.hash = key.sign(&self);
        self
    }
}

impl fmt::Display for Metric {
    /// Canonical representation: the hash input and the log form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            MetricValue::Gauge(v) => write!(f, "{}:gauge:{:.6}", self.id, v),
            MetricValue::Counter(d) => write!(f, "{}:counter:{}", self.id, d),
        }
    }
}

fn check_finite(id: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(MetricsError::invalid_value(id, "gauge value must be finite"))
    }
}

// ─── Wire payload ────────────────────────────────────────────────

/// JSON shape of a metric on the wire:
/// `{"id", "type", "value"?, "delta"?, "hash"?}`.
///
/// `kind` stays a plain string so an unknown type surfaces as
/// [`MetricsError::InvalidType`] rather than a generic decode error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

impl MetricPayload {
    /// Checks type, then value, then hash, and yields the domain metric.
    pub fn validate(self, key: &HashKey) -> Result<Metric> {
        let kind: Kind = self.kind.parse()?;
        let value = match kind {
            Kind::Gauge => {
                let v = self
                    .value
                    .ok_or_else(|| MetricsError::invalid_value(&self.id, "gauge without value"))?;
                check_finite(&self.id, v)?;
                MetricValue::Gauge(v)
            }
            Kind::Counter => MetricValue::Counter(
                self.delta
                    .ok_or_else(|| MetricsError::invalid_value(&self.id, "counter without delta"))?,
            ),
        };

        let metric = Metric {
            id: self.id,
            value,
            hash: self.hash,
        };
        if !key.verify(&metric) {
            return Err(MetricsError::InvalidHash(metric.id));
        }
        Ok(metric)
    }
}

impl From<&Metric> for MetricPayload {
    fn from(m: &Metric) -> Self {
        let (delta, value) = match m.value {
            MetricValue::Gauge(v) => (None, Some(v)),
            MetricValue::Counter(d) => (Some(d), None),
        };
        Self {
            id: m.id.clone(),
            kind: m.kind().as_str().to_string(),
            delta,
            value,
            hash: m.hash.clone(),
        }
    }
}

impl From<Metric> for MetricPayload {
    fn from(m: Metric) -> Self {
        Self::from(&m)
    }
}

/// Body of the JSON read route: identifies a metric without a value.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MetricQuery {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

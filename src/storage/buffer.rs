use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Kind, Metric, MetricValue};

// ─── Public types ────────────────────────────────────────────────

/// Authoritative in-memory values, one map per kind.
///
/// Writers take the exclusive lock; readers, snapshots and the snapshot
/// flusher take the shared one.
#[derive(Debug, Default)]
pub struct MetricBuffer {
    inner: RwLock<BufferSnapshot>,
}

/// Point-in-time copy of a buffer. Its serde form is the snapshot file
/// format, so saving and restoring go through the same type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BufferSnapshot {
    #[serde(rename = "GaugeMetrics", default)]
    pub gauges: HashMap<String, f64>,
    #[serde(rename = "CounterMetrics", default)]
    pub counters: HashMap<String, i64>,
}

/// Values a batch overwrote, as recorded by [`MetricBuffer::apply_logged`].
#[derive(Debug, Default)]
pub struct UndoLog {
    prior: Vec<Prior>,
}

#[derive(Debug)]
enum Prior {
    Gauge(String, Option<f64>),
    Counter(String, Option<i64>),
}

// ─── MetricBuffer impl ───────────────────────────────────────────

impl MetricBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrites the gauge and returns the stored value.
    pub fn apply_gauge(&self, id: &str, value: f64) -> f64 {
        self.inner.write().apply_gauge(id, value)
    }

    /// Adds `delta` to the counter and returns the new total. The read and
    /// the write happen under one exclusive lock acquisition.
    pub fn apply_counter(&self, id: &str, delta: i64) -> i64 {
        self.inner.write().apply_counter(id, delta)
    }

    /// Applies a metric's update rule and returns the post-update metric
    /// (without a hash).
    pub fn apply(&self, metric: &Metric) -> Metric {
        self.inner.write().apply(metric)
    }

    /// Applies every metric in order under a single exclusive lock.
    pub fn apply_all(&self, metrics: &[Metric]) -> Vec<Metric> {
        let mut inner = self.inner.write();
        metrics.iter().map(|m| inner.apply(m)).collect()
    }

    /// Like [`apply_all`](Self::apply_all), and also returns what the touched
    /// entries held before, so the batch can be taken back with
    /// [`undo`](Self::undo).
    pub fn apply_logged(&self, metrics: &[Metric]) -> (Vec<Metric>, UndoLog) {
        let mut inner = self.inner.write();
        let mut log = UndoLog::default();
        let updated = metrics
            .iter()
            .map(|m| {
                log.prior.push(inner.prior(m));
                inner.apply(m)
            })
            .collect();
        (updated, log)
    }

    /// Puts every entry in `log` back to its recorded value, newest first.
    /// Only exact when no other writer touched those entries in between.
    pub fn undo(&self, log: UndoLog) {
        let mut inner = self.inner.write();
        for prior in log.prior.into_iter().rev() {
            match prior {
                Prior::Gauge(id, Some(v)) => {
                    inner.gauges.insert(id, v);
                }
                Prior::Gauge(id, None) => {
                    inner.gauges.remove(&id);
                }
                Prior::Counter(id, Some(d)) => {
                    inner.counters.insert(id, d);
                }
                Prior::Counter(id, None) => {
                    inner.counters.remove(&id);
                }
            }
        }
    }

    pub fn read(&self, id: &str, kind: Kind) -> Option<MetricValue> {
        let inner = self.inner.read();
        match kind {
            Kind::Gauge => inner.gauges.get(id).copied().map(MetricValue::Gauge),
            Kind::Counter => inner.counters.get(id).copied().map(MetricValue::Counter),
        }
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        self.inner.read().clone()
    }

    /// Replaces the whole content with `snapshot`.
    pub fn restore(&self, snapshot: BufferSnapshot) {
        *self.inner.write() = snapshot;
    }

    /// Serializes the buffer into the snapshot file format while holding
    /// the shared lock, without cloning the maps.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        let inner = self.inner.read();
        Ok(serde_json::to_vec(&*inner)?)
    }

    /// All metrics, gauges first then counters. Order within a kind is
    /// unspecified.
    pub fn metrics(&self) -> Vec<Metric> {
        let inner = self.inner.read();
        let mut out = Vec::with_capacity(inner.gauges.len() + inner.counters.len());
        out.extend(inner.gauges.iter().map(|(id, v)| Metric::gauge(id.clone(), *v)));
        out.extend(inner.counters.iter().map(|(id, d)| Metric::counter(id.clone(), *d)));
        out
    }

    pub fn len(&self) -> usize {
        let inner = self.inner.read();
        inner.gauges.len() + inner.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ─── Inner impl ──────────────────────────────────────────────────

impl BufferSnapshot {
    fn apply_gauge(&mut self, id: &str, value: f64) -> f64 {
        self.gauges.insert(id.to_string(), value);
        value
    }

    fn apply_counter(&mut self, id: &str, delta: i64) -> i64 {
        let total = self.counters.entry(id.to_string()).or_insert(0);
        *total = total.saturating_add(delta);
        *total
    }

    fn prior(&self, metric: &Metric) -> Prior {
        let id = metric.id.clone();
        match metric.kind() {
            Kind::Gauge => Prior::Gauge(id, self.gauges.get(&metric.id).copied()),
            Kind::Counter => Prior::Counter(id, self.counters.get(&metric.id).copied()),
        }
    }

    fn apply(&mut self, metric: &Metric) -> Metric {
        let value = match metric.value {
            MetricValue::Gauge(v) => MetricValue::Gauge(self.apply_gauge(&metric.id, v)),
            MetricValue::Counter(d) => MetricValue::Counter(self.apply_counter(&metric.id, d)),
        };
        Metric {
            id: metric.id.clone(),
            value,
            hash: None,
        }
    }
}

use crate::model::{HashKey, Metric, MetricPayload};

/// One reporting interval's worth of metrics, in send order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Report {
    metrics: Vec<Metric>,
}

impl Report {
    pub fn new(metrics: Vec<Metric>) -> Self {
        Self { metrics }
    }

    /// Attaches a hash to every metric (or clears it when `key` is disabled).
    pub fn sign(mut self, key: &HashKey) -> Self {
        for m in &mut self.metrics {
            m.hash = key.sign(m);
        }
        self
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn payloads(&self) -> Vec<MetricPayload> {
        self.metrics.iter().map(MetricPayload::from).collect()
    }
}

impl FromIterator<Metric> for Report {
    fn from_iter<I: IntoIterator<Item = Metric>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

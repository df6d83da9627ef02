use parking_lot::RwLock;
use rand::Rng;

use crate::client::Report;
use crate::model::{HashKey, Metric};

pub const POLL_COUNT: &str = "PollCount";
pub const RANDOM_VALUE: &str = "RandomValue";

/// Values sampled between two reports.
#[derive(Debug, Default)]
pub struct Statistic {
    inner: RwLock<Sample>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Sample {
    poll_count: i64,
    random_value: f64,
}

impl Statistic {
    pub fn new() -> Self {
        Self::default()
    }

    /// One poll tick.
    pub fn collect(&self) {
        let random_value = rand::thread_rng().gen::<f64>();
        let mut s = self.inner.write();
        s.poll_count = s.poll_count.saturating_add(1);
        s.random_value = random_value;
    }

    pub fn poll_count(&self) -> i64 {
        self.inner.read().poll_count
    }

    /// Current values as a signed report. `PollCount` carries the number of
    /// polls not yet confirmed by the server.
    pub fn report(&self, key: &HashKey) -> Report {
        let s = *self.inner.read();
        Report::new(vec![
            Metric::counter(POLL_COUNT, s.poll_count),
            Metric::gauge(RANDOM_VALUE, s.random_value),
        ])
        .sign(key)
    }

    /// Forgets `delivered` polls after the server accepted them. Polls that
    /// happened while the report was in flight are kept.
    pub fn consume(&self, delivered: i64) {
        let mut s = self.inner.write();
        s.poll_count = (s.poll_count - delivered).max(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MetricValue;

    #[test]
    fn collect_counts_polls_and_samples_unit_interval() {
        let stat = Statistic::new();
        for _ in 0..5 {
            stat.collect();
        }
        assert_eq!(stat.poll_count(), 5);

        let report = stat.report(&HashKey::disabled());
        assert_eq!(report.metrics()[0], Metric::counter(POLL_COUNT, 5));
        match report.metrics()[1].value {
            MetricValue::Gauge(v) => assert!((0.0..1.0).contains(&v)),
            other => panic!("unexpected value {other:?}"),
        }
    }

    #[test]
    fn consume_keeps_polls_made_during_delivery() {
        let stat = Statistic::new();
        stat.collect();
        stat.collect();
        let sent = stat.poll_count();

        stat.collect(); // arrives while the report is in flight
        stat.consume(sent);
        assert_eq!(stat.poll_count(), 1);

        stat.consume(10);
        assert_eq!(stat.poll_count(), 0);
    }

    #[test]
    fn report_is_signed() {
        let key = HashKey::new("agent-key");
        let stat = Statistic::new();
        stat.collect();
        let report = stat.report(&key);
        assert!(report.metrics().iter().all(|m| m.hash.is_some() && key.verify(m)));
    }
}

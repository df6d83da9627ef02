//! Poll/report scheduler.
//!
//! Poll ticks update the [`Statistic`]; report ticks snapshot it into a
//! signed [`crate::client::Report`] and hand it to the [`MetricClient`].
//! A failed report is dropped and the unconfirmed polls roll into the next
//! one. Cancelling the shutdown token sends one last report.

pub mod statistic;

use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::wrappers::IntervalStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::MetricClient;
use crate::config::AgentConfig;
use crate::error::Result;
use crate::model::{HashKey, MetricValue};

pub use statistic::Statistic;

#[derive(Debug, Clone, Copy)]
enum Tick {
    Poll,
    Report,
}

pub struct Agent {
    client: MetricClient,
    statistic: Statistic,
    config: AgentConfig,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self> {
        Ok(Self {
            client: MetricClient::new(&config.client)?,
            statistic: Statistic::new(),
            config,
        })
    }

    pub fn statistic(&self) -> &Statistic {
        &self.statistic
    }

    fn hash_key(&self) -> &HashKey {
        &self.config.hash_key
    }

    /// Sends the current statistic once. On success the reported polls are
    /// subtracted from the pending count.
    pub async fn report(&self) -> Result<()> {
        let report = self.statistic.report(self.hash_key());
        let polls = report
            .metrics()
            .iter()
            .find_map(|m| match m.value {
                MetricValue::Counter(d) if m.id == statistic::POLL_COUNT => Some(d),
                _ => None,
            })
            .unwrap_or(0);

        if self.config.batch {
            self.client.send_batch(&report).await?;
        } else {
            self.client.send_each(&report).await?;
        }

        self.statistic.consume(polls);
        debug!(polls, metrics = report.len(), "report accepted");
        Ok(())
    }

    /// Runs until `shutdown` is cancelled, then sends a final report.
    pub async fn run(&self, shutdown: CancellationToken) {
        let poll_every = self.config.poll_interval;
        let report_every = self.config.report_interval;
        info!(
            server = self.client.base(),
            poll_ms = poll_every.as_millis() as u64,
            report_ms = report_every.as_millis() as u64,
            batch = self.config.batch,
            "agent started"
        );

        let now = Instant::now();
        let mut poll = interval_at(now + poll_every, poll_every);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut report = interval_at(now + report_every, report_every);
        report.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut ticks = IntervalStream::new(poll)
            .map(|_| Tick::Poll)
            .merge(IntervalStream::new(report).map(|_| Tick::Report));

        loop {
            let tick = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                tick = ticks.next() => tick,
            };
            match tick {
                Some(Tick::Poll) => self.statistic.collect(),
                Some(Tick::Report) => {
                    if let Err(e) = self.report().await {
                        warn!(error = %e, pending = self.statistic.poll_count(), "report failed");
                    }
                }
                None => break,
            }
        }

        match self.report().await {
            Ok(()) => info!("final report delivered"),
            Err(e) => warn!(error = %e, "final report failed"),
        }
    }
}

/// Builds an [`Agent`] from `config` and runs it until `shutdown`.
pub async fn run(config: AgentConfig, shutdown: CancellationToken) -> Result<()> {
    let agent = Agent::new(config)?;
    agent.run(shutdown).await;
    Ok(())
}

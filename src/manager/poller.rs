//! Per-source polling task

use super::event::{Message, MetricEvent, RefreshError};
use crate::sources::{Reader, ReaderError, Source};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shortest interval a poller will tick at
const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Producer side of the three event streams
#[derive(Clone)]
pub(crate) struct Outputs {
    pub metrics: mpsc::Sender<MetricEvent>,
    pub messages: mpsc::Sender<Message>,
    pub errors: mpsc::Sender<RefreshError>,
}

/// How one refresh cycle ended
#[derive(Debug, Clone, Copy, PartialEq)]
enum Cycle {
    Published,
    Failed,
    /// Cancellation arrived while metrics were being published
    Cancelled,
}

/// Drives one source on its own ticker until cancelled
///
/// The poller owns its source outright, so nothing else ever reads or
/// writes it while the poller runs. It never closes the output streams;
/// dropping its sender clones on exit is all it does to them.
pub(crate) struct Poller<R> {
    reader: Arc<R>,
    source: Source,
    outputs: Outputs,
    cancel: CancellationToken,
    cycle: u64,
    /// Timestamp of the last published cycle
    last_stamp: DateTime<Utc>,
}

impl<R: Reader + Sync> Poller<R> {
    pub fn new(reader: Arc<R>, source: Source, outputs: Outputs, cancel: CancellationToken) -> Self {
        Self {
            reader,
            source,
            outputs,
            cancel,
            cycle: 0,
            last_stamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub async fn run(mut self) {
        let name = self.source.name().to_string();
        let period = self.source.interval().max(MIN_INTERVAL);

        self.message(format!("Starting poller for {}", name)).await;
        info!(source = %name, interval_secs = period.as_secs(), "Poller started");

        // the immediate refresh stands in for the first tick
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        if self.poll_once().await != Cycle::Cancelled {
            loop {
                tokio::select! {
                    biased;

                    _ = self.cancel.cancelled() => break,

                    _ = ticker.tick() => {
                        self.cycle += 1;
                        if self.poll_once().await == Cycle::Cancelled {
                            break;
                        }
                    }
                }
            }
        }

        self.message(format!("Stopping poller for {}", name)).await;
        info!(source = %name, cycles = self.cycle, "Poller stopped");
    }

    /// Refresh the source and publish what it holds
    async fn poll_once(&mut self) -> Cycle {
        if let Err(error) = self.reader.refresh(&mut self.source).await {
            self.report(error).await;
            return Cycle::Failed;
        }

        if self.cycle > 0 {
            self.message(format!(
                "Updated {} ({} series)",
                self.source.name(),
                self.source.series_count()
            ))
            .await;
        }

        let timestamp = not_before(self.last_stamp, Utc::now());
        self.last_stamp = timestamp;
        for series in self.source.series_by_index() {
            let event = MetricEvent {
                source: self.source.name().to_string(),
                series: series.name.clone(),
                value: series.last_value,
                timestamp,
            };

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    debug!(
                        source = self.source.name(),
                        cycle = self.cycle,
                        "Cancelled while publishing, dropping rest of cycle"
                    );
                    return Cycle::Cancelled;
                }

                sent = self.outputs.metrics.send(event) => {
                    if sent.is_err() {
                        debug!(source = self.source.name(), "Metric stream has no reader");
                    }
                }
            }
        }

        debug!(
            source = self.source.name(),
            cycle = self.cycle,
            series = self.source.series_count(),
            "Published cycle"
        );
        Cycle::Published
    }

    async fn report(&self, error: ReaderError) {
        warn!(source = self.source.name(), cycle = self.cycle, error = %error, "Refresh failed");

        let event = RefreshError {
            source_name: self.source.name().to_string(),
            cycle: self.cycle,
            error,
        };
        if self.outputs.errors.send(event).await.is_err() {
            debug!(source = self.source.name(), "Error stream has no reader");
        }
    }

    async fn message(&self, message: Message) {
        if self.outputs.messages.send(message).await.is_err() {
            debug!(source = self.source.name(), "Message stream has no reader");
        }
    }
}

/// Wall-clock time that never goes behind `prev`
///
/// Cycles of one source must carry non-decreasing timestamps even if the
/// system clock is stepped back between them.
fn not_before(prev: DateTime<Utc>, now: DateTime<Utc>) -> DateTime<Utc> {
    now.max(prev)
}

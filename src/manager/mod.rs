//! Polling manager
//!
//! The [`Manager`] owns one [`Poller`](poller::Poller) per source and fans
//! their output into three shared streams:
//!
//! - metrics: one [`MetricEvent`] per sub-series per successful refresh
//! - messages: lifecycle notices
//! - errors: one [`RefreshError`] per failed refresh
//!
//! # Lifecycle
//!
//! [`Manager::run`] announces itself, spawns the pollers and then waits for
//! a stop request. Once one arrives it cancels every poller, waits for all
//! of them to finish, announces the shutdown and only then drops its
//! senders. The streams therefore close exactly once, after the last
//! producer is gone, and nothing can be written to a closed stream.
//!
//! ```ignore
//! let (manager, streams) = Manager::new(Arc::new(reader), sources);
//! let stop = manager.stop_handle();
//! tokio::spawn(manager.run());
//! // ... later
//! stop.stop();
//! ```

mod event;
mod poller;

pub use event::{Message, MetricEvent, RefreshError};

use crate::sources::{Reader, Source};
use poller::{Outputs, Poller};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Default capacity of each output stream
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// Manager tuning
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Capacity of each of the three output streams
    pub channel_capacity: usize,

    /// How long to wait for pollers after cancellation before aborting
    /// them. `None` waits for as long as it takes.
    pub shutdown_timeout: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            shutdown_timeout: None,
        }
    }
}

/// Consumer side of the three output streams
///
/// Each receiver yields `None` once the manager has fully stopped.
pub struct Streams {
    pub metrics: mpsc::Receiver<MetricEvent>,
    pub messages: mpsc::Receiver<Message>,
    pub errors: mpsc::Receiver<RefreshError>,
}

/// Requests a graceful shutdown of a running manager
///
/// Stopping is idempotent: later calls are no-ops. A stop requested before
/// [`Manager::run`] starts is still honored.
#[derive(Debug, Clone)]
pub struct StopHandle {
    token: CancellationToken,
}

impl StopHandle {
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            info!("Stop requested");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Owns the pollers and the shared output streams
pub struct Manager<R> {
    reader: Arc<R>,
    sources: Vec<Source>,
    config: ManagerConfig,
    outputs: Outputs,
    stop: CancellationToken,
}

impl<R> Manager<R>
where
    R: Reader + Sync + 'static,
{
    /// Create a manager with default settings
    pub fn new(reader: Arc<R>, sources: Vec<Source>) -> (Self, Streams) {
        Self::with_config(reader, sources, ManagerConfig::default())
    }

    pub fn with_config(reader: Arc<R>, sources: Vec<Source>, config: ManagerConfig) -> (Self, Streams) {
        let capacity = config.channel_capacity.max(1);
        let (metrics, metrics_rx) = mpsc::channel(capacity);
        let (messages, messages_rx) = mpsc::channel(capacity);
        let (errors, errors_rx) = mpsc::channel(capacity);

        let manager = Self {
            reader,
            sources,
            config,
            outputs: Outputs {
                metrics,
                messages,
                errors,
            },
            stop: CancellationToken::new(),
        };
        let streams = Streams {
            metrics: metrics_rx,
            messages: messages_rx,
            errors: errors_rx,
        };

        (manager, streams)
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            token: self.stop.clone(),
        }
    }

    /// Request shutdown; see [`StopHandle::stop`]
    pub fn stop(&self) {
        self.stop_handle().stop();
    }

    /// Run every poller until a stop request, then shut down
    ///
    /// Returns once all pollers have exited and the streams are closed.
    pub async fn run(self) {
        let Manager {
            reader,
            sources,
            config,
            outputs,
            stop,
        } = self;

        send_message(
            &outputs.messages,
            format!("Manager starting up ({} sources)", sources.len()),
        )
        .await;
        info!(sources = sources.len(), "Manager starting");

        let cancel = CancellationToken::new();
        let mut pollers = JoinSet::new();
        for source in sources {
            let poller = Poller::new(Arc::clone(&reader), source, outputs.clone(), cancel.clone());
            pollers.spawn(poller.run());
        }

        stop.cancelled().await;
        info!(pollers = pollers.len(), "Cancelling pollers");
        cancel.cancel();

        let abandoned = join_pollers(&mut pollers, config.shutdown_timeout).await;
        if abandoned > 0 {
            send_message(
                &outputs.messages,
                format!("Abandoned {} poller(s) after shutdown timeout", abandoned),
            )
            .await;
        }

        send_message(&outputs.messages, "Manager shutting down".to_string()).await;

        // the last senders: dropping them closes the streams
        let Outputs {
            metrics,
            messages,
            errors,
        } = outputs;
        drop(metrics);
        drop(messages);
        drop(errors);

        info!("Manager stopped");
    }
}

/// Wait for every poller to finish, returning how many had to be aborted
async fn join_pollers(pollers: &mut JoinSet<()>, timeout: Option<Duration>) -> usize {
    let Some(timeout) = timeout else {
        drain(pollers).await;
        return 0;
    };

    if tokio::time::timeout(timeout, drain(pollers)).await.is_ok() {
        return 0;
    }

    let abandoned = pollers.len();
    warn!(
        abandoned,
        timeout_secs = timeout.as_secs_f64(),
        "Pollers still busy after shutdown timeout, aborting"
    );
    pollers.abort_all();
    drain(pollers).await;
    abandoned
}

async fn drain(pollers: &mut JoinSet<()>) {
    while let Some(result) = pollers.join_next().await {
        if let Err(e) = result {
            if e.is_panic() {
                error!(error = %e, "Poller panicked");
            }
        }
    }
}

async fn send_message(messages: &mpsc::Sender<Message>, message: Message) {
    if messages.send(message).await.is_err() {
        tracing::debug!("Message stream has no reader");
    }
}

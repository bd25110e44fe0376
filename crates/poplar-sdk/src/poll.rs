//! Fixed-interval read scheduler.
//!
//! Each watched read gets its own task: emit `Loading`, fetch immediately,
//! then fetch again every interval and hand each outcome to the observer.
//! Stopping or dropping the handle ends the task, which is how a view
//! "unmounts". Timers are independent; nothing is deduplicated across them.

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::config::PollingConfig;
use crate::error::Result;
use crate::projection::FetchState;

/// Boxed fetch future produced on every tick
pub type FetchFuture<T> = BoxFuture<'static, Result<T>>;

/// Shortest interval a poller will tick at
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Spawns polling tasks at a fixed interval.
#[derive(Debug, Clone)]
pub struct Poller {
    interval: Duration,
}

impl Default for Poller {
    fn default() -> Self {
        Self::from_config(&PollingConfig::default())
    }
}

impl Poller {
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(MIN_INTERVAL),
        }
    }

    pub fn from_config(config: &PollingConfig) -> Self {
        Self::new(config.interval())
    }

    /// Staleness bound of anything this poller watches
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start polling `fetch`, reporting every outcome to `observer`.
    pub fn spawn<T, Fetch, Observer>(
        &self,
        label: &'static str,
        fetch: Fetch,
        mut observer: Observer,
    ) -> PollHandle
    where
        T: Send + 'static,
        Fetch: Fn() -> FetchFuture<T> + Send + 'static,
        Observer: FnMut(FetchState<T>) + Send + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let interval = self.interval;

        let task = tokio::spawn(async move {
            debug!(label, interval_ms = interval.as_millis() as u64, "Starting poller");
            observer(FetchState::Loading);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let state = FetchState::from_result(fetch().await);
                        if let Some(error) = state.error() {
                            warn!(label, error = %error, "Poll fetch failed");
                        }
                        observer(state);
                    }
                    _ = shutdown_rx.recv() => {
                        debug!(label, "Poller stopped");
                        break;
                    }
                }
            }
        });

        PollHandle {
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        }
    }
}

/// Handle to a running poll task. Dropping it cancels the task.
#[derive(Debug)]
pub struct PollHandle {
    shutdown_tx: Option<mpsc::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    /// Stop polling and wait for any in-flight fetch to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |t| t.is_finished())
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

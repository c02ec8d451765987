//! Worker pool — queue poller plus bounded concurrent executors.
//!
//! Organized by concern:
//! - [`poller`] — long-poll receive loop feeding the dispatch channel
//! - [`executor`] — executor loop: decode, build, acknowledge
//!
//! One poller task and `max_concurrency` executor tasks cooperate through a
//! single bounded channel sized to `max_concurrency`; the poller's blocking
//! send provides backpressure so it cannot out-run the pool. A shared
//! cancellation token fans out to the poller and every executor.

mod executor;
mod poller;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests;

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::builder::Builder;
use crate::config::Config;
use crate::queue::{QueueClient, QueueMessage};
use crate::types::Event;
use crate::Result;

use executor::ExecutorContext;

/// Receiver half of the dispatch channel, shared by all executors
pub(crate) type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<QueueMessage>>>;

/// The report worker: queue poller plus a fixed pool of executors
///
/// Consumes work items from the queue, runs the builder for each, and
/// acknowledges messages only on success. Produces no results for any
/// caller; all side effects flow through the record store and object store.
pub struct ReportWorker {
    /// Process configuration (shared, read-only)
    config: Arc<Config>,
    /// Queue handle used by both the poller and executor acknowledgements
    queue: Arc<dyn QueueClient>,
    /// The build pipeline invoked per work item
    builder: Arc<dyn Builder>,
    /// Event broadcast channel sender (multiple subscribers supported)
    event_tx: broadcast::Sender<Event>,
}

impl ReportWorker {
    /// Create a new worker
    pub fn new(
        config: Arc<Config>,
        queue: Arc<dyn QueueClient>,
        builder: Arc<dyn Builder>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            config,
            queue,
            builder,
            event_tx,
        }
    }

    /// Subscribe to worker events
    ///
    /// Multiple subscribers are supported; each receives all events
    /// independently.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Run the worker until the cancellation token fires
    ///
    /// Resolves the queue URL once (failure here aborts startup), spawns the
    /// executor pool, then runs the poll loop on the current task. Returns
    /// after cancellation once every executor has exited. Shutdown is
    /// immediate at the next blocking point; there is no drain phase.
    pub async fn start(&self, cancel: CancellationToken) -> Result<()> {
        let queue_name = &self.config.queue.queue_name;
        let queue_url = self.queue.resolve_queue_url(queue_name).await?;
        tracing::info!(queue = %queue_name, queue_url = %queue_url, "starting worker");

        let concurrency = self.config.queue.max_concurrency;
        let (tx, rx) = mpsc::channel::<QueueMessage>(concurrency);
        let rx: SharedReceiver = Arc::new(tokio::sync::Mutex::new(rx));

        let mut executors = Vec::with_capacity(concurrency);
        for id in 0..concurrency {
            let ctx = ExecutorContext {
                id,
                queue_url: queue_url.clone(),
                queue: Arc::clone(&self.queue),
                builder: Arc::clone(&self.builder),
                build_timeout: self.config.worker.build_timeout(),
                rx: Arc::clone(&rx),
                cancel: cancel.clone(),
            };
            executors.push(tokio::spawn(executor::run_executor(ctx)));
        }

        let poll_result = self.poll_loop(&queue_url, tx, cancel).await;

        // The dispatch sender is dropped by now, so executors drain whatever
        // is buffered and exit on cancellation or channel close.
        for handle in executors {
            handle.await.ok();
        }

        self.event_tx.send(Event::Shutdown).ok();
        poll_result
    }
}

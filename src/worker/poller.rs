//! Queue poller — long-polls the queue and feeds the dispatch channel.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::queue::QueueMessage;
use crate::Result;

use super::ReportWorker;

impl ReportWorker {
    /// Poll the queue until cancelled, pushing messages into the dispatch channel.
    ///
    /// Each iteration requests up to `max_concurrency + 1` messages. An empty
    /// batch is not an error; the loop immediately polls again and relies on
    /// the queue's long-poll wait. Receive errors are logged and polling
    /// continues, except when the cancellation token is already set, in which
    /// case the error is returned.
    ///
    /// Channel sends block when the pool is saturated, which is the
    /// backpressure that keeps the poller from out-running the executors.
    pub(crate) async fn poll_loop(
        &self,
        queue_url: &str,
        tx: mpsc::Sender<QueueMessage>,
        cancel: CancellationToken,
    ) -> Result<()> {
        let batch_size = i32::try_from(self.config.queue.max_concurrency.saturating_add(1))
            .unwrap_or(i32::MAX);

        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("poller stopped");
                    return Ok(());
                }
                result = self.queue.receive_messages(queue_url, batch_size) => match result {
                    Ok(batch) => batch,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to receive messages");
                        if cancel.is_cancelled() {
                            return Err(e);
                        }
                        continue;
                    }
                },
            };

            for message in batch {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("poller stopped");
                        return Ok(());
                    }
                    result = tx.send(message) => {
                        if result.is_err() {
                            // All executors are gone; nothing left to feed
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}

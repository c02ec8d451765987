//! Executor loop — decodes work items, runs builds, acknowledges messages.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::builder::Builder;
use crate::error::BuildError;
use crate::queue::{QueueClient, QueueMessage};
use crate::types::WorkItem;
use crate::{Error, Result};

use super::SharedReceiver;

/// Everything one executor task needs to process messages
pub(crate) struct ExecutorContext {
    /// Executor index, for logging
    pub(crate) id: usize,
    /// Resolved queue URL, used for acknowledgements
    pub(crate) queue_url: String,
    /// Queue handle for deleting processed messages
    pub(crate) queue: Arc<dyn QueueClient>,
    /// The build pipeline
    pub(crate) builder: Arc<dyn Builder>,
    /// Per-build deadline, independent of the outer cancellation tree
    pub(crate) build_timeout: Duration,
    /// Shared receiver half of the dispatch channel
    pub(crate) rx: SharedReceiver,
    /// Shutdown signal
    pub(crate) cancel: CancellationToken,
}

/// Run one executor until cancellation or channel close.
///
/// A successful build deletes the message from the queue; a failed build
/// leaves it for redelivery after the visibility timeout (at-least-once
/// retry). Deletion failures are logged but do not fail the executor.
pub(crate) async fn run_executor(ctx: ExecutorContext) {
    tracing::info!(executor_id = ctx.id, "starting executor");

    loop {
        let message = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                tracing::info!(executor_id = ctx.id, "executor stopped");
                return;
            }
            message = recv(&ctx.rx) => match message {
                Some(message) => message,
                None => {
                    tracing::info!(executor_id = ctx.id, "dispatch channel closed");
                    return;
                }
            },
        };

        match process_message(&ctx, &message).await {
            Ok(true) => {
                let Some(receipt_handle) = message.receipt_handle.as_deref() else {
                    tracing::warn!(
                        executor_id = ctx.id,
                        message_id = message.message_id.as_deref().unwrap_or("<unknown>"),
                        "message has no receipt handle, cannot acknowledge"
                    );
                    continue;
                };
                if let Err(e) = ctx.queue.delete_message(&ctx.queue_url, receipt_handle).await {
                    // The message will be redelivered and hit the idempotency
                    // guard as a cheap no-op
                    tracing::error!(
                        executor_id = ctx.id,
                        error = %e,
                        "failed to delete message"
                    );
                }
            }
            // Handled but deliberately left unacknowledged (bad payload)
            Ok(false) => {}
            Err(e) => {
                tracing::error!(
                    executor_id = ctx.id,
                    error = %e,
                    "failed to process message"
                );
            }
        }
    }
}

/// Wait for the next message on the shared dispatch channel.
async fn recv(rx: &SharedReceiver) -> Option<QueueMessage> {
    rx.lock().await.recv().await
}

/// Process one message.
///
/// Returns `Ok(true)` when the build succeeded and the message should be
/// acknowledged, `Ok(false)` when the message is malformed and should be
/// neither built nor acknowledged, and `Err` when the build failed.
async fn process_message(ctx: &ExecutorContext, message: &QueueMessage) -> Result<bool> {
    let message_id = message.message_id.as_deref().unwrap_or("<unknown>");
    tracing::info!(message_id, "processing message");

    let body = match message.body.as_deref() {
        Some(body) if !body.is_empty() => body,
        _ => {
            tracing::error!(message_id, "message body is empty");
            return Ok(false);
        }
    };

    let item: WorkItem = match serde_json::from_str(body) {
        Ok(item) => item,
        Err(_) => {
            tracing::warn!(message_id, body, "message body is invalid");
            return Ok(false);
        }
    };

    let build = ctx.builder.build(item.user_id, item.report_id);
    match tokio::time::timeout(ctx.build_timeout, build).await {
        Ok(Ok(_report)) => Ok(true),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(Error::Build(BuildError::Timeout {
            user_id: item.user_id,
            report_id: item.report_id,
            timeout_secs: ctx.build_timeout.as_secs(),
        })),
    }
}

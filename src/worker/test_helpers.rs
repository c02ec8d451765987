//! Shared test helpers for worker tests: scripted queue and builder doubles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::builder::Builder;
use crate::config::Config;
use crate::error::{BuildError, QueueError};
use crate::queue::{QueueClient, QueueMessage};
use crate::types::{Report, WorkItem};
use crate::worker::ReportWorker;
use crate::{Error, Result};

/// Queue double that serves pre-scripted batches, then empty batches.
///
/// Can be scripted to fail its first receives, optionally cancelling a token
/// just before the failure surfaces (to exercise shutdown-time error paths).
pub(crate) struct ScriptedQueue {
    batches: Mutex<VecDeque<Vec<QueueMessage>>>,
    receive_failures: AtomicUsize,
    cancel_on_receive_error: Mutex<Option<CancellationToken>>,
    pub(crate) receive_calls: AtomicUsize,
    pub(crate) max_messages_seen: Mutex<Vec<i32>>,
    pub(crate) deleted: Mutex<Vec<String>>,
    resolve_fails: bool,
}

impl ScriptedQueue {
    pub(crate) fn new(batches: Vec<Vec<QueueMessage>>) -> Self {
        Self {
            batches: Mutex::new(batches.into()),
            receive_failures: AtomicUsize::new(0),
            cancel_on_receive_error: Mutex::new(None),
            receive_calls: AtomicUsize::new(0),
            max_messages_seen: Mutex::new(Vec::new()),
            deleted: Mutex::new(Vec::new()),
            resolve_fails: false,
        }
    }

    pub(crate) fn failing_resolve() -> Self {
        Self {
            resolve_fails: true,
            ..Self::new(Vec::new())
        }
    }

    /// Fail the first `count` receive calls before serving scripted batches.
    pub(crate) fn with_receive_failures(self, count: usize) -> Self {
        self.receive_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Cancel `cancel` just before a scripted receive failure surfaces.
    pub(crate) fn with_cancel_on_receive_error(self, cancel: CancellationToken) -> Self {
        *self.cancel_on_receive_error.lock().unwrap() = Some(cancel);
        self
    }
}

#[async_trait]
impl QueueClient for ScriptedQueue {
    async fn resolve_queue_url(&self, queue_name: &str) -> Result<String> {
        if self.resolve_fails {
            return Err(Error::Queue(QueueError::ResolveQueueUrl {
                queue: queue_name.to_string(),
                reason: "queue does not exist".to_string(),
            }));
        }
        Ok(format!("https://queue.test/{}", queue_name))
    }

    async fn receive_messages(
        &self,
        _queue_url: &str,
        max_messages: i32,
    ) -> Result<Vec<QueueMessage>> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        self.max_messages_seen.lock().unwrap().push(max_messages);

        if self.receive_failures.load(Ordering::SeqCst) > 0 {
            self.receive_failures.fetch_sub(1, Ordering::SeqCst);
            if let Some(cancel) = self.cancel_on_receive_error.lock().unwrap().take() {
                cancel.cancel();
            }
            return Err(Error::Queue(QueueError::Receive(
                "connection reset".to_string(),
            )));
        }

        let batch = self.batches.lock().unwrap().pop_front();
        match batch {
            Some(batch) => Ok(batch),
            None => {
                // Stand in for the real queue's long-poll wait so the test
                // loop doesn't spin hot
                tokio::time::sleep(Duration::from_millis(20)).await;
                Ok(Vec::new())
            }
        }
    }

    async fn delete_message(&self, _queue_url: &str, receipt_handle: &str) -> Result<()> {
        self.deleted
            .lock()
            .unwrap()
            .push(receipt_handle.to_string());
        Ok(())
    }
}

/// Builder double: counts calls, optionally fails, optionally blocks on a gate.
pub(crate) struct StubBuilder {
    pub(crate) calls: AtomicUsize,
    pub(crate) active: AtomicUsize,
    pub(crate) max_active: AtomicUsize,
    gate: Option<Arc<Semaphore>>,
    fail: bool,
}

impl StubBuilder {
    pub(crate) fn succeeding() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            gate: None,
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::succeeding()
        }
    }

    /// Builds block until a permit is released on the returned gate.
    pub(crate) fn gated() -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let builder = Self {
            gate: Some(gate.clone()),
            ..Self::succeeding()
        };
        (builder, gate)
    }
}

/// Decrements the active-build counter even when the build future is
/// dropped mid-await (e.g. by the executor's timeout).
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Builder for StubBuilder {
    async fn build(&self, user_id: Uuid, report_id: Uuid) -> Result<Report> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        let _guard = ActiveGuard(&self.active);

        if let Some(gate) = &self.gate {
            // Permits are released by the test to unblock builds one at a time
            let permit = gate.acquire().await.map_err(|e| Error::Other(e.to_string()))?;
            permit.forget();
        }

        if self.fail {
            return Err(Error::Build(BuildError::NoData));
        }

        Ok(completed_report(user_id, report_id))
    }
}

/// A minimal completed report for stubbed builds.
pub(crate) fn completed_report(user_id: Uuid, report_id: Uuid) -> Report {
    let now = Utc::now();
    Report {
        user_id,
        id: report_id,
        report_type: "monsters".to_string(),
        output_file_path: Some(format!("/users/{}/report/{}.csv.gz", user_id, report_id)),
        download_url: None,
        download_url_expires_at: None,
        error_message: None,
        created_at: now,
        started_at: Some(now),
        completed_at: Some(now),
        failed_at: None,
    }
}

/// A well-formed work item message with the given receipt handle.
pub(crate) fn work_message(receipt_handle: &str) -> QueueMessage {
    let item = WorkItem {
        user_id: Uuid::new_v4(),
        report_id: Uuid::new_v4(),
    };
    QueueMessage {
        message_id: Some(format!("mid-{}", receipt_handle)),
        receipt_handle: Some(receipt_handle.to_string()),
        body: Some(serde_json::to_string(&item).unwrap()),
    }
}

/// Assemble a worker around the given doubles.
pub(crate) fn create_test_worker(
    queue: Arc<ScriptedQueue>,
    builder: Arc<StubBuilder>,
    max_concurrency: usize,
) -> ReportWorker {
    let mut config = Config::default();
    config.queue.max_concurrency = max_concurrency;
    let (event_tx, _rx) = broadcast::channel(64);
    ReportWorker::new(Arc::new(config), queue, builder, event_tx)
}

/// Poll `predicate` until it holds or the timeout elapses.
pub(crate) async fn wait_until<F: Fn() -> bool>(predicate: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    predicate()
}

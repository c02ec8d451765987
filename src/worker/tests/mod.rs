use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::error::QueueError;
use crate::queue::QueueMessage;
use crate::worker::test_helpers::{
    ScriptedQueue, StubBuilder, create_test_worker, wait_until, work_message,
};
use crate::Error;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn successful_build_deletes_message_with_its_receipt_handle() {
    let queue = Arc::new(ScriptedQueue::new(vec![vec![work_message("rh-1")]]));
    let builder = Arc::new(StubBuilder::succeeding());
    let worker = Arc::new(create_test_worker(queue.clone(), builder.clone(), 2));

    let cancel = CancellationToken::new();
    let handle = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.start(cancel).await })
    };

    let deleted = wait_until(
        || queue.deleted.lock().unwrap().len() == 1,
        Duration::from_secs(5),
    )
    .await;
    assert!(deleted, "expected exactly one delete call");
    assert_eq!(queue.deleted.lock().unwrap().as_slice(), ["rh-1"]);
    assert_eq!(builder.calls.load(Ordering::SeqCst), 1);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_build_leaves_message_for_redelivery() {
    let queue = Arc::new(ScriptedQueue::new(vec![vec![work_message("rh-1")]]));
    let builder = Arc::new(StubBuilder::failing());
    let worker = Arc::new(create_test_worker(queue.clone(), builder.clone(), 2));

    let cancel = CancellationToken::new();
    let handle = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.start(cancel).await })
    };

    assert!(
        wait_until(
            || builder.calls.load(Ordering::SeqCst) >= 1,
            Duration::from_secs(5),
        )
        .await
    );
    // Give any (incorrect) delete a chance to land before asserting
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(queue.deleted.lock().unwrap().is_empty());

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn malformed_bodies_are_neither_built_nor_acknowledged() {
    let empty_body = QueueMessage {
        message_id: Some("mid-empty".to_string()),
        receipt_handle: Some("rh-empty".to_string()),
        body: Some(String::new()),
    };
    let invalid_json = QueueMessage {
        message_id: Some("mid-bad".to_string()),
        receipt_handle: Some("rh-bad".to_string()),
        body: Some("not json".to_string()),
    };
    let queue = Arc::new(ScriptedQueue::new(vec![vec![empty_body, invalid_json]]));
    let builder = Arc::new(StubBuilder::succeeding());
    let worker = Arc::new(create_test_worker(queue.clone(), builder.clone(), 2));

    let cancel = CancellationToken::new();
    let handle = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.start(cancel).await })
    };

    // Both messages pass through the pool without reaching the builder
    assert!(
        wait_until(
            || queue.receive_calls.load(Ordering::SeqCst) >= 2,
            Duration::from_secs(5),
        )
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(builder.calls.load(Ordering::SeqCst), 0);
    assert!(queue.deleted.lock().unwrap().is_empty());

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn saturated_pool_blocks_the_poller() {
    // concurrency 2: two builds in flight, two messages buffered in the
    // channel, the fifth send blocks until a build finishes
    let batch: Vec<QueueMessage> = (1..=5).map(|i| work_message(&format!("rh-{}", i))).collect();
    let queue = Arc::new(ScriptedQueue::new(vec![batch]));
    let (builder, gate) = StubBuilder::gated();
    let builder = Arc::new(builder);
    let worker = Arc::new(create_test_worker(queue.clone(), builder.clone(), 2));

    let cancel = CancellationToken::new();
    let handle = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.start(cancel).await })
    };

    assert!(
        wait_until(
            || builder.active.load(Ordering::SeqCst) == 2,
            Duration::from_secs(5),
        )
        .await
    );

    // With both executors blocked and the channel full, the poller must be
    // stuck in its send: no further receive calls happen
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(queue.receive_calls.load(Ordering::SeqCst), 1);
    assert_eq!(builder.max_active.load(Ordering::SeqCst), 2);

    // Release all builds; the poller unblocks and the batch drains
    gate.add_permits(5);
    assert!(
        wait_until(
            || queue.deleted.lock().unwrap().len() == 5,
            Duration::from_secs(5),
        )
        .await
    );
    assert!(queue.receive_calls.load(Ordering::SeqCst) > 1);
    assert_eq!(builder.max_active.load(Ordering::SeqCst), 2);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn poller_survives_transient_receive_errors() {
    // First receive fails, second serves the batch; the poller must keep
    // polling through the failure
    let queue = Arc::new(
        ScriptedQueue::new(vec![vec![work_message("rh-1")]]).with_receive_failures(1),
    );
    let builder = Arc::new(StubBuilder::succeeding());
    let worker = Arc::new(create_test_worker(queue.clone(), builder.clone(), 2));

    let cancel = CancellationToken::new();
    let handle = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.start(cancel).await })
    };

    assert!(
        wait_until(
            || queue.deleted.lock().unwrap().len() == 1,
            Duration::from_secs(5),
        )
        .await,
        "message behind the transient error was never processed"
    );
    assert!(queue.receive_calls.load(Ordering::SeqCst) >= 2);
    assert_eq!(builder.calls.load(Ordering::SeqCst), 1);

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn receive_error_during_cancellation_is_returned() {
    // The queue cancels the token right before its receive fails, so the
    // poller observes the error with cancellation already requested
    let cancel = CancellationToken::new();
    let queue = Arc::new(
        ScriptedQueue::new(vec![])
            .with_receive_failures(1)
            .with_cancel_on_receive_error(cancel.clone()),
    );
    let builder = Arc::new(StubBuilder::succeeding());
    let worker = create_test_worker(queue, builder, 2);

    let result = worker.start(cancel).await;
    assert!(matches!(result, Err(Error::Queue(QueueError::Receive(_)))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn oversized_concurrency_saturates_the_batch_size() {
    let queue = Arc::new(ScriptedQueue::new(vec![]));
    let builder = Arc::new(StubBuilder::succeeding());
    let worker = Arc::new(create_test_worker(queue.clone(), builder, usize::MAX));

    // Drive the poll loop directly; spawning usize::MAX executors is not the
    // point here
    let (tx, _rx) = tokio::sync::mpsc::channel(1);
    let cancel = CancellationToken::new();
    let handle = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.poll_loop("https://queue.test/reports", tx, cancel).await })
    };

    assert!(
        wait_until(
            || queue.receive_calls.load(Ordering::SeqCst) >= 1,
            Duration::from_secs(5),
        )
        .await
    );
    cancel.cancel();
    handle.await.unwrap().unwrap();

    assert_eq!(queue.max_messages_seen.lock().unwrap()[0], i32::MAX);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancellation_stops_poller_and_executors() {
    let queue = Arc::new(ScriptedQueue::new(vec![]));
    let builder = Arc::new(StubBuilder::succeeding());
    let worker = Arc::new(create_test_worker(queue.clone(), builder, 2));

    let cancel = CancellationToken::new();
    let handle = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.start(cancel).await })
    };

    // Let the worker reach its polling steady state first
    assert!(
        wait_until(
            || queue.receive_calls.load(Ordering::SeqCst) >= 1,
            Duration::from_secs(5),
        )
        .await
    );

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop after cancellation")
        .unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn unresolvable_queue_aborts_startup() {
    let queue = Arc::new(ScriptedQueue::failing_resolve());
    let builder = Arc::new(StubBuilder::succeeding());
    let worker = create_test_worker(queue, builder, 2);

    let result = worker.start(CancellationToken::new()).await;
    assert!(matches!(
        result,
        Err(Error::Queue(QueueError::ResolveQueueUrl { .. }))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_build_is_bounded_by_the_build_timeout() {
    let queue = Arc::new(ScriptedQueue::new(vec![vec![work_message("rh-slow")]]));
    let (builder, _gate) = StubBuilder::gated(); // never released: build hangs
    let builder = Arc::new(builder);

    let mut config = crate::config::Config::default();
    config.queue.max_concurrency = 2;
    config.worker.build_timeout_secs = 1;
    let (event_tx, _rx) = tokio::sync::broadcast::channel(64);
    let worker = Arc::new(crate::worker::ReportWorker::new(
        Arc::new(config),
        queue.clone(),
        builder.clone(),
        event_tx,
    ));

    let cancel = CancellationToken::new();
    let handle = {
        let worker = worker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { worker.start(cancel).await })
    };

    assert!(
        wait_until(
            || builder.calls.load(Ordering::SeqCst) == 1,
            Duration::from_secs(5),
        )
        .await
    );

    // The hung build times out, the message stays unacknowledged, and the
    // executor is free again for the next message
    assert!(
        wait_until(
            || builder.active.load(Ordering::SeqCst) == 0,
            Duration::from_secs(5),
        )
        .await
    );
    assert!(queue.deleted.lock().unwrap().is_empty());

    cancel.cancel();
    handle.await.unwrap().unwrap();
}

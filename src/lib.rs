//! # report-worker
//!
//! Backend library for an asynchronous report generation service.
//!
//! A client requests a report through an API layer, which persists a pending
//! report record and enqueues a work item. This crate is the consumer side:
//! a queue poller long-polls for work items, a bounded pool of executors
//! runs the idempotent report builder for each, and the finished artifact (a
//! gzip-compressed CSV) lands in an object store. The API layer later serves
//! the record and a time-limited download link; that layer is not part of
//! this crate.
//!
//! ## Design Philosophy
//!
//! - **Library-first** - No CLI or HTTP surface, purely a Rust crate for embedding
//! - **Explicit dependencies** - Configuration and collaborators are injected
//!   at construction, never read from ambient globals
//! - **Capability traits** - The queue, object store, and data source are
//!   trait objects so test doubles need no network or database
//! - **At-least-once** - Messages are acknowledged only after a successful
//!   build; the builder's idempotency guard makes redelivery a cheap no-op
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use report_worker::{
//!     CompendiumClient, Config, Database, ReportBuilder, ReportWorker, S3ObjectStore,
//!     SqsQueueClient, run_with_shutdown,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(Config::default());
//!
//!     let db = Arc::new(Database::new(&config.persistence.database_path).await?);
//!     let fetcher = Arc::new(CompendiumClient::new(&config.source)?);
//!     let store = Arc::new(S3ObjectStore::from_config(&config.storage).await);
//!     let queue = Arc::new(SqsQueueClient::from_config(&config.queue).await);
//!
//!     let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);
//!     let builder = Arc::new(ReportBuilder::new(db, fetcher, store, event_tx.clone()));
//!     let worker = ReportWorker::new(config, queue, builder, event_tx);
//!
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(run_with_shutdown(cancel.clone()));
//!     worker.start(cancel).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Report build pipeline
pub mod builder;
/// Configuration types
pub mod config;
/// Database persistence layer
pub mod db;
/// Error types
pub mod error;
/// Queue client capability
pub mod queue;
/// External data source client
pub mod source;
/// Object store capability
pub mod storage;
/// Core types and events
pub mod types;
/// Queue poller and worker pool
pub mod worker;

// Re-export commonly used types
pub use builder::{Builder, ReportBuilder};
pub use config::Config;
pub use db::Database;
pub use error::{BuildError, DatabaseError, Error, QueueError, Result};
pub use queue::{QueueClient, QueueMessage, SqsQueueClient};
pub use source::{CompendiumClient, CompendiumEntry, Fetcher};
pub use storage::{ObjectStore, S3ObjectStore};
pub use types::{Event, Report, ReportStatus, WorkItem};
pub use worker::ReportWorker;

/// Helper function to cancel the worker on a termination signal.
///
/// Waits for a termination signal and then cancels the given token, which
/// stops the worker's poll loop and executor pool at their next blocking
/// point.
///
/// - **Unix:** listens for SIGTERM and SIGINT, with fallbacks if signal registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use report_worker::run_with_shutdown;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() {
///     let cancel = CancellationToken::new();
///     tokio::spawn(run_with_shutdown(cancel.clone()));
///     // ... run the worker with `cancel` ...
/// }
/// ```
pub async fn run_with_shutdown(cancel: tokio_util::sync::CancellationToken) {
    wait_for_signal().await;
    tracing::info!("Shutdown signal received, cancelling worker");
    cancel.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Set up signal handlers - these may fail in restricted environments (containers, tests)
    let sigterm_result = signal(SignalKind::terminate());
    let sigint_result = signal(SignalKind::interrupt());

    match (sigterm_result, sigint_result) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM signal");
                }
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT signal (Ctrl+C)");
                }
            }
        }
        (Err(e), _) => {
            tracing::warn!(error = %e, "Could not register SIGTERM handler, waiting for SIGINT only");
            if let Ok(mut sigint) = signal(SignalKind::interrupt()) {
                sigint.recv().await;
                tracing::info!("Received SIGINT signal (Ctrl+C)");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
        (_, Err(e)) => {
            tracing::warn!(error = %e, "Could not register SIGINT handler, waiting for SIGTERM only");
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM signal");
            } else {
                tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received Ctrl+C signal");
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        }
    }
}

//! Error types for report-worker
//!
//! This module provides error handling for the library, including:
//! - Domain-specific error types (Database, Queue, Build)
//! - A top-level [`Error`] enum with `From` conversions for infrastructure errors
//! - A crate-wide [`Result`] alias

use thiserror::Error;
use uuid::Uuid;

/// Result type alias for report-worker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for report-worker
///
/// This is the primary error type used throughout the library. Each variant includes
/// contextual information to help diagnose issues.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "queue_name")
        key: Option<String>,
    },

    /// Database operation failed
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    /// Queue operation failed
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    /// Report build pipeline failed
    #[error("build error: {0}")]
    Build(#[from] BuildError),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// Database-related errors
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Failed to connect to database
    #[error("failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to run migrations
    #[error("failed to run migrations: {0}")]
    MigrationFailed(String),

    /// Query failed
    #[error("query failed: {0}")]
    QueryFailed(String),

    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Constraint violation (e.g., duplicate key)
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Queue-related errors
#[derive(Debug, Error)]
pub enum QueueError {
    /// Failed to resolve the URL for a logical queue name
    #[error("failed to resolve url for queue {queue}: {reason}")]
    ResolveQueueUrl {
        /// The logical queue name that could not be resolved
        queue: String,
        /// The underlying failure reason
        reason: String,
    },

    /// Failed to receive messages from the queue
    #[error("failed to receive messages: {0}")]
    Receive(String),

    /// Failed to delete a message from the queue
    #[error("failed to delete message: {0}")]
    Delete(String),
}

/// Report build pipeline errors
#[derive(Debug, Error)]
pub enum BuildError {
    /// The source dataset was empty
    #[error("no source data found")]
    NoData,

    /// Failed to encode the dataset as a compressed CSV artifact
    #[error("failed to encode report artifact: {0}")]
    Encode(String),

    /// Failed to upload the finished artifact to the object store
    #[error("failed to upload report to {key}: {reason}")]
    Upload {
        /// The object store key the upload was addressed to
        key: String,
        /// The underlying failure reason
        reason: String,
    },

    /// The build exceeded its per-build deadline
    #[error("report {report_id} for user {user_id} timed out after {timeout_secs}s")]
    Timeout {
        /// Owner of the report
        user_id: Uuid,
        /// The report being built
        report_id: Uuid,
        /// The configured per-build timeout in seconds
        timeout_secs: u64,
    },
}

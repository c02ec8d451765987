//! Core types and events for report-worker

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted report record describing one requested artifact-generation job
/// and its lifecycle state.
///
/// A report is created as `pending` by the API layer and mutated exclusively
/// by the [`ReportBuilder`](crate::builder::ReportBuilder), which transitions
/// it `pending → started`, then `started → {completed | failed}`. Once
/// `completed_at` or `failed_at` is set the report is terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Owner of the report (composite primary key, first half)
    pub user_id: Uuid,
    /// Report ID (composite primary key, second half)
    pub id: Uuid,
    /// Report type tag chosen by the requester
    pub report_type: String,
    /// Object store key of the finished artifact (set iff `completed_at` is set)
    pub output_file_path: Option<String>,
    /// Time-limited download link, populated lazily by the API layer
    pub download_url: Option<String>,
    /// Expiry of `download_url`
    pub download_url_expires_at: Option<DateTime<Utc>>,
    /// Failure cause (set iff `failed_at` is set)
    pub error_message: Option<String>,
    /// When the report was requested
    pub created_at: DateTime<Utc>,
    /// When the build started processing this report
    pub started_at: Option<DateTime<Utc>>,
    /// When the build finished successfully
    pub completed_at: Option<DateTime<Utc>>,
    /// When the build failed
    pub failed_at: Option<DateTime<Utc>>,
}

impl Report {
    /// Derive the lifecycle status from which timestamps are present.
    ///
    /// Evaluated in order failed → completed → started → pending, so a
    /// (invalid) record with multiple terminal timestamps reads as failed.
    pub fn status(&self) -> ReportStatus {
        if self.failed_at.is_some() {
            ReportStatus::Failed
        } else if self.completed_at.is_some() {
            ReportStatus::Completed
        } else if self.started_at.is_some() {
            ReportStatus::Started
        } else {
            ReportStatus::Pending
        }
    }
}

/// Lifecycle status of a report, derived from its timestamps
///
/// Never stored; always computed via [`Report::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    /// Created, not yet picked up by a worker
    Pending,
    /// A build has started processing the report
    Started,
    /// The artifact was generated and uploaded
    Completed,
    /// The build failed; `error_message` carries the cause
    Failed,
}

impl ReportStatus {
    /// String form used in logs and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportStatus::Pending => "pending",
            ReportStatus::Started => "started",
            ReportStatus::Completed => "completed",
            ReportStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Queued work item referencing a report to build
///
/// Wire format (JSON message body): `{"user_id": "<uuid>", "report_id": "<uuid>"}`.
/// Produced by the API layer on report creation, consumed by the worker pool.
/// Delivery is at-least-once; the builder's idempotency guard makes
/// redelivered items cheap no-ops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Owner of the report
    pub user_id: Uuid,
    /// The report to build
    pub report_id: Uuid,
}

/// Events emitted by the worker and builder
///
/// Multiple subscribers are supported via a broadcast channel; if nobody is
/// listening events are silently dropped.
#[derive(Debug, Clone)]
pub enum Event {
    /// A build started processing a report
    ReportStarted {
        /// Owner of the report
        user_id: Uuid,
        /// The report being built
        report_id: Uuid,
    },
    /// A report artifact was generated and uploaded
    ReportCompleted {
        /// Owner of the report
        user_id: Uuid,
        /// The completed report
        report_id: Uuid,
        /// Object store key of the artifact
        output_file_path: String,
    },
    /// A build failed and the report was marked failed
    ReportFailed {
        /// Owner of the report
        user_id: Uuid,
        /// The failed report
        report_id: Uuid,
        /// Failure cause
        error: String,
    },
    /// The worker is shutting down
    Shutdown,
}

//! Database layer for report-worker
//!
//! Handles SQLite persistence for report records.
//!
//! ## Submodules
//!
//! Methods on [`Database`] are organized by domain:
//! - [`migrations`] — Database lifecycle, schema migrations
//! - [`reports`] — Report record CRUD
//!
//! Rows store UUIDs as text and timestamps as unix seconds; the conversion
//! to [`Report`] happens once at this boundary.

use crate::error::DatabaseError;
use crate::types::Report;
use crate::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{FromRow, sqlite::SqlitePool};
use uuid::Uuid;

mod migrations;
mod reports;

/// Report record as stored in SQLite
#[derive(Debug, Clone, FromRow)]
pub struct ReportRow {
    /// Owner of the report (text UUID)
    pub user_id: String,
    /// Report ID (text UUID)
    pub id: String,
    /// Report type tag chosen by the requester
    pub report_type: String,
    /// Object store key of the finished artifact
    pub output_file_path: Option<String>,
    /// Time-limited download link (populated by the API layer)
    pub download_url: Option<String>,
    /// Unix timestamp when the download link expires
    pub download_url_expires_at: Option<i64>,
    /// Failure cause
    pub error_message: Option<String>,
    /// Unix timestamp when the report was requested
    pub created_at: i64,
    /// Unix timestamp when the build started
    pub started_at: Option<i64>,
    /// Unix timestamp when the build completed
    pub completed_at: Option<i64>,
    /// Unix timestamp when the build failed
    pub failed_at: Option<i64>,
}

impl ReportRow {
    /// Convert a raw row into a [`Report`], parsing UUIDs and timestamps.
    fn into_report(self) -> Result<Report> {
        let user_id = parse_uuid(&self.user_id, "user_id")?;
        let id = parse_uuid(&self.id, "id")?;

        Ok(Report {
            user_id,
            id,
            report_type: self.report_type,
            output_file_path: self.output_file_path,
            download_url: self.download_url,
            download_url_expires_at: self.download_url_expires_at.map(from_unix),
            error_message: self.error_message,
            created_at: from_unix(self.created_at),
            started_at: self.started_at.map(from_unix),
            completed_at: self.completed_at.map(from_unix),
            failed_at: self.failed_at.map(from_unix),
        })
    }
}

fn parse_uuid(value: &str, column: &str) -> Result<Uuid> {
    Uuid::parse_str(value).map_err(|e| {
        Error::Database(DatabaseError::QueryFailed(format!(
            "Invalid UUID in column {}: {}",
            column, e
        )))
    })
}

fn from_unix(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}

/// Database handle for report-worker
pub struct Database {
    pool: SqlitePool,
}

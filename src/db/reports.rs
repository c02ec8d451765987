//! Report record CRUD operations.
//!
//! The report row is the sole point of serialization between workers:
//! updates are full-row last-writer-wins, with no optimistic version check.
//! The queue's visibility mechanics keep a given report in at most one
//! in-flight build at a time.

use crate::error::DatabaseError;
use crate::types::Report;
use crate::{Error, Result};
use uuid::Uuid;

use super::{Database, ReportRow};

const SELECT_REPORT: &str = r#"
    SELECT
        user_id, id, report_type, output_file_path, download_url,
        download_url_expires_at, error_message, created_at,
        started_at, completed_at, failed_at
    FROM reports
    WHERE user_id = ? AND id = ?
    "#;

impl Database {
    /// Insert a new pending report record
    ///
    /// The report starts with only `created_at` set (derived status: pending).
    pub async fn create_report(&self, user_id: Uuid, report_type: &str) -> Result<Report> {
        let id = Uuid::new_v4();
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO reports (user_id, id, report_type, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(user_id.to_string())
        .bind(id.to_string())
        .bind(report_type)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if e.as_database_error()
                .is_some_and(|dbe| dbe.is_unique_violation())
            {
                Error::Database(DatabaseError::ConstraintViolation(format!(
                    "report {} for user {} already exists",
                    id, user_id
                )))
            } else {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to insert report: {}",
                    e
                )))
            }
        })?;

        self.report_by_key(user_id, id).await
    }

    /// Get a report by its composite primary key
    ///
    /// Returns [`DatabaseError::NotFound`] when the record is absent, which
    /// the builder uses to fail fast and the API layer maps to a 404.
    pub async fn report_by_key(&self, user_id: Uuid, id: Uuid) -> Result<Report> {
        let row = sqlx::query_as::<_, ReportRow>(SELECT_REPORT)
            .bind(user_id.to_string())
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to get report: {}",
                    e
                )))
            })?;

        match row {
            Some(row) => row.into_report(),
            None => Err(Error::Database(DatabaseError::NotFound(format!(
                "report {} for user {}",
                id, user_id
            )))),
        }
    }

    /// Replace the full row addressed by (user_id, id) with the given field values
    ///
    /// Last-writer-wins; returns the record as re-read after the update.
    pub async fn update_report(&self, report: &Report) -> Result<Report> {
        let result = sqlx::query(
            r#"
            UPDATE reports
            SET output_file_path = ?,
                download_url = ?,
                download_url_expires_at = ?,
                error_message = ?,
                started_at = ?,
                completed_at = ?,
                failed_at = ?
            WHERE user_id = ? AND id = ?
            "#,
        )
        .bind(&report.output_file_path)
        .bind(&report.download_url)
        .bind(report.download_url_expires_at.map(|t| t.timestamp()))
        .bind(&report.error_message)
        .bind(report.started_at.map(|t| t.timestamp()))
        .bind(report.completed_at.map(|t| t.timestamp()))
        .bind(report.failed_at.map(|t| t.timestamp()))
        .bind(report.user_id.to_string())
        .bind(report.id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to update report {} for user {}: {}",
                report.id, report.user_id, e
            )))
        })?;

        if result.rows_affected() == 0 {
            return Err(Error::Database(DatabaseError::NotFound(format!(
                "report {} for user {}",
                report.id, report.user_id
            ))));
        }

        self.report_by_key(report.user_id, report.id).await
    }
}

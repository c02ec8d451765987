//! Report builder — the idempotent build pipeline
//!
//! Drives a single report from pending to a terminal state: mark started,
//! fetch the source dataset, encode it as a gzip-compressed CSV, upload the
//! artifact, mark completed. Safe to invoke again on message redelivery: a
//! report whose `started_at` is already set is returned as-is without
//! repeating any work.

use std::io::Write;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use flate2::Compression;
use flate2::write::GzEncoder;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::db::Database;
use crate::error::BuildError;
use crate::source::{CompendiumEntry, Fetcher};
use crate::storage::ObjectStore;
use crate::types::{Event, Report};
use crate::{Error, Result};

/// Fixed artifact header row
const CSV_HEADER: [&str; 8] = [
    "name",
    "id",
    "category",
    "description",
    "image",
    "common_locations",
    "drops",
    "dlc",
];

/// Capability trait for driving a report build
///
/// Implemented by [`ReportBuilder`]; the worker pool consumes the trait so
/// tests can substitute a stub.
#[async_trait]
pub trait Builder: Send + Sync {
    /// Drive the report identified by (user_id, report_id) to a terminal state
    async fn build(&self, user_id: Uuid, report_id: Uuid) -> Result<Report>;
}

/// Builds report artifacts and records their lifecycle
///
/// All collaborators are injected at construction; side effects flow through
/// the record store and object store only.
pub struct ReportBuilder {
    db: Arc<Database>,
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn ObjectStore>,
    event_tx: broadcast::Sender<Event>,
}

impl ReportBuilder {
    /// Create a new builder
    pub fn new(
        db: Arc<Database>,
        fetcher: Arc<dyn Fetcher>,
        store: Arc<dyn ObjectStore>,
        event_tx: broadcast::Sender<Event>,
    ) -> Self {
        Self {
            db,
            fetcher,
            store,
            event_tx,
        }
    }

    /// Drive the report identified by (user_id, report_id) to a terminal state
    ///
    /// Returns the stored record unchanged if a build already started for it
    /// (the idempotency guard — keyed on `started_at` alone, so a previously
    /// failed report is also returned as-is and never rebuilt). A missing
    /// record is an error for this invocation, not retried internally.
    ///
    /// Any failure after the guard is recorded on the report (`failed_at`,
    /// `error_message`) before the original error is returned.
    pub async fn build(&self, user_id: Uuid, report_id: Uuid) -> Result<Report> {
        let mut report = self.db.report_by_key(user_id, report_id).await?;

        if report.started_at.is_some() {
            return Ok(report);
        }

        match self.run(&mut report).await {
            Ok(report) => Ok(report),
            Err(err) => {
                // Record the failure; a failed persistence must not mask the
                // original error, so it is only logged.
                report.failed_at = Some(Utc::now());
                report.error_message = Some(err.to_string());
                if let Err(update_err) = self.db.update_report(&report).await {
                    tracing::error!(
                        user_id = %user_id,
                        report_id = %report_id,
                        error = %update_err,
                        "failed to record report failure"
                    );
                }
                self.emit(Event::ReportFailed {
                    user_id,
                    report_id,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// The pipeline proper: mark started, fetch, encode, upload, mark completed.
    async fn run(&self, report: &mut Report) -> Result<Report> {
        let user_id = report.user_id;
        let report_id = report.id;

        report.started_at = Some(Utc::now());
        let persisted = self.db.update_report(report).await?;
        *report = persisted;
        self.emit(Event::ReportStarted { user_id, report_id });

        let entries = self.fetcher.fetch().await?;
        if entries.is_empty() {
            return Err(Error::Build(BuildError::NoData));
        }

        let artifact = encode_artifact(&entries)?;

        let key = format!("/users/{}/report/{}.csv.gz", user_id, report_id);
        self.store.put_object(&key, artifact).await?;

        report.output_file_path = Some(key.clone());
        report.completed_at = Some(Utc::now());
        let report = self.db.update_report(report).await?;

        tracing::info!(
            user_id = %user_id,
            report_id = %report_id,
            path = %key,
            "successfully generated report"
        );
        self.emit(Event::ReportCompleted {
            user_id,
            report_id,
            output_file_path: key,
        });

        Ok(report)
    }

    fn emit(&self, event: Event) {
        // send() fails only when nobody is subscribed, which is fine
        self.event_tx.send(event).ok();
    }
}

#[async_trait]
impl Builder for ReportBuilder {
    async fn build(&self, user_id: Uuid, report_id: Uuid) -> Result<Report> {
        ReportBuilder::build(self, user_id, report_id).await
    }
}

/// Encode the dataset as a gzip-compressed CSV artifact.
fn encode_artifact(entries: &[CompendiumEntry]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    write_csv(entries, &mut encoder)?;
    encoder
        .finish()
        .map_err(|e| Error::Build(BuildError::Encode(format!("gzip finish: {}", e))))
}

/// Write the dataset as CSV: fixed header, one row per record, list fields
/// joined with ", ", booleans as literal `true`/`false`.
fn write_csv<W: Write>(entries: &[CompendiumEntry], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer
        .write_record(CSV_HEADER)
        .map_err(|e| Error::Build(BuildError::Encode(format!("csv header: {}", e))))?;

    for entry in entries {
        csv_writer
            .write_record([
                entry.name.as_str(),
                &entry.id.to_string(),
                entry.category.as_str(),
                entry.description.as_str(),
                entry.image.as_str(),
                &entry.common_locations.join(", "),
                &entry.drops.join(", "),
                if entry.dlc { "true" } else { "false" },
            ])
            .map_err(|e| Error::Build(BuildError::Encode(format!("csv row: {}", e))))?;
    }

    csv_writer
        .flush()
        .map_err(|e| Error::Build(BuildError::Encode(format!("csv flush: {}", e))))?;

    Ok(())
}

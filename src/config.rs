//! Configuration types for report-worker
//!
//! The configuration is constructed once at process start and passed by
//! `Arc` into the worker, builder, and store constructors. There is no
//! process-wide configuration singleton.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Persistence configuration (report record store)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Path to the SQLite database file (default: "./reports.db")
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Queue consumption configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Logical name of the queue to consume (resolved to a URL at startup)
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Endpoint URL override for SQS-compatible local stacks (None = AWS default)
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// Number of concurrent executors sharing the dispatch channel (default: 2)
    ///
    /// Also sizes the dispatch channel; each poll requests `max_concurrency + 1`
    /// messages, slightly oversubscribing the channel's drain rate.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            endpoint_url: None,
            max_concurrency: default_max_concurrency(),
        }
    }
}

/// Object store configuration (finished artifacts)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Bucket that receives finished report artifacts
    #[serde(default = "default_bucket")]
    pub bucket: String,

    /// Endpoint URL override for S3-compatible local stacks (None = AWS default)
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            endpoint_url: None,
        }
    }
}

/// Source dataset configuration (the external compendium API)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Base URL of the compendium API
    #[serde(default = "default_source_base_url")]
    pub base_url: String,

    /// Game edition passed as a query parameter (default: "totk")
    #[serde(default = "default_game")]
    pub game: String,

    /// HTTP request timeout in seconds (default: 10)
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl SourceConfig {
    /// Request timeout as a [`Duration`]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_source_base_url(),
            game: default_game(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Worker pool configuration
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Per-build deadline in seconds, independent of the outer cancellation
    /// tree (default: 10)
    ///
    /// Bounds how long a single slow build can delay pool shutdown.
    #[serde(default = "default_build_timeout_secs")]
    pub build_timeout_secs: u64,
}

impl WorkerConfig {
    /// Per-build deadline as a [`Duration`]
    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            build_timeout_secs: default_build_timeout_secs(),
        }
    }
}

/// Main configuration for the report worker
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Persistence settings
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Queue consumption settings
    #[serde(default)]
    pub queue: QueueConfig,

    /// Object store settings
    #[serde(default)]
    pub storage: StorageConfig,

    /// Source dataset settings
    #[serde(default)]
    pub source: SourceConfig,

    /// Worker pool settings
    #[serde(default)]
    pub worker: WorkerConfig,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./reports.db")
}

fn default_queue_name() -> String {
    "reports".to_string()
}

fn default_max_concurrency() -> usize {
    2
}

fn default_bucket() -> String {
    "reports".to_string()
}

fn default_source_base_url() -> String {
    "https://botw-compendium.herokuapp.com/api/v3/compendium".to_string()
}

fn default_game() -> String {
    "totk".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_build_timeout_secs() -> u64 {
    10
}

//! External data source client for the compendium API
//!
//! The worker reports on a third-party compendium dataset. The API is
//! consumed through the [`Fetcher`] capability trait so tests can substitute
//! a double without a network.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::SourceConfig;
use crate::{Error, Result};

/// One record of the source dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompendiumEntry {
    /// Entry name
    pub name: String,
    /// Numeric compendium ID
    pub id: i32,
    /// Entry category (e.g., "monsters")
    pub category: String,
    /// Entry description text
    pub description: String,
    /// Image URL
    pub image: String,
    /// Locations where the entry is commonly found
    #[serde(default)]
    pub common_locations: Vec<String>,
    /// Items the entry drops
    #[serde(default)]
    pub drops: Vec<String>,
    /// Whether the entry is DLC-only
    #[serde(default)]
    pub dlc: bool,
}

/// Response envelope returned by the compendium API
#[derive(Debug, Deserialize)]
struct CompendiumResponse {
    data: Vec<CompendiumEntry>,
}

/// Capability trait for fetching the source dataset
///
/// A single call must return the full dataset; the API offers no pagination.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch all records to be reported on
    async fn fetch(&self) -> Result<Vec<CompendiumEntry>>;
}

/// HTTP client for the compendium API
pub struct CompendiumClient {
    client: reqwest::Client,
    base_url: String,
    game: String,
}

impl CompendiumClient {
    /// Create a client from source configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(config: &SourceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(Error::Network)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            game: config.game.clone(),
        })
    }
}

#[async_trait]
impl Fetcher for CompendiumClient {
    async fn fetch(&self) -> Result<Vec<CompendiumEntry>> {
        let url = format!("{}/category/monsters", self.base_url);

        let response = self
            .client
            .get(&url)
            .query(&[("game", self.game.as_str())])
            .send()
            .await
            .map_err(Error::Network)?
            .error_for_status()
            .map_err(Error::Network)?;

        let envelope: CompendiumResponse = response.json().await.map_err(Error::Network)?;
        Ok(envelope.data)
    }
}

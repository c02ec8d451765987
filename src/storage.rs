//! Object store capability and its S3 implementation
//!
//! Finished report artifacts are uploaded through the [`ObjectStore`]
//! capability trait; [`S3ObjectStore`] is the real implementation. Keys are
//! deterministic per (user, report), so a retried upload safely overwrites.

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;

use crate::config::StorageConfig;
use crate::error::BuildError;
use crate::{Error, Result};

/// Capability trait for uploading finished artifacts
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `body` under `key`, overwriting any existing object
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()>;
}

/// S3 implementation of [`ObjectStore`]
pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3ObjectStore {
    /// Create a store from an already-configured S3 client and bucket
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Create a store from storage configuration and ambient AWS credentials
    ///
    /// Honors `endpoint_url` for S3-compatible local stacks (path-style
    /// addressing is forced when an endpoint override is present).
    pub async fn from_config(config: &StorageConfig) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }

        Self::new(
            aws_sdk_s3::Client::from_conf(builder.build()),
            config.bucket.clone(),
        )
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| {
                Error::Build(BuildError::Upload {
                    key: key.to_string(),
                    reason: e.into_service_error().to_string(),
                })
            })?;

        Ok(())
    }
}

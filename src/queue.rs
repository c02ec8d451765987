//! Queue client capability and its SQS implementation
//!
//! The worker consumes work items from an SQS-compatible queue. The queue is
//! reached through the [`QueueClient`] capability trait so tests can
//! substitute a double; [`SqsQueueClient`] is the real implementation.

use async_trait::async_trait;

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::{Error, Result};

/// A message received from the queue
///
/// Mirrors the SQS message shape: every field may be absent on the wire.
/// The `receipt_handle` is required to acknowledge (delete) the message.
#[derive(Debug, Clone, Default)]
pub struct QueueMessage {
    /// Queue-assigned message ID (for logging)
    pub message_id: Option<String>,
    /// Receipt handle identifying this delivery of the message
    pub receipt_handle: Option<String>,
    /// Raw message body
    pub body: Option<String>,
}

/// Capability trait for queue consumption
///
/// The queue provides at-least-once delivery: a received message becomes
/// invisible for the visibility timeout and is redelivered unless deleted.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Resolve a logical queue name to a concrete queue URL
    async fn resolve_queue_url(&self, queue_name: &str) -> Result<String>;

    /// Long-poll for up to `max_messages` pending messages
    ///
    /// An empty batch is not an error.
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
    ) -> Result<Vec<QueueMessage>>;

    /// Delete (acknowledge) a message by its receipt handle
    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()>;
}

/// SQS implementation of [`QueueClient`]
pub struct SqsQueueClient {
    client: aws_sdk_sqs::Client,
}

impl SqsQueueClient {
    /// Create a client from an already-configured SQS client
    pub fn new(client: aws_sdk_sqs::Client) -> Self {
        Self { client }
    }

    /// Create a client from queue configuration and ambient AWS credentials
    ///
    /// Honors `endpoint_url` for SQS-compatible local stacks.
    pub async fn from_config(config: &QueueConfig) -> Self {
        let shared = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;

        let mut builder = aws_sdk_sqs::config::Builder::from(&shared);
        if let Some(endpoint) = &config.endpoint_url {
            builder = builder.endpoint_url(endpoint);
        }

        Self::new(aws_sdk_sqs::Client::from_conf(builder.build()))
    }
}

#[async_trait]
impl QueueClient for SqsQueueClient {
    async fn resolve_queue_url(&self, queue_name: &str) -> Result<String> {
        let output = self
            .client
            .get_queue_url()
            .queue_name(queue_name)
            .send()
            .await
            .map_err(|e| {
                Error::Queue(QueueError::ResolveQueueUrl {
                    queue: queue_name.to_string(),
                    reason: e.into_service_error().to_string(),
                })
            })?;

        output
            .queue_url()
            .map(|url| url.to_string())
            .ok_or_else(|| {
                Error::Queue(QueueError::ResolveQueueUrl {
                    queue: queue_name.to_string(),
                    reason: "response carried no queue url".to_string(),
                })
            })
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: i32,
    ) -> Result<Vec<QueueMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(queue_url)
            .max_number_of_messages(max_messages)
            .send()
            .await
            .map_err(|e| Error::Queue(QueueError::Receive(e.into_service_error().to_string())))?;

        let messages = output
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| QueueMessage {
                message_id: m.message_id,
                receipt_handle: m.receipt_handle,
                body: m.body,
            })
            .collect();

        Ok(messages)
    }

    async fn delete_message(&self, queue_url: &str, receipt_handle: &str) -> Result<()> {
        self.client
            .delete_message()
            .queue_url(queue_url)
            .receipt_handle(receipt_handle)
            .send()
            .await
            .map_err(|e| Error::Queue(QueueError::Delete(e.into_service_error().to_string())))?;

        Ok(())
    }
}

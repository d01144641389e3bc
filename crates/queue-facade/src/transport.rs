//! The queue transport seam.
//!
//! A transport turns operation requests into calls against the hosted queue
//! service and hands back the raw response untouched. Signing, retries and
//! the wire protocol all live behind this trait; the facade only ever sees
//! [`RawResponse`] values.

use crate::error::TransportError;
use crate::message::{DeleteOptions, ReceiveOptions, SendOptions};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Maximum number of entries the provider accepts in one batch call
pub const MAX_BATCH_ENTRIES: usize = 10;

/// Outcome of a single transport call
pub type TransportResult = Result<RawResponse, TransportError>;

/// Response envelope as returned by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    /// HTTP-style status code
    pub status: u16,
    /// Request id reported out-of-band (e.g. `x-amzn-RequestId` header)
    pub request_id: Option<String>,
    /// Decoded response body
    pub body: Value,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            request_id: None,
            body,
        }
    }

    /// Successful (200) response with the given body
    pub fn ok(body: Value) -> Self {
        Self::new(200, body)
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Provider success predicate
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One entry of a SendMessageBatch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendBatchEntry {
    /// Chunk-local identifier
    pub id: String,
    pub message_body: String,
}

/// One entry of a DeleteMessageBatch call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteBatchEntry {
    /// Chunk-local identifier
    pub id: String,
    pub receipt_handle: String,
}

/// Operations the facade needs from the hosted queue service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QueueTransport: Send + Sync {
    async fn list_queues(&self) -> TransportResult;

    async fn create_queue(&self, name: &str) -> TransportResult;

    async fn send_message(&self, queue_url: &str, body: &str, options: &SendOptions)
        -> TransportResult;

    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: &[SendBatchEntry],
        options: &SendOptions,
    ) -> TransportResult;

    async fn receive_message(&self, queue_url: &str, options: &ReceiveOptions) -> TransportResult;

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        options: &DeleteOptions,
    ) -> TransportResult;

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        entries: &[DeleteBatchEntry],
        options: &DeleteOptions,
    ) -> TransportResult;
}

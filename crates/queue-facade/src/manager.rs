//! Queue manager façade.
//!
//! [`QueueManager`] is the single entry point for queue operations. It wraps a
//! [`QueueTransport`], normalizes every response, caches the queue directory
//! and splits oversized batches. Remote failures are reported as `false` or
//! `None`; the details of the most recent call are available through
//! [`QueueManager::errors`] and [`QueueManager::last_request_id`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use queue_facade::{
//!     DeleteOptions, InMemoryTransport, ManagerConfig, QueueManager, ReceiveOptions, SendOptions,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), queue_facade::QueueError> {
//! let manager = QueueManager::new(
//!     ManagerConfig::new("access", "secret"),
//!     Arc::new(InMemoryTransport::default()),
//! )?;
//!
//! if let Some(orders) = manager.create("orders").await? {
//!     manager.send(orders.url(), "hello", &SendOptions::new()).await;
//!
//!     if let Some(received) = manager.receive(orders.url(), &ReceiveOptions::new()).await? {
//!         for message in received.into_messages() {
//!             manager.delete(orders.url(), &message, &DeleteOptions::new()).await;
//!         }
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::batch::{self, chunk_entries, BatchOutcome};
use crate::config::ManagerConfig;
use crate::directory::{
    parse_created_queue_url, parse_queue_urls, DirectoryCache, QueueDirectory, QueueHandle,
};
use crate::error::QueueError;
use crate::message::{
    AsReceiptHandle, DeleteOptions, Message, ReceiveOptions, Received, SendOptions,
};
use crate::response::{one_or_many, result_node, OperationError, ResponseNormalizer};
use crate::transport::{DeleteBatchEntry, QueueTransport, SendBatchEntry};
use std::sync::Arc;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;

/// Façade over a hosted message queue service
pub struct QueueManager {
    transport: Arc<dyn QueueTransport>,
    config: ManagerConfig,
    normalizer: ResponseNormalizer,
    directory: DirectoryCache,
}

impl QueueManager {
    /// Create a manager, validating the configured credentials
    ///
    /// A missing or empty access key or secret key fails with
    /// [`QueueError::ConfigurationError`].
    pub fn new(config: ManagerConfig, transport: Arc<dyn QueueTransport>) -> Result<Self, QueueError> {
        config.validate()?;

        Ok(Self {
            transport,
            config,
            normalizer: ResponseNormalizer::new(),
            directory: DirectoryCache::default(),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn table_prefix(&self) -> Option<&str> {
        self.config.table_prefix.as_deref()
    }

    // ========================================================================
    // Directory
    // ========================================================================

    /// Get the queue directory, building it on first use
    ///
    /// With `refresh` the directory is rebuilt from a fresh listing. Returns
    /// `Ok(None)` when the listing call fails; a previously built directory
    /// is kept in that case.
    pub async fn list(&self, refresh: bool) -> Result<Option<Arc<QueueDirectory>>, QueueError> {
        if !refresh {
            if let Some(directory) = self.directory.snapshot().await {
                return Ok(Some(directory));
            }
        }

        let normalized = self.normalizer.normalize(self.transport.list_queues().await);
        let Some(payload) = normalized.payload() else {
            return Ok(None);
        };

        let urls = parse_queue_urls(payload)?;
        let directory = QueueDirectory::from_urls(&urls)
            .map_err(|e| QueueError::malformed("ListQueues", e.to_string()))?;

        debug!(queues = directory.len(), refresh, "Built queue directory");
        Ok(Some(self.directory.replace(directory).await))
    }

    /// Create a queue and add it to the directory
    ///
    /// Returns `Ok(None)` when the provider rejects the request.
    pub async fn create(&self, name: &str) -> Result<Option<QueueHandle>, QueueError> {
        let normalized = self
            .normalizer
            .normalize(self.transport.create_queue(name).await);
        let Some(payload) = normalized.payload() else {
            return Ok(None);
        };

        let url = parse_created_queue_url(payload)?;
        let handle = QueueHandle::from_url(&url)
            .map_err(|e| QueueError::malformed("CreateQueue", e.to_string()))?;

        if self.list(false).await?.is_none() {
            warn!(
                queue = %handle.name(),
                "Queue directory unavailable, created queue was not cached"
            );
            return Ok(Some(handle));
        }

        self.directory.insert(handle.clone()).await;
        Ok(Some(handle))
    }

    /// Look up a queue by name in the cached directory
    ///
    /// Fails with [`QueueError::DirectoryUnavailable`] until the directory
    /// has been built once by [`list`](Self::list) or [`create`](Self::create).
    pub async fn queue(&self, name: &str) -> Result<Option<QueueHandle>, QueueError> {
        let directory = self
            .directory
            .snapshot()
            .await
            .ok_or(QueueError::DirectoryUnavailable)?;
        Ok(directory.get(name).cloned())
    }

    // ========================================================================
    // Messages
    // ========================================================================

    pub async fn send(&self, queue_url: &str, body: &str, options: &SendOptions) -> bool {
        self.normalizer
            .normalize(self.transport.send_message(queue_url, body, options).await)
            .is_success()
    }

    /// Send any number of messages; true only if every chunk call succeeded
    pub async fn send_batch<T: AsRef<str>>(
        &self,
        queue_url: &str,
        bodies: &[T],
        options: &SendOptions,
    ) -> bool {
        self.send_batch_detailed(queue_url, bodies, options)
            .await
            .all_succeeded()
    }

    pub async fn send_batch_detailed<T: AsRef<str>>(
        &self,
        queue_url: &str,
        bodies: &[T],
        options: &SendOptions,
    ) -> BatchOutcome {
        let chunks = chunk_entries(bodies, |id, body| SendBatchEntry {
            id,
            message_body: body.as_ref().to_string(),
        });

        let transport = self.transport.as_ref();
        batch::dispatch(
            &self.normalizer,
            "SendMessageBatch",
            "SendMessageBatchResult",
            chunks,
            move |entries| async move {
                transport
                    .send_message_batch(queue_url, &entries, options)
                    .await
            },
        )
        .await
    }

    /// Receive messages from a queue
    ///
    /// Without `max_messages` the result is `Received::Single` holding the
    /// last returned message, or `None` when the queue returned nothing. With
    /// `max_messages` it is always `Received::Many`, possibly empty. Remote
    /// failures return `Ok(None)`.
    pub async fn receive(
        &self,
        queue_url: &str,
        options: &ReceiveOptions,
    ) -> Result<Option<Received>, QueueError> {
        let normalized = self
            .normalizer
            .normalize(self.transport.receive_message(queue_url, options).await);
        let Some(payload) = normalized.payload() else {
            return Ok(None);
        };

        let result = result_node(payload, "ReceiveMessageResult");
        let envelopes = match result.get("Messages") {
            Some(messages) => one_or_many(Some(messages)),
            None => one_or_many(result.get("Message")),
        };

        let mut messages = envelopes
            .into_iter()
            .map(Message::from_envelope)
            .collect::<Result<Vec<_>, _>>()?;

        if options.max_messages.is_some() {
            return Ok(Some(Received::Many(messages)));
        }
        Ok(messages.pop().map(Received::Single))
    }

    /// Delete a received message by `Message` or raw receipt handle
    pub async fn delete(
        &self,
        queue_url: &str,
        message: impl AsReceiptHandle,
        options: &DeleteOptions,
    ) -> bool {
        self.normalizer
            .normalize(
                self.transport
                    .delete_message(queue_url, message.receipt_handle(), options)
                    .await,
            )
            .is_success()
    }

    /// Delete any number of messages; true only if every chunk call succeeded
    pub async fn delete_batch<T: AsReceiptHandle>(
        &self,
        queue_url: &str,
        messages: &[T],
        options: &DeleteOptions,
    ) -> bool {
        self.delete_batch_detailed(queue_url, messages, options)
            .await
            .all_succeeded()
    }

    pub async fn delete_batch_detailed<T: AsReceiptHandle>(
        &self,
        queue_url: &str,
        messages: &[T],
        options: &DeleteOptions,
    ) -> BatchOutcome {
        let chunks = chunk_entries(messages, |id, message| DeleteBatchEntry {
            id,
            receipt_handle: message.receipt_handle().to_string(),
        });

        let transport = self.transport.as_ref();
        batch::dispatch(
            &self.normalizer,
            "DeleteMessageBatch",
            "DeleteMessageBatchResult",
            chunks,
            move |entries| async move {
                transport
                    .delete_message_batch(queue_url, &entries, options)
                    .await
            },
        )
        .await
    }

    // ========================================================================
    // Call state
    // ========================================================================

    /// Error of the most recent call, `None` if it succeeded
    pub fn errors(&self) -> Option<OperationError> {
        self.normalizer.last_error()
    }

    /// Request id of the most recent call
    pub fn last_request_id(&self) -> String {
        self.normalizer.last_request_id()
    }
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("config", &self.config)
            .field("directory", &self.directory)
            .finish()
    }
}

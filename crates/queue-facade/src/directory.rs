//! Queue handles and the cached queue directory.
//!
//! The directory maps queue names to [`QueueHandle`]s. It is built from the
//! provider's queue listing the first time it is needed and replaced as a
//! whole on refresh: a rebuild assembles a fresh [`QueueDirectory`] and swaps
//! it in under the write lock, so readers holding a snapshot never observe a
//! partially populated directory.
//!
//! ## Listing envelope
//!
//! The provider returns the URL list under one of two keys depending on the
//! protocol variant in use, and both are accepted:
//!
//! - `{"QueueUrls": ["https://..", ..]}` (JSON protocol)
//! - `{"ListQueuesResult": {"QueueUrl": [..] | ".."}}` (query protocol)
//!
//! A listing with neither key means the account has no queues.

use crate::error::{QueueError, ValidationError};
use crate::response::{one_or_many, result_node};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use url::Url;

#[cfg(test)]
#[path = "directory_tests.rs"]
mod tests;

/// Name and URL of a remote queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct QueueHandle {
    name: String,
    url: String,
}

impl QueueHandle {
    /// Derive a handle from a queue URL
    ///
    /// The name is the last non-empty path segment of the URL.
    pub fn from_url(url: &str) -> Result<Self, ValidationError> {
        let parsed = Url::parse(url).map_err(|e| ValidationError::InvalidFormat {
            field: "queue_url".to_string(),
            message: format!("'{}' is not a valid URL: {}", url, e),
        })?;

        let name = parsed
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).last())
            .ok_or_else(|| ValidationError::InvalidFormat {
                field: "queue_url".to_string(),
                message: format!("'{}' has no queue name segment", url),
            })?;

        Ok(Self {
            name: name.to_string(),
            url: url.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.url)
    }
}

/// Case-sensitive mapping from queue name to handle, ordered by name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueDirectory {
    queues: BTreeMap<String, QueueHandle>,
}

impl QueueDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a directory with one handle per URL
    ///
    /// When two URLs end in the same name the later one wins.
    pub fn from_urls<I, S>(urls: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut directory = Self::new();
        for url in urls {
            directory.insert(QueueHandle::from_url(url.as_ref())?);
        }
        Ok(directory)
    }

    /// Add or replace the handle stored under its name
    pub fn insert(&mut self, handle: QueueHandle) -> Option<QueueHandle> {
        self.queues.insert(handle.name.clone(), handle)
    }

    pub fn get(&self, name: &str) -> Option<&QueueHandle> {
        self.queues.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queues.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueHandle> {
        self.queues.values()
    }

    pub fn len(&self) -> usize {
        self.queues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }
}

/// Shared, atomically replaceable directory slot
///
/// `None` until the first successful build.
#[derive(Debug, Default)]
pub(crate) struct DirectoryCache {
    slot: RwLock<Option<Arc<QueueDirectory>>>,
}

impl DirectoryCache {
    pub(crate) async fn snapshot(&self) -> Option<Arc<QueueDirectory>> {
        self.slot.read().await.clone()
    }

    pub(crate) async fn replace(&self, directory: QueueDirectory) -> Arc<QueueDirectory> {
        let directory = Arc::new(directory);
        *self.slot.write().await = Some(Arc::clone(&directory));
        directory
    }

    /// Insert into the current directory; returns false if none is built
    pub(crate) async fn insert(&self, handle: QueueHandle) -> bool {
        let mut slot = self.slot.write().await;
        match slot.as_mut() {
            Some(directory) => {
                // Copy-on-write: outstanding snapshots keep the old contents
                Arc::make_mut(directory).insert(handle);
                true
            }
            None => false,
        }
    }
}

/// Extract the queue URL list from a ListQueues payload
pub(crate) fn parse_queue_urls(payload: &Value) -> Result<Vec<String>, QueueError> {
    let urls = match payload.get("QueueUrls") {
        Some(urls) => one_or_many(Some(urls)),
        None => one_or_many(result_node(payload, "ListQueuesResult").get("QueueUrl")),
    };

    urls.into_iter()
        .map(|url| {
            url.as_str().map(str::to_string).ok_or_else(|| {
                QueueError::malformed("ListQueues", format!("queue URL {} is not a string", url))
            })
        })
        .collect()
}

/// Extract the queue URL from a CreateQueue payload
pub(crate) fn parse_created_queue_url(payload: &Value) -> Result<String, QueueError> {
    result_node(payload, "CreateQueueResult")
        .get("QueueUrl")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| QueueError::malformed("CreateQueue", "QueueUrl not found in response"))
}

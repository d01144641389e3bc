//! Batch chunking and dispatch.
//!
//! The provider accepts at most [`MAX_BATCH_ENTRIES`] entries per batch call.
//! Larger inputs are split into consecutive chunks, preserving order, and each
//! entry gets a chunk-local id (`"0"`..`"9"`, restarting in every chunk).
//!
//! Every chunk is dispatched, even after an earlier chunk failed. Each chunk
//! response goes through the manager's normalizer, so once a batch operation
//! returns, the recorded request id and error describe the last chunk only.
//! [`BatchOutcome`] keeps the per-chunk view.

use crate::message::scalar_text;
use crate::response::{one_or_many, result_node, OperationError, ResponseNormalizer};
use crate::transport::{TransportResult, MAX_BATCH_ENTRIES};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "batch_tests.rs"]
mod tests;

/// Entry the provider rejected inside an otherwise successful chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntryFailure {
    /// Chunk-local id of the entry
    pub id: String,
    pub code: String,
    pub message: String,
    pub sender_fault: bool,
}

/// Outcome of one chunk call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutcome {
    /// Position of the chunk in dispatch order
    pub index: usize,
    /// Number of entries sent in the chunk
    pub entries: usize,
    pub request_id: String,
    /// Set when the chunk call itself failed
    pub error: Option<OperationError>,
    pub failed_entries: Vec<BatchEntryFailure>,
}

impl ChunkOutcome {
    /// Whether the chunk call normalized as success
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-chunk outcomes of a batch operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    chunks: Vec<ChunkOutcome>,
}

impl BatchOutcome {
    /// True when every chunk call succeeded (vacuously true for no chunks)
    pub fn all_succeeded(&self) -> bool {
        self.chunks.iter().all(ChunkOutcome::is_success)
    }

    pub fn chunks(&self) -> &[ChunkOutcome] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Chunks whose call failed
    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkOutcome> {
        self.chunks.iter().filter(|c| !c.is_success())
    }

    /// Entry-level failures across all chunks, with their chunk index
    pub fn failed_entries(&self) -> impl Iterator<Item = (usize, &BatchEntryFailure)> {
        self.chunks
            .iter()
            .flat_map(|c| c.failed_entries.iter().map(move |f| (c.index, f)))
    }
}

/// Split `items` into provider-sized chunks of wrapped entries
///
/// `wrap` receives the chunk-local id and the item.
pub fn chunk_entries<T, E, F>(items: &[T], wrap: F) -> Vec<Vec<E>>
where
    F: Fn(String, &T) -> E,
{
    items
        .chunks(MAX_BATCH_ENTRIES)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .map(|(local_id, item)| wrap(local_id.to_string(), item))
                .collect()
        })
        .collect()
}

/// Send every chunk through `call` and fold the normalized outcomes
///
/// `result_key` names the query-protocol result element of the operation
/// (e.g. `SendMessageBatchResult`).
pub(crate) async fn dispatch<E, F, Fut>(
    normalizer: &ResponseNormalizer,
    operation: &str,
    result_key: &str,
    chunks: Vec<Vec<E>>,
    mut call: F,
) -> BatchOutcome
where
    F: FnMut(Vec<E>) -> Fut,
    Fut: Future<Output = TransportResult>,
{
    let total = chunks.len();
    let mut outcome = BatchOutcome::default();

    for (index, entries) in chunks.into_iter().enumerate() {
        let size = entries.len();
        debug!(operation, chunk = index, of = total, entries = size, "Dispatching batch chunk");

        let normalized = normalizer.normalize(call(entries).await);

        let failed_entries = normalized
            .payload()
            .map(|payload| parse_failed_entries(result_node(payload, result_key)))
            .unwrap_or_default();

        if !failed_entries.is_empty() {
            warn!(
                operation,
                chunk = index,
                request_id = %normalized.request_id(),
                failed = failed_entries.len(),
                "Provider rejected entries in batch chunk"
            );
        }

        outcome.chunks.push(ChunkOutcome {
            index,
            entries: size,
            request_id: normalized.request_id().to_string(),
            error: normalized.error().cloned(),
            failed_entries,
        });
    }

    outcome
}

/// Read `Failed` (JSON protocol) or `BatchResultErrorEntry` (query protocol)
fn parse_failed_entries(result: &Value) -> Vec<BatchEntryFailure> {
    let entries = match result.get("Failed") {
        Some(failed) => one_or_many(Some(failed)),
        None => one_or_many(result.get("BatchResultErrorEntry")),
    };

    entries
        .into_iter()
        .map(|entry| {
            let text = |field: &str| entry.get(field).and_then(scalar_text).unwrap_or_default();
            BatchEntryFailure {
                id: text("Id"),
                code: text("Code"),
                message: text("Message"),
                sender_fault: text("SenderFault") == "true",
            }
        })
        .collect()
}

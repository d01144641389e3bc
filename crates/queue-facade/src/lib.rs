//! # Queue Facade
//!
//! Normalizing façade over hosted message-queue services (SQS and
//! SQS-compatible endpoints).
//!
//! This library provides:
//! - A lazily built, case-sensitive queue directory keyed by queue name
//! - Send, receive and delete operations reporting remote failures as
//!   `false` / `None` instead of errors
//! - Transparent splitting of batch sends and deletes into provider-sized
//!   chunks
//! - The request id and error of the most recent call
//! - An in-memory transport for tests and local development
//!
//! ## Module Organization
//!
//! - [`manager`] - The [`QueueManager`] façade
//! - [`directory`] - Queue handles and the cached directory
//! - [`batch`] - Chunking and per-chunk outcomes
//! - [`response`] - Response normalization and call state
//! - [`message`] - Received messages, attributes and operation options
//! - [`transport`] - The transport trait the manager talks to
//! - [`transports`] - Transport implementations
//! - [`config`] - Manager configuration and credential handling
//! - [`error`] - Error types for local faults

// Module declarations
pub mod batch;
pub mod config;
pub mod directory;
pub mod error;
pub mod manager;
pub mod message;
pub mod response;
pub mod transport;
pub mod transports;

// Re-export commonly used types at crate root for convenience
pub use batch::{BatchEntryFailure, BatchOutcome, ChunkOutcome};
pub use config::{Credential, ManagerConfig};
pub use directory::{QueueDirectory, QueueHandle};
pub use error::{ConfigurationError, QueueError, TransportError, ValidationError};
pub use manager::QueueManager;
pub use message::{
    AsReceiptHandle, DeleteOptions, Message, MessageAttribute, MessageAttributes, ReceiveOptions,
    Received, SendOptions,
};
pub use response::{NormalizedResponse, OperationError, ResponseNormalizer};
pub use transport::{
    DeleteBatchEntry, QueueTransport, RawResponse, SendBatchEntry, TransportResult,
    MAX_BATCH_ENTRIES,
};
pub use transports::{InMemoryConfig, InMemoryTransport};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

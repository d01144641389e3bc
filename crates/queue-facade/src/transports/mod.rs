//! Queue transport implementations.
//!
//! This module contains concrete implementations of the
//! [`QueueTransport`](crate::transport::QueueTransport) trait.

pub mod memory;

pub use memory::{
    body_digest, message_attributes_digest, EnvelopeStyle, InMemoryConfig, InMemoryTransport,
};

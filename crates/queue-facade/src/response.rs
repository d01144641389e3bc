//! Response normalization.
//!
//! Every transport call made by the manager passes through a
//! [`ResponseNormalizer`], which turns the raw provider response into a
//! [`NormalizedResponse`] and records the request id and error of the call.
//! The recorded values are replaced on every call; they describe the most
//! recent call only.
//!
//! ## Error envelopes
//!
//! Two failure envelopes are recognised:
//!
//! - query protocol: `{"Error": {"Code": .., "Message": ..}, "RequestId": ..}`,
//!   optionally wrapped in `ErrorResponse`
//! - JSON protocol: `{"__type": "com.amazonaws.sqs#QueueDoesNotExist", "message": ..}`

use crate::error::TransportError;
use crate::message::scalar_text;
use crate::transport::{RawResponse, TransportResult};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::error;

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;

/// Channel attached to every logged operation failure
pub const LOG_CHANNEL: &str = "sqs";

const UNKNOWN_CODE: &str = "Unknown";
const UNKNOWN_MESSAGE: &str = "Unknown error";

/// Structured description of a failed call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    pub request_id: String,
    pub code: String,
    pub message: String,
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.request_id, self.code, self.message)
    }
}

/// A transport response classified as success or failure
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedResponse {
    request_id: String,
    outcome: Result<Value, OperationError>,
}

impl NormalizedResponse {
    fn success(request_id: String, payload: Value) -> Self {
        Self {
            request_id,
            outcome: Ok(payload),
        }
    }

    fn failure(error: OperationError) -> Self {
        Self {
            request_id: error.request_id.clone(),
            outcome: Err(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Accepted payload; `None` on failure
    pub fn payload(&self) -> Option<&Value> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.outcome.as_ref().err()
    }
}

#[derive(Debug, Default)]
struct CallState {
    last_request_id: String,
    last_error: Option<OperationError>,
}

/// Normalizes transport responses and remembers the latest call's outcome
#[derive(Debug, Default)]
pub struct ResponseNormalizer {
    state: RwLock<CallState>,
}

impl ResponseNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Classify a transport outcome and record its request id and error
    ///
    /// Remote failures never surface as Rust errors; inspect
    /// [`NormalizedResponse::is_success`].
    pub fn normalize(&self, outcome: TransportResult) -> NormalizedResponse {
        let normalized = match outcome {
            Ok(raw) => Self::classify(raw),
            Err(e) => Self::transport_failure(&e),
        };

        if let Some(failure) = normalized.error() {
            error!(
                channel = LOG_CHANNEL,
                request_id = %failure.request_id,
                code = %failure.code,
                "{}",
                failure
            );
        }

        let mut state = self.write_state();
        state.last_request_id = normalized.request_id.clone();
        state.last_error = normalized.error().cloned();

        normalized
    }

    /// Request id of the most recent call (empty when none was reported)
    pub fn last_request_id(&self) -> String {
        self.read_state().last_request_id.clone()
    }

    /// Error of the most recent call, `None` if it succeeded
    pub fn last_error(&self) -> Option<OperationError> {
        self.read_state().last_error.clone()
    }

    fn classify(raw: RawResponse) -> NormalizedResponse {
        let request_id = extract_request_id(&raw);

        if raw.is_success() {
            return NormalizedResponse::success(request_id, raw.body);
        }

        let envelope = raw.body.get("ErrorResponse").unwrap_or(&raw.body);
        let (code, message) = match envelope.get("Error") {
            Some(error) => (
                error.get("Code").and_then(scalar_text),
                error.get("Message").and_then(scalar_text),
            ),
            None => (
                envelope
                    .get("__type")
                    .and_then(Value::as_str)
                    .and_then(|t| t.rsplit('#').next())
                    .map(str::to_string),
                envelope
                    .get("message")
                    .or_else(|| envelope.get("Message"))
                    .and_then(scalar_text),
            ),
        };

        NormalizedResponse::failure(OperationError {
            request_id,
            code: code.unwrap_or_else(|| UNKNOWN_CODE.to_string()),
            message: message.unwrap_or_else(|| UNKNOWN_MESSAGE.to_string()),
        })
    }

    fn transport_failure(error: &TransportError) -> NormalizedResponse {
        NormalizedResponse::failure(OperationError {
            request_id: String::new(),
            code: error.code().to_string(),
            message: error.to_string(),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, CallState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, CallState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn extract_request_id(raw: &RawResponse) -> String {
    if let Some(id) = &raw.request_id {
        return id.clone();
    }

    [
        "/ResponseMetadata/RequestId",
        "/RequestId",
        "/ErrorResponse/RequestId",
    ]
    .iter()
    .find_map(|pointer| raw.body.pointer(pointer).and_then(scalar_text))
    .unwrap_or_default()
}

/// Unwrap a query-protocol `<Operation>Result` element when present
pub(crate) fn result_node<'a>(payload: &'a Value, result_key: &str) -> &'a Value {
    payload.get(result_key).unwrap_or(payload)
}

/// Provider lists arrive as arrays, or as a bare element when there is one
pub(crate) fn one_or_many(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item) => vec![item],
    }
}

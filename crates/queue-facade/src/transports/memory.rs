//! In-memory queue transport for testing and development.
//!
//! This module provides a fully functional in-process implementation of
//! [`QueueTransport`] that:
//! - Creates and lists queues with provider-style URLs
//! - Stores messages with body digests, system attributes and custom
//!   message attributes
//! - Hides received messages for their visibility timeout
//! - Enforces the provider's batch limits and reports per-entry failures
//! - Answers in either provider envelope variant (JSON or query protocol)
//! - Supports scripted failures via [`InMemoryTransport::fail_next`]
//!
//! It is intended for unit testing facade consumers and as a reference for
//! what a network transport must return.

use crate::error::TransportError;
use crate::message::{DeleteOptions, MessageAttribute, ReceiveOptions, SendOptions};
use crate::transport::{
    DeleteBatchEntry, QueueTransport, RawResponse, SendBatchEntry, TransportResult,
    MAX_BATCH_ENTRIES,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use md5::{Digest, Md5};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use tokio::sync::Mutex;
use tracing::info;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

const MAX_DELAY_SECONDS: u32 = 900;
const DEFAULT_VISIBILITY_TIMEOUT: u32 = 30;
const MAX_QUEUE_NAME_LENGTH: usize = 80;
const MAX_MESSAGE_ATTRIBUTES: usize = 10;
const RESERVED_ATTRIBUTE_PREFIXES: [&str; 2] = ["aws.", "amazon."];

/// Response body layout used by the transport
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnvelopeStyle {
    /// `{"QueueUrls": [..]}`, `{"__type": .., "message": ..}`
    #[default]
    Json,
    /// `{"ListQueuesResult": {"QueueUrl": [..]}}`, `{"Error": {..}, "RequestId": ..}`
    Query,
}

/// In-memory transport configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    pub endpoint: String,
    pub account_id: String,
    pub envelope_style: EnvelopeStyle,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:4566".to_string(),
            account_id: "000000000000".to_string(),
            envelope_style: EnvelopeStyle::Json,
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Default)]
struct TransportState {
    /// Queues keyed by name
    queues: BTreeMap<String, InMemoryQueue>,
    faults: VecDeque<InjectedFault>,
}

impl TransportState {
    fn queue_by_url(&mut self, url: &str) -> Option<&mut InMemoryQueue> {
        self.queues.values_mut().find(|q| q.url == url)
    }
}

struct InMemoryQueue {
    url: String,
    messages: VecDeque<StoredMessage>,
    /// Received messages keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
}

impl InMemoryQueue {
    fn new(url: String) -> Self {
        Self {
            url,
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }

    /// Return messages whose visibility timeout elapsed to the queue
    fn release_expired(&mut self, now: DateTime<Utc>) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, m)| m.invisible_until <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                self.messages.push_back(in_flight.message);
            }
        }
    }
}

#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: String,
    body_md5: String,
    sent_at: DateTime<Utc>,
    available_at: DateTime<Utc>,
    receive_count: u32,
    first_received_at: Option<DateTime<Utc>>,
    message_group_id: Option<String>,
    message_deduplication_id: Option<String>,
    message_attributes: BTreeMap<String, String>,
}

impl StoredMessage {
    fn new(body: &str, options: &SendOptions) -> Self {
        let now = Utc::now();
        Self {
            message_id: uuid::Uuid::new_v4().to_string(),
            body: body.to_string(),
            body_md5: body_digest(body),
            sent_at: now,
            available_at: now + Duration::seconds(i64::from(options.delay_seconds.unwrap_or(0))),
            receive_count: 0,
            first_received_at: None,
            message_group_id: options.message_group_id.clone(),
            message_deduplication_id: options.message_deduplication_id.clone(),
            message_attributes: options
                .message_attributes
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        }
    }

    /// Custom attributes selected by `requested` names
    ///
    /// `All` and `.*` select everything, `prefix.*` selects by prefix.
    fn selected_message_attributes(&self, requested: &[String]) -> BTreeMap<String, String> {
        self.message_attributes
            .iter()
            .filter(|(name, _)| {
                requested.iter().any(|pattern| match pattern.as_str() {
                    "All" | ".*" => true,
                    pattern => match pattern.strip_suffix('*') {
                        Some(prefix) => name.starts_with(prefix),
                        None => *name == pattern,
                    },
                })
            })
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }

    /// Send response fields for this message
    fn send_result(&self) -> Map<String, Value> {
        let mut result = Map::new();
        result.insert("MessageId".to_string(), json!(self.message_id));
        result.insert("MD5OfMessageBody".to_string(), json!(self.body_md5));
        if !self.message_attributes.is_empty() {
            result.insert(
                "MD5OfMessageAttributes".to_string(),
                json!(message_attributes_digest(&self.message_attributes)),
            );
        }
        result
    }

    fn attribute(&self, attribute: MessageAttribute, account_id: &str) -> Option<String> {
        match attribute {
            MessageAttribute::SenderId => Some(account_id.to_string()),
            MessageAttribute::SentTimestamp => Some(self.sent_at.timestamp_millis().to_string()),
            MessageAttribute::ApproximateReceiveCount => Some(self.receive_count.to_string()),
            MessageAttribute::ApproximateFirstReceiveTimestamp => self
                .first_received_at
                .map(|t| t.timestamp_millis().to_string()),
            MessageAttribute::MessageGroupId => self.message_group_id.clone(),
            MessageAttribute::MessageDeduplicationId => self.message_deduplication_id.clone(),
            MessageAttribute::SequenceNumber | MessageAttribute::AwsTraceHeader => None,
        }
    }
}

struct InFlightMessage {
    message: StoredMessage,
    invisible_until: DateTime<Utc>,
}

enum InjectedFault {
    Response {
        status: u16,
        code: String,
        message: String,
    },
    Transport(TransportError),
}

/// MD5 hex digest of a message body, as reported by the provider
pub fn body_digest(body: &str) -> String {
    hex::encode(Md5::digest(body.as_bytes()))
}

/// MD5 hex digest of string message attributes, as reported by the provider
///
/// Attributes are hashed in name order; each contributes its length-prefixed
/// name, the length-prefixed data type `String`, the transport type byte `1`
/// and its length-prefixed value.
pub fn message_attributes_digest(attributes: &BTreeMap<String, String>) -> String {
    fn push_prefixed(buffer: &mut Vec<u8>, bytes: &[u8]) {
        buffer.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        buffer.extend_from_slice(bytes);
    }

    let mut buffer = Vec::new();
    for (name, value) in attributes {
        push_prefixed(&mut buffer, name.as_bytes());
        push_prefixed(&mut buffer, b"String");
        buffer.push(1);
        push_prefixed(&mut buffer, value.as_bytes());
    }
    hex::encode(Md5::digest(&buffer))
}

fn is_valid_queue_name(name: &str) -> bool {
    let base = name.strip_suffix(".fifo").unwrap_or(name);
    !base.is_empty()
        && name.len() <= MAX_QUEUE_NAME_LENGTH
        && base
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

// ============================================================================
// In-Memory Transport
// ============================================================================

/// Queue transport backed by process memory
pub struct InMemoryTransport {
    config: InMemoryConfig,
    state: Mutex<TransportState>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

impl InMemoryTransport {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            config,
            state: Mutex::new(TransportState::default()),
        }
    }

    /// Answer with query-protocol envelopes instead of JSON ones
    pub fn with_query_envelopes(mut self) -> Self {
        self.config.envelope_style = EnvelopeStyle::Query;
        self
    }

    /// URL a queue with `name` has (or would have) on this transport
    pub fn queue_url(&self, name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.account_id,
            name
        )
    }

    /// Make the next call fail with a provider error response
    pub async fn fail_next(&self, status: u16, code: &str, message: &str) {
        self.state.lock().await.faults.push_back(InjectedFault::Response {
            status,
            code: code.to_string(),
            message: message.to_string(),
        });
    }

    /// Make the next call fail without producing any response
    pub async fn fail_next_with(&self, error: TransportError) {
        self.state
            .lock()
            .await
            .faults
            .push_back(InjectedFault::Transport(error));
    }

    /// Messages waiting in a queue, excluding in-flight ones
    pub async fn visible_message_count(&self, name: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(name).map_or(0, |q| q.messages.len())
    }

    /// Messages received but not yet deleted
    pub async fn in_flight_message_count(&self, name: &str) -> usize {
        let state = self.state.lock().await;
        state.queues.get(name).map_or(0, |q| q.in_flight.len())
    }

    fn new_request_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn respond(&self, operation: &str, body: Value) -> TransportResult {
        let request_id = Self::new_request_id();
        let response = match self.config.envelope_style {
            EnvelopeStyle::Json => RawResponse::ok(body).with_request_id(request_id),
            EnvelopeStyle::Query => {
                let mut envelope = Map::new();
                envelope.insert(format!("{}Result", operation), to_query_shape(operation, body));
                envelope.insert(
                    "ResponseMetadata".to_string(),
                    json!({ "RequestId": request_id }),
                );
                RawResponse::ok(Value::Object(envelope))
            }
        };
        Ok(response)
    }

    fn reject(&self, status: u16, code: &str, message: &str) -> TransportResult {
        let request_id = Self::new_request_id();
        let response = match self.config.envelope_style {
            EnvelopeStyle::Json => RawResponse::new(
                status,
                json!({
                    "__type": format!("com.amazonaws.sqs#{}", code),
                    "message": message
                }),
            )
            .with_request_id(request_id),
            EnvelopeStyle::Query => RawResponse::new(
                status,
                json!({
                    "Error": {
                        "Type": if status < 500 { "Sender" } else { "Receiver" },
                        "Code": code,
                        "Message": message
                    },
                    "RequestId": request_id
                }),
            ),
        };
        Ok(response)
    }

    fn injected(&self, state: &mut TransportState) -> Option<TransportResult> {
        state.faults.pop_front().map(|fault| match fault {
            InjectedFault::Response {
                status,
                code,
                message,
            } => self.reject(status, &code, &message),
            InjectedFault::Transport(error) => Err(error),
        })
    }

    fn non_existent_queue(&self) -> TransportResult {
        self.reject(
            400,
            "AWS.SimpleQueueService.NonExistentQueue",
            "The specified queue does not exist for this wsdl version.",
        )
    }

    /// Shared batch request checks; returns the rejection if any
    fn check_batch_ids<'a>(&self, ids: impl Iterator<Item = &'a str>) -> Option<TransportResult> {
        let ids: Vec<&str> = ids.collect();
        if ids.is_empty() {
            return Some(self.reject(
                400,
                "AWS.SimpleQueueService.EmptyBatchRequest",
                "There should be at least one entry in the request.",
            ));
        }
        if ids.len() > MAX_BATCH_ENTRIES {
            return Some(self.reject(
                400,
                "AWS.SimpleQueueService.TooManyEntriesInBatchRequest",
                &format!("Maximum number of entries per request are {}.", MAX_BATCH_ENTRIES),
            ));
        }
        let distinct: HashSet<&str> = ids.iter().copied().collect();
        if distinct.len() != ids.len() {
            return Some(self.reject(
                400,
                "AWS.SimpleQueueService.BatchEntryIdsNotDistinct",
                "Two or more batch entries in the request have the same Id.",
            ));
        }
        None
    }

    fn validate_send(body: &str, options: &SendOptions) -> Result<(), String> {
        if body.is_empty() {
            return Err("The request must contain the parameter MessageBody.".to_string());
        }
        if options.delay_seconds.is_some_and(|d| d > MAX_DELAY_SECONDS) {
            return Err(format!(
                "Value for parameter DelaySeconds is invalid. Reason: must be between 0 and {}.",
                MAX_DELAY_SECONDS
            ));
        }
        if options.message_attributes.len() > MAX_MESSAGE_ATTRIBUTES {
            return Err(format!(
                "Number of message attributes [{}] exceeds the allowed maximum [{}].",
                options.message_attributes.len(),
                MAX_MESSAGE_ATTRIBUTES
            ));
        }
        for name in options.message_attributes.keys() {
            let lower = name.to_ascii_lowercase();
            if name.is_empty() || RESERVED_ATTRIBUTE_PREFIXES.iter().any(|p| lower.starts_with(p)) {
                return Err(format!("Message attribute name '{}' is reserved or empty.", name));
            }
        }
        Ok(())
    }

    /// Delete calls accept no extra request parameters
    fn check_delete_options(&self, options: &DeleteOptions) -> Option<TransportResult> {
        options.parameters.keys().next().map(|name| {
            self.reject(
                400,
                "InvalidParameterValue",
                &format!("Parameter {} is not recognized for this operation.", name),
            )
        })
    }
}

/// Rewrite a JSON-protocol body into the equivalent query-protocol result
fn to_query_shape(operation: &str, body: Value) -> Value {
    let fields = match body {
        Value::Object(fields) => fields,
        other => return other,
    };

    let mut shaped = Map::new();
    for (key, value) in fields {
        let (key, value) = match key.as_str() {
            "QueueUrls" => ("QueueUrl".to_string(), value),
            "Messages" => ("Message".to_string(), messages_to_query_shape(value)),
            "Successful" => (format!("{}ResultEntry", operation), value),
            "Failed" => ("BatchResultErrorEntry".to_string(), value),
            _ => (key, value),
        };
        shaped.insert(key, value);
    }
    Value::Object(shaped)
}

fn messages_to_query_shape(messages: Value) -> Value {
    let messages = match messages {
        Value::Array(messages) => messages,
        other => return other,
    };

    let shaped = messages
        .into_iter()
        .map(|mut message| {
            if let Some(Value::Object(attributes)) = message.get_mut("Attributes").map(Value::take) {
                message["Attributes"] = name_value_pairs(attributes);
            }
            if let Some(Value::Object(custom)) = message
                .as_object_mut()
                .and_then(|fields| fields.remove("MessageAttributes"))
            {
                message["MessageAttribute"] = name_value_pairs(custom);
            }
            message
        })
        .collect();
    Value::Array(shaped)
}

fn name_value_pairs(fields: Map<String, Value>) -> Value {
    fields
        .into_iter()
        .map(|(name, value)| json!({ "Name": name, "Value": value }))
        .collect()
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn list_queues(&self) -> TransportResult {
        let mut state = self.state.lock().await;
        if let Some(fault) = self.injected(&mut state) {
            return fault;
        }

        let urls: Vec<&str> = state.queues.values().map(|q| q.url.as_str()).collect();
        if urls.is_empty() {
            return self.respond("ListQueues", json!({}));
        }
        self.respond("ListQueues", json!({ "QueueUrls": urls }))
    }

    async fn create_queue(&self, name: &str) -> TransportResult {
        let mut state = self.state.lock().await;
        if let Some(fault) = self.injected(&mut state) {
            return fault;
        }

        if !is_valid_queue_name(name) {
            return self.reject(
                400,
                "InvalidParameterValue",
                "Can only include alphanumeric characters, hyphens, or underscores. 1 to 80 in length",
            );
        }

        let url = self.queue_url(name);
        state.queues.entry(name.to_string()).or_insert_with(|| {
            info!(queue = %name, url = %url, "Created in-memory queue");
            InMemoryQueue::new(url.clone())
        });

        self.respond("CreateQueue", json!({ "QueueUrl": url }))
    }

    async fn send_message(
        &self,
        queue_url: &str,
        body: &str,
        options: &SendOptions,
    ) -> TransportResult {
        let mut state = self.state.lock().await;
        if let Some(fault) = self.injected(&mut state) {
            return fault;
        }

        if let Err(message) = Self::validate_send(body, options) {
            return self.reject(400, "InvalidParameterValue", &message);
        }

        let Some(queue) = state.queue_by_url(queue_url) else {
            return self.non_existent_queue();
        };

        let stored = StoredMessage::new(body, options);
        let response = Value::Object(stored.send_result());
        queue.messages.push_back(stored);

        self.respond("SendMessage", response)
    }

    async fn send_message_batch(
        &self,
        queue_url: &str,
        entries: &[SendBatchEntry],
        options: &SendOptions,
    ) -> TransportResult {
        let mut state = self.state.lock().await;
        if let Some(fault) = self.injected(&mut state) {
            return fault;
        }

        if let Some(rejection) = self.check_batch_ids(entries.iter().map(|e| e.id.as_str())) {
            return rejection;
        }

        let Some(queue) = state.queue_by_url(queue_url) else {
            return self.non_existent_queue();
        };

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for entry in entries {
            match Self::validate_send(&entry.message_body, options) {
                Ok(()) => {
                    let stored = StoredMessage::new(&entry.message_body, options);
                    let mut result = stored.send_result();
                    result.insert("Id".to_string(), json!(entry.id));
                    successful.push(Value::Object(result));
                    queue.messages.push_back(stored);
                }
                Err(message) => failed.push(json!({
                    "Id": entry.id,
                    "Code": "InvalidParameterValue",
                    "Message": message,
                    "SenderFault": true
                })),
            }
        }

        self.respond(
            "SendMessageBatch",
            json!({ "Successful": successful, "Failed": failed }),
        )
    }

    async fn receive_message(&self, queue_url: &str, options: &ReceiveOptions) -> TransportResult {
        let mut state = self.state.lock().await;
        if let Some(fault) = self.injected(&mut state) {
            return fault;
        }

        let max_messages = options.max_messages.unwrap_or(1);
        if !(1..=MAX_BATCH_ENTRIES as u32).contains(&max_messages) {
            return self.reject(
                400,
                "ReadCountOutOfRange",
                &format!(
                    "Value {} for parameter MaxNumberOfMessages is invalid. Reason: must be between 1 and {}.",
                    max_messages, MAX_BATCH_ENTRIES
                ),
            );
        }

        let Some(queue) = state.queue_by_url(queue_url) else {
            return self.non_existent_queue();
        };

        let now = Utc::now();
        queue.release_expired(now);

        let visibility = options
            .visibility_timeout
            .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT);
        let requested: Vec<MessageAttribute> = if options.attribute_names.iter().any(|n| n == "All") {
            MessageAttribute::ALL.to_vec()
        } else {
            options
                .attribute_names
                .iter()
                .filter_map(|n| MessageAttribute::from_provider_name(n))
                .collect()
        };

        let mut envelopes = Vec::new();
        let mut remaining = VecDeque::new();
        while let Some(mut message) = queue.messages.pop_front() {
            if envelopes.len() >= max_messages as usize || message.available_at > now {
                remaining.push_back(message);
                continue;
            }

            message.receive_count += 1;
            message.first_received_at.get_or_insert(now);

            let receipt_handle = uuid::Uuid::new_v4().to_string();
            let mut envelope = json!({
                "MessageId": message.message_id,
                "ReceiptHandle": receipt_handle,
                "MD5OfBody": message.body_md5,
                "Body": message.body
            });

            let attributes: Map<String, Value> = requested
                .iter()
                .filter_map(|attribute| {
                    message
                        .attribute(*attribute, &self.config.account_id)
                        .map(|value| (attribute.provider_name().to_string(), Value::String(value)))
                })
                .collect();
            if !attributes.is_empty() {
                envelope["Attributes"] = Value::Object(attributes);
            }

            let custom = message.selected_message_attributes(&options.message_attribute_names);
            if !custom.is_empty() {
                envelope["MD5OfMessageAttributes"] = json!(message_attributes_digest(&custom));
                envelope["MessageAttributes"] = custom
                    .into_iter()
                    .map(|(name, value)| {
                        (name, json!({ "DataType": "String", "StringValue": value }))
                    })
                    .collect::<Map<String, Value>>()
                    .into();
            }
            envelopes.push(envelope);

            queue.in_flight.insert(
                receipt_handle,
                InFlightMessage {
                    message,
                    invisible_until: now + Duration::seconds(i64::from(visibility)),
                },
            );
        }
        queue.messages = remaining;

        if envelopes.is_empty() {
            return self.respond("ReceiveMessage", json!({}));
        }
        self.respond("ReceiveMessage", json!({ "Messages": envelopes }))
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
        options: &DeleteOptions,
    ) -> TransportResult {
        let mut state = self.state.lock().await;
        if let Some(fault) = self.injected(&mut state) {
            return fault;
        }

        if let Some(rejection) = self.check_delete_options(options) {
            return rejection;
        }

        let Some(queue) = state.queue_by_url(queue_url) else {
            return self.non_existent_queue();
        };

        if queue.in_flight.remove(receipt_handle).is_none() {
            return self.reject(
                400,
                "ReceiptHandleIsInvalid",
                &format!("The input receipt handle \"{}\" is not valid.", receipt_handle),
            );
        }

        self.respond("DeleteMessage", json!({}))
    }

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        entries: &[DeleteBatchEntry],
        options: &DeleteOptions,
    ) -> TransportResult {
        let mut state = self.state.lock().await;
        if let Some(fault) = self.injected(&mut state) {
            return fault;
        }

        if let Some(rejection) = self
            .check_batch_ids(entries.iter().map(|e| e.id.as_str()))
            .or_else(|| self.check_delete_options(options))
        {
            return rejection;
        }

        let Some(queue) = state.queue_by_url(queue_url) else {
            return self.non_existent_queue();
        };

        let mut successful = Vec::new();
        let mut failed = Vec::new();
        for entry in entries {
            if queue.in_flight.remove(&entry.receipt_handle).is_some() {
                successful.push(json!({ "Id": entry.id }));
            } else {
                failed.push(json!({
                    "Id": entry.id,
                    "Code": "ReceiptHandleIsInvalid",
                    "Message": format!("The input receipt handle \"{}\" is not valid.", entry.receipt_handle),
                    "SenderFault": true
                }));
            }
        }

        self.respond(
            "DeleteMessageBatch",
            json!({ "Successful": successful, "Failed": failed }),
        )
    }
}

//! Message types and per-operation options.

use crate::error::QueueError;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ============================================================================
// Message Attributes
// ============================================================================

/// System attributes copied from received messages
///
/// Anything the provider sends that is not listed here is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MessageAttribute {
    SenderId,
    SentTimestamp,
    ApproximateReceiveCount,
    ApproximateFirstReceiveTimestamp,
    MessageDeduplicationId,
    MessageGroupId,
    SequenceNumber,
    AwsTraceHeader,
}

impl MessageAttribute {
    /// Every known attribute, in provider documentation order
    pub const ALL: [MessageAttribute; 8] = [
        Self::SenderId,
        Self::SentTimestamp,
        Self::ApproximateReceiveCount,
        Self::ApproximateFirstReceiveTimestamp,
        Self::MessageDeduplicationId,
        Self::MessageGroupId,
        Self::SequenceNumber,
        Self::AwsTraceHeader,
    ];

    /// Name used by the provider (PascalCase)
    pub fn provider_name(&self) -> &'static str {
        match self {
            Self::SenderId => "SenderId",
            Self::SentTimestamp => "SentTimestamp",
            Self::ApproximateReceiveCount => "ApproximateReceiveCount",
            Self::ApproximateFirstReceiveTimestamp => "ApproximateFirstReceiveTimestamp",
            Self::MessageDeduplicationId => "MessageDeduplicationId",
            Self::MessageGroupId => "MessageGroupId",
            Self::SequenceNumber => "SequenceNumber",
            Self::AwsTraceHeader => "AWSTraceHeader",
        }
    }

    /// Name exposed on [`Message`] (lowerCamelCase)
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::SenderId => "senderId",
            Self::SentTimestamp => "sentTimestamp",
            Self::ApproximateReceiveCount => "approximateReceiveCount",
            Self::ApproximateFirstReceiveTimestamp => "approximateFirstReceiveTimestamp",
            Self::MessageDeduplicationId => "messageDeduplicationId",
            Self::MessageGroupId => "messageGroupId",
            Self::SequenceNumber => "sequenceNumber",
            Self::AwsTraceHeader => "awsTraceHeader",
        }
    }

    pub fn from_provider_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.provider_name() == name)
    }

    pub fn from_field_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.field_name() == name)
    }
}

impl fmt::Display for MessageAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.field_name())
    }
}

/// Allow-listed attribute values of a received message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageAttributes {
    values: BTreeMap<MessageAttribute, String>,
}

impl MessageAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under its provider name; unknown names are ignored
    ///
    /// Returns whether the name was accepted.
    pub fn insert_provider(&mut self, provider_name: &str, value: String) -> bool {
        match MessageAttribute::from_provider_name(provider_name) {
            Some(attribute) => {
                self.values.insert(attribute, value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, attribute: MessageAttribute) -> Option<&str> {
        self.values.get(&attribute).map(String::as_str)
    }

    /// Look up by lowerCamelCase field name
    pub fn get_field(&self, field_name: &str) -> Option<&str> {
        MessageAttribute::from_field_name(field_name).and_then(|a| self.get(a))
    }

    pub fn sender_id(&self) -> Option<&str> {
        self.get(MessageAttribute::SenderId)
    }

    pub fn approximate_receive_count(&self) -> Option<u32> {
        self.get(MessageAttribute::ApproximateReceiveCount)
            .and_then(|v| v.parse().ok())
    }

    /// Milliseconds since the epoch
    pub fn sent_timestamp(&self) -> Option<i64> {
        self.get(MessageAttribute::SentTimestamp)
            .and_then(|v| v.parse().ok())
    }

    pub fn message_group_id(&self) -> Option<&str> {
        self.get(MessageAttribute::MessageGroupId)
    }

    /// Iterate as (field name, value) pairs
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.values
            .iter()
            .map(|(attribute, value)| (attribute.field_name(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message received from a queue
///
/// Deleting a message never changes this value; it only invalidates the
/// receipt handle on the service side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub body: String,
    pub body_digest: String,
    pub id: String,
    pub receipt_handle: String,
    pub attributes: MessageAttributes,
    /// Custom string attributes set by the sender
    pub message_attributes: BTreeMap<String, String>,
}

impl Message {
    /// Parse one message envelope from a receive payload
    pub(crate) fn from_envelope(envelope: &Value) -> Result<Self, QueueError> {
        let required = |field: &str| -> Result<String, QueueError> {
            envelope
                .get(field)
                .and_then(scalar_text)
                .ok_or_else(|| {
                    QueueError::malformed(
                        "ReceiveMessage",
                        format!("{} not found in message envelope", field),
                    )
                })
        };

        let mut attributes = MessageAttributes::new();
        if let Some(raw) = envelope.get("Attributes") {
            for (name, value) in attribute_pairs(raw) {
                attributes.insert_provider(&name, value);
            }
        }

        let message_attributes = envelope
            .get("MessageAttributes")
            .or_else(|| envelope.get("MessageAttribute"))
            .map(custom_attribute_pairs)
            .unwrap_or_default();

        Ok(Self {
            body: required("Body")?,
            body_digest: envelope
                .get("MD5OfBody")
                .and_then(scalar_text)
                .unwrap_or_default(),
            id: required("MessageId")?,
            receipt_handle: required("ReceiptHandle")?,
            attributes,
            message_attributes,
        })
    }
}

/// Accept both `{"Name": "Value"}` maps and `[{"Name": .., "Value": ..}]` lists
fn attribute_pairs(raw: &Value) -> Vec<(String, String)> {
    let pair = |entry: &Value| -> Option<(String, String)> {
        let name = entry.get("Name").and_then(scalar_text)?;
        let value = entry.get("Value").and_then(scalar_text)?;
        Some((name, value))
    };

    match raw {
        Value::Array(entries) => entries.iter().filter_map(pair).collect(),
        Value::Object(map) if map.contains_key("Name") => pair(raw).into_iter().collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, value)| scalar_text(value).map(|v| (name.clone(), v)))
            .collect(),
        _ => Vec::new(),
    }
}

/// Accept `{"name": {"StringValue": ..}}` maps and
/// `[{"Name": .., "Value": {"StringValue": ..}}]` lists
///
/// Attributes without a string value are skipped.
fn custom_attribute_pairs(raw: &Value) -> BTreeMap<String, String> {
    let string_value = |value: &Value| value.get("StringValue").and_then(scalar_text);
    let pair = |entry: &Value| -> Option<(String, String)> {
        let name = entry.get("Name").and_then(scalar_text)?;
        let value = entry.get("Value").and_then(string_value)?;
        Some((name, value))
    };

    match raw {
        Value::Array(entries) => entries.iter().filter_map(pair).collect(),
        Value::Object(map) if map.contains_key("Name") => pair(raw).into_iter().collect(),
        Value::Object(map) => map
            .iter()
            .filter_map(|(name, value)| string_value(value).map(|v| (name.clone(), v)))
            .collect(),
        _ => BTreeMap::new(),
    }
}

pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Anything that identifies a received message instance for deletion
pub trait AsReceiptHandle {
    fn receipt_handle(&self) -> &str;
}

impl AsReceiptHandle for Message {
    fn receipt_handle(&self) -> &str {
        &self.receipt_handle
    }
}

impl AsReceiptHandle for str {
    fn receipt_handle(&self) -> &str {
        self
    }
}

impl AsReceiptHandle for String {
    fn receipt_handle(&self) -> &str {
        self
    }
}

impl<T: AsReceiptHandle + ?Sized> AsReceiptHandle for &T {
    fn receipt_handle(&self) -> &str {
        (**self).receipt_handle()
    }
}

/// Result shape of a successful receive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// No max-messages option was given: the last message returned
    Single(Message),
    /// A max-messages option was given: every message returned, possibly none
    Many(Vec<Message>),
}

impl Received {
    /// Flatten into a list regardless of shape
    pub fn into_messages(self) -> Vec<Message> {
        match self {
            Self::Single(message) => vec![message],
            Self::Many(messages) => messages,
        }
    }

    pub fn into_single(self) -> Option<Message> {
        match self {
            Self::Single(message) => Some(message),
            Self::Many(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Single(_) => 1,
            Self::Many(messages) => messages.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Operation Options
// ============================================================================

/// Options applied when sending messages (single or batch)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Seconds before the message becomes visible
    pub delay_seconds: Option<u32>,
    /// Ordering group for FIFO queues
    pub message_group_id: Option<String>,
    /// Deduplication token for FIFO queues
    pub message_deduplication_id: Option<String>,
    /// Custom string attributes attached to the message
    pub message_attributes: HashMap<String, String>,
}

impl SendOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay_seconds(mut self, seconds: u32) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    pub fn with_message_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.message_group_id = Some(group_id.into());
        self
    }

    pub fn with_message_deduplication_id(mut self, id: impl Into<String>) -> Self {
        self.message_deduplication_id = Some(id.into());
        self
    }

    pub fn with_message_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.message_attributes.insert(key.into(), value.into());
        self
    }
}

/// Options applied when receiving messages
///
/// Setting `max_messages` changes the result shape of
/// [`QueueManager::receive`](crate::QueueManager::receive) to a list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReceiveOptions {
    pub max_messages: Option<u32>,
    pub visibility_timeout: Option<u32>,
    pub wait_time_seconds: Option<u32>,
    /// System attributes to return (provider names, or `All`)
    pub attribute_names: Vec<String>,
    /// Custom attributes to return (names, `prefix.*`, or `All`)
    pub message_attribute_names: Vec<String>,
}

impl ReceiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_messages(mut self, max: u32) -> Self {
        self.max_messages = Some(max);
        self
    }

    pub fn with_visibility_timeout(mut self, seconds: u32) -> Self {
        self.visibility_timeout = Some(seconds);
        self
    }

    pub fn with_wait_time_seconds(mut self, seconds: u32) -> Self {
        self.wait_time_seconds = Some(seconds);
        self
    }

    pub fn with_attribute(mut self, attribute: MessageAttribute) -> Self {
        self.attribute_names
            .push(attribute.provider_name().to_string());
        self
    }

    pub fn with_all_attributes(mut self) -> Self {
        self.attribute_names = vec!["All".to_string()];
        self
    }

    pub fn with_message_attribute_name(mut self, name: impl Into<String>) -> Self {
        self.message_attribute_names.push(name.into());
        self
    }

    pub fn with_all_message_attributes(mut self) -> Self {
        self.message_attribute_names = vec!["All".to_string()];
        self
    }
}

/// Options applied when deleting messages (single or batch)
///
/// The provider's delete calls define no parameters beyond the receipt
/// handle. Extra request parameters set here are forwarded to the transport
/// unchanged, which decides whether it accepts them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOptions {
    pub parameters: BTreeMap<String, String>,
}

impl DeleteOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

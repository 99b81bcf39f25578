use crate::error::ClassificationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::borrow::Cow;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Token proving the holder received the message under a peek-lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LockToken(pub Uuid);

/// Transport envelope for one queued payload.
///
/// The worker only ever interprets `body`; the other fields belong to the
/// queue transport and travel with the message into the dead-letter sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: MessageId,
    #[serde(serialize_with = "serialize_body", deserialize_with = "deserialize_body")]
    pub body: Vec<u8>,
    /// Set only on messages obtained through `receive`; peeked copies carry none.
    pub lock_token: Option<LockToken>,
    pub delivery_count: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl RawMessage {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            id: MessageId::new(),
            body: body.into(),
            lock_token: None,
            delivery_count: 0,
            enqueued_at: Utc::now(),
        }
    }

    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}

fn serialize_body<S>(body: &[u8], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&String::from_utf8_lossy(body))
}

fn deserialize_body<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    Ok(text.into_bytes())
}

/// Machine-readable category of a dead-lettered message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    MalformedPayload,
    UnknownMessageType,
    StorageExhausted,
    Unanticipated,
    DeliveryLimitExceeded,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::MalformedPayload => "MalformedPayload",
            FailureKind::UnknownMessageType => "UnknownMessageType",
            FailureKind::StorageExhausted => "StorageExhausted",
            FailureKind::Unanticipated => "Unanticipated",
            FailureKind::DeliveryLimitExceeded => "DeliveryLimitExceeded",
        };
        f.write_str(name)
    }
}

impl From<&ClassificationError> for FailureKind {
    fn from(error: &ClassificationError) -> Self {
        match error {
            ClassificationError::MalformedPayload(_) => FailureKind::MalformedPayload,
            ClassificationError::UnknownMessageType(_) => FailureKind::UnknownMessageType,
        }
    }
}

/// A message parked outside the live queue together with why it was parked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    pub message: RawMessage,
    pub kind: FailureKind,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

impl DeadLetterRecord {
    pub fn new(message: RawMessage, kind: FailureKind, reason: impl Into<String>) -> Self {
        Self {
            message,
            kind,
            reason: reason.into(),
            timestamp: Utc::now(),
        }
    }
}

//! Message record and handle.
//!
//! 1 メッセージ = 1 レコード。フィールドの「意味」はこのモジュールが持ち、
//! 物理的な保存はストアが持ちます。

use chrono::{DateTime, Utc};

use super::errors::{QueueError, Result};
use super::ids::MessageId;
use super::value::{Document, Value};
use crate::config::SendOptions;

/// Stored field names.
pub mod fields {
    pub const ID: &str = "_id";
    pub const PAYLOAD: &str = "payload";
    pub const RUNNING: &str = "running";
    pub const RESET_TIMESTAMP: &str = "resetTimestamp";
    pub const EARLIEST_GET: &str = "earliestGet";
    pub const PRIORITY: &str = "priority";
    pub const CREATED: &str = "created";

    /// Field injected into the payload of a handle returned by `get`.
    pub const HANDLE_ID: &str = "id";
}

/// `resetTimestamp` of a message nobody has claimed yet.
pub const NEVER: DateTime<Utc> = DateTime::<Utc>::MAX_UTC;

/// Anything that can become a message payload.
///
/// `Document` is taken as is. JSON and `Value` must be an object/document:
/// null is a missing payload, anything else is invalid.
pub trait IntoPayload {
    fn into_payload(self) -> Result<Document>;
}

impl IntoPayload for Document {
    fn into_payload(self) -> Result<Document> {
        Ok(self)
    }
}

impl IntoPayload for Value {
    fn into_payload(self) -> Result<Document> {
        match self {
            Value::Document(doc) => Ok(doc),
            Value::Null => Err(QueueError::MissingArgument("payload")),
            other => Err(QueueError::InvalidArgument(format!(
                "payload must be a document, got {}",
                other.type_name()
            ))),
        }
    }
}

impl IntoPayload for serde_json::Value {
    fn into_payload(self) -> Result<Document> {
        Value::from(self).into_payload()
    }
}

impl IntoPayload for Option<Document> {
    fn into_payload(self) -> Result<Document> {
        self.ok_or(QueueError::MissingArgument("payload"))
    }
}

/// One message as stored in the collection.
///
/// Invariants:
/// - `priority` is never NaN (checked by [`MessageRecord::new`])
/// - `running == false` で `earliest_get <= now` なら取り出し可能
/// - `running == true` でも `reset_timestamp <= now` なら stuck として回収される
#[derive(Debug, Clone, PartialEq)]
pub struct MessageRecord {
    /// `None` until the store assigns one.
    pub id: Option<MessageId>,
    pub payload: Document,
    pub running: bool,
    pub reset_timestamp: DateTime<Utc>,
    pub earliest_get: DateTime<Utc>,
    pub priority: f64,
    pub created: DateTime<Utc>,
}

impl MessageRecord {
    /// Build a fresh, unclaimed record. The only place priority is validated.
    pub fn new(payload: Document, options: &SendOptions, now: DateTime<Utc>) -> Result<Self> {
        if options.priority.is_nan() {
            return Err(QueueError::InvalidArgument("priority was NaN".to_string()));
        }
        Ok(Self {
            id: None,
            payload,
            running: false,
            reset_timestamp: NEVER,
            earliest_get: options.earliest_get.unwrap_or(now),
            priority: options.priority,
            created: now,
        })
    }

    /// Encode as a store document (`_id` first when present).
    pub fn to_document(&self) -> Document {
        let mut doc = Document::new();
        if let Some(id) = self.id {
            doc.insert(fields::ID, id);
        }
        doc.with(fields::PAYLOAD, self.payload.clone())
            .with(fields::RUNNING, self.running)
            .with(fields::RESET_TIMESTAMP, self.reset_timestamp)
            .with(fields::EARLIEST_GET, self.earliest_get)
            .with(fields::PRIORITY, self.priority)
            .with(fields::CREATED, self.created)
    }

    /// Decode a stored document.
    pub fn from_document(doc: &Document) -> Result<Self> {
        let id = match doc.get(fields::ID) {
            None => None,
            Some(value) => Some(value.as_id().ok_or_else(|| malformed(fields::ID, value))?),
        };
        let payload = required(doc, fields::PAYLOAD, |v| v.as_document().cloned())?;
        let running = required(doc, fields::RUNNING, Value::as_bool)?;
        let reset_timestamp = required(doc, fields::RESET_TIMESTAMP, Value::as_datetime)?;
        let earliest_get = required(doc, fields::EARLIEST_GET, Value::as_datetime)?;
        let priority = required(doc, fields::PRIORITY, Value::as_f64)?;
        let created = required(doc, fields::CREATED, Value::as_datetime)?;

        Ok(Self {
            id,
            payload,
            running,
            reset_timestamp,
            earliest_get,
            priority,
            created,
        })
    }
}

fn required<T>(doc: &Document, field: &'static str, extract: impl Fn(&Value) -> Option<T>) -> Result<T> {
    let value = doc
        .get(field)
        .ok_or_else(|| QueueError::MalformedRecord(format!("missing field {field}")))?;
    extract(value).ok_or_else(|| malformed(field, value))
}

fn malformed(field: &str, value: &Value) -> QueueError {
    QueueError::MalformedRecord(format!(
        "field {field} has unexpected type {}",
        value.type_name()
    ))
}

/// Handle returned by `get`: the payload plus an injected `id`.
///
/// `ack` / `ack_send` / `requeue` take it back. Callers may build one from any
/// document; the `id` type is checked when it is used.
#[derive(Debug, Clone, PartialEq)]
pub struct Handle(Document);

impl Handle {
    /// Handle for a freshly claimed record. An `id` key already present in the
    /// payload is overwritten in place.
    pub(crate) fn claimed(id: MessageId, payload: Document) -> Self {
        Self(payload.with(fields::HANDLE_ID, id))
    }

    /// The record id, validated to be a store identifier.
    pub fn id(&self) -> Result<MessageId> {
        match self.0.get(fields::HANDLE_ID) {
            None => Err(QueueError::MissingArgument("id")),
            Some(Value::Id(id)) => Ok(*id),
            Some(other) => Err(QueueError::InvalidArgument(format!(
                "id must be a message id, got {}",
                other.type_name()
            ))),
        }
    }

    /// Payload without the injected `id`.
    pub fn payload(&self) -> Document {
        let mut payload = self.0.clone();
        payload.remove(fields::HANDLE_ID);
        payload
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn into_document(self) -> Document {
        self.0
    }
}

impl From<Document> for Handle {
    fn from(doc: Document) -> Self {
        Self(doc)
    }
}

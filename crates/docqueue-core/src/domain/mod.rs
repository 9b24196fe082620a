//! Domain model (ids, document model, message records, query shapes, errors).

pub mod errors;
pub mod ids;
pub mod message;
pub mod query;
pub mod value;

pub use self::errors::{ErrorKind, QueueError, Result};
pub use self::ids::MessageId;
pub use self::message::{fields, Handle, IntoPayload, MessageRecord, NEVER};
pub use self::value::{Document, Value};

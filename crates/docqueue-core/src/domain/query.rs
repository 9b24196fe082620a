//! Query shapes issued against the store.
//!
//! 呼び出し側のフィルタは payload のフィールドに対する条件です。
//! ストアへ渡す前に各キーへ `payload.` を付けて書き換えます（純粋なデータ変換）。
//!
//! 制約: トップレベルに `$and` / `$or` などの論理演算子は書けません。
//! 下位の演算子（`{"a": {"$gt": 1}}`）は使えます。

use chrono::{DateTime, Utc};

use super::errors::{QueueError, Result};
use super::message::fields;
use super::value::{Document, Value};

pub const PAYLOAD_PREFIX: &str = "payload.";

/// Reject top-level operators (`$and`, `$or`, ...) that per-field prefixing
/// would turn into a `payload.$or` path matching nothing.
pub fn check_payload_filter(filter: &Document) -> Result<()> {
    match filter.keys().find(|key| key.starts_with('$')) {
        Some(key) => Err(QueueError::InvalidArgument(format!(
            "filter must not use top-level operator {key}"
        ))),
        None => Ok(()),
    }
}

/// Prefix every top-level key of `filter` with `payload.`, keeping order.
pub fn qualify_payload_fields(filter: &Document) -> Document {
    filter
        .iter()
        .map(|(key, value)| (format!("{PAYLOAD_PREFIX}{key}"), value.clone()))
        .collect()
}

/// Append the qualified fields of `filter` to `target`.
pub fn append_payload_fields(target: &mut Document, filter: &Document) {
    for (key, value) in qualify_payload_fields(filter) {
        target.insert(key, value);
    }
}

/// `{"$lte": at}`
pub fn lte(at: DateTime<Utc>) -> Value {
    Value::Document(Document::new().with("$lte", at))
}

/// `{"$set": fields}`
pub fn set(fields: Document) -> Document {
    Document::new().with("$set", fields)
}

/// Claimed records whose reset timestamp has passed.
pub fn stuck_filter(now: DateTime<Utc>) -> Document {
    Document::new()
        .with(fields::RUNNING, true)
        .with(fields::RESET_TIMESTAMP, lte(now))
}

/// Unclaimed, visible records matching the caller's payload filter.
pub fn claimable_filter(filter: &Document, now: DateTime<Utc>) -> Document {
    let mut query = Document::new().with(fields::RUNNING, false);
    append_payload_fields(&mut query, filter);
    query.with(fields::EARLIEST_GET, lte(now))
}

/// Selection order of claims: lowest priority value first, then oldest.
pub fn claim_sort() -> Document {
    Document::new()
        .with(fields::PRIORITY, 1)
        .with(fields::CREATED, 1)
}

/// Count query: optional `running` constraint first, then payload fields.
pub fn count_filter(filter: &Document, running: Option<bool>) -> Document {
    let mut query = Document::new();
    if let Some(running) = running {
        query.insert(fields::RUNNING, running);
    }
    append_payload_fields(&mut query, filter);
    query
}

//! Index derivation and creation.
//!
//! キー順の一般則: 等価条件 → ソート → 範囲条件。
//! `running` は常に先頭（stuck 回収クエリのために `running, resetTimestamp` も別途作る）。
//!
//! # 作成プロトコル
//! ストアは「同名・別定義」「別名・同定義」の作成要求をどちらも黙って無視するので、
//! 名前ではなくキーパターンで成否を確認します。
//! 1. キーパターンのハッシュから決まる名前で作成を試みる（2 回目以降は `_<n>` を付ける）
//! 2. ライブなインデックス一覧に同じキーパターンがあれば成功（名前は問わない）
//! 3. 無ければバックオフして再試行、上限に達したら致命的エラー

use tracing::{info, warn};

use crate::config::IndexConfig;
use crate::domain::query::PAYLOAD_PREFIX;
use crate::domain::{Document, QueueError, Result, Value, fields};
use crate::ports::{DocumentStore, StoreError};

/// Key pattern for `get`: running, before-sort fields, priority, created,
/// after-sort fields, earliestGet.
pub fn get_index_keys(before_sort: &Document, after_sort: &Document) -> Result<Document> {
    let mut keys = Document::new().with(fields::RUNNING, 1);
    append_payload_keys(&mut keys, before_sort)?;
    keys.insert(fields::PRIORITY, 1);
    keys.insert(fields::CREATED, 1);
    append_payload_keys(&mut keys, after_sort)?;
    keys.insert(fields::EARLIEST_GET, 1);
    Ok(keys)
}

/// Key pattern for the stuck-message sweep.
pub fn stuck_index_keys() -> Document {
    Document::new()
        .with(fields::RUNNING, 1)
        .with(fields::RESET_TIMESTAMP, 1)
}

/// Key pattern for `count`: running (if counted by it), then the fields.
pub fn count_index_keys(payload_fields: &Document, include_running: bool) -> Result<Document> {
    let mut keys = Document::new();
    if include_running {
        keys.insert(fields::RUNNING, 1);
    }
    append_payload_keys(&mut keys, payload_fields)?;
    Ok(keys)
}

fn append_payload_keys(keys: &mut Document, payload_fields: &Document) -> Result<()> {
    for (field, direction) in payload_fields.iter() {
        if !matches!(direction, Value::Int(1) | Value::Int(-1)) {
            return Err(QueueError::InvalidArgument(format!(
                "field values must be either 1 or -1 (got {direction} for {field})"
            )));
        }
        keys.insert(format!("{PAYLOAD_PREFIX}{field}"), direction.clone());
    }
    Ok(())
}

/// Deterministic index name for `keys`; `attempt` (1-indexed) > 1 adds a suffix.
pub fn index_name(prefix: &str, keys: &Document, attempt: u32) -> String {
    let canonical = keys
        .iter()
        .map(|(field, direction)| format!("{field}_{direction}"))
        .collect::<Vec<_>>()
        .join(",");
    let digest = format!("{:x}", md5::compute(canonical.as_bytes()));
    if attempt <= 1 {
        format!("{prefix}{}", &digest[..16])
    } else {
        format!("{prefix}{}_{attempt}", &digest[..16])
    }
}

/// Ensure a live index with exactly `keys` exists. Returns the name holding it.
pub async fn ensure_index<S>(store: &S, keys: &Document, config: &IndexConfig) -> Result<String>
where
    S: DocumentStore + ?Sized,
{
    let policy = config.retry_policy();

    for attempt in 1..=config.max_attempts {
        let name = index_name(&config.name_prefix, keys, attempt);

        match store.create_index(keys, &name).await {
            Ok(()) => {}
            Err(StoreError::IndexNameTooLong { name, limit }) => {
                warn!(%name, limit, attempt, "index name rejected as too long");
            }
            Err(err) => return Err(err.into()),
        }

        let live = store.list_indexes().await?;
        if let Some(existing) = live.iter().find(|index| index.keys == *keys) {
            info!(name = %existing.name, keys = %keys, "index ensured");
            return Ok(existing.name.clone());
        }

        if attempt < config.max_attempts {
            let delay = policy.next_delay(attempt);
            warn!(attempt, ?delay, keys = %keys, "index not live yet, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    Err(QueueError::IndexCreationFailed {
        attempts: config.max_attempts,
    })
}

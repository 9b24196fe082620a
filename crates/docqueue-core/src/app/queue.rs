//! Queue - ドキュメントストア上の優先度付きメッセージキュー
//!
//! Queue 自体はプロセス内に状態を持ちません。メッセージの状態遷移はすべて
//! ストアの原子的操作で表現します。
//!
//! # ライフサイクル
//! - send: 新規レコードを挿入（running=false, resetTimestamp=NEVER）
//! - get: stuck 回収 → `(priority, created)` 順で 1 件を原子的に claim（running=true）
//! - ack: 削除
//! - ack_send / requeue: 同じ `_id` へ新しいレコードを原子的に置換（無ければ挿入）
//! - claim したまま放置されたメッセージは resetTimestamp を過ぎると次の get で回収される

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::index;
use crate::config::{GetOptions, QueueConfig, SendOptions};
use crate::domain::message::NEVER;
use crate::domain::{
    query, Document, Handle, IntoPayload, MessageId, MessageRecord, QueueError, Result, Value,
    fields,
};
use crate::observability::QueueCounts;
use crate::ports::{Clock, DocumentStore, SystemClock};

/// Priority queue over one collection handle.
///
/// Any number of `Queue` values, in any number of processes, may share a
/// collection: claims are arbitrated by the store's find-and-update.
pub struct Queue<S, C = SystemClock> {
    store: S,
    clock: C,
    config: QueueConfig,
}

impl<S: DocumentStore> Queue<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_config(store, QueueConfig::default())
    }

    pub fn with_config(store: S, config: QueueConfig) -> Self {
        Self::with_clock(store, SystemClock, config)
    }
}

impl<S: DocumentStore, C: Clock> Queue<S, C> {
    pub fn with_clock(store: S, clock: C, config: QueueConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// The injected collection handle.
    pub fn collection(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Current time of the queue's clock (basis of `created` / `earliestGet`).
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// `GetOptions` with this queue's configured wait and poll.
    pub fn get_options(&self, reset_duration: TimeDelta) -> GetOptions {
        GetOptions::from_config(reset_duration, &self.config.get)
    }

    // ========================================
    // index
    // ========================================

    /// Ensure the indexes `get` needs.
    ///
    /// `before_sort` / `after_sort` are payload fields (values `1` or `-1`)
    /// placed before / after `priority, created` in the compound key.
    pub async fn ensure_get_index(&self, before_sort: &Document, after_sort: &Document) -> Result<()> {
        let keys = index::get_index_keys(before_sort, after_sort)?;
        index::ensure_index(&self.store, &keys, &self.config.index).await?;
        index::ensure_index(&self.store, &index::stuck_index_keys(), &self.config.index).await?;
        Ok(())
    }

    /// Ensure the index `count` needs for `fields` (values `1` or `-1`).
    pub async fn ensure_count_index(&self, fields: &Document, include_running: bool) -> Result<()> {
        let keys = index::count_index_keys(fields, include_running)?;
        index::ensure_index(&self.store, &keys, &self.config.index).await?;
        Ok(())
    }

    // ========================================
    // get
    // ========================================

    /// Claim the first eligible message matching `filter`, polling until
    /// `options.wait_ms` elapses. `Ok(None)` means nothing was available.
    ///
    /// `filter` is over payload fields; a top-level operator key is
    /// `InvalidArgument`.
    pub async fn get(&self, filter: &Document, options: &GetOptions) -> Result<Option<Handle>> {
        self.claim_loop(filter, options, None).await
    }

    /// Like [`Queue::get`], but a `true` on `shutdown` while waiting aborts the
    /// call with [`QueueError::Interrupted`].
    pub async fn get_until_shutdown(
        &self,
        filter: &Document,
        options: &GetOptions,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<Option<Handle>> {
        self.claim_loop(filter, options, Some(shutdown)).await
    }

    #[instrument(level = "debug", skip_all, fields(filter = %filter))]
    async fn claim_loop(
        &self,
        filter: &Document,
        options: &GetOptions,
        mut shutdown: Option<&mut watch::Receiver<bool>>,
    ) -> Result<Option<Handle>> {
        query::check_payload_filter(filter)?;

        // stuck 回収は呼び出しごとに 1 回だけ（poll のたびには行わない）
        let now = self.clock.now();
        let reset = self
            .store
            .update_many(
                &query::stuck_filter(now),
                &query::set(Document::new().with(fields::RUNNING, false)),
            )
            .await?;
        debug!(reset, "swept stuck messages");

        let deadline = deadline_after(options.wait_ms);
        let poll = non_negative_millis(options.poll_ms);
        let sort = query::claim_sort();

        loop {
            let now = self.clock.now();
            let reset_timestamp = now
                .checked_add_signed(options.reset_duration)
                .unwrap_or(NEVER);
            let claimed = self
                .store
                .find_one_and_update(
                    &query::claimable_filter(filter, now),
                    &sort,
                    &query::set(
                        Document::new()
                            .with(fields::RUNNING, true)
                            .with(fields::RESET_TIMESTAMP, reset_timestamp),
                    ),
                )
                .await?;

            if let Some(record) = claimed {
                let handle = handle_from_record(record)?;
                debug!(id = %handle.id()?, %reset_timestamp, "claimed message");
                return Ok(Some(handle));
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }

            pause(poll, shutdown.as_deref_mut()).await?;
        }
    }

    // ========================================
    // count
    // ========================================

    /// Count messages whose payload matches `filter`; `running` narrows to
    /// claimed (`Some(true)`) or unclaimed (`Some(false)`) messages.
    pub async fn count(&self, filter: &Document, running: Option<bool>) -> Result<u64> {
        query::check_payload_filter(filter)?;
        let count = self
            .store
            .count(&query::count_filter(filter, running))
            .await?;
        Ok(count)
    }

    /// Running / waiting / total counts for `filter`.
    pub async fn counts(&self, filter: &Document) -> Result<QueueCounts> {
        Ok(QueueCounts {
            running: self.count(filter, Some(true)).await?,
            waiting: self.count(filter, Some(false)).await?,
            total: self.count(filter, None).await?,
        })
    }

    // ========================================
    // send / ack
    // ========================================

    /// Enqueue a new message. Returns the id the store assigned.
    pub async fn send(&self, payload: impl IntoPayload, options: SendOptions) -> Result<MessageId> {
        let record = MessageRecord::new(payload.into_payload()?, &options, self.clock.now())?;
        let id = self.store.insert_one(record.to_document()).await?;
        debug!(%id, priority = record.priority, earliest_get = %record.earliest_get, "sent message");
        Ok(id)
    }

    /// Remove a claimed message. Acking an already removed message is fine.
    pub async fn ack(&self, handle: &Handle) -> Result<()> {
        let id = handle.id()?;
        let removed = self.store.delete_one(id).await?;
        debug!(%id, removed, "acked message");
        Ok(())
    }

    /// Atomically ack `handle` and send `payload` in its place (same `_id`).
    ///
    /// If the original record is gone the replacement is inserted anyway.
    pub async fn ack_send(
        &self,
        handle: &Handle,
        payload: impl IntoPayload,
        options: SendOptions,
    ) -> Result<()> {
        let payload = payload.into_payload()?;
        let record = MessageRecord::new(payload, &options, self.clock.now())?;
        let id = handle.id()?;

        self.store
            .replace_one_upsert(id, record.to_document())
            .await?;
        debug!(%id, priority = record.priority, "ack-sent message");
        Ok(())
    }

    /// Put the handle's own payload back with new scheduling parameters.
    pub async fn requeue(&self, handle: &Handle, options: SendOptions) -> Result<()> {
        self.ack_send(handle, handle.payload(), options).await
    }
}

/// Post-image of a claim → payload + injected `id`.
fn handle_from_record(record: Document) -> Result<Handle> {
    let id = record
        .get(fields::ID)
        .and_then(Value::as_id)
        .ok_or_else(|| QueueError::MalformedRecord("claimed record has no _id".to_string()))?;
    let payload = match record.get(fields::PAYLOAD) {
        Some(Value::Document(payload)) => payload.clone(),
        _ => {
            return Err(QueueError::MalformedRecord(format!(
                "claimed record {id} has no payload document"
            )));
        }
    };
    Ok(Handle::claimed(id, payload))
}

fn non_negative_millis(ms: i64) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(0))
}

/// Non-positive waits give a deadline of "now": one attempt, no sleep.
fn deadline_after(wait_ms: i64) -> Instant {
    let start = Instant::now();
    start
        .checked_add(non_negative_millis(wait_ms))
        .unwrap_or(start + Duration::from_secs(60 * 60 * 24 * 365))
}

/// Sleep one poll interval. A shutdown signal cuts the sleep short with
/// `Interrupted`; a closed shutdown channel just finishes the sleep.
async fn pause(poll: Duration, shutdown: Option<&mut watch::Receiver<bool>>) -> Result<()> {
    let Some(shutdown) = shutdown else {
        tokio::time::sleep(poll).await;
        return Ok(());
    };
    if *shutdown.borrow() {
        return Err(QueueError::Interrupted);
    }

    let sleep = tokio::time::sleep(poll);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return Ok(()),
            changed = shutdown.changed() => match changed {
                Ok(()) if *shutdown.borrow() => return Err(QueueError::Interrupted),
                Ok(()) => continue,
                Err(_) => {
                    sleep.as_mut().await;
                    return Ok(());
                }
            },
        }
    }
}

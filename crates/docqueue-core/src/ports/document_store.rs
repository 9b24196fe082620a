//! DocumentStore port - 外部ドキュメントストアへの契約
//!
//! Queue は自前の状態もロックも持たず、ここに並ぶ原子的操作だけで協調します。
//!
//! # 実装が満たすべきこと
//! - `find_one_and_update` は「一致・ソート・更新・更新後の返却」を 1 つの原子的操作で行う
//! - `replace_one_upsert` は対象が無ければ挿入にフォールバックする
//! - `create_index` は「同名・別定義」「別名・同定義」を no-op として扱ってよい
//!
//! # 実装
//! - **InMemoryDocumentStore**（impls）: テスト・開発用
//! - 本番用はネットワーク越しのストアを別クレートで実装する想定

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Document, MessageId};

/// Low-level store errors. Queue propagates them unchanged.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("index name too long: {name} (limit {limit})")]
    IndexNameTooLong { name: String, limit: usize },

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("store error: {0}")]
    Other(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A live index: its name and exact key pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexInfo {
    pub name: String,
    pub keys: Document,
}

/// Collection handle. Implementations must be thread-safe; every method is one
/// round trip.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert one document; the store assigns `_id` unless one is present.
    async fn insert_one(&self, document: Document) -> StoreResult<MessageId>;

    /// Apply `update` to every document matching `filter`. Returns how many matched.
    async fn update_many(&self, filter: &Document, update: &Document) -> StoreResult<u64>;

    /// Atomically pick the first match in `sort` order, apply `update` and
    /// return the post-image.
    async fn find_one_and_update(
        &self,
        filter: &Document,
        sort: &Document,
        update: &Document,
    ) -> StoreResult<Option<Document>>;

    /// Replace the document at `id` with `replacement`, inserting it under
    /// `id` when absent.
    async fn replace_one_upsert(&self, id: MessageId, replacement: Document) -> StoreResult<()>;

    /// Delete by id. Deleting nothing is not an error; returns how many were removed.
    async fn delete_one(&self, id: MessageId) -> StoreResult<u64>;

    async fn count(&self, filter: &Document) -> StoreResult<u64>;

    async fn create_index(&self, keys: &Document, name: &str) -> StoreResult<()>;

    async fn list_indexes(&self) -> StoreResult<Vec<IndexInfo>>;
}

#[async_trait]
impl<S: DocumentStore + ?Sized> DocumentStore for Arc<S> {
    async fn insert_one(&self, document: Document) -> StoreResult<MessageId> {
        (**self).insert_one(document).await
    }

    async fn update_many(&self, filter: &Document, update: &Document) -> StoreResult<u64> {
        (**self).update_many(filter, update).await
    }

    async fn find_one_and_update(
        &self,
        filter: &Document,
        sort: &Document,
        update: &Document,
    ) -> StoreResult<Option<Document>> {
        (**self).find_one_and_update(filter, sort, update).await
    }

    async fn replace_one_upsert(&self, id: MessageId, replacement: Document) -> StoreResult<()> {
        (**self).replace_one_upsert(id, replacement).await
    }

    async fn delete_one(&self, id: MessageId) -> StoreResult<u64> {
        (**self).delete_one(id).await
    }

    async fn count(&self, filter: &Document) -> StoreResult<u64> {
        (**self).count(filter).await
    }

    async fn create_index(&self, keys: &Document, name: &str) -> StoreResult<()> {
        (**self).create_index(keys, name).await
    }

    async fn list_indexes(&self) -> StoreResult<Vec<IndexInfo>> {
        (**self).list_indexes().await
    }
}

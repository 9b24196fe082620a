//! InMemoryDocumentStore - 開発・テスト用のドキュメントストア
//!
//! DocumentStore の契約を 1 つの Mutex で満たします。
//! 各操作はロックの内側で完結するので、find_one_and_update などの
//! 「一致→更新」は自然に原子的になります。
//!
//! # ストアの振る舞い（ネットワーク越しのストアに合わせている点）
//! - 作成直後から `_id` のインデックス（`_id_`）がある
//! - インデックス作成は「同名」「同じキーパターン」のどちらも no-op
//! - `namespace + ".$" + name` が上限を超える名前は `IndexNameTooLong`
//! - ソートで同順位のときは挿入順

use std::cmp::Ordering;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::matcher;
use crate::domain::{Document, MessageId, Value, fields};
use crate::ports::{
    DocumentStore, IdGenerator, IndexInfo, StoreError, StoreResult, SystemClock, UlidGenerator,
};

/// Settings of the in-memory store.
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// `database.collection`, counted against the index name limit.
    pub namespace: String,
    pub max_index_name_len: usize,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            namespace: "testing.messages".to_string(),
            max_index_name_len: 127,
        }
    }
}

struct StoreState {
    /// Insertion order is kept; it breaks sort ties.
    documents: Vec<(MessageId, Document)>,
    indexes: Vec<IndexInfo>,
    /// Next operation fails with this error (test seam).
    injected_failure: Option<StoreError>,
}

impl StoreState {
    fn take_failure(&mut self) -> StoreResult<()> {
        match self.injected_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn position(&self, id: MessageId) -> Option<usize> {
        self.documents.iter().position(|(doc_id, _)| *doc_id == id)
    }
}

pub struct InMemoryDocumentStore {
    state: Mutex<StoreState>,
    id_generator: Box<dyn IdGenerator>,
    config: MemoryStoreConfig,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::with_config(MemoryStoreConfig::default())
    }

    pub fn with_config(config: MemoryStoreConfig) -> Self {
        Self::with_id_generator(config, Box::new(UlidGenerator::new(SystemClock)))
    }

    pub fn with_id_generator(config: MemoryStoreConfig, id_generator: Box<dyn IdGenerator>) -> Self {
        let id_index = IndexInfo {
            name: "_id_".to_string(),
            keys: Document::new().with(fields::ID, 1),
        };
        Self {
            state: Mutex::new(StoreState {
                documents: Vec::new(),
                indexes: vec![id_index],
                injected_failure: None,
            }),
            id_generator,
            config,
        }
    }

    pub fn config(&self) -> &MemoryStoreConfig {
        &self.config
    }

    /// Make the next store operation fail with `error`.
    pub async fn inject_failure(&self, error: StoreError) {
        self.state.lock().await.injected_failure = Some(error);
    }

    /// Number of stored documents.
    pub async fn len(&self) -> usize {
        self.state.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Raw document by id (including `_id`).
    pub async fn find_by_id(&self, id: MessageId) -> Option<Document> {
        let state = self.state.lock().await;
        state
            .documents
            .iter()
            .find(|(doc_id, _)| *doc_id == id)
            .map(|(_, doc)| doc.clone())
    }

    /// All raw documents in insertion order.
    pub async fn snapshot(&self) -> Vec<Document> {
        let state = self.state.lock().await;
        state.documents.iter().map(|(_, doc)| doc.clone()).collect()
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Put `_id` first, dropping any `_id` the body carried.
fn with_id(id: MessageId, body: Document) -> Document {
    let mut doc = Document::new().with(fields::ID, id);
    for (key, value) in body {
        if key != fields::ID {
            doc.insert(key, value);
        }
    }
    doc
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn insert_one(&self, document: Document) -> StoreResult<MessageId> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        let id = match document.get(fields::ID) {
            Some(Value::Id(id)) => *id,
            Some(other) => {
                return Err(StoreError::Other(format!(
                    "_id must be a message id, got {}",
                    other.type_name()
                )));
            }
            None => self.id_generator.generate_message_id(),
        };
        if state.position(id).is_some() {
            return Err(StoreError::Other(format!("duplicate key {id}")));
        }
        state.documents.push((id, with_id(id, document)));
        Ok(id)
    }

    async fn update_many(&self, filter: &Document, update: &Document) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        let mut updated = 0;
        for (_, doc) in state.documents.iter_mut() {
            if matcher::matches(doc, filter)? {
                matcher::apply_update(doc, update)?;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn find_one_and_update(
        &self,
        filter: &Document,
        sort: &Document,
        update: &Document,
    ) -> StoreResult<Option<Document>> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        // 同順位なら先に見つかった（先に挿入された）ものを残す
        let mut best: Option<usize> = None;
        for (i, (_, doc)) in state.documents.iter().enumerate() {
            if !matcher::matches(doc, filter)? {
                continue;
            }
            best = match best {
                Some(b) if matcher::compare_by_sort(doc, &state.documents[b].1, sort)? != Ordering::Less => Some(b),
                _ => Some(i),
            };
        }

        let Some(index) = best else {
            return Ok(None);
        };
        let doc = &mut state.documents[index].1;
        matcher::apply_update(doc, update)?;
        Ok(Some(doc.clone()))
    }

    async fn replace_one_upsert(&self, id: MessageId, replacement: Document) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        let doc = with_id(id, replacement);
        match state.position(id) {
            Some(index) => state.documents[index].1 = doc,
            None => state.documents.push((id, doc)),
        }
        Ok(())
    }

    async fn delete_one(&self, id: MessageId) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        match state.position(id) {
            Some(index) => {
                state.documents.remove(index);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn count(&self, filter: &Document) -> StoreResult<u64> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        let mut count = 0;
        for (_, doc) in state.documents.iter() {
            if matcher::matches(doc, filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    async fn create_index(&self, keys: &Document, name: &str) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        state.take_failure()?;

        let full_len = self.config.namespace.len() + 2 + name.len();
        if name.is_empty() || full_len > self.config.max_index_name_len {
            return Err(StoreError::IndexNameTooLong {
                name: name.to_string(),
                limit: self.config.max_index_name_len,
            });
        }
        let exists = state
            .indexes
            .iter()
            .any(|index| index.name == name || index.keys == *keys);
        if !exists {
            state.indexes.push(IndexInfo {
                name: name.to_string(),
                keys: keys.clone(),
            });
        }
        Ok(())
    }

    async fn list_indexes(&self) -> StoreResult<Vec<IndexInfo>> {
        let mut state = self.state.lock().await;
        state.take_failure()?;
        Ok(state.indexes.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_assigns_id_first() {
        let store = InMemoryDocumentStore::new();
        let id = store
            .insert_one(Document::new().with("payload", Document::new()))
            .await
            .unwrap();

        let doc = store.find_by_id(id).await.unwrap();
        assert_eq!(doc.keys().collect::<Vec<_>>(), vec!["_id", "payload"]);
        assert_eq!(doc.get("_id"), Some(&Value::Id(id)));
    }

    #[tokio::test]
    async fn find_one_and_update_prefers_first_inserted_on_ties() {
        let store = InMemoryDocumentStore::new();
        let first = store.insert_one(Document::new().with("p", 1)).await.unwrap();
        store.insert_one(Document::new().with("p", 1)).await.unwrap();

        let update = Document::new().with("$set", Document::new().with("taken", true));
        let doc = store
            .find_one_and_update(&Document::new(), &Document::new().with("p", 1), &update)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(doc.get("_id"), Some(&Value::Id(first)));
        assert_eq!(doc.get("taken"), Some(&Value::Bool(true)));
    }

    #[tokio::test]
    async fn replace_one_upsert_inserts_when_missing() {
        let store = InMemoryDocumentStore::new();
        let id = store.insert_one(Document::new().with("v", 1)).await.unwrap();
        store.delete_one(id).await.unwrap();

        store
            .replace_one_upsert(id, Document::new().with("v", 2))
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(
            store.find_by_id(id).await.unwrap(),
            Document::new().with("_id", id).with("v", 2)
        );
    }

    #[tokio::test]
    async fn delete_of_missing_document_is_zero() {
        let store = InMemoryDocumentStore::new();
        let id = store.insert_one(Document::new()).await.unwrap();

        assert_eq!(store.delete_one(id).await.unwrap(), 1);
        assert_eq!(store.delete_one(id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn create_index_is_noop_for_same_name_or_same_keys() {
        let store = InMemoryDocumentStore::new();
        let keys = Document::new().with("running", 1);

        store.create_index(&keys, "a").await.unwrap();
        store.create_index(&keys, "b").await.unwrap();
        store
            .create_index(&Document::new().with("priority", 1), "a")
            .await
            .unwrap();

        let indexes = store.list_indexes().await.unwrap();
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[0].name, "_id_");
        assert_eq!(indexes[1], IndexInfo { name: "a".into(), keys });
    }

    #[tokio::test]
    async fn create_index_rejects_long_names() {
        let store = InMemoryDocumentStore::with_config(MemoryStoreConfig {
            namespace: "db.c".to_string(),
            max_index_name_len: 10,
        });

        let err = store
            .create_index(&Document::new().with("x", 1), "abcdefg")
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::IndexNameTooLong { limit: 10, .. }));
    }

    #[tokio::test]
    async fn injected_failure_hits_next_operation_only() {
        let store = InMemoryDocumentStore::new();
        store.inject_failure(StoreError::Timeout).await;

        assert!(matches!(store.count(&Document::new()).await, Err(StoreError::Timeout)));
        assert_eq!(store.count(&Document::new()).await.unwrap(), 0);
    }
}

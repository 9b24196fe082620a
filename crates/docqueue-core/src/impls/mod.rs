//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryDocumentStore**: DocumentStore の参照実装（テスト・CLI デモ用）
//!
//! # 本番用実装
//! ネットワーク越しのドキュメントストア実装は別クレートに配置する想定です。

pub mod matcher;
pub mod memory_store;

pub use self::memory_store::{InMemoryDocumentStore, MemoryStoreConfig};

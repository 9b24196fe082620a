//! docqueue-core
//!
//! ドキュメントストアの上に載せた優先度付きメッセージキュー。
//! キュー自身はプロセス内に状態を持たず、ストアの原子的操作だけで協調します。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, value, message, query, errors）
//! - **ports**: 抽象化レイヤー（DocumentStore, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（Queue, index, retry）
//! - **impls**: 実装（InMemoryDocumentStore など開発・テスト用）
//! - **config**: 設定（TOML）と呼び出しごとのオプション
//! - **observability**: 状態ビュー（QueueCounts）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;

pub use app::Queue;
pub use config::{GetConfig, GetOptions, IndexConfig, QueueConfig, SendOptions};
pub use domain::{Document, ErrorKind, Handle, MessageId, QueueError, Result, Value};
pub use impls::InMemoryDocumentStore;
pub use observability::QueueCounts;
pub use ports::{DocumentStore, StoreError};

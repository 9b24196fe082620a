//! App - アプリケーション層
//!
//! ports を組み合わせてキューのプロトコルを実装します。
//!
//! # 主要コンポーネント
//! - **Queue**: send / get / ack / ack_send / requeue / count
//! - **index**: インデックスのキー導出と作成プロトコル
//! - **RetryPolicy**: インデックス作成の再試行間隔

pub mod index;
pub mod queue;
pub mod retry;

pub use self::queue::Queue;
pub use self::retry::RetryPolicy;

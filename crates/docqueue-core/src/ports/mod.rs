//! Ports - 抽象化レイヤー
//!
//! Hexagonal Architecture の「ポート」を定義します。
//! Queue はドキュメントストアを外部の協力者として扱い、ここにある trait だけを通して触ります。
//!
//! # 設計原則
//! - ストアが唯一の正本（Queue はプロセス内に状態を持たない）
//! - 協調はストアの原子的操作（条件付き更新・置換）だけで行う
//! - 時刻と ID 生成は差し替え可能にしてテストを決定的にする

pub mod clock;
pub mod document_store;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::document_store::{DocumentStore, IndexInfo, StoreError, StoreResult};
pub use self::id_generator::{IdGenerator, UlidGenerator};

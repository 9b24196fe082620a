//! Errors - エラー型と分類
//!
//! # 分類
//! - InvalidArgument: 呼び出し側が直せる入力エラー（ストアには一切触れていない）
//! - Fatal: リトライしても意味がない（インデックス作成の失敗、待機中の中断）
//! - Transient: ストア側の障害。加工せずにそのまま返す

use crate::ports::StoreError;

/// ErrorKind は QueueError の運用分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidArgument,
    Fatal,
    Transient,
}

/// QueueError は Queue の操作が返すエラー
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("couldn't create index after {attempts} attempts")]
    IndexCreationFailed { attempts: u32 },

    #[error("interrupted while waiting for a message")]
    Interrupted,

    #[error("malformed message record: {0}")]
    MalformedRecord(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QueueError::MissingArgument(_) | QueueError::InvalidArgument(_) => {
                ErrorKind::InvalidArgument
            }
            QueueError::IndexCreationFailed { .. }
            | QueueError::Interrupted
            | QueueError::MalformedRecord(_) => ErrorKind::Fatal,
            QueueError::Store(_) => ErrorKind::Transient,
        }
    }

    pub fn is_invalid_argument(&self) -> bool {
        self.kind() == ErrorKind::InvalidArgument
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;

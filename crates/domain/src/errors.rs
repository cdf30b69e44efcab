use crate::todo::TodoId;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid TodoId: {0}")]
    InvalidTodoId(String),

    #[error("Invalid UserId: {0}")]
    InvalidUserId(String),
}

/// ストレージ層の失敗（I/O、接続、制約違反など）
///
/// 原因はログ用に保持し、呼び出し元には種別だけを見せます。
#[derive(Debug, Error)]
#[error("{context}")]
pub struct StorageError {
    context: String,
    #[source]
    source: Option<BoxError>,
}

impl StorageError {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            source: None,
        }
    }

    pub fn with_source(
        context: impl Into<String>,
        source: impl Into<BoxError>,
    ) -> Self {
        Self {
            context: context.into(),
            source: Some(source.into()),
        }
    }

    pub fn context(&self) -> &str {
        &self.context
    }
}

#[derive(Debug, Error)]
pub enum TodoError {
    #[error("ID '{0}' not found")]
    NotFound(TodoId),

    #[error("Permission denied")]
    PermissionDenied,

    #[error("Storage failure: {0}")]
    Storage(#[from] StorageError),
}

impl TodoError {
    /// 呼び出し元の問題ではなくサーバー側の失敗かどうか
    pub fn is_internal(&self) -> bool {
        matches!(self, TodoError::Storage(_))
    }
}

use crate::errors::DomainError;
use serde::{Deserialize, Serialize};

/// ユーザーID（認証層が検証済みの不透明な識別子）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// 新しいユーザーIDを生成
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// 文字列からユーザーIDを作成
    pub fn from_string(id: String) -> Result<Self, DomainError> {
        if id.is_empty() {
            return Err(DomainError::InvalidUserId(
                "User ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 呼び出し元のコンテキスト
///
/// 認証済みユーザーを各操作へ明示的に引き回します。
/// リポジトリはこれを参照するだけで変更しません。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    user_id: UserId,
    request_id: Option<String>,
}

impl Caller {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            request_id: None,
        }
    }

    /// ログ相関用のリクエストIDを付与
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    /// 呼び出し元がレコードの所有者かどうか
    pub fn owns(&self, owner_id: &UserId) -> bool {
        &self.user_id == owner_id
    }

    /// user_id / request_id を持つスパンを作成
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "caller",
            user_id = %self.user_id,
            request_id = %self.request_id.as_deref().unwrap_or("none")
        )
    }
}

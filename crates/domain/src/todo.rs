use crate::errors::DomainError;
use crate::identity::UserId;
use chrono::{DateTime, Duration, NaiveDate, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// ToDo ID（ULID、サーバー側で採番）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TodoId(String);

impl TodoId {
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// 文字列から ToDo ID を作成（ULID 形式のみ受け付ける）
    pub fn from_string(id: String) -> Result<Self, DomainError> {
        ulid::Ulid::from_string(&id)
            .map_err(|e| DomainError::InvalidTodoId(format!("{id}: {e}")))?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn timestamp_ms(&self) -> Option<u64> {
        ulid::Ulid::from_string(&self.0)
            .ok()
            .map(|ulid| ulid.timestamp_ms())
    }
}

impl Default for TodoId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TodoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// タスクレコード
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Todo {
    pub id: TodoId,
    pub owner_id: UserId,
    pub subject: String,
    pub description: String,
    pub priority: i32,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// 作成入力から新しいレコードを組み立てる
    /// ID・所有者・タイムスタンプはここでのみ設定される
    pub fn create(owner_id: UserId, input: NewTodo) -> Self {
        let now = now();
        Self {
            id: TodoId::new(),
            owner_id,
            subject: input.subject,
            description: input.description,
            priority: input.priority,
            due_date: input.due_date,
            completed: input.completed,
            created_at: now,
            updated_at: now,
        }
    }

    /// updated_at を進める（必ず前回より大きくなる）
    pub fn touch(&mut self) {
        self.updated_at = next_timestamp(self.updated_at);
    }
}

/// 作成リクエストの内容（ID・所有者・時刻は含まない）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTodo {
    pub subject: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub completed: bool,
}

impl NewTodo {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_due_date(mut self, due_date: Option<NaiveDate>) -> Self {
        self.due_date = due_date;
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }
}

/// 現在時刻（マイクロ秒に丸める）
///
/// どのストレージでも往復で値が変わらない精度に揃える。
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// `previous` より厳密に大きい現在時刻を返す
pub fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = now();
    if now > previous {
        now
    } else {
        previous + Duration::microseconds(1)
    }
}

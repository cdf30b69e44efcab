use crate::field::Field;
use crate::identity::UserId;
use crate::todo::TodoId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 一覧取得の条件
///
/// `Unset` のフィールドは条件なし。`due_date` の `Set(None)` は
/// 「期限が設定されていないレコード」を意味します。
/// `limit` / `offset` は 0 のとき指定なしとして扱います。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoFilter {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub id: Field<TodoId>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub owner_id: Field<UserId>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub priority: Field<i32>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub due_date: Field<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub completed: Field<bool>,
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

impl TodoFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: TodoId) -> Self {
        self.id = Field::Set(id);
        self
    }

    pub fn with_owner(mut self, owner_id: UserId) -> Self {
        self.owner_id = Field::Set(owner_id);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Field::Set(priority);
        self
    }

    /// `None` を渡すと「期限なし」に一致する
    pub fn with_due_date(mut self, due_date: Option<NaiveDate>) -> Self {
        self.due_date = Field::Set(due_date);
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Field::Set(completed);
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }
}

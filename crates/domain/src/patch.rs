use crate::field::Field;
use crate::todo::Todo;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 部分更新の内容
///
/// `Unset` のフィールドは変更しない。`Set` なら（`null` を含めて）その値で上書きする。
/// ID・所有者・作成日時は更新対象に含めない。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoPatch {
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub subject: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub description: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub priority: Field<i32>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub due_date: Field<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Field::is_unset")]
    pub completed: Field<bool>,
}

impl TodoPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Field::Set(subject.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Field::Set(description.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Field::Set(priority);
        self
    }

    pub fn with_due_date(mut self, due_date: Option<NaiveDate>) -> Self {
        self.due_date = Field::Set(due_date);
        self
    }

    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Field::Set(completed);
        self
    }

    /// どのフィールドも指定されていない
    pub fn is_empty(&self) -> bool {
        self.subject.is_unset()
            && self.description.is_unset()
            && self.priority.is_unset()
            && self.due_date.is_unset()
            && self.completed.is_unset()
    }

    /// 指定されたフィールドだけを `todo` に上書きする
    ///
    /// 1 つでも上書きした場合に `true` を返す。updated_at は呼び出し側が進める。
    pub fn apply_to(self, todo: &mut Todo) -> bool {
        let mut updated = false;
        updated |= self.subject.assign_to(&mut todo.subject);
        updated |= self.description.assign_to(&mut todo.description);
        updated |= self.priority.assign_to(&mut todo.priority);
        updated |= self.due_date.assign_to(&mut todo.due_date);
        updated |= self.completed.assign_to(&mut todo.completed);
        updated
    }
}

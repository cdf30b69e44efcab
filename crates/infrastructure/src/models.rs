use crate::query::QueryParam;
use aws_sdk_dynamodb::types::AttributeValue;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use domain::{StorageError, Todo, TodoId, UserId};
use std::collections::HashMap;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// ToDo 1 件分の DynamoDB キー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoKeys {
    pub pk: String,
    pub sk: String,
}

impl TodoKeys {
    pub const PK_PREFIX: &'static str = "TODO#";
    pub const CURRENT_SK: &'static str = "CURRENT";

    pub fn for_todo(id: &TodoId) -> Self {
        Self {
            pk: format!("{}{}", Self::PK_PREFIX, id.as_str()),
            sk: Self::CURRENT_SK.to_string(),
        }
    }

    pub fn into_key_map(self) -> HashMap<String, AttributeValue> {
        HashMap::from([
            ("PK".to_string(), AttributeValue::S(self.pk)),
            ("SK".to_string(), AttributeValue::S(self.sk)),
        ])
    }
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// ToDo を DynamoDB アイテムに変換
///
/// 期限なしの場合 `due_date` 属性は書かない（`attribute_not_exists` で検索できるように）。
pub fn todo_to_item(todo: &Todo) -> HashMap<String, AttributeValue> {
    let mut item = TodoKeys::for_todo(&todo.id).into_key_map();

    item.insert("id".to_string(), AttributeValue::S(todo.id.as_str().to_string()));
    item.insert(
        "owner_id".to_string(),
        AttributeValue::S(todo.owner_id.as_str().to_string()),
    );
    item.insert("subject".to_string(), AttributeValue::S(todo.subject.clone()));
    item.insert(
        "description".to_string(),
        AttributeValue::S(todo.description.clone()),
    );
    item.insert(
        "priority".to_string(),
        AttributeValue::N(todo.priority.to_string()),
    );
    if let Some(due_date) = todo.due_date {
        item.insert(
            "due_date".to_string(),
            AttributeValue::S(due_date.format(DATE_FORMAT).to_string()),
        );
    }
    item.insert("completed".to_string(), AttributeValue::Bool(todo.completed));
    item.insert(
        "created_at".to_string(),
        AttributeValue::S(format_timestamp(&todo.created_at)),
    );
    item.insert(
        "updated_at".to_string(),
        AttributeValue::S(format_timestamp(&todo.updated_at)),
    );

    item
}

/// DynamoDB アイテムから ToDo を復元
pub fn item_to_todo(item: &HashMap<String, AttributeValue>) -> Result<Todo, StorageError> {
    let id = TodoId::from_string(string_attr(item, "id")?.clone())
        .map_err(|e| StorageError::with_source("invalid id attribute", e))?;
    let owner_id = UserId::from_string(string_attr(item, "owner_id")?.clone())
        .map_err(|e| StorageError::with_source("invalid owner_id attribute", e))?;

    let priority = item
        .get("priority")
        .and_then(|v| v.as_n().ok())
        .ok_or_else(|| missing("priority"))?
        .parse::<i32>()
        .map_err(|e| StorageError::with_source("invalid priority attribute", e))?;

    let due_date = match item.get("due_date") {
        None | Some(AttributeValue::Null(_)) => None,
        Some(value) => {
            let raw = value.as_s().map_err(|_| missing("due_date"))?;
            Some(
                NaiveDate::parse_from_str(raw, DATE_FORMAT)
                    .map_err(|e| StorageError::with_source("invalid due_date attribute", e))?,
            )
        }
    };

    let completed = *item
        .get("completed")
        .and_then(|v| v.as_bool().ok())
        .ok_or_else(|| missing("completed"))?;

    Ok(Todo {
        id,
        owner_id,
        subject: string_attr(item, "subject")?.clone(),
        description: string_attr(item, "description")?.clone(),
        priority,
        due_date,
        completed,
        created_at: timestamp_attr(item, "created_at")?,
        updated_at: timestamp_attr(item, "updated_at")?,
    })
}

/// クエリパラメータを DynamoDB の値に変換
pub fn param_to_attribute(param: &QueryParam) -> AttributeValue {
    match param {
        QueryParam::Text(s) => AttributeValue::S(s.clone()),
        QueryParam::Integer(n) => AttributeValue::N(n.to_string()),
        QueryParam::Date(d) => AttributeValue::S(d.format(DATE_FORMAT).to_string()),
        QueryParam::Bool(b) => AttributeValue::Bool(*b),
    }
}

pub(crate) fn string_attr<'a>(
    item: &'a HashMap<String, AttributeValue>,
    key: &str,
) -> Result<&'a String, StorageError> {
    item.get(key)
        .and_then(|v| v.as_s().ok())
        .ok_or_else(|| missing(key))
}

fn timestamp_attr(
    item: &HashMap<String, AttributeValue>,
    key: &str,
) -> Result<DateTime<Utc>, StorageError> {
    let raw = string_attr(item, key)?;
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::with_source(format!("invalid {key} attribute"), e))
}

fn missing(key: &str) -> StorageError {
    StorageError::new(format!("missing or malformed attribute: {key}"))
}

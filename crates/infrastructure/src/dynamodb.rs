use crate::models::{
    format_timestamp, item_to_todo, param_to_attribute, string_attr, todo_to_item, TodoKeys,
};
use crate::query::{Predicate, TodoQuery};
use crate::row_lock::{RowGuard, RowLocks};
use crate::store::{StoreTransaction, TodoStore};
use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::config::Region;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client;
use domain::{StorageError, Todo, TodoId};
use shared::{trace_store_operation, Config};
use std::collections::HashMap;
use tracing::{debug, info};

const BACKEND: &str = "dynamodb";

#[derive(Clone)]
pub struct DynamoDbClient {
    client: Client,
    table_name: String,
}

impl DynamoDbClient {
    pub async fn new(config: &Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()));
        if let Some(endpoint) = &config.dynamodb_endpoint {
            loader = loader.endpoint_url(endpoint);
        }
        let aws_config = loader.load().await;

        Self {
            client: Client::new(&aws_config),
            table_name: config.dynamodb_table.clone(),
        }
    }

    /// 構築済みのクライアントから作成（DynamoDB Local 向けの資格情報を差し込む場合など）
    pub fn from_client(client: Client, table_name: impl Into<String>) -> Self {
        Self {
            client,
            table_name: table_name.into(),
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }
}

/// DynamoDB をバックエンドにしたレコードストア
///
/// DynamoDB には行ロック付きの読み取りがないため、
/// プロセス内の行ロック（`RowLocks`）と、ロック下で読んだ `updated_at` を
/// 条件にした書き込み（compare-and-swap）を組み合わせる。
/// 条件に合わなかった書き込みは影響行数 0 として返す。
#[derive(Clone)]
pub struct DynamoDbTodoStore {
    db: DynamoDbClient,
    locks: RowLocks,
}

impl DynamoDbTodoStore {
    pub fn new(db: DynamoDbClient) -> Self {
        Self {
            db,
            locks: RowLocks::new(),
        }
    }

    pub async fn from_config(config: &Config) -> Self {
        info!(
            table = %config.dynamodb_table,
            environment = %config.environment,
            endpoint = config.dynamodb_endpoint.as_deref().unwrap_or("default"),
            "connecting todo store"
        );
        Self::new(DynamoDbClient::new(config).await)
    }

    pub fn db(&self) -> &DynamoDbClient {
        &self.db
    }
}

impl TodoStore for DynamoDbTodoStore {
    type Transaction = DynamoDbTransaction;

    async fn begin(&self) -> Result<DynamoDbTransaction, StorageError> {
        Ok(DynamoDbTransaction {
            db: self.db.clone(),
            locks: self.locks.clone(),
            held: HashMap::new(),
            observed: HashMap::new(),
        })
    }

    async fn query(&self, query: &TodoQuery) -> Result<Vec<Todo>, StorageError> {
        let filter = FilterExpression::from_query(query);
        let mut todos = Vec::new();
        let mut start_key: Option<HashMap<String, AttributeValue>> = None;

        loop {
            let output = trace_store_operation(BACKEND, "scan", || {
                self.db
                    .client()
                    .scan()
                    .table_name(self.db.table_name())
                    .filter_expression(filter.expression.clone())
                    .set_expression_attribute_names(Some(filter.names.clone()))
                    .set_expression_attribute_values(Some(filter.values.clone()))
                    .set_exclusive_start_key(start_key.take())
                    .send()
            })
            .await
            .map_err(|e| StorageError::with_source("scan todo", e))?;

            for item in output.items() {
                todos.push(item_to_todo(item)?);
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        // Scan の Limit は評価件数の上限なので、並び替えとページングはここで行う
        Ok(query.paginate(todos))
    }

    async fn fetch(&self, id: &TodoId) -> Result<Option<Todo>, StorageError> {
        let (todo, _) = get_todo(&self.db, id, false).await?;
        Ok(todo)
    }

    async fn insert(&self, todo: &Todo) -> Result<(), StorageError> {
        let result = trace_store_operation(BACKEND, "put_item", || {
            self.db
                .client()
                .put_item()
                .table_name(self.db.table_name())
                .set_item(Some(todo_to_item(todo)))
                .condition_expression("attribute_not_exists(PK)")
                .send()
        })
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => {
                let duplicate = e
                    .as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception());
                let context = if duplicate {
                    format!("duplicate key value violates unique constraint: id={}", todo.id)
                } else {
                    "insert todo".to_string()
                };
                Err(StorageError::with_source(context, e))
            }
        }
    }
}

/// `DynamoDbTodoStore` のトランザクション
///
/// 書き込みは呼び出した時点で確定する。リポジトリは書き込みを
/// コミット直前の最後の手順にしているので、確定後にロールバックされることはない。
pub struct DynamoDbTransaction {
    db: DynamoDbClient,
    locks: RowLocks,
    held: HashMap<TodoId, RowGuard>,
    /// ロック下で読んだ updated_at（条件付き書き込みの期待値）
    observed: HashMap<TodoId, String>,
}

impl DynamoDbTransaction {
    async fn ensure_locked(&mut self, id: &TodoId) {
        if !self.held.contains_key(id) {
            let guard = self.locks.acquire(id).await;
            self.held.insert(id.clone(), guard);
        }
    }

    /// 書き込み条件と、その式で使う値
    fn write_condition(&self, id: &TodoId) -> (String, Option<HashMap<String, AttributeValue>>) {
        match self.observed.get(id) {
            Some(updated_at) => (
                "attribute_exists(PK) AND updated_at = :expected_updated_at".to_string(),
                Some(HashMap::from([(
                    ":expected_updated_at".to_string(),
                    AttributeValue::S(updated_at.clone()),
                )])),
            ),
            None => ("attribute_exists(PK)".to_string(), None),
        }
    }
}

impl StoreTransaction for DynamoDbTransaction {
    async fn lock_row(&mut self, id: &TodoId) -> Result<Option<Todo>, StorageError> {
        self.ensure_locked(id).await;

        let (todo, updated_at) = get_todo(&self.db, id, true).await?;
        match updated_at {
            Some(raw) => {
                self.observed.insert(id.clone(), raw);
            }
            None => {
                self.observed.remove(id);
            }
        }
        Ok(todo)
    }

    async fn update_row(&mut self, todo: &Todo) -> Result<u64, StorageError> {
        self.ensure_locked(&todo.id).await;
        let (condition, values) = self.write_condition(&todo.id);

        let result = trace_store_operation(BACKEND, "put_item", || {
            self.db
                .client()
                .put_item()
                .table_name(self.db.table_name())
                .set_item(Some(todo_to_item(todo)))
                .condition_expression(condition)
                .set_expression_attribute_values(values)
                .send()
        })
        .await;

        match result {
            Ok(_) => {
                self.observed
                    .insert(todo.id.clone(), format_timestamp(&todo.updated_at));
                Ok(1)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                debug!(todo_id = %todo.id, "conditional update matched no row");
                Ok(0)
            }
            Err(e) => Err(StorageError::with_source("update todo", e)),
        }
    }

    async fn delete_row(&mut self, id: &TodoId) -> Result<u64, StorageError> {
        self.ensure_locked(id).await;
        let (condition, values) = self.write_condition(id);

        let result = trace_store_operation(BACKEND, "delete_item", || {
            self.db
                .client()
                .delete_item()
                .table_name(self.db.table_name())
                .set_key(Some(TodoKeys::for_todo(id).into_key_map()))
                .condition_expression(condition)
                .set_expression_attribute_values(values)
                .send()
        })
        .await;

        match result {
            Ok(_) => {
                self.observed.remove(id);
                Ok(1)
            }
            Err(e)
                if e.as_service_error()
                    .is_some_and(|se| se.is_conditional_check_failed_exception()) =>
            {
                debug!(todo_id = %id, "conditional delete matched no row");
                Ok(0)
            }
            Err(e) => Err(StorageError::with_source("delete todo", e)),
        }
    }

    async fn commit(mut self) -> Result<(), StorageError> {
        debug!(locks = self.held.len(), "dynamodb transaction committed");
        self.held.clear();
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StorageError> {
        debug!(locks = self.held.len(), "dynamodb transaction rolled back");
        self.observed.clear();
        self.held.clear();
        Ok(())
    }
}

/// 1 件取得し、ToDo と保存されている updated_at の生文字列を返す
async fn get_todo(
    db: &DynamoDbClient,
    id: &TodoId,
    consistent_read: bool,
) -> Result<(Option<Todo>, Option<String>), StorageError> {
    let output = trace_store_operation(BACKEND, "get_item", || {
        db.client()
            .get_item()
            .table_name(db.table_name())
            .set_key(Some(TodoKeys::for_todo(id).into_key_map()))
            .consistent_read(consistent_read)
            .send()
    })
    .await
    .map_err(|e| StorageError::with_source("get todo", e))?;

    match output.item() {
        Some(item) => {
            let todo = item_to_todo(item)?;
            let updated_at = string_attr(item, "updated_at")?.clone();
            Ok((Some(todo), Some(updated_at)))
        }
        None => Ok((None, None)),
    }
}

/// `TodoQuery` の述語を DynamoDB のフィルタ式に変換したもの
#[derive(Debug, Clone, PartialEq)]
pub struct FilterExpression {
    pub expression: String,
    pub names: HashMap<String, String>,
    pub values: HashMap<String, AttributeValue>,
}

impl FilterExpression {
    /// 値はすべて `:p{位置}` のプレースホルダで渡す。
    /// ToDo 以外のアイテムを除くため PK の前方一致を常に先頭に置く。
    pub fn from_query(query: &TodoQuery) -> Self {
        let mut clauses = vec!["begins_with(#pk, :pk_prefix)".to_string()];
        let mut names = HashMap::from([("#pk".to_string(), "PK".to_string())]);
        let mut values = HashMap::from([(
            ":pk_prefix".to_string(),
            AttributeValue::S(TodoKeys::PK_PREFIX.to_string()),
        )]);

        for predicate in query.predicates() {
            let column = predicate.column().as_str();
            let name = format!("#{column}");
            names.insert(name.clone(), column.to_string());

            match predicate {
                Predicate::Equals { position, .. } => {
                    let placeholder = format!(":p{position}");
                    if let Some(param) = query.param(*position) {
                        values.insert(placeholder.clone(), param_to_attribute(param));
                    }
                    clauses.push(format!("{name} = {placeholder}"));
                }
                Predicate::IsNull { .. } => {
                    clauses.push(format!("attribute_not_exists({name})"));
                }
            }
        }

        Self {
            expression: clauses.join(" AND "),
            names,
            values,
        }
    }
}

//! ToDo リポジトリ
//!
//! 読み取りはストアへそのまま委譲し、更新・削除は 1 回の呼び出しごとに
//! 短いトランザクションを張って次の順で進めます。
//!
//! `begin → 行ロック取得 → 所有者確認 → パッチ適用（変更がある場合のみ書き込み） → commit`
//!
//! どの段階で失敗してもエラーを返す前にロールバックします。
//! ロールバック自体の失敗は、先に起きたエラーを上書きしません。

use crate::query::TodoQuery;
use crate::store::{StoreTransaction, TodoStore};
use domain::{Caller, Field, NewTodo, Todo, TodoError, TodoFilter, TodoId, TodoPatch};
use shared::log_todo_error;
use tracing::{debug, error, instrument, warn, Instrument};

pub struct TodoRepository<S> {
    store: S,
}

impl<S: TodoStore> TodoRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// フィルタに一致するレコードを subject 昇順で返す（一致なしは空）
    #[instrument(skip_all, fields(limit = filter.limit, offset = filter.offset))]
    pub async fn list(&self, filter: &TodoFilter) -> Result<Vec<Todo>, TodoError> {
        let query = TodoQuery::from_filter(filter);
        debug!(sql = %query.to_sql(), params = query.params().len(), "listing todos");

        let todos = self.store.query(&query).await.inspect_err(|e| {
            error!(error = %e, "failed to list todos");
        })?;
        debug!(count = todos.len(), "listed todos");
        Ok(todos)
    }

    /// ID で 1 件取得
    #[instrument(skip_all, fields(todo_id = %id))]
    pub async fn get(&self, id: &TodoId) -> Result<Todo, TodoError> {
        let todo = self.store.fetch(id).await.inspect_err(|e| {
            error!(error = %e, "failed to get todo");
        })?;
        todo.ok_or_else(|| TodoError::NotFound(id.clone()))
    }

    /// 呼び出し元が所有するレコードだけを対象に一覧を返す
    ///
    /// フィルタで他人の所有者を指定した場合は常に空になる。
    pub async fn list_owned(
        &self,
        caller: &Caller,
        filter: &TodoFilter,
    ) -> Result<Vec<Todo>, TodoError> {
        if let Field::Set(owner_id) = &filter.owner_id {
            if !caller.owns(owner_id) {
                return Ok(Vec::new());
            }
        }
        let scoped = TodoFilter {
            owner_id: Field::Set(caller.user_id().clone()),
            ..filter.clone()
        };
        self.list(&scoped)
            .instrument(caller.span())
            .await
            .inspect_err(|e| log_todo_error(caller, "list", e))
    }

    /// 呼び出し元が所有するレコードを 1 件取得
    pub async fn get_owned(&self, caller: &Caller, id: &TodoId) -> Result<Todo, TodoError> {
        async {
            let todo = self.get(id).await?;
            if !caller.owns(&todo.owner_id) {
                return Err(TodoError::PermissionDenied);
            }
            Ok::<_, TodoError>(todo)
        }
        .instrument(caller.span())
        .await
        .inspect_err(|e| log_todo_error(caller, "get", e))
    }

    /// 新規作成
    ///
    /// ID・所有者・作成/更新日時はここで設定する。所有者の確認は行わない。
    pub async fn create(&self, caller: &Caller, input: NewTodo) -> Result<Todo, TodoError> {
        async {
            let todo = Todo::create(caller.user_id().clone(), input);
            self.store.insert(&todo).await?;
            debug!(todo_id = %todo.id, "todo created");
            Ok::<_, TodoError>(todo)
        }
        .instrument(caller.span())
        .await
        .inspect_err(|e| log_todo_error(caller, "create", e))
    }

    /// 部分更新
    ///
    /// 指定されたフィールドが 1 つもなければ書き込まずにコミットし、
    /// updated_at も進めない。成功時はコミットされた状態のレコードを返す。
    pub async fn update(
        &self,
        caller: &Caller,
        id: &TodoId,
        patch: TodoPatch,
    ) -> Result<Todo, TodoError> {
        async {
            let mut tx = self.store.begin().await?;
            let result = update_locked(&mut tx, caller, id, patch).await;
            finish(tx, result).await
        }
        .instrument(caller.span())
        .await
        .inspect_err(|e| log_todo_error(caller, "update", e))
    }

    /// 物理削除
    pub async fn delete(&self, caller: &Caller, id: &TodoId) -> Result<(), TodoError> {
        async {
            let mut tx = self.store.begin().await?;
            let result = delete_locked(&mut tx, caller, id).await;
            finish(tx, result).await
        }
        .instrument(caller.span())
        .await
        .inspect_err(|e| log_todo_error(caller, "delete", e))
    }
}

impl<S: Clone> Clone for TodoRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

/// 行ロックを取り、所有者を確認したうえでレコードを返す
async fn lock_owned_row<T: StoreTransaction>(
    tx: &mut T,
    caller: &Caller,
    id: &TodoId,
) -> Result<Todo, TodoError> {
    let todo = tx
        .lock_row(id)
        .await?
        .ok_or_else(|| TodoError::NotFound(id.clone()))?;

    // 所有者の確認は必ずロック取得後の値で行う
    if !caller.owns(&todo.owner_id) {
        return Err(TodoError::PermissionDenied);
    }
    Ok(todo)
}

async fn update_locked<T: StoreTransaction>(
    tx: &mut T,
    caller: &Caller,
    id: &TodoId,
    patch: TodoPatch,
) -> Result<Todo, TodoError> {
    let mut todo = lock_owned_row(tx, caller, id).await?;

    if !patch.apply_to(&mut todo) {
        debug!(todo_id = %id, "empty patch, skipping write");
        return Ok(todo);
    }
    todo.touch();

    let affected = tx.update_row(&todo).await?;
    if affected == 0 {
        return Err(TodoError::NotFound(id.clone()));
    }
    debug!(todo_id = %id, updated_at = %todo.updated_at, "todo updated");
    Ok(todo)
}

async fn delete_locked<T: StoreTransaction>(
    tx: &mut T,
    caller: &Caller,
    id: &TodoId,
) -> Result<(), TodoError> {
    lock_owned_row(tx, caller, id).await?;

    let affected = tx.delete_row(id).await?;
    if affected == 0 {
        return Err(TodoError::NotFound(id.clone()));
    }
    debug!(todo_id = %id, "todo deleted");
    Ok(())
}

/// 成功ならコミット、失敗ならロールバックして元のエラーを返す
async fn finish<T: StoreTransaction, V>(
    tx: T,
    result: Result<V, TodoError>,
) -> Result<V, TodoError> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(
                    error = %err,
                    rollback_error = %rollback_err,
                    "rollback failed, returning the original error"
                );
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryTodoStore, InMemoryTransaction};
    use domain::{StorageError, UserId};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    /// 障害を差し込めるストア
    #[derive(Clone, Default)]
    struct FaultyStore {
        inner: InMemoryTodoStore,
        faults: Arc<Faults>,
    }

    #[derive(Default)]
    struct Faults {
        fail_begin: AtomicBool,
        write_affects_nothing: AtomicBool,
        fail_commit: AtomicBool,
        fail_rollback: AtomicBool,
        rolled_back: AtomicBool,
    }

    struct FaultyTransaction {
        inner: InMemoryTransaction,
        faults: Arc<Faults>,
    }

    impl TodoStore for FaultyStore {
        type Transaction = FaultyTransaction;

        async fn begin(&self) -> Result<FaultyTransaction, StorageError> {
            if self.faults.fail_begin.load(Ordering::SeqCst) {
                return Err(StorageError::new("connection refused"));
            }
            Ok(FaultyTransaction {
                inner: self.inner.begin().await?,
                faults: Arc::clone(&self.faults),
            })
        }

        async fn query(&self, query: &TodoQuery) -> Result<Vec<Todo>, StorageError> {
            self.inner.query(query).await
        }

        async fn fetch(&self, id: &TodoId) -> Result<Option<Todo>, StorageError> {
            self.inner.fetch(id).await
        }

        async fn insert(&self, todo: &Todo) -> Result<(), StorageError> {
            self.inner.insert(todo).await
        }
    }

    impl StoreTransaction for FaultyTransaction {
        async fn lock_row(&mut self, id: &TodoId) -> Result<Option<Todo>, StorageError> {
            self.inner.lock_row(id).await
        }

        async fn update_row(&mut self, todo: &Todo) -> Result<u64, StorageError> {
            if self.faults.write_affects_nothing.load(Ordering::SeqCst) {
                return Ok(0);
            }
            self.inner.update_row(todo).await
        }

        async fn delete_row(&mut self, id: &TodoId) -> Result<u64, StorageError> {
            if self.faults.write_affects_nothing.load(Ordering::SeqCst) {
                return Ok(0);
            }
            self.inner.delete_row(id).await
        }

        async fn commit(self) -> Result<(), StorageError> {
            if self.faults.fail_commit.load(Ordering::SeqCst) {
                // コミットできなかった書き込みは破棄される
                self.inner.rollback().await?;
                return Err(StorageError::new("could not serialize access"));
            }
            self.inner.commit().await
        }

        async fn rollback(self) -> Result<(), StorageError> {
            self.faults.rolled_back.store(true, Ordering::SeqCst);
            self.inner.rollback().await?;
            if self.faults.fail_rollback.load(Ordering::SeqCst) {
                return Err(StorageError::new("connection lost during rollback"));
            }
            Ok(())
        }
    }

    async fn seeded() -> (TodoRepository<FaultyStore>, Caller, Todo) {
        let repo = TodoRepository::new(FaultyStore::default());
        let caller = Caller::new(UserId::new());
        let todo = repo
            .create(&caller, NewTodo::new("Buy milk").with_priority(1))
            .await
            .unwrap();
        (repo, caller, todo)
    }

    #[tokio::test]
    async fn begin_failure_is_a_storage_error() {
        let (repo, caller, todo) = seeded().await;
        repo.store().faults.fail_begin.store(true, Ordering::SeqCst);

        let err = repo
            .update(&caller, &todo.id, TodoPatch::new().with_completed(true))
            .await
            .unwrap_err();

        assert!(matches!(err, TodoError::Storage(_)));
        assert!(!repo.store().faults.rolled_back.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn zero_affected_rows_on_update_is_not_found_and_rolls_back() {
        let (repo, caller, todo) = seeded().await;
        repo.store()
            .faults
            .write_affects_nothing
            .store(true, Ordering::SeqCst);

        let err = repo
            .update(&caller, &todo.id, TodoPatch::new().with_subject("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, TodoError::NotFound(ref id) if id == &todo.id));
        assert!(repo.store().faults.rolled_back.load(Ordering::SeqCst));
        assert_eq!(repo.get(&todo.id).await.unwrap(), todo);
    }

    #[tokio::test]
    async fn zero_affected_rows_on_delete_is_not_found() {
        let (repo, caller, todo) = seeded().await;
        repo.store()
            .faults
            .write_affects_nothing
            .store(true, Ordering::SeqCst);

        let err = repo.delete(&caller, &todo.id).await.unwrap_err();

        assert!(matches!(err, TodoError::NotFound(_)));
        assert!(repo.get(&todo.id).await.is_ok());
    }

    #[tokio::test]
    async fn commit_failure_leaves_record_unchanged() {
        let (repo, caller, todo) = seeded().await;
        repo.store().faults.fail_commit.store(true, Ordering::SeqCst);

        let err = repo
            .update(&caller, &todo.id, TodoPatch::new().with_completed(true))
            .await
            .unwrap_err();

        assert!(matches!(err, TodoError::Storage(_)));
        assert_eq!(repo.get(&todo.id).await.unwrap(), todo);
    }

    #[tokio::test]
    async fn rollback_failure_does_not_mask_permission_denied() {
        let (repo, _, todo) = seeded().await;
        repo.store().faults.fail_rollback.store(true, Ordering::SeqCst);
        let stranger = Caller::new(UserId::new());

        let err = repo
            .update(&stranger, &todo.id, TodoPatch::new().with_subject("x"))
            .await
            .unwrap_err();

        assert!(matches!(err, TodoError::PermissionDenied));
        assert!(repo.store().faults.rolled_back.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn rollback_failure_does_not_mask_not_found() {
        let (repo, caller, _) = seeded().await;
        repo.store().faults.fail_rollback.store(true, Ordering::SeqCst);
        let missing = TodoId::new();

        let err = repo.delete(&caller, &missing).await.unwrap_err();

        assert!(matches!(err, TodoError::NotFound(ref id) if id == &missing));
    }

    #[tokio::test]
    async fn failed_mutation_releases_row_lock() {
        let (repo, _, todo) = seeded().await;
        let stranger = Caller::new(UserId::new());

        let _ = repo.delete(&stranger, &todo.id).await;

        assert_eq!(repo.store().inner.active_row_locks(), 0);
    }
}

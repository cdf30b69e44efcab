use crate::query::TodoQuery;
use crate::row_lock::{RowGuard, RowLocks};
use crate::store::{StoreTransaction, TodoStore};
use domain::{StorageError, Todo, TodoId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

type Rows = HashMap<TodoId, Todo>;

/// プロセス内のレコードストア（開発/テスト用）
///
/// 行ロックは `RowLocks`、書き込みはトランザクション内に積んでおき
/// コミット時にまとめて反映する。読み取りはコミット済みの行だけを見る。
#[derive(Clone, Default)]
pub struct InMemoryTodoStore {
    rows: Arc<Mutex<Rows>>,
    locks: RowLocks,
}

impl InMemoryTodoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 保存済みの件数
    pub fn len(&self) -> usize {
        lock_rows(&self.rows).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 保持・待機中の行ロック数
    pub fn active_row_locks(&self) -> usize {
        self.locks.active()
    }
}

impl TodoStore for InMemoryTodoStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> Result<InMemoryTransaction, StorageError> {
        Ok(InMemoryTransaction {
            rows: Arc::clone(&self.rows),
            locks: self.locks.clone(),
            held: HashMap::new(),
            staged: Vec::new(),
        })
    }

    async fn query(&self, query: &TodoQuery) -> Result<Vec<Todo>, StorageError> {
        let matched: Vec<Todo> = lock_rows(&self.rows)
            .values()
            .filter(|todo| query.matches(todo))
            .cloned()
            .collect();
        Ok(query.paginate(matched))
    }

    async fn fetch(&self, id: &TodoId) -> Result<Option<Todo>, StorageError> {
        Ok(lock_rows(&self.rows).get(id).cloned())
    }

    async fn insert(&self, todo: &Todo) -> Result<(), StorageError> {
        let mut rows = lock_rows(&self.rows);
        if rows.contains_key(&todo.id) {
            return Err(StorageError::new(format!(
                "duplicate key value violates unique constraint: id={}",
                todo.id
            )));
        }
        rows.insert(todo.id.clone(), todo.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
enum StagedWrite {
    Update(Todo),
    Delete(TodoId),
}

impl StagedWrite {
    fn id(&self) -> &TodoId {
        match self {
            StagedWrite::Update(todo) => &todo.id,
            StagedWrite::Delete(id) => id,
        }
    }
}

/// `InMemoryTodoStore` のトランザクション
pub struct InMemoryTransaction {
    rows: Arc<Mutex<Rows>>,
    locks: RowLocks,
    held: HashMap<TodoId, RowGuard>,
    staged: Vec<StagedWrite>,
}

impl InMemoryTransaction {
    async fn ensure_locked(&mut self, id: &TodoId) {
        if !self.held.contains_key(id) {
            let guard = self.locks.acquire(id).await;
            self.held.insert(id.clone(), guard);
        }
    }

    /// コミット済みの行に、このトランザクションの未確定の書き込みを重ねた値
    fn visible_row(&self, id: &TodoId) -> Option<Todo> {
        let committed = lock_rows(&self.rows).get(id).cloned();
        self.staged
            .iter()
            .filter(|write| write.id() == id)
            .fold(committed, |_, write| match write {
                StagedWrite::Update(todo) => Some(todo.clone()),
                StagedWrite::Delete(_) => None,
            })
    }
}

impl StoreTransaction for InMemoryTransaction {
    async fn lock_row(&mut self, id: &TodoId) -> Result<Option<Todo>, StorageError> {
        self.ensure_locked(id).await;
        Ok(self.visible_row(id))
    }

    async fn update_row(&mut self, todo: &Todo) -> Result<u64, StorageError> {
        self.ensure_locked(&todo.id).await;
        if self.visible_row(&todo.id).is_none() {
            return Ok(0);
        }
        self.staged.push(StagedWrite::Update(todo.clone()));
        Ok(1)
    }

    async fn delete_row(&mut self, id: &TodoId) -> Result<u64, StorageError> {
        self.ensure_locked(id).await;
        if self.visible_row(id).is_none() {
            return Ok(0);
        }
        self.staged.push(StagedWrite::Delete(id.clone()));
        Ok(1)
    }

    async fn commit(mut self) -> Result<(), StorageError> {
        let applied = self.staged.len();
        {
            let mut rows = lock_rows(&self.rows);
            for write in self.staged.drain(..) {
                match write {
                    StagedWrite::Update(todo) => {
                        rows.insert(todo.id.clone(), todo);
                    }
                    StagedWrite::Delete(id) => {
                        rows.remove(&id);
                    }
                }
            }
        }
        debug!(applied, locks = self.held.len(), "in-memory transaction committed");
        // 反映後にロックを解放する
        self.held.clear();
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StorageError> {
        debug!(
            discarded = self.staged.len(),
            locks = self.held.len(),
            "in-memory transaction rolled back"
        );
        self.staged.clear();
        self.held.clear();
        Ok(())
    }
}

fn lock_rows(rows: &Mutex<Rows>) -> MutexGuard<'_, Rows> {
    rows.lock().unwrap_or_else(PoisonError::into_inner)
}

use domain::TodoId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OwnedMutexGuard;
use tracing::trace;

type LockTable = HashMap<TodoId, Arc<tokio::sync::Mutex<()>>>;

/// 行単位の排他ロック表
///
/// ID ごとに非同期 Mutex を持つ。誰も保持・待機していないエントリは解放時に取り除く。
#[derive(Clone, Default)]
pub struct RowLocks {
    table: Arc<Mutex<LockTable>>,
}

impl RowLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 行ロックを取得（他が保持中なら解放まで待つ）
    pub async fn acquire(&self, id: &TodoId) -> RowGuard {
        let mutex = {
            let mut table = lock_table(&self.table);
            Arc::clone(table.entry(id.clone()).or_default())
        };
        let guard = mutex.lock_owned().await;
        trace!(todo_id = %id, "row lock acquired");

        RowGuard {
            id: id.clone(),
            guard: Some(guard),
            table: Arc::clone(&self.table),
        }
    }

    /// 現在保持または待機されている行の数
    pub fn active(&self) -> usize {
        lock_table(&self.table).len()
    }
}

/// 保持中の行ロック。drop で解放される
pub struct RowGuard {
    id: TodoId,
    guard: Option<OwnedMutexGuard<()>>,
    table: Arc<Mutex<LockTable>>,
}

impl RowGuard {
    pub fn id(&self) -> &TodoId {
        &self.id
    }
}

impl Drop for RowGuard {
    fn drop(&mut self) {
        drop(self.guard.take());

        let mut table = lock_table(&self.table);
        let unused = table
            .get(&self.id)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1);
        if unused {
            table.remove(&self.id);
        }
        trace!(todo_id = %self.id, "row lock released");
    }
}

fn lock_table(table: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_row_is_exclusive() {
        let locks = RowLocks::new();
        let id = TodoId::new();

        let first = locks.acquire(&id).await;
        let second = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&id)).await;
        assert!(second.is_err(), "second acquire must wait");

        drop(first);
        let second = tokio::time::timeout(Duration::from_secs(1), locks.acquire(&id)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn different_rows_do_not_block() {
        let locks = RowLocks::new();
        let _a = locks.acquire(&TodoId::new()).await;
        let b = tokio::time::timeout(Duration::from_millis(50), locks.acquire(&TodoId::new())).await;
        assert!(b.is_ok());
        assert_eq!(locks.active(), 2);
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = RowLocks::new();
        let id = TodoId::new();
        {
            let guard = locks.acquire(&id).await;
            assert_eq!(guard.id(), &id);
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
    }
}

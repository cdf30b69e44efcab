use crate::query::TodoQuery;
use domain::{StorageError, Todo, TodoId};
use std::future::Future;

/// レコードストアの抽象
///
/// 読み取り系（`query` / `fetch`）はロックを取らず、コミット済みの状態を返す。
/// 書き込み系はすべて `begin` で開始したトランザクション経由で行う。
pub trait TodoStore: Send + Sync {
    type Transaction: StoreTransaction;

    /// トランザクションを開始
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction, StorageError>> + Send;

    /// 述語・並び順・ページングを適用した一覧を返す
    fn query(
        &self,
        query: &TodoQuery,
    ) -> impl Future<Output = Result<Vec<Todo>, StorageError>> + Send;

    /// ID で 1 件取得（存在しなければ `None`）
    fn fetch(&self, id: &TodoId)
        -> impl Future<Output = Result<Option<Todo>, StorageError>> + Send;

    /// 新規レコードを挿入。ID の重複は制約違反としてエラーにする
    fn insert(&self, todo: &Todo) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// 書き込み用トランザクション
///
/// `lock_row` で取得した行ロックは `commit` / `rollback` まで保持される。
/// その間、同じ行をロック・書き込みしようとする他のトランザクションは待たされる。
/// コミットもロールバックもせずに破棄した場合はロールバック扱い。
pub trait StoreTransaction: Send {
    /// 排他ロックを取って行を読む（`SELECT ... FOR UPDATE` 相当）
    fn lock_row(
        &mut self,
        id: &TodoId,
    ) -> impl Future<Output = Result<Option<Todo>, StorageError>> + Send;

    /// ID をキーに行を上書きし、影響行数を返す
    fn update_row(&mut self, todo: &Todo)
        -> impl Future<Output = Result<u64, StorageError>> + Send;

    /// ID をキーに行を物理削除し、影響行数を返す
    fn delete_row(&mut self, id: &TodoId)
        -> impl Future<Output = Result<u64, StorageError>> + Send;

    fn commit(self) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn rollback(self) -> impl Future<Output = Result<(), StorageError>> + Send;
}

//! 一覧取得用のクエリ組み立て
//!
//! `TodoFilter` の指定済みフィールドごとに述語を 1 つ積み、値はすべて
//! 位置パラメータとして束縛します。例外は `due_date IS NULL` だけで、
//! これはパラメータを持ちません。並び順は `subject ASC, id ASC` で固定です。

use chrono::NaiveDate;
use domain::{Field, Todo, TodoFilter};
use std::cmp::Ordering;

const SELECT_COLUMNS: &str =
    "id, owner_id, subject, description, priority, due_date, completed, created_at, updated_at";

/// フィルタ可能な列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Id,
    OwnerId,
    Priority,
    DueDate,
    Completed,
}

impl Column {
    pub fn as_str(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::OwnerId => "owner_id",
            Column::Priority => "priority",
            Column::DueDate => "due_date",
            Column::Completed => "completed",
        }
    }

    /// レコードの列値。`None` は NULL
    fn value_of(&self, todo: &Todo) -> Option<QueryParam> {
        match self {
            Column::Id => Some(QueryParam::Text(todo.id.as_str().to_string())),
            Column::OwnerId => Some(QueryParam::Text(todo.owner_id.as_str().to_string())),
            Column::Priority => Some(QueryParam::Integer(todo.priority)),
            Column::DueDate => todo.due_date.map(QueryParam::Date),
            Column::Completed => Some(QueryParam::Bool(todo.completed)),
        }
    }
}

/// 束縛パラメータ
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryParam {
    Text(String),
    Integer(i32),
    Date(NaiveDate),
    Bool(bool),
}

/// WHERE 句の述語
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `column = $position`（position は 1 始まり）
    Equals { column: Column, position: usize },
    /// `column IS NULL`
    IsNull { column: Column },
}

impl Predicate {
    pub fn column(&self) -> Column {
        match self {
            Predicate::Equals { column, .. } | Predicate::IsNull { column } => *column,
        }
    }

    fn render(&self) -> String {
        match self {
            Predicate::Equals { column, position } => format!("{} = ${position}", column.as_str()),
            Predicate::IsNull { column } => format!("{} IS NULL", column.as_str()),
        }
    }
}

/// 述語とパラメータを宣言順に積むビルダー
#[derive(Debug, Default)]
pub struct QueryBuilder {
    predicates: Vec<Predicate>,
    params: Vec<QueryParam>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_eq(&mut self, column: Column, param: QueryParam) -> &mut Self {
        self.params.push(param);
        self.predicates.push(Predicate::Equals {
            column,
            position: self.params.len(),
        });
        self
    }

    pub fn push_is_null(&mut self, column: Column) -> &mut Self {
        self.predicates.push(Predicate::IsNull { column });
        self
    }

    pub fn build(self, limit: u64, offset: u64) -> TodoQuery {
        TodoQuery {
            predicates: self.predicates,
            params: self.params,
            limit: (limit > 0).then_some(limit),
            offset: (offset > 0).then_some(offset),
        }
    }
}

/// 組み立て済みの一覧クエリ
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TodoQuery {
    predicates: Vec<Predicate>,
    params: Vec<QueryParam>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl TodoQuery {
    /// フィルタからクエリを組み立てる
    ///
    /// 述語の順序は id, owner_id, priority, due_date, completed で固定。
    pub fn from_filter(filter: &TodoFilter) -> Self {
        let mut builder = QueryBuilder::new();

        if let Field::Set(id) = &filter.id {
            builder.push_eq(Column::Id, QueryParam::Text(id.as_str().to_string()));
        }
        if let Field::Set(owner_id) = &filter.owner_id {
            builder.push_eq(Column::OwnerId, QueryParam::Text(owner_id.as_str().to_string()));
        }
        if let Field::Set(priority) = filter.priority {
            builder.push_eq(Column::Priority, QueryParam::Integer(priority));
        }
        match filter.due_date {
            Field::Set(Some(date)) => {
                builder.push_eq(Column::DueDate, QueryParam::Date(date));
            }
            Field::Set(None) => {
                builder.push_is_null(Column::DueDate);
            }
            Field::Unset => {}
        }
        if let Field::Set(completed) = filter.completed {
            builder.push_eq(Column::Completed, QueryParam::Bool(completed));
        }

        builder.build(filter.limit, filter.offset)
    }

    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    /// 位置パラメータを取得（1 始まり）
    pub fn param(&self, position: usize) -> Option<&QueryParam> {
        position.checked_sub(1).and_then(|i| self.params.get(i))
    }

    pub fn where_clause(&self) -> String {
        if self.predicates.is_empty() {
            return "TRUE".to_string();
        }
        self.predicates
            .iter()
            .map(Predicate::render)
            .collect::<Vec<_>>()
            .join(" AND ")
    }

    pub fn order_by_clause(&self) -> &'static str {
        "ORDER BY subject ASC, id ASC"
    }

    pub fn limit_clause(&self) -> Option<String> {
        self.limit.map(|n| format!("LIMIT {n}"))
    }

    pub fn offset_clause(&self) -> Option<String> {
        self.offset.map(|n| format!("OFFSET {n}"))
    }

    pub fn to_sql(&self) -> String {
        let mut sql = format!(
            "SELECT {SELECT_COLUMNS} FROM todo WHERE {} {}",
            self.where_clause(),
            self.order_by_clause()
        );
        for clause in [self.limit_clause(), self.offset_clause()].into_iter().flatten() {
            sql.push(' ');
            sql.push_str(&clause);
        }
        sql
    }

    /// レコードが全述語を満たすか
    ///
    /// NULL との等値比較は常に偽。
    pub fn matches(&self, todo: &Todo) -> bool {
        self.predicates.iter().all(|predicate| match predicate {
            Predicate::Equals { column, position } => {
                match (column.value_of(todo), self.param(*position)) {
                    (Some(value), Some(param)) => &value == param,
                    _ => false,
                }
            }
            Predicate::IsNull { column } => column.value_of(todo).is_none(),
        })
    }

    /// 並び替えてから offset / limit を適用する
    pub fn paginate(&self, mut todos: Vec<Todo>) -> Vec<Todo> {
        todos.sort_by(compare_for_listing);

        let offset = self.offset.map_or(0, |n| usize::try_from(n).unwrap_or(usize::MAX));
        let limit = self.limit.map_or(usize::MAX, |n| usize::try_from(n).unwrap_or(usize::MAX));
        todos.into_iter().skip(offset).take(limit).collect()
    }
}

/// 一覧の並び順（subject 昇順、同値なら id 昇順）
pub fn compare_for_listing(a: &Todo, b: &Todo) -> Ordering {
    a.subject.cmp(&b.subject).then_with(|| a.id.cmp(&b.id))
}

pub mod dynamodb;
pub mod memory;
pub mod models;
pub mod query;
pub mod repository;
pub mod row_lock;
pub mod store;

pub use dynamodb::*;
pub use memory::*;
pub use models::*;
pub use query::*;
pub use repository::*;
pub use row_lock::*;
pub use store::*;

pub mod errors;
pub mod field;
pub mod filter;
pub mod identity;
pub mod patch;
pub mod todo;

pub use errors::*;
pub use field::*;
pub use filter::*;
pub use identity::*;
pub use patch::*;
pub use todo::*;

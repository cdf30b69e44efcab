pub mod config;
pub mod errors;
pub mod telemetry;
pub mod tracing;

pub use config::*;
pub use errors::*;
pub use telemetry::*;
pub use self::tracing::init_tracing;

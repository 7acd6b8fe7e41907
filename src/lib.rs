// Core modules
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod execution;
pub mod models;
pub mod oracle;

// Re-export commonly used types
pub use config::Settings;
pub use engine::{CycleOutcome, Engine, TradingContext};
pub use error::Error;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Error>;

pub mod error;
pub mod time_value;
pub mod types;

pub mod capital;
pub mod exit;
pub mod pipeline;
pub mod schedule;
pub mod waterfall;

#[cfg(feature = "scenarios")]
pub mod scenarios;

pub use error::LboError;
pub use types::*;

/// Standard result type for all engine operations
pub type LboResult<T> = Result<T, LboError>;

//! Error classification and retry.
//!
//! A failure is classified once, a strategy is picked for its kind, and the
//! engine drives attempts until the strategy gives up.

pub mod classifier;
pub mod engine;
pub mod strategy;

pub use classifier::{classify, classify_error, is_retryable, recovery_hint, ErrorKind};
pub use engine::execute_with_recovery;
pub use strategy::RetryStrategy;

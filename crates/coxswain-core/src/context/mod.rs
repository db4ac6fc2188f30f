//! Context window management: size estimation and compression.

pub mod compressor;
pub mod manager;

pub use manager::{ContextManager, ContextStats};

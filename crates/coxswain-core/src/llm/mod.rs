//! Completion client seam and fallback tool-call parsing.

pub mod client;
pub mod fallback;

pub use client::CompletionClient;

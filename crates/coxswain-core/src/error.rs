//! Library error types.

use thiserror::Error;

/// Errors surfaced by the agent and its side-channels.
///
/// `run()` only ever returns `Completion`; every other failure inside the
/// loop is converted into conversation content. The storage variants come
/// from the queue and session stores.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The completion backend failed after its own retries
    #[error("completion request failed: {0}")]
    Completion(anyhow::Error),

    /// SQLite failure in a side-channel store
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Payload or transcript (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored row no longer parses into its model type
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn completion_errors_render_their_cause() {
        let error = AgentError::Completion(anyhow!("backend unreachable"));
        assert_eq!(error.to_string(), "completion request failed: backend unreachable");
    }

    #[test]
    fn storage_errors_convert_from_rusqlite() {
        let error: AgentError = rusqlite::Error::InvalidQuery.into();
        assert!(matches!(error, AgentError::Storage(_)));
    }
}

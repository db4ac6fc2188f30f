//! Context window accounting.

use serde::Serialize;

use crate::models::message::Message;

/// Rough characters-per-token ratio used for estimation
const CHARS_PER_TOKEN: usize = 4;

pub const DEFAULT_MAX_TOKENS: usize = 8000;
pub const DEFAULT_COMPRESSION_THRESHOLD: f64 = 0.75;

/// Snapshot of context usage
#[derive(Debug, Clone, Serialize)]
pub struct ContextStats {
    pub message_count: usize,
    pub estimated_tokens: usize,
    pub max_tokens: usize,
    pub utilization: f64,
    pub should_compress: bool,
}

/// Tracks estimated context size and decides when to compress.
///
/// Token counts are estimated from character length; the estimate only has
/// to be consistent, not exact, since it is compared against a threshold.
#[derive(Debug, Clone)]
pub struct ContextManager {
    max_tokens: usize,
    compression_threshold: f64,
}

impl ContextManager {
    pub fn new(max_tokens: usize, compression_threshold: f64) -> Self {
        Self {
            max_tokens,
            compression_threshold,
        }
    }

    /// Estimate the token footprint of a transcript.
    ///
    /// Counts message content plus serialized tool-call parameters, at
    /// roughly four characters per token.
    pub fn estimate_tokens(&self, messages: &[Message]) -> usize {
        let mut total_chars = 0;
        for message in messages {
            total_chars += message.content.chars().count();
            if let Some(calls) = &message.tool_calls {
                for call in calls {
                    total_chars += call.parameters.to_string().chars().count();
                }
            }
        }
        total_chars / CHARS_PER_TOKEN
    }

    /// True when the estimate exceeds the compression threshold
    pub fn should_compress(&self, messages: &[Message]) -> bool {
        let estimated = self.estimate_tokens(messages);
        estimated as f64 > self.max_tokens as f64 * self.compression_threshold
    }

    pub fn stats(&self, messages: &[Message]) -> ContextStats {
        let estimated = self.estimate_tokens(messages);
        ContextStats {
            message_count: messages.len(),
            estimated_tokens: estimated,
            max_tokens: self.max_tokens,
            utilization: estimated as f64 / self.max_tokens as f64,
            should_compress: self.should_compress(messages),
        }
    }
}

impl Default for ContextManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS, DEFAULT_COMPRESSION_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::models::message::ToolCall;

    #[test]
    fn estimates_scale_with_content_length() {
        let manager = ContextManager::default();
        let messages = vec![Message::user("a".repeat(400))];
        assert_eq!(manager.estimate_tokens(&messages), 100);
    }

    #[test]
    fn tool_call_parameters_count_toward_estimate() {
        let manager = ContextManager::default();
        let plain = vec![Message::assistant("x")];
        let with_call = vec![Message::assistant("x").with_tool_calls(vec![ToolCall {
            id: "1".to_string(),
            name: "Read".to_string(),
            parameters: json!({"file_path": "/tmp/some/long/path/to/a/file.txt"}),
        }])];
        assert!(manager.estimate_tokens(&with_call) > manager.estimate_tokens(&plain));
    }

    #[test]
    fn compression_triggers_above_threshold() {
        let manager = ContextManager::new(100, 0.75);
        // 75 tokens = 300 chars is the threshold; stay just below it
        let below = vec![Message::user("a".repeat(300))];
        assert!(!manager.should_compress(&below));

        let above = vec![Message::user("a".repeat(304))];
        assert!(manager.should_compress(&above));
    }

    #[test]
    fn stats_report_utilization() {
        let manager = ContextManager::new(100, 0.75);
        let messages = vec![Message::user("a".repeat(200))];
        let stats = manager.stats(&messages);
        assert_eq!(stats.message_count, 1);
        assert_eq!(stats.estimated_tokens, 50);
        assert_eq!(stats.max_tokens, 100);
        assert!((stats.utilization - 0.5).abs() < f64::EPSILON);
        assert!(!stats.should_compress);
    }
}

//! Per-task retry tracking and loop prevention.
//!
//! Tracks how often each (tool, parameters) identity has been attempted and
//! watches the recent call window for the model re-issuing the same call in
//! a loop. A separate task-wide counter of consecutive failures acts as a
//! circuit breaker.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_FAILURE_LIMIT: u32 = 5;

/// Sliding window capacity for recent call identities
const MAX_HISTORY: usize = 10;
/// Window suffix length checked by the identical-call heuristic
const PATTERN_LENGTH: usize = 5;

/// Snapshot of tracker state for diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStats {
    pub total_attempts: u32,
    pub unique_operations: usize,
    pub consecutive_failures: u32,
    pub most_retried: Option<(String, u32)>,
}

/// One instance per top-level task; reset at the start of every run
pub struct RetryTracker {
    max_retries: u32,
    failure_limit: u32,
    attempts: HashMap<String, u32>,
    consecutive_failures: u32,
    recent_calls: Vec<(String, String)>,
}

impl RetryTracker {
    pub fn new(max_retries: u32, failure_limit: u32) -> Self {
        Self {
            max_retries,
            failure_limit,
            attempts: HashMap::new(),
            consecutive_failures: 0,
            recent_calls: Vec::new(),
        }
    }

    /// Consult the tracker before executing a call.
    ///
    /// Counts the attempt and appends the identity to the window even when
    /// the call ends up blocked. Returns the block reason, or `None` when
    /// the call may proceed.
    pub fn check_should_execute(&mut self, tool_name: &str, params: &Value) -> Option<String> {
        let params_hash = hash_params(params);
        let key = format!("{}:{}", tool_name, params_hash);

        let counter = self.attempts.entry(key).or_insert(0);
        *counter += 1;
        let attempts = *counter;

        self.recent_calls.push((tool_name.to_string(), params_hash.clone()));
        if self.recent_calls.len() > MAX_HISTORY {
            self.recent_calls.remove(0);
        }

        if attempts > self.max_retries {
            return Some(format!(
                "Retry limit exceeded for {} with these parameters ({}/{} attempts). Consider trying a different approach.",
                tool_name, attempts, self.max_retries
            ));
        }

        if self.recent_calls.len() >= PATTERN_LENGTH {
            let window = &self.recent_calls[self.recent_calls.len() - PATTERN_LENGTH..];
            if window.iter().all(|(name, hash)| name == tool_name && hash == &params_hash) {
                return Some(format!(
                    "{} called 5 times in a row with identical parameters. This appears to be stuck in a loop. Try a different approach.",
                    tool_name
                ));
            }
        }

        None
    }

    /// A tool call succeeded; the consecutive-failure streak is over
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failed tool call; returns the stop reason when the circuit
    /// breaker trips.
    pub fn record_failure(&mut self) -> Option<String> {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.failure_limit {
            return Some(format!(
                "Stopped after {} consecutive tool failures. The task may not be achievable with current approach.",
                self.consecutive_failures
            ));
        }
        None
    }

    /// Clear all state for a new task
    pub fn reset(&mut self) {
        self.attempts.clear();
        self.consecutive_failures = 0;
        self.recent_calls.clear();
    }

    pub fn stats(&self) -> TrackerStats {
        TrackerStats {
            total_attempts: self.attempts.values().sum(),
            unique_operations: self.attempts.len(),
            consecutive_failures: self.consecutive_failures,
            most_retried: self
                .attempts
                .iter()
                .max_by_key(|(_, count)| **count)
                .map(|(key, count)| (key.clone(), *count)),
        }
    }
}

impl Default for RetryTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES, DEFAULT_FAILURE_LIMIT)
    }
}

/// Hash parameters into an identity that ignores object key order.
///
/// Objects are serialized with keys sorted at every nesting level, then
/// hashed. The digest is opaque; only equality matters.
fn hash_params(params: &Value) -> String {
    let mut canonical = String::new();
    write_canonical(params, &mut canonical);
    format!("{:x}", Sha256::digest(canonical.as_bytes()))
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn hash_ignores_key_order_at_every_level() {
        let a = json!({"b": 1, "a": {"y": 2, "x": 3}});
        let b = json!({"a": {"x": 3, "y": 2}, "b": 1});
        assert_eq!(hash_params(&a), hash_params(&b));

        let c = json!({"a": {"x": 3, "y": 99}, "b": 1});
        assert_ne!(hash_params(&a), hash_params(&c));
    }

    #[test]
    fn hash_distinguishes_array_order() {
        assert_ne!(hash_params(&json!([1, 2])), hash_params(&json!([2, 1])));
    }

    #[test]
    fn fourth_identical_call_is_blocked() {
        let mut tracker = RetryTracker::default();
        let params = json!({"file_path": "x.py"});

        for _ in 0..3 {
            assert!(tracker.check_should_execute("Read", &params).is_none());
        }

        let reason = tracker.check_should_execute("Read", &params).unwrap();
        assert_eq!(
            reason,
            "Retry limit exceeded for Read with these parameters (4/3 attempts). Consider trying a different approach."
        );
    }

    #[test]
    fn different_parameters_do_not_share_a_counter() {
        let mut tracker = RetryTracker::default();
        for i in 0..10 {
            let params = json!({"file_path": format!("file{}.py", i)});
            assert!(tracker.check_should_execute("Read", &params).is_none());
        }
    }

    #[test]
    fn five_identical_calls_in_a_row_trip_the_pattern_heuristic() {
        // Raise max_retries so the per-identity limit stays out of the way
        let mut tracker = RetryTracker::new(10, 5);
        let params = json!({"command": "ls"});

        for _ in 0..4 {
            assert!(tracker.check_should_execute("Bash", &params).is_none());
        }

        let reason = tracker.check_should_execute("Bash", &params).unwrap();
        assert_eq!(
            reason,
            "Bash called 5 times in a row with identical parameters. This appears to be stuck in a loop. Try a different approach."
        );
    }

    #[test]
    fn interleaved_calls_do_not_trip_the_pattern_heuristic() {
        let mut tracker = RetryTracker::new(10, 5);
        for i in 0..12 {
            let params = if i % 2 == 0 { json!({"n": 1}) } else { json!({"n": 2}) };
            assert!(tracker.check_should_execute("Math", &params).is_none(), "call {}", i);
        }
    }

    #[test]
    fn circuit_breaker_trips_at_the_failure_limit() {
        let mut tracker = RetryTracker::default();
        for _ in 0..4 {
            assert!(tracker.record_failure().is_none());
        }

        let reason = tracker.record_failure().unwrap();
        assert_eq!(
            reason,
            "Stopped after 5 consecutive tool failures. The task may not be achievable with current approach."
        );
    }

    #[test]
    fn success_resets_the_failure_streak() {
        let mut tracker = RetryTracker::default();
        for _ in 0..4 {
            assert!(tracker.record_failure().is_none());
        }
        tracker.record_success();
        for _ in 0..4 {
            assert!(tracker.record_failure().is_none());
        }
        assert!(tracker.record_failure().is_some());
    }

    #[test]
    fn reset_clears_everything() {
        let mut tracker = RetryTracker::default();
        let params = json!({"x": 1});
        for _ in 0..3 {
            tracker.check_should_execute("Read", &params);
        }
        tracker.record_failure();

        tracker.reset();
        assert!(tracker.check_should_execute("Read", &params).is_none());
        let stats = tracker.stats();
        assert_eq!(stats.total_attempts, 1);
        assert_eq!(stats.consecutive_failures, 0);
    }

    #[test]
    fn stats_report_the_most_retried_identity() {
        let mut tracker = RetryTracker::default();
        let hot = json!({"file_path": "hot.py"});
        let cold = json!({"file_path": "cold.py"});

        tracker.check_should_execute("Read", &hot);
        tracker.check_should_execute("Read", &hot);
        tracker.check_should_execute("Read", &cold);

        let stats = tracker.stats();
        assert_eq!(stats.total_attempts, 3);
        assert_eq!(stats.unique_operations, 2);
        let (key, count) = stats.most_retried.unwrap();
        assert!(key.starts_with("Read:"));
        assert_eq!(count, 2);
    }
}

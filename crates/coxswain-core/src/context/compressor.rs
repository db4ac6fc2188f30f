//! Transcript compression.
//!
//! Replaces the middle of a long conversation with a single summary
//! message so the recent exchange always survives verbatim.

use std::collections::BTreeSet;

use crate::models::message::{Message, Role};

pub const DEFAULT_KEEP_RECENT: usize = 10;

/// Compress a transcript down to at most `keep_recent + 2` messages.
///
/// The most recent `keep_recent` messages are kept verbatim. When
/// `keep_system` is set and the first message is a system message, it is
/// kept too. Everything in between collapses into one user-role summary.
/// Transcripts short enough to keep whole are returned unchanged.
pub fn compress(messages: &[Message], keep_recent: usize, keep_system: bool) -> Vec<Message> {
    if messages.len() <= keep_recent + 1 {
        return messages.to_vec();
    }

    let mut compressed = Vec::with_capacity(keep_recent + 2);

    let start = match messages.first() {
        Some(first) if keep_system && first.role == Role::System => {
            compressed.push(first.clone());
            1
        }
        _ => 0,
    };

    let split = messages.len() - keep_recent;
    let summary = summarize(&messages[start..split]);
    compressed.push(Message::user(format!("[Previous conversation summary: {}]", summary)));
    compressed.extend(messages[split..].iter().cloned());

    compressed
}

fn summarize(messages: &[Message]) -> String {
    let mut tool_names = BTreeSet::new();
    let mut user_turns = 0;

    for message in messages {
        if message.role == Role::User {
            user_turns += 1;
        } else if let Some(calls) = &message.tool_calls {
            for call in calls {
                tool_names.insert(call.name.as_str());
            }
        }
    }

    let tool_summary = if tool_names.is_empty() {
        "none".to_string()
    } else {
        tool_names.into_iter().collect::<Vec<_>>().join(", ")
    };

    format!(
        "{} messages compressed, {} user turns, tools used: {}",
        messages.len(),
        user_turns,
        tool_summary
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::models::message::ToolCall;

    fn call(name: &str) -> ToolCall {
        ToolCall {
            id: "1".to_string(),
            name: name.to_string(),
            parameters: json!({}),
        }
    }

    #[test]
    fn short_transcripts_are_unchanged() {
        let messages: Vec<Message> = (0..11).map(|i| Message::user(format!("m{i}"))).collect();
        let compressed = compress(&messages, 10, true);
        assert_eq!(compressed, messages);
    }

    #[test]
    fn output_never_exceeds_keep_recent_plus_two() {
        let mut messages = vec![Message::system("sys")];
        messages.extend((0..40).map(|i| Message::user(format!("m{i}"))));

        let compressed = compress(&messages, 10, true);
        assert_eq!(compressed.len(), 12);
        assert_eq!(compressed[0].role, Role::System);
        assert_eq!(compressed[0].content, "sys");
        // last keep_recent messages survive verbatim
        assert_eq!(compressed[11], messages[40]);
        assert_eq!(compressed[2], messages[31]);
    }

    #[test]
    fn summary_counts_messages_and_user_turns() {
        let mut messages = vec![Message::system("sys")];
        messages.push(Message::user("one"));
        messages.push(Message::user("two"));
        messages.extend((0..10).map(|i| Message::user(format!("recent{i}"))));

        let compressed = compress(&messages, 10, true);
        assert_eq!(
            compressed[1].content,
            "[Previous conversation summary: 2 messages compressed, 2 user turns, tools used: none]"
        );
        assert_eq!(compressed[1].role, Role::User);
    }

    #[test]
    fn summary_lists_distinct_tool_names_alphabetically() {
        let mut messages = vec![Message::system("sys")];
        messages.push(Message::assistant("reading").with_tool_calls(vec![call("Read"), call("Grep")]));
        messages.push(Message::assistant("again").with_tool_calls(vec![call("Read")]));
        messages.extend((0..10).map(|i| Message::user(format!("recent{i}"))));

        let compressed = compress(&messages, 10, true);
        assert!(compressed[1].content.contains("tools used: Grep, Read"));
    }

    #[test]
    fn system_message_dropped_when_keep_system_is_off() {
        let mut messages = vec![Message::system("sys")];
        messages.extend((0..20).map(|i| Message::user(format!("m{i}"))));

        let compressed = compress(&messages, 10, false);
        assert_eq!(compressed.len(), 11);
        assert_ne!(compressed[0].role, Role::System);
        assert!(compressed[0].content.starts_with("[Previous conversation summary:"));
    }
}

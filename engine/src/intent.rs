//! Edit-intent detection for forced tool use.
//!
//! When the latest user message asks for a change, the turn runs with
//! [`ToolChoice::Required`] so the model proposes the edit instead of
//! describing it in prose.

use std::sync::OnceLock;

use regex::Regex;

use quire_types::{ChatMessage, Role, ToolChoice};

const EDIT_VOCABULARY: &[&str] = &[
    "save",
    "write",
    "rewrite",
    "edit",
    "update",
    "change",
    "modify",
    "add",
    "insert",
    "append",
    "remove",
    "delete",
    "fix",
    "correct",
    "replace",
    "rename",
    "format",
    "reformat",
    "restructure",
    "translate",
    "expand",
    "shorten",
    "improve",
    r"summarize\s+into",
    r"turn\s+into",
    "convert",
];

fn edit_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            let alternation = EDIT_VOCABULARY.join("|");
            match Regex::new(&format!(r"(?i)\b(?:{alternation})\b")) {
                Ok(regex) => Some(regex),
                Err(e) => {
                    tracing::error!("Edit-intent pattern failed to compile: {e}");
                    None
                }
            }
        })
        .as_ref()
}

#[must_use]
pub fn is_edit_request(text: &str) -> bool {
    edit_pattern().is_some_and(|pattern| pattern.is_match(text))
}

/// Tool choice for a turn.
///
/// Only a conversation ending in a user message starts a new turn. One that
/// ends in tool results is a resume after a permission decision, and the
/// model already answered the request that may have forced tool use.
#[must_use]
pub fn tool_choice_for(messages: &[ChatMessage]) -> ToolChoice {
    match messages.last() {
        Some(message) if message.role == Role::User && is_edit_request(&message.text()) => {
            ToolChoice::Required
        }
        _ => ToolChoice::Auto,
    }
}

#[cfg(test)]
mod tests {
    use super::{is_edit_request, tool_choice_for};
    use quire_types::{ChatMessage, MessagePart, ToolCall, ToolChoice};
    use serde_json::json;

    #[test]
    fn matches_whole_words_case_insensitively() {
        assert!(is_edit_request("Please FIX the typo in the intro"));
        assert!(is_edit_request("can you summarize   into three bullets"));
        assert!(is_edit_request("Turn into a checklist"));
        assert!(!is_edit_request("what does this note say?"));
        // "address" contains "add" but is not the word.
        assert!(!is_edit_request("what is the address in this note"));
        assert!(!is_edit_request("summarize this for me"));
    }

    #[test]
    fn only_latest_user_message_counts() {
        let messages = vec![
            ChatMessage::user("rewrite the intro"),
            ChatMessage::assistant(vec![MessagePart::Text {
                text: "Done, please review.".to_string(),
            }]),
            ChatMessage::user("thanks, what time is it in the note?"),
        ];
        assert_eq!(tool_choice_for(&messages), ToolChoice::Auto);
        assert_eq!(tool_choice_for(&messages[..1]), ToolChoice::Required);
        assert_eq!(tool_choice_for(&[]), ToolChoice::Auto);
    }

    #[test]
    fn resumed_conversation_is_not_forced() {
        let call = ToolCall::new("c1", "readMarkdownFile", json!({"filePath": "a.md", "reason": "r"}));
        let messages = vec![
            ChatMessage::user("fix the typo in a.md"),
            ChatMessage::assistant(vec![MessagePart::ToolCall {
                tool_call_id: call.id.clone(),
                tool_name: call.name.clone(),
                args: call.arguments.clone(),
            }]),
            ChatMessage::tool_results(vec![MessagePart::tool_result(
                &call,
                json!({"success": false, "error": "Permission denied by user for readMarkdownFile"}),
                true,
            )]),
        ];
        assert_eq!(tool_choice_for(&messages[..1]), ToolChoice::Required);
        assert_eq!(tool_choice_for(&messages), ToolChoice::Auto);
    }
}

//! Conversation messages.
//!
//! A message is a role plus an ordered list of typed parts. Assistant messages
//! carry text and tool calls; tool messages carry the results for those calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ToolCall;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum MessagePart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub id: String,
    pub role: Role,
    pub parts: Vec<MessagePart>,
}

impl ChatMessage {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            role: Role::User,
            parts: vec![MessagePart::Text { text: text.into() }],
        }
    }

    #[must_use]
    pub fn assistant(parts: Vec<MessagePart>) -> Self {
        Self {
            id: String::new(),
            role: Role::Assistant,
            parts,
        }
    }

    #[must_use]
    pub fn tool_results(parts: Vec<MessagePart>) -> Self {
        Self {
            id: String::new(),
            role: Role::Tool,
            parts,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Concatenated text of every text part.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    #[must_use]
    pub fn tool_calls(&self) -> Vec<ToolCall> {
        self.parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::ToolCall {
                    tool_call_id,
                    tool_name,
                    args,
                } => Some(ToolCall::new(tool_call_id, tool_name, args.clone())),
                _ => None,
            })
            .collect()
    }
}

impl MessagePart {
    #[must_use]
    pub fn tool_result(call: &ToolCall, result: Value, is_error: bool) -> Self {
        MessagePart::ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result,
            is_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ChatMessage, MessagePart, Role};
    use serde_json::json;

    #[test]
    fn parts_use_kebab_case_tags() {
        let message = ChatMessage::assistant(vec![
            MessagePart::Text {
                text: "Looking".to_string(),
            },
            MessagePart::ToolCall {
                tool_call_id: "c1".to_string(),
                tool_name: "listFileTree".to_string(),
                args: json!({"reason": "orient"}),
            },
        ]);
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["role"], "assistant");
        assert_eq!(value["parts"][0]["type"], "text");
        assert_eq!(value["parts"][1]["type"], "tool-call");
        assert_eq!(value["parts"][1]["toolName"], "listFileTree");
    }

    #[test]
    fn user_message_from_wire() {
        let message: ChatMessage = serde_json::from_value(json!({
            "role": "user",
            "parts": [{"type": "text", "text": "hi"}, {"type": "text", "text": " there"}]
        }))
        .unwrap();
        assert_eq!(message.role, Role::User);
        assert_eq!(message.text(), "hi there");
        assert!(message.tool_calls().is_empty());
    }
}

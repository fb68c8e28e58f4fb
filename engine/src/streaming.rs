//! Accumulation of one model response from provider stream events.

use serde_json::Value;

use quire_types::{ChatMessage, MessagePart, StreamEvent, ToolCall};

/// Upper bound on streamed JSON arguments for a single tool call.
pub const MAX_TOOL_ARGS_BYTES: usize = 2 * 1024 * 1024;

#[derive(Debug, Clone)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    arguments_json: String,
    args_exceeded: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFinish {
    Done,
    Error(String),
}

/// A tool call whose arguments could not be used, with the error fed back to the model.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedCall {
    pub call: ToolCall,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ParsedToolCalls {
    pub calls: Vec<ToolCall>,
    pub rejected: Vec<RejectedCall>,
}

/// An in-flight model response.
///
/// Text deltas are appended as they arrive; tool call arguments are buffered
/// as raw JSON and parsed only once the stream has finished.
#[derive(Debug, Default)]
pub struct StreamingMessage {
    content: String,
    tool_calls: Vec<ToolCallAccumulator>,
}

impl StreamingMessage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_event(&mut self, event: StreamEvent) -> Option<StreamFinish> {
        match event {
            StreamEvent::TextDelta(text) => {
                self.content.push_str(&text);
                None
            }
            StreamEvent::ToolCallStart { id, name } => {
                self.tool_calls.push(ToolCallAccumulator {
                    id,
                    name,
                    arguments_json: String::new(),
                    args_exceeded: false,
                });
                None
            }
            StreamEvent::ToolCallDelta { id, arguments } => {
                if let Some(acc) = self.tool_calls.iter_mut().find(|t| t.id == id) {
                    if acc.args_exceeded {
                        return None;
                    }
                    let new_len = acc.arguments_json.len().saturating_add(arguments.len());
                    if new_len > MAX_TOOL_ARGS_BYTES {
                        acc.args_exceeded = true;
                        return None;
                    }
                    acc.arguments_json.push_str(&arguments);
                }
                None
            }
            StreamEvent::Done => Some(StreamFinish::Done),
            StreamEvent::Error(err) => Some(StreamFinish::Error(err)),
        }
    }

    pub fn take_tool_calls(&mut self) -> ParsedToolCalls {
        let mut parsed = ParsedToolCalls::default();

        for acc in self.tool_calls.drain(..) {
            let empty_args = || Value::Object(serde_json::Map::new());
            if acc.args_exceeded {
                parsed.rejected.push(RejectedCall {
                    call: ToolCall::new(acc.id, acc.name, empty_args()),
                    error: "Tool arguments exceeded maximum size".to_string(),
                });
                continue;
            }

            if acc.arguments_json.trim().is_empty() {
                parsed
                    .calls
                    .push(ToolCall::new(acc.id, acc.name, empty_args()));
                continue;
            }

            match serde_json::from_str(&acc.arguments_json) {
                Ok(arguments) => parsed.calls.push(ToolCall::new(acc.id, acc.name, arguments)),
                Err(e) => {
                    tracing::warn!(tool = %acc.name, "Failed to parse tool call arguments: {e}");
                    parsed.rejected.push(RejectedCall {
                        call: ToolCall::new(acc.id, acc.name, empty_args()),
                        error: "Invalid tool arguments JSON".to_string(),
                    });
                }
            }
        }

        parsed
    }

    /// The assistant message for this response: text first, then every call.
    #[must_use]
    pub fn into_message(self, calls: &[ToolCall]) -> Option<ChatMessage> {
        let mut parts = Vec::new();
        if !self.content.trim().is_empty() {
            parts.push(MessagePart::Text { text: self.content });
        }
        parts.extend(calls.iter().map(|call| MessagePart::ToolCall {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            args: call.arguments.clone(),
        }));
        (!parts.is_empty()).then(|| ChatMessage::assistant(parts))
    }
}

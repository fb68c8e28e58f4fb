use crate::{
    ChatMessage, MessagePart, Result, Role, SendMessageRequest, SseParseAction, SseParser,
    StreamEvent, ToolChoice, ToolDefinition, client_for, emit_or_continue, parse_sse_payload,
    retry::RetryConfig, send_retried_sse_request, tool_result_text,
};
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};

const MAX_OUTPUT_TOKENS: u32 = 16_384;

use crate::sse_types::openai as typed;

#[derive(Default)]
struct OpenAIParser {
    /// Item ids that streamed text deltas; `.done` text is a fallback only.
    text_delta_seen: HashSet<String>,
    /// Function call item id -> call id, for deltas that only carry the item id.
    item_to_call: HashMap<String, String>,
    /// Call ids that streamed argument deltas.
    call_has_delta: HashSet<String>,
}

impl OpenAIParser {
    fn resolve_call_id(&self, item_id: Option<&str>, call_id: Option<&str>) -> Option<String> {
        if let Some(call_id) = call_id {
            return Some(call_id.to_string());
        }
        let item_id = item_id?;
        Some(
            self.item_to_call
                .get(item_id)
                .cloned()
                .unwrap_or_else(|| item_id.to_string()),
        )
    }
}

impl SseParser for OpenAIParser {
    fn parse(&mut self, json: &Value) -> SseParseAction {
        let Some(event) = parse_sse_payload::<typed::Event>(json, "OpenAI") else {
            return SseParseAction::Continue;
        };

        let mut events = Vec::new();

        match event {
            typed::Event::OutputItemAdded { item_id, item } => {
                if let Some(typed::OutputItem::FunctionCall {
                    id,
                    call_id,
                    name,
                    arguments,
                }) = item
                {
                    let Some(call_id) = call_id
                        .or_else(|| id.clone())
                        .filter(|s| !s.trim().is_empty())
                    else {
                        return SseParseAction::Error("OpenAI tool call missing id".to_string());
                    };
                    let Some(name) = name.filter(|s| !s.trim().is_empty()) else {
                        return SseParseAction::Error("OpenAI tool call missing name".to_string());
                    };

                    for key in [item_id, id].into_iter().flatten() {
                        self.item_to_call.insert(key, call_id.clone());
                    }

                    events.push(StreamEvent::ToolCallStart {
                        id: call_id.clone(),
                        name,
                    });

                    if let Some(args) = arguments.filter(|s| !s.is_empty()) {
                        events.push(StreamEvent::ToolCallDelta {
                            id: call_id.clone(),
                            arguments: args,
                        });
                        self.call_has_delta.insert(call_id);
                    }
                }
            }

            typed::Event::OutputTextDelta { item_id, delta }
            | typed::Event::RefusalDelta { item_id, delta } => {
                if let Some(delta) = delta {
                    if let Some(item_id) = item_id {
                        self.text_delta_seen.insert(item_id);
                    }
                    events.push(StreamEvent::TextDelta(delta));
                }
            }

            typed::Event::OutputTextDone { item_id, text } => {
                let saw_delta = item_id
                    .as_ref()
                    .is_some_and(|id| self.text_delta_seen.contains(id));
                if !saw_delta && let Some(text) = text {
                    events.push(StreamEvent::TextDelta(text));
                }
            }

            typed::Event::FunctionCallArgumentsDelta {
                item_id,
                call_id,
                delta,
            } => {
                let resolved = self.resolve_call_id(item_id.as_deref(), call_id.as_deref());
                if let Some(delta) = delta {
                    let Some(call_id) = resolved else {
                        return SseParseAction::Error(
                            "OpenAI tool call delta missing id".to_string(),
                        );
                    };
                    events.push(StreamEvent::ToolCallDelta {
                        id: call_id.clone(),
                        arguments: delta,
                    });
                    self.call_has_delta.insert(call_id);
                }
            }

            typed::Event::FunctionCallArgumentsDone {
                item_id,
                call_id,
                arguments,
            } => {
                let resolved = self.resolve_call_id(item_id.as_deref(), call_id.as_deref());
                if let Some(arguments) = arguments {
                    let Some(call_id) = resolved else {
                        return SseParseAction::Error(
                            "OpenAI tool call args missing id".to_string(),
                        );
                    };
                    if !self.call_has_delta.contains(&call_id) && !arguments.is_empty() {
                        events.push(StreamEvent::ToolCallDelta {
                            id: call_id.clone(),
                            arguments,
                        });
                    }
                    self.call_has_delta.insert(call_id);
                }
            }

            typed::Event::Completed => {
                events.push(StreamEvent::Done);
            }

            typed::Event::Incomplete { response } => {
                let reason = response
                    .and_then(|r| r.incomplete_details)
                    .and_then(|d| d.reason)
                    .unwrap_or_else(|| "Response incomplete".to_string());
                return SseParseAction::Error(reason);
            }

            typed::Event::Failed { response, error } => {
                let message = error
                    .and_then(|e| e.message)
                    .or_else(|| response.and_then(|r| r.error).and_then(|e| e.message))
                    .unwrap_or_else(|| "Response failed".to_string());
                return SseParseAction::Error(message);
            }

            typed::Event::Error { error } => {
                let message = error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "Unknown error".to_string());
                return SseParseAction::Error(message);
            }

            typed::Event::Unknown => {}
        }

        emit_or_continue(events)
    }

    fn provider_name(&self) -> &'static str {
        "OpenAI"
    }
}

fn build_request_body(
    model: &str,
    messages: &[ChatMessage],
    system_prompt: Option<&str>,
    tools: &[ToolDefinition],
    tool_choice: ToolChoice,
) -> Value {
    let mut input_items: Vec<Value> = Vec::new();
    for msg in messages {
        for part in &msg.parts {
            match part {
                MessagePart::Text { text } if text.trim().is_empty() => {}
                MessagePart::Text { text } => {
                    let role = match msg.role {
                        Role::Assistant => "assistant",
                        Role::User | Role::Tool => "user",
                    };
                    input_items.push(json!({ "role": role, "content": text }));
                }
                MessagePart::ToolCall {
                    tool_call_id,
                    tool_name,
                    args,
                } => {
                    input_items.push(json!({
                        "type": "function_call",
                        "call_id": tool_call_id,
                        "name": tool_name,
                        "arguments": args.to_string(),
                    }));
                }
                MessagePart::ToolResult {
                    tool_call_id,
                    result,
                    ..
                } => {
                    input_items.push(json!({
                        "type": "function_call_output",
                        "call_id": tool_call_id,
                        "output": tool_result_text(result),
                    }));
                }
            }
        }
    }

    let mut body = serde_json::Map::new();
    body.insert("model".to_string(), json!(model));
    body.insert("input".to_string(), Value::Array(input_items));
    body.insert("max_output_tokens".to_string(), json!(MAX_OUTPUT_TOKENS));
    body.insert("stream".to_string(), json!(true));
    body.insert("store".to_string(), json!(false));

    if let Some(prompt) = system_prompt
        && !prompt.trim().is_empty()
    {
        body.insert("instructions".to_string(), json!(prompt));
    }

    if !tools.is_empty() {
        let tool_defs: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "name": tool.name,
                    "description": tool.description,
                    "parameters": tool.parameters,
                })
            })
            .collect();
        body.insert("tools".to_string(), Value::Array(tool_defs));
        let choice = match tool_choice {
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "required",
        };
        body.insert("tool_choice".to_string(), json!(choice));
    }

    Value::Object(body)
}

pub async fn send_message(request: &SendMessageRequest<'_>) -> Result<()> {
    let config = request.config;
    let client = client_for(config.base_url());
    let retry_config = RetryConfig::default();
    let url = format!("{}/responses", config.base_url());

    let body = build_request_body(
        config.model().model_id(),
        request.messages,
        request.system_prompt,
        request.tools,
        request.tool_choice,
    );
    let auth_header = format!("Bearer {}", config.api_key());

    let mut parser = OpenAIParser::default();
    send_retried_sse_request(
        || {
            client
                .post(&url)
                .header("Authorization", &auth_header)
                .header("content-type", "application/json")
                .json(&body)
        },
        &retry_config,
        &request.tx,
        &mut parser,
        crate::stream_idle_timeout(),
    )
    .await
}

use serde_json::{Value, json};

use crate::retry::RetryConfig;
use crate::{
    ChatMessage, MessagePart, Result, Role, SendMessageRequest, SseParseAction, SseParser,
    StreamEvent, ToolChoice, ToolDefinition, client_for, emit_or_continue, parse_sse_payload,
    send_retried_sse_request, tool_result_text,
};

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_OUTPUT_TOKENS: u32 = 16_384;

fn content_blocks(parts: &[MessagePart]) -> Vec<Value> {
    parts
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } if text.trim().is_empty() => None,
            MessagePart::Text { text } => Some(json!({ "type": "text", "text": text })),
            MessagePart::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => Some(json!({
                "type": "tool_use",
                "id": tool_call_id,
                "name": tool_name,
                "input": args
            })),
            MessagePart::ToolResult {
                tool_call_id,
                result,
                is_error,
                ..
            } => Some(json!({
                "type": "tool_result",
                "tool_use_id": tool_call_id,
                "content": tool_result_text(result),
                "is_error": is_error
            })),
        })
        .collect()
}

fn build_request_body(
    model: &str,
    messages: &[ChatMessage],
    system_prompt: Option<&str>,
    tools: &[ToolDefinition],
    tool_choice: ToolChoice,
) -> Value {
    let mut api_messages: Vec<Value> = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::Assistant => "assistant",
            // Tool results ride in a user turn.
            Role::User | Role::Tool => "user",
        };
        let blocks = content_blocks(&msg.parts);
        if blocks.is_empty() {
            continue;
        }

        // Consecutive same-role turns are merged; the API requires alternation.
        if let Some(last) = api_messages.last_mut()
            && last["role"] == role
            && let Some(content) = last["content"].as_array_mut()
        {
            content.extend(blocks);
            continue;
        }
        api_messages.push(json!({ "role": role, "content": blocks }));
    }

    let mut body = serde_json::Map::new();
    body.insert("model".into(), json!(model));
    body.insert("max_tokens".into(), json!(MAX_OUTPUT_TOKENS));
    body.insert("stream".into(), json!(true));
    body.insert("messages".into(), Value::Array(api_messages));

    if let Some(prompt) = system_prompt
        && !prompt.trim().is_empty()
    {
        body.insert(
            "system".into(),
            json!([{ "type": "text", "text": prompt }]),
        );
    }

    if !tools.is_empty() {
        let tool_defs: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool.description,
                    "input_schema": tool.parameters
                })
            })
            .collect();
        body.insert("tools".into(), Value::Array(tool_defs));
        let choice = match tool_choice {
            ToolChoice::Auto => "auto",
            ToolChoice::Required => "any",
        };
        body.insert("tool_choice".into(), json!({ "type": choice }));
    }

    Value::Object(body)
}

use crate::sse_types::claude as typed;

#[derive(Default)]
struct ClaudeParser {
    /// Tool call whose `input_json_delta` fragments are streaming.
    current_tool_id: Option<String>,
}

impl SseParser for ClaudeParser {
    fn parse(&mut self, json: &Value) -> SseParseAction {
        let Some(event) = parse_sse_payload::<typed::Event>(json, "Claude") else {
            return SseParseAction::Continue;
        };

        let mut events = Vec::new();

        match event {
            typed::Event::ContentBlockStart { content_block, .. } => match content_block {
                typed::ContentBlock::ToolUse { id, name } => {
                    if id.is_empty() {
                        return SseParseAction::Error("Claude tool call missing id".to_string());
                    }
                    if name.is_empty() {
                        return SseParseAction::Error("Claude tool call missing name".to_string());
                    }
                    self.current_tool_id = Some(id.clone());
                    events.push(StreamEvent::ToolCallStart { id, name });
                }
                typed::ContentBlock::Text { text } if !text.is_empty() => {
                    events.push(StreamEvent::TextDelta(text));
                }
                typed::ContentBlock::Text { .. } | typed::ContentBlock::Unknown => {}
            },

            typed::Event::ContentBlockDelta { delta, .. } => match delta {
                typed::Delta::TextDelta { text } => {
                    events.push(StreamEvent::TextDelta(text));
                }
                typed::Delta::InputJsonDelta { partial_json } => {
                    if let Some(ref id) = self.current_tool_id {
                        events.push(StreamEvent::ToolCallDelta {
                            id: id.clone(),
                            arguments: partial_json,
                        });
                    }
                }
                typed::Delta::Unknown => {}
            },

            typed::Event::ContentBlockStop { .. } => {
                self.current_tool_id = None;
            }

            typed::Event::MessageDelta { delta } => {
                if let Some(typed::MessageDeltaInfo {
                    stop_reason: Some(typed::StopReason::MaxTokens),
                }) = delta
                {
                    tracing::warn!("Claude response hit the output token limit");
                }
            }

            typed::Event::MessageStop => return SseParseAction::Done,

            typed::Event::Error { error } => {
                let msg = if error.message.is_empty() {
                    format!("Claude stream error: {}", error.error_type)
                } else {
                    error.message
                };
                return SseParseAction::Error(msg);
            }

            typed::Event::MessageStart | typed::Event::Ping | typed::Event::Unknown => {}
        }

        emit_or_continue(events)
    }

    fn provider_name(&self) -> &'static str {
        "Claude"
    }
}

pub async fn send_message(request: &SendMessageRequest<'_>) -> Result<()> {
    let config = request.config;
    let client = client_for(config.base_url());
    let retry_config = RetryConfig::default();
    let url = format!("{}/messages", config.base_url());

    let body = build_request_body(
        config.model().model_id(),
        request.messages,
        request.system_prompt,
        request.tools,
        request.tool_choice,
    );
    let api_key = config.api_key().to_string();

    let mut parser = ClaudeParser::default();
    send_retried_sse_request(
        || {
            client
                .post(&url)
                .header("x-api-key", &api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
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

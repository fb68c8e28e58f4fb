use serde_json::{Value, json};
use uuid::Uuid;

use crate::retry::RetryConfig;
use crate::{
    ChatMessage, MessagePart, Result, Role, SendMessageRequest, SseParseAction, SseParser,
    StreamEvent, ToolChoice, ToolDefinition, client_for, emit_or_continue, parse_sse_payload,
    send_retried_sse_request,
};

const MAX_OUTPUT_TOKENS: u32 = 16_384;

fn text_part(text: &str) -> Value {
    json!({ "text": text })
}

fn remove_additional_properties(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.remove("additionalProperties");
            for value in map.values_mut() {
                remove_additional_properties(value);
            }
        }
        Value::Array(values) => {
            for value in values {
                remove_additional_properties(value);
            }
        }
        _ => {}
    }
}

fn gemini_part(part: &MessagePart) -> Option<Value> {
    match part {
        MessagePart::Text { text } if text.trim().is_empty() => None,
        MessagePart::Text { text } => Some(text_part(text)),
        MessagePart::ToolCall {
            tool_call_id,
            tool_name,
            args,
        } => Some(json!({
            "functionCall": { "id": tool_call_id, "name": tool_name, "args": args }
        })),
        MessagePart::ToolResult {
            tool_call_id,
            tool_name,
            result,
            ..
        } => Some(json!({
            "functionResponse": {
                "id": tool_call_id,
                "name": tool_name,
                "response": { "result": result }
            }
        })),
    }
}

/// Build the request body for the Gemini API.
///
/// Gemini mixes casing: `system_instruction` is snake_case while
/// `generationConfig` and `toolConfig` are camelCase.
fn build_request_body(
    messages: &[ChatMessage],
    system_prompt: Option<&str>,
    tools: &[ToolDefinition],
    tool_choice: ToolChoice,
) -> Value {
    let mut contents: Vec<Value> = Vec::new();

    for msg in messages {
        let role = match msg.role {
            Role::Assistant => "model",
            Role::User | Role::Tool => "user",
        };
        let parts: Vec<Value> = msg.parts.iter().filter_map(gemini_part).collect();
        if parts.is_empty() {
            continue;
        }
        // Tool results and a following user turn share one `user` entry.
        if let Some(last) = contents.last_mut()
            && last["role"] == role
            && let Some(existing) = last["parts"].as_array_mut()
        {
            existing.extend(parts);
            continue;
        }
        contents.push(json!({ "role": role, "parts": parts }));
    }

    let mut body = serde_json::Map::new();
    body.insert("contents".into(), json!(contents));

    if let Some(prompt) = system_prompt
        && !prompt.trim().is_empty()
    {
        body.insert(
            "system_instruction".into(),
            json!({ "parts": [text_part(prompt)] }),
        );
    }

    body.insert(
        "generationConfig".into(),
        json!({ "maxOutputTokens": MAX_OUTPUT_TOKENS }),
    );

    if !tools.is_empty() {
        let function_declarations: Vec<Value> = tools
            .iter()
            .map(|t| {
                let mut parameters = t.parameters.clone();
                remove_additional_properties(&mut parameters);
                json!({
                    "name": t.name,
                    "description": t.description,
                    "parameters": parameters
                })
            })
            .collect();
        body.insert(
            "tools".into(),
            json!([{ "functionDeclarations": function_declarations }]),
        );
        let mode = match tool_choice {
            ToolChoice::Auto => "AUTO",
            ToolChoice::Required => "ANY",
        };
        body.insert(
            "toolConfig".into(),
            json!({ "functionCallingConfig": { "mode": mode } }),
        );
    }

    Value::Object(body)
}

use crate::sse_types::gemini as typed;

#[derive(Default)]
struct GeminiParser;

impl SseParser for GeminiParser {
    fn parse(&mut self, json: &Value) -> SseParseAction {
        let Some(response) = parse_sse_payload::<typed::Response>(json, "Gemini") else {
            return SseParseAction::Continue;
        };

        if let Some(error) = response.error {
            return SseParseAction::Error(
                error.message.unwrap_or_else(|| "Unknown error".to_string()),
            );
        }

        let mut events = Vec::new();
        let mut finish: Option<StreamEvent> = None;

        for candidate in response.candidates.into_iter().flatten() {
            // Content first: the final chunk carries both text and finishReason.
            let parts = candidate.content.and_then(|c| c.parts).unwrap_or_default();
            for part in parts {
                if let Some(text) = part.text
                    && !part.thought
                {
                    events.push(StreamEvent::TextDelta(text));
                }

                if let Some(func_call) = part.function_call {
                    let name = func_call.name.unwrap_or_default();
                    if name.is_empty() {
                        tracing::warn!("Gemini function call with empty name, skipping");
                        continue;
                    }
                    let id = func_call
                        .id
                        .filter(|id| !id.is_empty())
                        .unwrap_or_else(|| format!("call_{}", Uuid::new_v4().simple()));
                    events.push(StreamEvent::ToolCallStart {
                        id: id.clone(),
                        name,
                    });
                    // Gemini sends arguments whole, never as fragments.
                    let args = func_call.args.unwrap_or_else(|| json!({}));
                    events.push(StreamEvent::ToolCallDelta {
                        id,
                        arguments: args.to_string(),
                    });
                }
            }

            if let Some(reason) = candidate.finish_reason {
                let reason = typed::FinishReason::parse(&reason);
                finish = Some(match reason.error_message() {
                    Some(msg) => StreamEvent::Error(msg.to_string()),
                    None => StreamEvent::Done,
                });
            }
        }

        events.extend(finish);
        emit_or_continue(events)
    }

    fn provider_name(&self) -> &'static str {
        "Gemini"
    }
}

pub async fn send_message(request: &SendMessageRequest<'_>) -> Result<()> {
    let config = request.config;
    let client = client_for(config.base_url());
    let retry_config = RetryConfig::default();
    let url = format!(
        "{}/models/{}:streamGenerateContent?alt=sse",
        config.base_url(),
        config.model().model_id()
    );

    let body = build_request_body(
        request.messages,
        request.system_prompt,
        request.tools,
        request.tool_choice,
    );
    let api_key = config.api_key().to_string();

    let mut parser = GeminiParser;
    send_retried_sse_request(
        || {
            client
                .post(&url)
                .header("x-goog-api-key", &api_key)
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

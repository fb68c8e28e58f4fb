//! Typed SSE event structures for provider responses.
//!
//! Each provider module defines an event enum (or response struct) plus the
//! nested data it carries. Unknown event and block types deserialize to an
//! `Unknown` variant so new server features never break an existing stream.

pub mod claude {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum Event {
        MessageStart,
        MessageDelta {
            delta: Option<MessageDeltaInfo>,
        },
        ContentBlockStart {
            index: u32,
            content_block: ContentBlock,
        },
        ContentBlockDelta {
            index: u32,
            delta: Delta,
        },
        ContentBlockStop {
            index: u32,
        },
        MessageStop,
        Ping,
        Error {
            error: ErrorInfo,
        },
        #[serde(other)]
        Unknown,
    }

    #[derive(Debug, Deserialize)]
    pub struct ErrorInfo {
        #[serde(default, rename = "type")]
        pub error_type: String,
        #[serde(default)]
        pub message: String,
    }

    #[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
    #[serde(rename_all = "snake_case")]
    pub enum StopReason {
        EndTurn,
        MaxTokens,
        StopSequence,
        ToolUse,
        #[serde(other)]
        Unknown,
    }

    #[derive(Debug, Deserialize)]
    pub struct MessageDeltaInfo {
        #[serde(default)]
        pub stop_reason: Option<StopReason>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum ContentBlock {
        Text {
            #[serde(default)]
            text: String,
        },
        ToolUse {
            id: String,
            name: String,
        },
        #[serde(other)]
        Unknown,
    }

    #[derive(Debug, Deserialize)]
    #[serde(tag = "type", rename_all = "snake_case")]
    pub enum Delta {
        TextDelta { text: String },
        InputJsonDelta { partial_json: String },
        #[serde(other)]
        Unknown,
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn deserialize_tool_use_block_start() {
            let json = r#"{
                "type": "content_block_start",
                "index": 1,
                "content_block": {"type": "tool_use", "id": "toolu_1", "name": "listFileTree", "input": {}}
            }"#;
            let event: Event = serde_json::from_str(json).unwrap();
            match event {
                Event::ContentBlockStart {
                    index,
                    content_block: ContentBlock::ToolUse { id, name },
                } => {
                    assert_eq!(index, 1);
                    assert_eq!(id, "toolu_1");
                    assert_eq!(name, "listFileTree");
                }
                other => panic!("wrong event: {other:?}"),
            }
        }

        #[test]
        fn unknown_types_are_tolerated() {
            let event: Event = serde_json::from_str(r#"{"type": "future_event"}"#).unwrap();
            assert!(matches!(event, Event::Unknown));

            let json = r#"{"type": "content_block_delta", "index": 0, "delta": {"type": "thinking_delta", "thinking": "x"}}"#;
            let event: Event = serde_json::from_str(json).unwrap();
            assert!(matches!(
                event,
                Event::ContentBlockDelta {
                    delta: Delta::Unknown,
                    ..
                }
            ));
        }

        #[test]
        fn stop_reason_tool_use() {
            let json = r#"{"type": "message_delta", "delta": {"stop_reason": "tool_use"}, "usage": {"output_tokens": 9}}"#;
            let event: Event = serde_json::from_str(json).unwrap();
            match event {
                Event::MessageDelta { delta } => {
                    assert_eq!(delta.unwrap().stop_reason, Some(StopReason::ToolUse));
                }
                other => panic!("wrong event: {other:?}"),
            }
        }
    }
}

pub mod openai {
    use serde::Deserialize;

    /// Responses API stream event, tagged by `type`.
    #[derive(Debug, Deserialize)]
    #[serde(tag = "type")]
    pub enum Event {
        #[serde(rename = "response.output_item.added")]
        OutputItemAdded {
            item_id: Option<String>,
            #[serde(alias = "output_item")]
            item: Option<OutputItem>,
        },
        #[serde(rename = "response.output_text.delta")]
        OutputTextDelta {
            item_id: Option<String>,
            delta: Option<String>,
        },
        #[serde(rename = "response.output_text.done")]
        OutputTextDone {
            item_id: Option<String>,
            text: Option<String>,
        },
        #[serde(rename = "response.refusal.delta")]
        RefusalDelta {
            item_id: Option<String>,
            delta: Option<String>,
        },
        #[serde(rename = "response.function_call_arguments.delta")]
        FunctionCallArgumentsDelta {
            item_id: Option<String>,
            call_id: Option<String>,
            delta: Option<String>,
        },
        #[serde(rename = "response.function_call_arguments.done")]
        FunctionCallArgumentsDone {
            item_id: Option<String>,
            call_id: Option<String>,
            arguments: Option<String>,
        },
        #[serde(rename = "response.completed")]
        Completed,
        #[serde(rename = "response.incomplete")]
        Incomplete { response: Option<ResponseInfo> },
        #[serde(rename = "response.failed")]
        Failed {
            response: Option<ResponseInfo>,
            error: Option<ErrorInfo>,
        },
        #[serde(rename = "error")]
        Error { error: Option<ErrorInfo> },
        #[serde(other)]
        Unknown,
    }

    #[derive(Debug, Deserialize)]
    #[serde(tag = "type")]
    pub enum OutputItem {
        #[serde(rename = "function_call")]
        FunctionCall {
            id: Option<String>,
            call_id: Option<String>,
            name: Option<String>,
            arguments: Option<String>,
        },
        #[serde(other)]
        Unknown,
    }

    #[derive(Debug, Deserialize)]
    pub struct ResponseInfo {
        pub error: Option<ErrorInfo>,
        pub incomplete_details: Option<IncompleteDetails>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ErrorInfo {
        pub message: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct IncompleteDetails {
        pub reason: Option<String>,
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn deserialize_function_call_item() {
            let json = r#"{
                "type": "response.output_item.added",
                "item_id": "fc_1",
                "item": {"type": "function_call", "id": "fc_1", "call_id": "call_1", "name": "readMarkdownFile", "arguments": ""}
            }"#;
            let event: Event = serde_json::from_str(json).unwrap();
            match event {
                Event::OutputItemAdded {
                    item: Some(OutputItem::FunctionCall { call_id, name, .. }),
                    ..
                } => {
                    assert_eq!(call_id.as_deref(), Some("call_1"));
                    assert_eq!(name.as_deref(), Some("readMarkdownFile"));
                }
                other => panic!("wrong event: {other:?}"),
            }
        }

        #[test]
        fn message_items_are_unknown() {
            let json = r#"{"type": "response.output_item.added", "item": {"type": "message", "content": []}}"#;
            let event: Event = serde_json::from_str(json).unwrap();
            assert!(matches!(
                event,
                Event::OutputItemAdded {
                    item: Some(OutputItem::Unknown),
                    ..
                }
            ));
        }

        #[test]
        fn completed_ignores_payload() {
            let json = r#"{"type": "response.completed", "response": {"id": "resp_1", "usage": {"input_tokens": 3}}}"#;
            let event: Event = serde_json::from_str(json).unwrap();
            assert!(matches!(event, Event::Completed));
        }
    }
}

pub mod gemini {
    use serde::Deserialize;

    /// One streamed `GenerateContentResponse` chunk.
    ///
    /// Gemini has no event types; every chunk is a full response object.
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Response {
        pub candidates: Option<Vec<Candidate>>,
        pub error: Option<ErrorInfo>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Candidate {
        pub content: Option<Content>,
        pub finish_reason: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Content {
        pub parts: Option<Vec<Part>>,
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct Part {
        pub text: Option<String>,
        /// Thought summaries are not shown to the user.
        #[serde(default)]
        pub thought: bool,
        pub function_call: Option<FunctionCall>,
    }

    #[derive(Debug, Deserialize)]
    pub struct FunctionCall {
        pub id: Option<String>,
        pub name: Option<String>,
        pub args: Option<serde_json::Value>,
    }

    #[derive(Debug, Deserialize)]
    pub struct ErrorInfo {
        pub message: Option<String>,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum FinishReason {
        Stop,
        MaxTokens,
        Safety,
        Recitation,
        Blocklist,
        ProhibitedContent,
        Spii,
        MalformedFunctionCall,
        Other,
        Unknown,
    }

    impl FinishReason {
        #[must_use]
        pub fn parse(s: &str) -> Self {
            match s {
                "STOP" => Self::Stop,
                "MAX_TOKENS" => Self::MaxTokens,
                "SAFETY" => Self::Safety,
                "RECITATION" => Self::Recitation,
                "BLOCKLIST" => Self::Blocklist,
                "PROHIBITED_CONTENT" => Self::ProhibitedContent,
                "SPII" => Self::Spii,
                "MALFORMED_FUNCTION_CALL" => Self::MalformedFunctionCall,
                "OTHER" => Self::Other,
                _ => Self::Unknown,
            }
        }

        /// `None` for reasons that end the stream normally.
        #[must_use]
        pub fn error_message(self) -> Option<&'static str> {
            match self {
                Self::Stop | Self::MaxTokens | Self::Unknown => None,
                Self::Safety => Some("Content filtered by safety settings"),
                Self::Recitation => Some("Response blocked: recitation"),
                Self::Blocklist => Some("Content contains blocked terms"),
                Self::ProhibitedContent => Some("Prohibited content detected"),
                Self::Spii => Some("Sensitive PII detected"),
                Self::MalformedFunctionCall => Some("Invalid function call generated"),
                Self::Other => Some("Generation stopped for an unspecified reason"),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn deserialize_function_call_chunk() {
            let json = r#"{
                "candidates": [{
                    "content": {"role": "model", "parts": [
                        {"functionCall": {"name": "searchMarkdownFiles", "args": {"reason": "find notes"}}}
                    ]},
                    "finishReason": "STOP"
                }]
            }"#;
            let response: Response = serde_json::from_str(json).unwrap();
            let candidate = &response.candidates.unwrap()[0];
            let part = &candidate.content.as_ref().unwrap().parts.as_ref().unwrap()[0];
            let call = part.function_call.as_ref().unwrap();
            assert_eq!(call.name.as_deref(), Some("searchMarkdownFiles"));
            assert_eq!(candidate.finish_reason.as_deref(), Some("STOP"));
        }

        #[test]
        fn finish_reasons() {
            assert_eq!(FinishReason::parse("STOP").error_message(), None);
            assert_eq!(FinishReason::parse("NEW_REASON"), FinishReason::Unknown);
            assert!(FinishReason::parse("SAFETY").error_message().is_some());
        }
    }
}

//! LLM provider clients with unified streaming support.
//!
//! # Architecture
//!
//! - [`send_message`] - Unified entry point that dispatches to provider-specific implementations
//! - [`claude`] - Anthropic Messages API
//! - [`openai`] - `OpenAI` Responses API
//! - [`gemini`] - Google Gemini `streamGenerateContent`
//!
//! All providers emit events through a [`tokio::sync::mpsc::Sender<StreamEvent>`]
//! channel, allowing the caller to process streaming content as it arrives.
//!
//! # Streaming Events
//!
//! | Event | Description |
//! |-------|-------------|
//! | `TextDelta` | Incremental text content from the model |
//! | `ToolCallStart` | Beginning of a tool/function call |
//! | `ToolCallDelta` | Incremental tool call arguments (JSON) |
//! | `Done` | Stream completed successfully |
//! | `Error` | Stream terminated with an error |
//!
//! # Error Handling
//!
//! Provider/API errors are delivered as `StreamEvent::Error` rather than
//! `Result::Err`, so text streamed before the failure is not lost. Dropping the
//! receiver cancels the request: the next send fails and the stream is abandoned.

pub mod retry;
pub mod sse_types;

pub(crate) use anyhow::Result;
pub(crate) use quire_types::{
    ApiKey, ChatMessage, MessagePart, PredefinedModel, Provider, Role, StreamEvent, ToolChoice,
    ToolDefinition,
};
use std::sync::OnceLock;
use std::time::Duration;
pub(crate) use tokio::sync::mpsc;

pub use quire_types;

/// Canonical Anthropic API base URL.
pub const CLAUDE_API_BASE_URL: &str = "https://api.anthropic.com/v1";
/// Canonical `OpenAI` API base URL.
pub const OPENAI_API_BASE_URL: &str = "https://api.openai.com/v1";
/// Canonical Gemini API base URL.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const CONNECT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_STREAM_IDLE_TIMEOUT_SECS: u64 = 60;
const TCP_KEEPALIVE_SECS: u64 = 60;
const POOL_MAX_IDLE_PER_HOST: usize = 100;
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

const MAX_SSE_PARSE_ERRORS: usize = 3;

const MAX_ERROR_BODY_BYTES: usize = 32 * 1024;

/// Shared HTTPS-only client for provider endpoints.
pub fn http_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder(true).build().unwrap_or_else(|e| {
            tracing::error!("Failed to build hardened HTTP client: {e}. Using defaults.");
            reqwest::Client::new()
        })
    })
}

/// Plain-HTTP client, only ever handed out for loopback base URLs.
fn loopback_client() -> &'static reqwest::Client {
    static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();
    CLIENT.get_or_init(|| {
        base_client_builder(false)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new())
    })
}

fn base_client_builder(https_only: bool) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
        .redirect(reqwest::redirect::Policy::none())
        .https_only(https_only)
        .tcp_keepalive(Some(Duration::from_secs(TCP_KEEPALIVE_SECS)))
        .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
        .pool_idle_timeout(Some(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS)))
}

pub(crate) fn client_for(base_url: &str) -> &'static reqwest::Client {
    let is_loopback = ["http://127.0.0.1", "http://localhost", "http://[::1]"]
        .iter()
        .any(|prefix| {
            base_url
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.is_empty() || rest.starts_with([':', '/']))
        });
    if is_loopback {
        loopback_client()
    } else {
        http_client()
    }
}

fn find_sse_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn drain_next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_sse_event_boundary(buffer)?;
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(event)
}

fn extract_sse_data(event: &str) -> Option<String> {
    let mut data = String::new();
    let mut found = false;

    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(mut rest) = line.strip_prefix("data:") {
            if let Some(stripped) = rest.strip_prefix(' ') {
                rest = stripped;
            }

            if found {
                data.push('\n');
            }
            data.push_str(rest);
            found = true;
        }
    }

    if found { Some(data) } else { None }
}

#[derive(Debug)]
pub(crate) enum SseParseAction {
    /// Continue processing, no event to emit
    Continue,
    /// Emit these events and continue
    Emit(Vec<StreamEvent>),
    /// Stream is done (`message_stop`, `response.completed`, finishReason=STOP)
    Done,
    Error(String),
}

pub(crate) trait SseParser {
    fn parse(&mut self, json: &serde_json::Value) -> SseParseAction;
    fn provider_name(&self) -> &'static str;
}

pub(crate) fn stream_idle_timeout() -> Duration {
    static TIMEOUT: OnceLock<Duration> = OnceLock::new();
    *TIMEOUT.get_or_init(|| {
        let timeout = std::env::var("QUIRE_STREAM_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(DEFAULT_STREAM_IDLE_TIMEOUT_SECS);
        Duration::from_secs(timeout)
    })
}

pub(crate) async fn send_event(tx: &mpsc::Sender<StreamEvent>, event: StreamEvent) -> bool {
    tx.send(event).await.is_ok()
}

pub(crate) fn parse_sse_payload<T>(
    json: &serde_json::Value,
    provider_name: &'static str,
) -> Option<T>
where
    T: serde::de::DeserializeOwned,
{
    match serde_json::from_value(json.clone()) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::warn!(%e, provider = provider_name, "Failed to parse SSE event");
            None
        }
    }
}

pub(crate) fn emit_or_continue(events: Vec<StreamEvent>) -> SseParseAction {
    if events.is_empty() {
        SseParseAction::Continue
    } else {
        SseParseAction::Emit(events)
    }
}

/// Process an SSE stream using a provider-specific parser.
///
/// Handles idle timeouts, the buffer size cap, UTF-8 validation, event
/// boundaries, the `[DONE]` marker and repeated JSON parse failures.
pub(crate) async fn process_sse_stream<P: SseParser>(
    response: reqwest::Response,
    parser: &mut P,
    tx: &mpsc::Sender<StreamEvent>,
    idle_timeout: Duration,
) -> Result<()> {
    use futures_util::StreamExt;

    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut parse_errors = 0usize;

    loop {
        let Ok(next) = tokio::time::timeout(idle_timeout, stream.next()).await else {
            let _ = send_event(tx, StreamEvent::Error("Stream idle timeout".to_string())).await;
            return Ok(());
        };

        let Some(chunk) = next else { break };
        let chunk = chunk?;
        buffer.extend_from_slice(&chunk);

        if buffer.len() > MAX_SSE_BUFFER_BYTES {
            let _ = send_event(
                tx,
                StreamEvent::Error("SSE buffer exceeded maximum size (4 MiB)".to_string()),
            )
            .await;
            return Ok(());
        }

        while let Some(event) = drain_next_sse_event(&mut buffer) {
            if event.is_empty() {
                continue;
            }

            let Ok(event) = std::str::from_utf8(&event) else {
                let _ = send_event(
                    tx,
                    StreamEvent::Error("Received invalid UTF-8 from SSE stream".to_string()),
                )
                .await;
                return Ok(());
            };

            let Some(data) = extract_sse_data(event) else {
                continue;
            };

            if data == "[DONE]" {
                let _ = send_event(tx, StreamEvent::Done).await;
                return Ok(());
            }

            match serde_json::from_str::<serde_json::Value>(&data) {
                Ok(json) => {
                    parse_errors = 0;
                    match parser.parse(&json) {
                        SseParseAction::Continue => {}
                        SseParseAction::Emit(events) => {
                            for event in events {
                                let is_terminal =
                                    matches!(&event, StreamEvent::Done | StreamEvent::Error(_));
                                if !send_event(tx, event).await || is_terminal {
                                    return Ok(());
                                }
                            }
                        }
                        SseParseAction::Done => {
                            let _ = send_event(tx, StreamEvent::Done).await;
                            return Ok(());
                        }
                        SseParseAction::Error(msg) => {
                            let _ = send_event(tx, StreamEvent::Error(msg)).await;
                            return Ok(());
                        }
                    }
                }
                Err(e) => {
                    parse_errors = parse_errors.saturating_add(1);
                    tracing::warn!(
                        %e,
                        payload_bytes = data.len(),
                        provider = parser.provider_name(),
                        "Invalid SSE JSON payload"
                    );
                    if parse_errors >= MAX_SSE_PARSE_ERRORS {
                        let _ = send_event(
                            tx,
                            StreamEvent::Error(format!("Invalid stream payload: {e}")),
                        )
                        .await;
                        return Ok(());
                    }
                }
            }
        }
    }

    // Connection closed without a completion signal.
    let _ = send_event(
        tx,
        StreamEvent::Error("Connection closed before stream completed".to_string()),
    )
    .await;
    Ok(())
}

pub async fn read_capped_error_body(response: reqwest::Response) -> String {
    use futures_util::StreamExt;
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let Ok(chunk) = chunk else { break };
        body.extend_from_slice(&chunk);
        if body.len() > MAX_ERROR_BODY_BYTES {
            body.truncate(MAX_ERROR_BODY_BYTES);
            let text = String::from_utf8_lossy(&body);
            return format!("{text}...(truncated)");
        }
    }
    String::from_utf8_lossy(&body).into_owned()
}

#[derive(Debug)]
pub(crate) enum ApiResponse {
    Success(reqwest::Response),
    StreamTerminated,
}

pub(crate) async fn handle_response(
    outcome: retry::RetryOutcome,
    tx: &mpsc::Sender<StreamEvent>,
) -> ApiResponse {
    let response = match outcome {
        retry::RetryOutcome::Success(resp) | retry::RetryOutcome::HttpError(resp) => resp,
        retry::RetryOutcome::ConnectionError { attempts, source } => {
            let _ = send_event(
                tx,
                StreamEvent::Error(format!(
                    "Request failed after {attempts} attempts: {source}"
                )),
            )
            .await;
            return ApiResponse::StreamTerminated;
        }
        retry::RetryOutcome::NonRetryable(e) => {
            let _ = send_event(tx, StreamEvent::Error(format!("Request failed: {e}"))).await;
            return ApiResponse::StreamTerminated;
        }
    };

    if !response.status().is_success() {
        let status = response.status();
        let error_text = read_capped_error_body(response).await;
        tracing::warn!(%status, "Provider returned an error status");
        let _ = send_event(
            tx,
            StreamEvent::Error(format!("API error {status}: {error_text}")),
        )
        .await;
        return ApiResponse::StreamTerminated;
    }

    ApiResponse::Success(response)
}

pub(crate) async fn send_retried_sse_request<P, F>(
    build_request: F,
    retry_config: &retry::RetryConfig,
    tx: &mpsc::Sender<StreamEvent>,
    parser: &mut P,
    idle_timeout: Duration,
) -> Result<()>
where
    P: SseParser,
    F: Fn() -> reqwest::RequestBuilder,
{
    let outcome = retry::send_with_retry(build_request, retry_config).await;
    let response = match handle_response(outcome, tx).await {
        ApiResponse::Success(resp) => resp,
        ApiResponse::StreamTerminated => return Ok(()),
    };

    process_sse_stream(response, parser, tx, idle_timeout).await
}

/// Tool results travel to every provider as a JSON string.
pub(crate) fn tool_result_text(result: &serde_json::Value) -> String {
    match result {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Provider + model configuration.
///
/// The constructor enforces that the API key and model belong to the same provider.
///
/// ```rust
/// use quire_providers::ApiConfig;
/// use quire_types::{ApiKey, PredefinedModel, Provider};
///
/// let config = ApiConfig::new(
///     ApiKey::new(Provider::Claude, "test"),
///     PredefinedModel::ClaudeSonnet,
/// )
/// .unwrap();
/// assert_eq!(config.provider(), Provider::Claude);
/// ```
#[derive(Debug, Clone)]
pub struct ApiConfig {
    api_key: ApiKey,
    model: PredefinedModel,
    base_url: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiConfigError {
    #[error("API key provider {key:?} does not match model provider {model:?}")]
    ProviderMismatch { key: Provider, model: Provider },
}

impl ApiConfig {
    pub fn new(api_key: ApiKey, model: PredefinedModel) -> Result<Self, ApiConfigError> {
        let key_provider = api_key.provider();
        let model_provider = model.provider();
        if key_provider != model_provider {
            return Err(ApiConfigError::ProviderMismatch {
                key: key_provider,
                model: model_provider,
            });
        }

        Ok(Self {
            api_key,
            model,
            base_url: None,
        })
    }

    /// Point the client at a different endpoint root (proxies, tests).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        self.base_url = Some(base_url.trim_end_matches('/').to_string());
        self
    }

    #[must_use]
    pub fn provider(&self) -> Provider {
        self.api_key.provider()
    }

    #[must_use]
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    #[must_use]
    pub fn model(&self) -> PredefinedModel {
        self.model
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        match (&self.base_url, self.provider()) {
            (Some(url), _) => url,
            (None, Provider::Claude) => CLAUDE_API_BASE_URL,
            (None, Provider::OpenAI) => OPENAI_API_BASE_URL,
            (None, Provider::Gemini) => GEMINI_API_BASE_URL,
        }
    }
}

pub struct SendMessageRequest<'a> {
    pub config: &'a ApiConfig,
    pub messages: &'a [ChatMessage],
    pub system_prompt: Option<&'a str>,
    pub tools: &'a [ToolDefinition],
    pub tool_choice: ToolChoice,
    pub tx: mpsc::Sender<StreamEvent>,
}

pub async fn send_message(request: SendMessageRequest<'_>) -> Result<()> {
    tracing::debug!(
        provider = request.config.provider().as_str(),
        model = request.config.model().model_id(),
        messages = request.messages.len(),
        tool_choice = ?request.tool_choice,
        "Sending model request"
    );
    match request.config.provider() {
        Provider::Claude => claude::send_message(&request).await,
        Provider::OpenAI => openai::send_message(&request).await,
        Provider::Gemini => gemini::send_message(&request).await,
    }
}

/// Anthropic Messages API.
///
/// Assistant text and tool calls are grouped into one assistant message of
/// `text` / `tool_use` blocks; tool results become a user message of
/// `tool_result` blocks.
pub mod claude;

/// `OpenAI` Responses API.
///
/// Tool calls and results are top-level `function_call` /
/// `function_call_output` input items; the system prompt goes in `instructions`.
pub mod openai;

/// Google Gemini `streamGenerateContent` API.
///
/// Tool calls become `functionCall` parts of a `model` turn and results become
/// `functionResponse` parts of a `user` turn. `additionalProperties` is
/// stripped from tool schemas, which Gemini rejects.
pub mod gemini;

//! The bounded tool-use loop for one user turn.
//!
//! Each step streams one model response, runs the tool calls it contains
//! through the [`ToolRegistry`], and feeds the results back. The loop ends
//! when the model stops calling tools, a gated tool needs approval, the step
//! cap is hit, or the turn is aborted.

use std::fmt::Write as _;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{mpsc, watch};

use quire_providers::{ApiConfig, SendMessageRequest};
use quire_tools::{Proposal, ToolOutput, ToolRegistry};
use quire_types::{
    ApiKey, ChatMessage, MessagePart, PermissionRequest, PredefinedModel, Provider, StreamEvent,
    ToolCall, ToolChoice, ToolDefinition,
};

use crate::intent::tool_choice_for;
use crate::streaming::{StreamFinish, StreamingMessage};

/// Hard cap on model round trips per user turn.
pub const MAX_STEPS: usize = 5;

const STREAM_CHANNEL_CAPACITY: usize = 64;

pub const PERMISSION_ALREADY_PENDING: &str =
    "A permission request is already pending; wait for the user to resolve it before calling another gated tool";

#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("Unknown model: {0}")]
    UnknownModel(String),
    #[error("No API key configured for {0}")]
    MissingApiKey(Provider),
    #[error("Provider error: {0}")]
    Provider(String),
    #[error("A permission request is awaiting a decision")]
    PermissionPending,
    #[error("Conversation has no user message")]
    EmptyConversation,
}

pub type ModelFut<'a> = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'a>>;

/// Everything a model needs for one streamed response.
#[derive(Debug)]
pub struct ModelRequest {
    pub messages: Vec<ChatMessage>,
    pub system_prompt: String,
    pub tools: Vec<ToolDefinition>,
    pub tool_choice: ToolChoice,
    pub tx: mpsc::Sender<StreamEvent>,
}

/// A streaming text/tool-call generator.
pub trait ModelClient: Send + Sync {
    fn stream(&self, request: ModelRequest) -> ModelFut<'_>;
}

impl<T: ModelClient + ?Sized> ModelClient for Arc<T> {
    fn stream(&self, request: ModelRequest) -> ModelFut<'_> {
        (**self).stream(request)
    }
}

/// [`ModelClient`] backed by one of the HTTP providers.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    config: ApiConfig,
}

impl ProviderClient {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    /// Look up `model_id` in the allow-list and pair it with its provider's key.
    ///
    /// An unknown id is an error; there is no fallback model.
    pub fn for_model(
        model_id: &str,
        api_key: impl FnOnce(Provider) -> Option<ApiKey>,
    ) -> Result<Self, TurnError> {
        let model = PredefinedModel::from_model_id(model_id)
            .map_err(|_| TurnError::UnknownModel(model_id.trim().to_string()))?;
        let provider = model.provider();
        let key = api_key(provider).ok_or(TurnError::MissingApiKey(provider))?;
        let config =
            ApiConfig::new(key, model).map_err(|e| TurnError::Provider(e.to_string()))?;
        Ok(Self::new(config))
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }
}

impl ModelClient for ProviderClient {
    fn stream(&self, request: ModelRequest) -> ModelFut<'_> {
        Box::pin(async move {
            quire_providers::send_message(SendMessageRequest {
                config: &self.config,
                messages: &request.messages,
                system_prompt: Some(&request.system_prompt),
                tools: &request.tools,
                tool_choice: request.tool_choice,
                tx: request.tx,
            })
            .await
        })
    }
}

/// What the model is told about the editor at the start of a step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentSnapshot {
    pub path: Option<String>,
    pub content: Option<String>,
    pub selected_text: Option<String>,
}

/// Accessor for the live document, read again at every step.
pub trait DocumentSource: Send + Sync {
    fn snapshot(&self) -> DocumentSnapshot;
}

impl DocumentSource for DocumentSnapshot {
    fn snapshot(&self) -> DocumentSnapshot {
        self.clone()
    }
}

#[must_use]
pub fn build_system_prompt(root: &Path, document: &DocumentSnapshot) -> String {
    let mut prompt = String::from(
        "You are a writing assistant working inside a folder of markdown notes.\n\
         You can only touch files through your tools.\n\n\
         - To change a file, call proposeDocumentChange with the COMPLETE new content of the \
         file. Never describe an edit in prose instead of proposing it. The user reviews a diff \
         and decides whether to accept it.\n\
         - Reading, searching and listing files requires the user's approval. Always give a \
         short, honest reason.\n\
         - Use absolute paths inside the notes folder.\n",
    );
    let _ = write!(prompt, "\nNotes folder: {}\n", root.display());

    match &document.path {
        Some(path) => {
            let _ = writeln!(prompt, "Open file: {path}");
            if let Some(content) = &document.content {
                let _ = write!(
                    prompt,
                    "\nCurrent content of the open file (including unsaved edits):\n<document>\n{content}\n</document>\n"
                );
            }
        }
        None => prompt.push_str("No file is open.\n"),
    }
    if let Some(selected) = document.selected_text.as_deref().filter(|s| !s.trim().is_empty()) {
        let _ = write!(
            prompt,
            "\nThe user has selected this text:\n<selection>\n{selected}\n</selection>\n"
        );
    }
    prompt
}

/// Cancels a running turn.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

#[derive(Debug, Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

impl AbortHandle {
    #[must_use]
    pub fn new() -> (Self, AbortSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx: Arc::new(tx) }, AbortSignal { rx })
    }

    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }
}

impl AbortSignal {
    /// A signal that never fires.
    #[must_use]
    pub fn never() -> Self {
        let (_, signal) = AbortHandle::new();
        signal
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    async fn aborted(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FinishReason {
    Completed,
    AwaitingPermission,
    StepLimit,
    Aborted,
    Error,
}

/// Streamed to the UI while a turn runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum TurnEvent {
    Text {
        delta: String,
    },
    ToolCall {
        tool_call_id: String,
        tool_name: String,
        args: Value,
    },
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        result: Value,
        is_error: bool,
    },
    PermissionRequested {
        tool_call_id: String,
        request: PermissionRequest,
    },
    Proposal {
        tool_call_id: String,
        proposal: Proposal,
    },
    Finish {
        reason: FinishReason,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The model answered without further tool calls.
    Completed,
    /// Parked until the user approves or denies `request`.
    AwaitingPermission {
        request: PermissionRequest,
        call: ToolCall,
    },
    StepLimit,
    Aborted,
    Failed(String),
}

impl TurnOutcome {
    #[must_use]
    pub fn finish_reason(&self) -> FinishReason {
        match self {
            TurnOutcome::Completed => FinishReason::Completed,
            TurnOutcome::AwaitingPermission { .. } => FinishReason::AwaitingPermission,
            TurnOutcome::StepLimit => FinishReason::StepLimit,
            TurnOutcome::Aborted => FinishReason::Aborted,
            TurnOutcome::Failed(_) => FinishReason::Error,
        }
    }
}

#[derive(Debug)]
pub struct TurnReport {
    /// Messages produced by this turn, in conversation order.
    pub messages: Vec<ChatMessage>,
    /// The latest proposal made during the turn, if any.
    pub proposal: Option<Proposal>,
    pub outcome: TurnOutcome,
    pub steps: usize,
}

/// Result of streaming one model response.
enum StepStream {
    Finished(StreamingMessage),
    Failed(StreamingMessage, String),
    Aborted(StreamingMessage),
}

pub struct Orchestrator<'a> {
    client: &'a dyn ModelClient,
    registry: &'a ToolRegistry,
    document: &'a dyn DocumentSource,
    max_steps: usize,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(
        client: &'a dyn ModelClient,
        registry: &'a ToolRegistry,
        document: &'a dyn DocumentSource,
    ) -> Self {
        Self {
            client,
            registry,
            document,
            max_steps: MAX_STEPS,
        }
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Run one user turn over `conversation`.
    ///
    /// A closed `events` receiver is treated like an abort.
    pub async fn run_turn(
        &self,
        conversation: &[ChatMessage],
        events: &mpsc::Sender<TurnEvent>,
        abort: &mut AbortSignal,
    ) -> TurnReport {
        self.run(conversation, tool_choice_for(conversation), events, abort)
            .await
    }

    /// Continue after a permission decision was appended to `conversation`.
    ///
    /// The edit heuristic is not applied again: the model already answered
    /// the user message it was derived from.
    pub async fn resume_turn(
        &self,
        conversation: &[ChatMessage],
        events: &mpsc::Sender<TurnEvent>,
        abort: &mut AbortSignal,
    ) -> TurnReport {
        self.run(conversation, ToolChoice::Auto, events, abort).await
    }

    async fn run(
        &self,
        conversation: &[ChatMessage],
        tool_choice: ToolChoice,
        events: &mpsc::Sender<TurnEvent>,
        abort: &mut AbortSignal,
    ) -> TurnReport {
        let tools = ToolRegistry::definitions();
        let mut history = conversation.to_vec();
        let mut report = TurnReport {
            messages: Vec::new(),
            proposal: None,
            outcome: TurnOutcome::StepLimit,
            steps: 0,
        };
        tracing::info!(
            messages = conversation.len(),
            tool_choice = ?tool_choice,
            "Turn started"
        );

        while report.steps < self.max_steps {
            report.steps += 1;
            // Forced tool use applies to the first response only; later steps
            // must be free to answer in text once the proposal is made.
            let choice = if report.steps == 1 {
                tool_choice
            } else {
                ToolChoice::Auto
            };
            let snapshot = self.document.snapshot();
            let (tx, rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
            let request = ModelRequest {
                messages: history.clone(),
                system_prompt: build_system_prompt(self.registry.store().root(), &snapshot),
                tools: tools.clone(),
                tool_choice: choice,
                tx,
            };

            let mut message = match self.stream_step(request, rx, events, abort).await {
                StepStream::Finished(message) => message,
                StepStream::Failed(message, error) => {
                    tracing::warn!(step = report.steps, "Model stream failed: {error}");
                    if let Some(partial) = message.into_message(&[]) {
                        report.messages.push(partial);
                    }
                    let _ = events.send(TurnEvent::Error { message: error.clone() }).await;
                    report.outcome = TurnOutcome::Failed(error);
                    break;
                }
                StepStream::Aborted(message) => {
                    tracing::info!(step = report.steps, "Turn aborted");
                    if let Some(partial) = message.into_message(&[]) {
                        report.messages.push(partial);
                    }
                    report.outcome = TurnOutcome::Aborted;
                    break;
                }
            };

            let parsed = message.take_tool_calls();
            let all_calls: Vec<ToolCall> = parsed
                .calls
                .iter()
                .cloned()
                .chain(parsed.rejected.iter().map(|r| r.call.clone()))
                .collect();
            if let Some(assistant) = message.into_message(&all_calls) {
                history.push(assistant.clone());
                report.messages.push(assistant);
            }
            if all_calls.is_empty() {
                report.outcome = TurnOutcome::Completed;
                break;
            }

            let mut results = Vec::new();
            let mut awaiting = None;
            for call in &parsed.calls {
                self.emit(events, TurnEvent::ToolCall {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    args: call.arguments.clone(),
                })
                .await;
                let (result, is_error) = match self.registry.invoke(&call.name, &call.arguments) {
                    Ok(ToolOutput::Proposal(proposal)) => {
                        let value = proposal.to_value();
                        self.emit(events, TurnEvent::Proposal {
                            tool_call_id: call.id.clone(),
                            proposal: proposal.clone(),
                        })
                        .await;
                        report.proposal = Some(proposal);
                        (value, false)
                    }
                    Ok(ToolOutput::PermissionRequired(request)) => {
                        if awaiting.is_none() {
                            self.emit(events, TurnEvent::PermissionRequested {
                                tool_call_id: call.id.clone(),
                                request: request.clone(),
                            })
                            .await;
                            awaiting = Some((request, call.clone()));
                            continue;
                        }
                        tracing::info!(tool = %call.name, "Second gated call rejected while one is pending");
                        (
                            json!({ "success": false, "error": PERMISSION_ALREADY_PENDING }),
                            true,
                        )
                    }
                    Err(e) => {
                        tracing::debug!(tool = %call.name, "Tool call failed: {e}");
                        (e.to_value(), true)
                    }
                };
                results.push(self.result_part(events, call, result, is_error).await);
            }
            for rejected in parsed.rejected {
                let result = json!({ "success": false, "error": rejected.error });
                results.push(self.result_part(events, &rejected.call, result, true).await);
            }

            if !results.is_empty() {
                let tool_message = ChatMessage::tool_results(results);
                history.push(tool_message.clone());
                report.messages.push(tool_message);
            }
            if let Some((request, call)) = awaiting {
                report.outcome = TurnOutcome::AwaitingPermission { request, call };
                break;
            }
        }

        if report.outcome == TurnOutcome::StepLimit {
            tracing::info!(steps = report.steps, "Turn stopped at step limit");
        }
        let _ = events
            .send(TurnEvent::Finish {
                reason: report.outcome.finish_reason(),
            })
            .await;
        report
    }

    async fn stream_step(
        &self,
        request: ModelRequest,
        mut rx: mpsc::Receiver<StreamEvent>,
        events: &mpsc::Sender<TurnEvent>,
        abort: &mut AbortSignal,
    ) -> StepStream {
        let mut message = StreamingMessage::new();
        if abort.is_aborted() {
            return StepStream::Aborted(message);
        }
        let mut stream = self.client.stream(request);
        let mut stream_done = false;

        loop {
            tokio::select! {
                biased;
                () = abort.aborted() => return StepStream::Aborted(message),
                result = &mut stream, if !stream_done => {
                    stream_done = true;
                    if let Err(e) = result {
                        return StepStream::Failed(message, e.to_string());
                    }
                }
                event = rx.recv() => {
                    let Some(event) = event else {
                        return StepStream::Finished(message);
                    };
                    if let StreamEvent::TextDelta(delta) = &event
                        && events.send(TurnEvent::Text { delta: delta.clone() }).await.is_err()
                    {
                        tracing::debug!("Turn listener closed");
                        return StepStream::Aborted(message);
                    }
                    match message.apply_event(event) {
                        Some(StreamFinish::Done) => return StepStream::Finished(message),
                        Some(StreamFinish::Error(e)) => return StepStream::Failed(message, e),
                        None => {}
                    }
                }
            }
        }
    }

    async fn result_part(
        &self,
        events: &mpsc::Sender<TurnEvent>,
        call: &ToolCall,
        result: Value,
        is_error: bool,
    ) -> MessagePart {
        self.emit(events, TurnEvent::ToolResult {
            tool_call_id: call.id.clone(),
            tool_name: call.name.clone(),
            result: result.clone(),
            is_error,
        })
        .await;
        MessagePart::tool_result(call, result, is_error)
    }

    async fn emit(&self, events: &mpsc::Sender<TurnEvent>, event: TurnEvent) {
        if events.send(event).await.is_err() {
            tracing::debug!("Turn listener closed; event dropped");
        }
    }
}

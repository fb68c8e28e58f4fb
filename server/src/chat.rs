//! `POST /api/chat`, the model list, and approved tool execution.

use std::convert::Infallible;

use axum::Json;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use futures_util::stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use quire_engine::{
    AbortSignal, DocumentSnapshot, Orchestrator, TurnError, TurnEvent, run_approved,
};
use quire_tools::{OpResult, ToolRegistry};
use quire_types::{ChatMessage, PredefinedModel, Provider, Role};

use crate::{ApiError, AppState};

const TURN_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatRequest {
    messages: Vec<ChatMessage>,
    /// Optional here so a missing model is a 400, not a body rejection.
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    file_content: Option<String>,
    #[serde(default)]
    selected_text: Option<String>,
    #[serde(default)]
    root_directory: Option<String>,
}

pub(crate) async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    // No fallback to the configured default: the client must name the model.
    let model_id = request
        .model
        .clone()
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("No model selected".to_string()))?;
    let client = state.models().resolve(&model_id)?;
    if !request.messages.iter().any(|m| m.role == Role::User) {
        return Err(TurnError::EmptyConversation.into());
    }
    let store = state
        .scoped_store(request.root_directory.as_deref())
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let registry = ToolRegistry::new(store);
    let document = DocumentSnapshot {
        path: request.file_path,
        content: request.file_content,
        selected_text: request.selected_text,
    };
    let messages = request.messages;
    tracing::info!(model = %model_id, messages = messages.len(), "Chat turn requested");

    let (tx, rx) = mpsc::channel(TURN_EVENT_CAPACITY);
    tokio::spawn(async move {
        let report = Orchestrator::new(client.as_ref(), &registry, &document)
            .run_turn(&messages, &tx, &mut AbortSignal::never())
            .await;
        tracing::info!(
            steps = report.steps,
            reason = ?report.outcome.finish_reason(),
            "Chat turn finished"
        );
    });

    let events = stream::unfold(rx, |mut rx| async move {
        let event = rx.recv().await?;
        Some((Ok(to_sse(&event)), rx))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &TurnEvent) -> Event {
    Event::default().json_data(event).unwrap_or_else(|e| {
        tracing::warn!("Failed to encode turn event: {e}");
        Event::default().data(r#"{"type":"error","message":"encoding failed"}"#)
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModelInfo {
    id: &'static str,
    name: &'static str,
    provider: Provider,
    available: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ModelList {
    models: Vec<ModelInfo>,
    default_model: Option<String>,
}

pub(crate) async fn models(State(state): State<AppState>) -> Json<ModelList> {
    let models = PredefinedModel::all()
        .iter()
        .map(|model| ModelInfo {
            id: model.model_id(),
            name: model.display_name(),
            provider: model.provider(),
            available: state.models().is_available(model.model_id()),
        })
        .collect();
    Json(ModelList {
        models,
        default_model: state.models().default_model(),
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ExecuteRequest {
    tool_name: String,
    #[serde(default)]
    parameters: Value,
    #[serde(default)]
    root_directory: Option<String>,
}

/// Run a gated tool the user has approved.
pub(crate) async fn execute_tool(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Json<OpResult<Value>> {
    let registry = match state.scoped_store(request.root_directory.as_deref()) {
        Ok(store) => ToolRegistry::new(store),
        Err(e) => return Json(OpResult::err(e)),
    };
    tracing::info!(tool = %request.tool_name, "Approved tool execution requested");
    Json(run_approved(&registry, &request.tool_name, &request.parameters).await)
}

//! File, settings and recent-files endpoints.
//!
//! Every file operation runs on a blocking thread against a fresh
//! [`FileStore`] over the current settings, and answers with an `OpResult`.

use std::path::Path;

use axum::Json;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use quire_config::{Settings, SettingsUpdate};
use quire_engine::commit;
use quire_tools::{DeleteMode, FileStore, OpResult, ToolError};
use quire_types::FileNode;

use crate::{ApiError, AppState};

async fn blocking<T, F>(state: &AppState, op: F) -> OpResult<T>
where
    T: Send + 'static,
    F: FnOnce(&FileStore) -> Result<T, ToolError> + Send + 'static,
{
    let store = state.store();
    match tokio::task::spawn_blocking(move || op(&store)).await {
        Ok(result) => result.into(),
        Err(e) => {
            tracing::error!("File operation task failed: {e}");
            OpResult::err(format!("Internal error: {e}"))
        }
    }
}

pub(crate) async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings())
}

pub(crate) async fn put_settings(
    State(state): State<AppState>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<Settings>, ApiError> {
    let shared = std::sync::Arc::clone(&state.shared);
    let updated = tokio::task::spawn_blocking(move || {
        let mut store = match shared.settings.write() {
            Ok(store) => store,
            Err(poisoned) => poisoned.into_inner(),
        };
        store.update(update).cloned()
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(updated))
}

pub(crate) async fn recent(State(state): State<AppState>) -> Json<Vec<String>> {
    let entries = state
        .recent_entries()
        .into_iter()
        .filter(|entry| Path::new(entry).is_file())
        .collect();
    Json(entries)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AcceptRequest {
    file_path: String,
    proposed_content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AcceptResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes_written: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Commit an accepted proposal; `bytesWritten` is the size on disk after the write.
pub(crate) async fn accept(
    State(state): State<AppState>,
    Json(request): Json<AcceptRequest>,
) -> Json<AcceptResponse> {
    let outcome = blocking(&state, move |store| {
        commit(store, &request.file_path, &request.proposed_content)
    })
    .await;
    Json(AcceptResponse {
        success: outcome.success,
        bytes_written: outcome.data,
        error: outcome.error,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TreeRequest {
    #[serde(default)]
    path: Option<String>,
}

pub(crate) async fn tree(
    State(state): State<AppState>,
    Json(request): Json<TreeRequest>,
) -> Json<OpResult<Vec<FileNode>>> {
    Json(
        blocking(&state, move |store| {
            let path = request
                .path
                .unwrap_or_else(|| store.root().to_string_lossy().into_owned());
            store.read_directory(&path)
        })
        .await,
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct PathRequest {
    path: String,
}

/// Open a file for editing; it becomes the most recent entry.
pub(crate) async fn read(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Json<OpResult<String>> {
    Json(
        blocking(&state, move |store| {
            let content = store.read_file(&request.path)?;
            store.touch_recent(&request.path);
            Ok(content)
        })
        .await,
    )
}

#[derive(Debug, Deserialize)]
pub(crate) struct WriteRequest {
    path: String,
    content: String,
}

pub(crate) async fn write(
    State(state): State<AppState>,
    Json(request): Json<WriteRequest>,
) -> Json<OpResult<u64>> {
    Json(blocking(&state, move |store| store.write_file(&request.path, &request.content)).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateRequest {
    parent_path: String,
    name: String,
    /// Absent for a folder.
    #[serde(default)]
    initial_content: Option<String>,
}

pub(crate) async fn create(
    State(state): State<AppState>,
    Json(request): Json<CreateRequest>,
) -> Json<OpResult<String>> {
    Json(
        blocking(&state, move |store| {
            store.create(
                &request.parent_path,
                &request.name,
                request.initial_content.as_deref(),
            )
        })
        .await,
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RenameRequest {
    old_path: String,
    new_name: String,
}

pub(crate) async fn rename(
    State(state): State<AppState>,
    Json(request): Json<RenameRequest>,
) -> Json<OpResult<String>> {
    Json(blocking(&state, move |store| store.rename(&request.old_path, &request.new_name)).await)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MoveRequest {
    source_path: String,
    target_dir: String,
}

pub(crate) async fn move_to(
    State(state): State<AppState>,
    Json(request): Json<MoveRequest>,
) -> Json<OpResult<String>> {
    Json(
        blocking(&state, move |store| {
            store.move_to(&request.source_path, &request.target_dir)
        })
        .await,
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct DeleteRequest {
    path: String,
    #[serde(default = "default_use_trash")]
    use_trash: bool,
}

fn default_use_trash() -> bool {
    true
}

pub(crate) async fn delete(
    State(state): State<AppState>,
    Json(request): Json<DeleteRequest>,
) -> Json<OpResult<DeleteMode>> {
    Json(blocking(&state, move |store| store.delete(&request.path, request.use_trash)).await)
}

pub(crate) async fn duplicate(
    State(state): State<AppState>,
    Json(request): Json<PathRequest>,
) -> Json<OpResult<String>> {
    Json(blocking(&state, move |store| store.duplicate(&request.path)).await)
}

//! HTTP API for Quire.
//!
//! The server is stateless with respect to conversations: the client sends
//! the full message list with every chat request and keeps pending
//! permission requests and proposals itself. The server owns the settings
//! document and the recent-files list.

mod chat;
mod error;
mod files;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};

use axum::Router;
use axum::routing::{get, post};

use quire_config::{QuireConfig, RecentFiles, Settings, SettingsStore};
use quire_engine::{ModelClient, ProviderClient, TurnError};
use quire_tools::{FileStore, ToolError};

pub use error::ApiError;

/// Turns a model id from a request into a client, failing closed.
pub trait ModelResolver: Send + Sync {
    fn resolve(&self, model_id: &str) -> Result<Arc<dyn ModelClient>, TurnError>;

    /// Whether `model_id` could be resolved right now (key configured).
    fn is_available(&self, model_id: &str) -> bool {
        self.resolve(model_id).is_ok()
    }

    fn default_model(&self) -> Option<String> {
        None
    }
}

/// Provider clients keyed from `config.toml` and the environment.
#[derive(Debug)]
pub struct ConfiguredModels {
    config: QuireConfig,
}

impl ConfiguredModels {
    #[must_use]
    pub fn new(config: QuireConfig) -> Self {
        Self { config }
    }
}

impl ModelResolver for ConfiguredModels {
    fn resolve(&self, model_id: &str) -> Result<Arc<dyn ModelClient>, TurnError> {
        let client = ProviderClient::for_model(model_id, |provider| self.config.api_key(provider))?;
        Ok(Arc::new(client))
    }

    fn default_model(&self) -> Option<String> {
        self.config.default_model().map(str::to_string)
    }
}

struct Shared {
    settings: RwLock<SettingsStore>,
    recent: Arc<Mutex<RecentFiles>>,
    models: Arc<dyn ModelResolver>,
}

#[derive(Clone)]
pub struct AppState {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("root", &self.settings().root_directory)
            .finish_non_exhaustive()
    }
}

impl AppState {
    #[must_use]
    pub fn new(
        settings: SettingsStore,
        recent: RecentFiles,
        models: Arc<dyn ModelResolver>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                settings: RwLock::new(settings),
                recent: Arc::new(Mutex::new(recent)),
                models,
            }),
        }
    }

    /// Current settings, copied out so no lock is held across I/O.
    #[must_use]
    pub fn settings(&self) -> Settings {
        match self.shared.settings.read() {
            Ok(store) => store.settings().clone(),
            Err(poisoned) => poisoned.into_inner().settings().clone(),
        }
    }

    fn models(&self) -> &dyn ModelResolver {
        self.shared.models.as_ref()
    }

    fn recent_entries(&self) -> Vec<String> {
        match self.shared.recent.lock() {
            Ok(recent) => recent.entries().to_vec(),
            Err(_) => {
                tracing::warn!("Recent files lock poisoned");
                Vec::new()
            }
        }
    }

    /// A file store over the configured root.
    #[must_use]
    pub fn store(&self) -> FileStore {
        FileStore::new(self.settings()).with_recent(Arc::clone(&self.shared.recent))
    }

    /// A file store over `root`, which must be the configured root or a
    /// directory inside it. Clients cannot widen the sandbox.
    pub fn scoped_store(&self, root: Option<&str>) -> Result<FileStore, ToolError> {
        let store = self.store();
        let Some(root) = root.map(str::trim).filter(|r| !r.is_empty()) else {
            return Ok(store);
        };
        let resolved: PathBuf = store.resolve(root)?;
        if !resolved.is_dir() {
            return Err(ToolError::NotFound {
                path: root.to_string(),
            });
        }
        let settings = Settings {
            root_directory: resolved,
            ..self.settings()
        };
        Ok(FileStore::new(settings).with_recent(Arc::clone(&self.shared.recent)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/chat", post(chat::chat))
        .route("/api/models", get(chat::models))
        .route("/api/tools/execute", post(chat::execute_tool))
        .route("/api/settings", get(files::get_settings).put(files::put_settings))
        .route("/api/recent", get(files::recent))
        .route("/api/files/accept", post(files::accept))
        .route("/api/files/tree", post(files::tree))
        .route("/api/files/read", post(files::read))
        .route("/api/files/write", post(files::write))
        .route("/api/files/create", post(files::create))
        .route("/api/files/rename", post(files::rename))
        .route("/api/files/move", post(files::move_to))
        .route("/api/files/delete", post(files::delete))
        .route("/api/files/duplicate", post(files::duplicate))
        .with_state(state)
}

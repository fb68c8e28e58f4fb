//! Sandboxed file access and the agent-callable tool set.
//!
//! - [`PathSandbox`]: confines every path to the configured root
//! - [`FileStore`]: CRUD on notes and folders, built on the sandbox
//! - [`ToolRegistry`]: the closed [`ToolName`] set, its schemas, and the two
//!   entry points a tool call goes through (first call, then approved execution)

pub mod builtins;
pub mod sandbox;
pub mod search;
pub mod store;
pub mod trash;

use std::io;

use serde::Serialize;
use serde_json::Value;

use quire_types::{PermissionRequest, ToolDefinition};

pub use builtins::{Proposal, ToolMode, ToolName};
pub use sandbox::PathSandbox;
pub use search::{FileMatch, LineMatch, MAX_SEARCH_RESULTS, SearchResults};
pub use store::{DeleteMode, FileStore};
pub use trash::{DirTrash, NoTrash, Trash};

/// Error taxonomy shared by the file store and the tools.
///
/// Paths in messages are always the ones the caller supplied.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Access denied: {path} is outside the root directory")]
    AccessDenied { path: String },
    #[error("Not found: {path}")]
    NotFound { path: String },
    #[error("Already exists: {path}")]
    AlreadyExists { path: String },
    #[error("Not a file: {path}")]
    NotAFile { path: String },
    #[error("Wrong file type: {path} is not a {expected} file")]
    WrongFileType { path: String, expected: &'static str },
    #[error("Invalid arguments: {message}")]
    Validation { message: String },
    #[error("I/O error on {path}: {source}")]
    Io { path: String, source: io::Error },
    #[error("Unknown tool: {name}")]
    UnknownTool { name: String },
}

impl ToolError {
    /// `{success:false, error}` as fed back to the model.
    #[must_use]
    pub fn to_value(&self) -> Value {
        serde_json::json!({ "success": false, "error": self.to_string() })
    }
}

pub(crate) fn io_error(path: &str) -> impl FnOnce(io::Error) -> ToolError + '_ {
    move |source| match source.kind() {
        io::ErrorKind::NotFound => ToolError::NotFound {
            path: path.to_string(),
        },
        io::ErrorKind::AlreadyExists => ToolError::AlreadyExists {
            path: path.to_string(),
        },
        _ => ToolError::Io {
            path: path.to_string(),
            source,
        },
    }
}

/// Uniform `{success, data?, error?}` result handed across the tool boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> OpResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
        }
    }
}

impl<T> From<Result<T, ToolError>> for OpResult<T> {
    fn from(result: Result<T, ToolError>) -> Self {
        match result {
            Ok(data) => Self::ok(data),
            Err(e) => Self::err(e),
        }
    }
}

pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(args: &Value) -> Result<T, ToolError> {
    serde_json::from_value(args.clone()).map_err(|e| ToolError::Validation {
        message: e.to_string(),
    })
}

/// Validate arguments against a JSON schema.
pub fn validate_args(schema: &Value, args: &Value) -> Result<(), ToolError> {
    let validator = jsonschema::validator_for(schema).map_err(|e| ToolError::Validation {
        message: format!("Invalid tool schema: {e}"),
    })?;
    validator
        .validate(args)
        .map_err(|err| ToolError::Validation {
            message: err.to_string(),
        })
}

/// What a tool's first invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    /// Direct tool result: a staged rewrite, nothing written yet.
    Proposal(Proposal),
    /// Gated tool preconditions passed; the real work waits for approval.
    PermissionRequired(PermissionRequest),
}

impl ToolOutput {
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            ToolOutput::Proposal(proposal) => proposal.to_value(),
            ToolOutput::PermissionRequired(request) => serde_json::json!({
                "success": false,
                "requiresPermission": true,
                "permissionRequest": request,
            }),
        }
    }
}

/// The tool set bound to one file store.
#[derive(Debug, Clone)]
pub struct ToolRegistry {
    store: FileStore,
}

impl ToolRegistry {
    #[must_use]
    pub fn new(store: FileStore) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    #[must_use]
    pub fn definitions() -> Vec<ToolDefinition> {
        ToolName::ALL.iter().map(|tool| tool.definition()).collect()
    }

    /// First call: direct tools run, gated tools only check preconditions.
    ///
    /// A gated tool never performs its read here, whatever the arguments.
    pub fn invoke(&self, name: &str, args: &Value) -> Result<ToolOutput, ToolError> {
        let tool: ToolName = name.parse()?;
        validate_args(&tool.schema(), args)?;
        let output = match tool.mode() {
            ToolMode::Direct => ToolOutput::Proposal(builtins::propose(&self.store, args)?),
            ToolMode::Gated => ToolOutput::PermissionRequired(builtins::request_permission(
                tool,
                &self.store,
                args,
            )?),
        };
        tracing::debug!(tool = tool.as_str(), "Tool invoked");
        Ok(output)
    }

    /// Approved execution: re-validate against the sandbox and do the real work.
    pub async fn execute_approved(&self, tool: ToolName, args: &Value) -> Result<Value, ToolError> {
        validate_args(&tool.schema(), args)?;
        let store = self.store.clone();
        let args = args.clone();
        let result = tokio::task::spawn_blocking(move || builtins::execute(tool, &store, &args))
            .await
            .map_err(|e| ToolError::Io {
                path: tool.as_str().to_string(),
                source: io::Error::other(e),
            })?;
        match &result {
            Ok(_) => tracing::info!(tool = tool.as_str(), "Approved tool executed"),
            Err(e) => tracing::warn!(tool = tool.as_str(), "Approved tool failed: {e}"),
        }
        result
    }

    /// [`ToolRegistry::execute_approved`] keyed by wire name.
    pub async fn execute_by_name(&self, name: &str, args: &Value) -> Result<Value, ToolError> {
        let tool: ToolName = name.parse()?;
        self.execute_approved(tool, args).await
    }
}

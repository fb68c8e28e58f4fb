//! Human approval for gated tool calls.
//!
//! The gate holds at most one outstanding [`PermissionRequest`]. Resolving it
//! always clears the slot first and then produces the tool-result message the
//! conversation resumes with, whether the tool was approved or denied.

use std::collections::HashMap;

use serde_json::Value;

use quire_tools::{OpResult, ToolName, ToolRegistry};
use quire_types::{ChatMessage, MessagePart, PermissionRequest, PermissionStatus, ToolCall};

#[derive(Debug, thiserror::Error)]
pub enum GateError {
    #[error("No permission request is pending")]
    NoPendingRequest,
    #[error("Unknown permission request: {0}")]
    UnknownRequest(String),
    #[error("Permission request {id} was already {status:?}")]
    AlreadyResolved { id: String, status: PermissionStatus },
    #[error("A permission request is already pending: {0}")]
    AlreadyPending(String),
}

#[derive(Debug, Clone, Default)]
enum GateState {
    #[default]
    Idle,
    Pending {
        request: PermissionRequest,
        call: ToolCall,
    },
}

#[derive(Debug, Default)]
pub struct PermissionGate {
    state: GateState,
    resolved: HashMap<String, PermissionStatus>,
}

impl PermissionGate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park `request` until the user decides. `call` is the tool call it answers.
    pub fn open(&mut self, request: PermissionRequest, call: ToolCall) -> Result<(), GateError> {
        if let GateState::Pending { request: current, .. } = &self.state {
            return Err(GateError::AlreadyPending(current.id.clone()));
        }
        tracing::info!(
            request = %request.id,
            tool = %request.tool_name,
            "Permission requested"
        );
        self.state = GateState::Pending { request, call };
        Ok(())
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PermissionRequest> {
        match &self.state {
            GateState::Idle => None,
            GateState::Pending { request, .. } => Some(request),
        }
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, GateState::Pending { .. })
    }

    /// Status of a request this gate has seen, pending or resolved.
    #[must_use]
    pub fn status(&self, id: &str) -> Option<PermissionStatus> {
        if self.pending().is_some_and(|request| request.id == id) {
            return Some(PermissionStatus::Pending);
        }
        self.resolved.get(id).copied()
    }

    /// Drop the pending request without resolving it (conversation cleared).
    pub fn cancel(&mut self) -> Option<PermissionRequest> {
        match std::mem::take(&mut self.state) {
            GateState::Idle => None,
            GateState::Pending { request, .. } => {
                tracing::debug!(request = %request.id, "Pending permission request dropped");
                Some(request)
            }
        }
    }

    fn take(&mut self, id: &str) -> Result<(PermissionRequest, ToolCall), GateError> {
        if let Some(&status) = self.resolved.get(id) {
            return Err(GateError::AlreadyResolved {
                id: id.to_string(),
                status,
            });
        }
        match &self.state {
            GateState::Idle => return Err(GateError::NoPendingRequest),
            GateState::Pending { request, .. } if request.id != id => {
                return Err(GateError::UnknownRequest(id.to_string()));
            }
            GateState::Pending { .. } => {}
        }
        match std::mem::take(&mut self.state) {
            GateState::Pending { request, call } => Ok((request, call)),
            GateState::Idle => Err(GateError::NoPendingRequest),
        }
    }

    /// Run the approved tool and return the tool-result message for the model.
    ///
    /// Execution failures are reported to the model as an error result, not
    /// returned as `Err`: the agent is always told the outcome.
    pub async fn approve(
        &mut self,
        registry: &ToolRegistry,
        id: &str,
    ) -> Result<ChatMessage, GateError> {
        let (mut request, call) = self.take(id)?;
        request.status = PermissionStatus::Approved;
        self.resolved.insert(request.id.clone(), PermissionStatus::Approved);
        tracing::info!(request = %request.id, tool = %request.tool_name, "Permission approved");

        let outcome = run_approved(registry, &request.tool_name, &request.arguments()).await;
        let is_error = !outcome.success;
        let result = serde_json::to_value(&outcome).unwrap_or(Value::Null);
        Ok(ChatMessage::tool_results(vec![MessagePart::tool_result(
            &call, result, is_error,
        )]))
    }

    pub fn deny(&mut self, id: &str) -> Result<ChatMessage, GateError> {
        let (request, call) = self.take(id)?;
        self.resolved.insert(request.id.clone(), PermissionStatus::Denied);
        tracing::info!(request = %request.id, tool = %request.tool_name, "Permission denied");

        let result = serde_json::json!({
            "success": false,
            "error": format!("Permission denied by user for {}", request.tool_name),
        });
        Ok(ChatMessage::tool_results(vec![MessagePart::tool_result(
            &call, result, true,
        )]))
    }
}

/// Execute a gated tool after approval, as a structured result.
pub async fn run_approved(registry: &ToolRegistry, name: &str, params: &Value) -> OpResult<Value> {
    match name.parse::<ToolName>() {
        Ok(tool) => registry.execute_approved(tool, params).await.into(),
        Err(e) => {
            tracing::warn!(tool = name, "Rejected execution of unknown tool");
            OpResult::err(e)
        }
    }
}

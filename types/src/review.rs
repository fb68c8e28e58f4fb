//! Objects that wait on a human decision: permission requests and staged changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Pending,
    Approved,
    Denied,
}

/// Request fields a tool argument must never shadow on the wire.
const RESERVED_KEYS: &[&str] = &["id", "toolName", "action", "reason", "timestamp", "status"];

/// A gated tool's request to run, surfaced for approval.
///
/// The tool's own parameters (minus `reason`) are flattened next to the request
/// fields, so `{toolName, filePath, reason}` reads naturally on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionRequest {
    pub id: String,
    pub tool_name: String,
    /// Human-facing description of what will happen, e.g. "Read a.md".
    pub action: String,
    pub reason: String,
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
    pub status: PermissionStatus,
}

impl PermissionRequest {
    pub fn new(
        id: impl Into<String>,
        tool_name: impl Into<String>,
        action: impl Into<String>,
        reason: impl Into<String>,
        arguments: &Value,
    ) -> Self {
        let mut parameters = arguments.as_object().cloned().unwrap_or_default();
        parameters.retain(|key, _| !RESERVED_KEYS.contains(&key.as_str()));
        Self {
            id: id.into(),
            tool_name: tool_name.into(),
            action: action.into(),
            reason: reason.into(),
            parameters,
            timestamp: Utc::now(),
            status: PermissionStatus::Pending,
        }
    }

    /// The arguments the gated tool must be re-run with once approved.
    #[must_use]
    pub fn arguments(&self) -> Value {
        let mut args = self.parameters.clone();
        args.insert("reason".to_string(), Value::String(self.reason.clone()));
        Value::Object(args)
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == PermissionStatus::Pending
    }
}

/// A staged whole-file rewrite awaiting accept or reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingChange {
    pub file_path: String,
    /// Live editor content at proposal time, including unsaved edits.
    pub original_content: String,
    pub proposed_content: String,
    pub summary: String,
    pub timestamp: DateTime<Utc>,
}

impl PendingChange {
    pub fn new(
        file_path: impl Into<String>,
        original_content: impl Into<String>,
        proposed_content: impl Into<String>,
        summary: impl Into<String>,
    ) -> Self {
        Self {
            file_path: file_path.into(),
            original_content: original_content.into(),
            proposed_content: proposed_content.into(),
            summary: summary.into(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{PermissionRequest, PermissionStatus};
    use serde_json::json;

    #[test]
    fn permission_request_flattens_parameters() {
        let args = json!({"filePath": "/w/a.md", "reason": "check content"});
        let request = PermissionRequest::new("p1", "readMarkdownFile", "Read a.md", "check content", &args);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["toolName"], "readMarkdownFile");
        assert_eq!(value["filePath"], "/w/a.md");
        assert_eq!(value["reason"], "check content");
        assert_eq!(value["status"], "pending");
        assert!(value.get("parameters").is_none());
    }

    #[test]
    fn arguments_cannot_shadow_request_fields() {
        let args = json!({
            "filePath": "/w/secret.md",
            "reason": "check content",
            "id": "perm_fake",
            "toolName": "listFileTree",
            "action": "List the file tree",
            "status": "approved"
        });
        let request = PermissionRequest::new("perm_1", "readMarkdownFile", "Read secret.md", "check content", &args);
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["id"], "perm_1");
        assert_eq!(value["toolName"], "readMarkdownFile");
        assert_eq!(value["action"], "Read secret.md");
        assert_eq!(value["status"], "pending");
        assert_eq!(
            request.arguments(),
            json!({"filePath": "/w/secret.md", "reason": "check content"})
        );
    }

    #[test]
    fn arguments_restore_reason() {
        let args = json!({"query": "todo", "reason": "find tasks"});
        let request = PermissionRequest::new("p2", "searchMarkdownContent", "Search", "find tasks", &args);
        assert_eq!(request.arguments(), args);
        assert_eq!(request.status, PermissionStatus::Pending);
    }
}

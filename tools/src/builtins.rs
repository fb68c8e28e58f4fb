//! Built-in tool implementations.

use std::fmt::{self, Write as _};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use quire_types::{NonEmptyString, PermissionRequest, ToolDefinition};

use crate::search::{self, is_markdown};
use crate::store::FileStore;
use crate::{ToolError, parse_args};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolMode {
    /// Runs on first call.
    Direct,
    /// First call only checks preconditions and asks for approval.
    Gated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ProposeDocumentChange,
    ReadMarkdownFile,
    SearchMarkdownFiles,
    SearchMarkdownContent,
    ListFileTree,
}

impl ToolName {
    pub const ALL: [ToolName; 5] = [
        ToolName::ProposeDocumentChange,
        ToolName::ReadMarkdownFile,
        ToolName::SearchMarkdownFiles,
        ToolName::SearchMarkdownContent,
        ToolName::ListFileTree,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ToolName::ProposeDocumentChange => "proposeDocumentChange",
            ToolName::ReadMarkdownFile => "readMarkdownFile",
            ToolName::SearchMarkdownFiles => "searchMarkdownFiles",
            ToolName::SearchMarkdownContent => "searchMarkdownContent",
            ToolName::ListFileTree => "listFileTree",
        }
    }

    #[must_use]
    pub const fn mode(self) -> ToolMode {
        match self {
            ToolName::ProposeDocumentChange => ToolMode::Direct,
            ToolName::ReadMarkdownFile
            | ToolName::SearchMarkdownFiles
            | ToolName::SearchMarkdownContent
            | ToolName::ListFileTree => ToolMode::Gated,
        }
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            ToolName::ProposeDocumentChange => {
                "Propose a rewrite of a markdown file. Provide the COMPLETE new file content, \
                 not a fragment. Nothing is written until the user reviews the diff and accepts it."
            }
            ToolName::ReadMarkdownFile => {
                "Read a markdown (.md) file from the notes directory. Requires user approval; \
                 explain why in `reason`."
            }
            ToolName::SearchMarkdownFiles => {
                "Find markdown files whose name contains `pattern` (case-insensitive). Omit \
                 `pattern` to list every markdown file. Requires user approval."
            }
            ToolName::SearchMarkdownContent => {
                "Search the lines of markdown files for `query` (case-insensitive), optionally \
                 restricted to files whose name contains `filePattern`. Requires user approval."
            }
            ToolName::ListFileTree => {
                "List the full folder and file tree of the notes directory. Requires user approval."
            }
        }
    }

    #[must_use]
    pub fn schema(self) -> Value {
        let reason = json!({
            "type": "string",
            "minLength": 1,
            "description": "Why this is needed; shown to the user when asking for approval"
        });
        match self {
            ToolName::ProposeDocumentChange => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "path": {"type": "string", "minLength": 1, "description": "Absolute path of the file to rewrite"},
                    "newContent": {"type": "string", "description": "Complete new file content"},
                    "summary": {"type": "string", "minLength": 1, "description": "One-line description of the change"}
                },
                "required": ["path", "newContent", "summary"]
            }),
            ToolName::ReadMarkdownFile => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "filePath": {"type": "string", "minLength": 1, "description": "Absolute path of the .md file"},
                    "reason": reason
                },
                "required": ["filePath", "reason"]
            }),
            ToolName::SearchMarkdownFiles => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "pattern": {"type": "string", "description": "Substring to match in file names"},
                    "reason": reason
                },
                "required": ["reason"]
            }),
            ToolName::SearchMarkdownContent => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "query": {"type": "string", "minLength": 1, "description": "Text to search for"},
                    "filePattern": {"type": "string", "description": "Only search files whose name contains this"},
                    "reason": reason
                },
                "required": ["query", "reason"]
            }),
            ToolName::ListFileTree => json!({
                "type": "object",
                "additionalProperties": false,
                "properties": {"reason": reason},
                "required": ["reason"]
            }),
        }
    }

    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition::new(self.as_str(), self.description(), self.schema())
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = ToolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .into_iter()
            .find(|tool| tool.as_str() == s)
            .ok_or_else(|| ToolError::UnknownTool {
                name: s.to_string(),
            })
    }
}

/// A staged whole-file rewrite, exactly as the model proposed it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub path: String,
    pub proposed_content: String,
    pub summary: String,
}

impl Proposal {
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "success": true,
            "type": "proposal",
            "path": self.path,
            "proposedContent": self.proposed_content,
            "summary": self.summary,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProposeArgs {
    path: NonEmptyString,
    new_content: String,
    summary: NonEmptyString,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadArgs {
    file_path: NonEmptyString,
    reason: NonEmptyString,
}

#[derive(Deserialize)]
struct SearchFilesArgs {
    pattern: Option<String>,
    reason: NonEmptyString,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchContentArgs {
    query: NonEmptyString,
    file_pattern: Option<String>,
    reason: NonEmptyString,
}

#[derive(Deserialize)]
struct ListTreeArgs {
    reason: NonEmptyString,
}

pub(crate) fn propose(store: &FileStore, args: &Value) -> Result<Proposal, ToolError> {
    let typed: ProposeArgs = parse_args(args)?;
    store.resolve(&typed.path)?;
    Ok(Proposal {
        path: typed.path.into_inner(),
        proposed_content: typed.new_content,
        summary: typed.summary.into_inner(),
    })
}

/// Read-only precondition checks for a gated tool, then a pending request.
pub(crate) fn request_permission(
    tool: ToolName,
    store: &FileStore,
    args: &Value,
) -> Result<PermissionRequest, ToolError> {
    let (action, reason) = match tool {
        ToolName::ReadMarkdownFile => {
            let typed: ReadArgs = parse_args(args)?;
            check_markdown_file(store, &typed.file_path)?;
            (format!("Read {}", typed.file_path.as_str()), typed.reason)
        }
        ToolName::SearchMarkdownFiles => {
            let typed: SearchFilesArgs = parse_args(args)?;
            check_root(store)?;
            let action = match typed.pattern.as_deref().map(str::trim) {
                Some(pattern) if !pattern.is_empty() => {
                    format!("Search file names for \"{pattern}\"")
                }
                _ => "List all markdown files".to_string(),
            };
            (action, typed.reason)
        }
        ToolName::SearchMarkdownContent => {
            let typed: SearchContentArgs = parse_args(args)?;
            check_root(store)?;
            let mut action = format!("Search file contents for \"{}\"", typed.query.as_str());
            if let Some(pattern) = typed.file_pattern.as_deref().filter(|p| !p.trim().is_empty()) {
                let _ = write!(action, " in files matching \"{pattern}\"");
            }
            (action, typed.reason)
        }
        ToolName::ListFileTree => {
            let typed: ListTreeArgs = parse_args(args)?;
            check_root(store)?;
            ("List the file tree".to_string(), typed.reason)
        }
        ToolName::ProposeDocumentChange => {
            return Err(ToolError::Validation {
                message: format!("{tool} does not require permission"),
            });
        }
    };

    let id = format!("perm_{}", uuid::Uuid::new_v4().simple());
    Ok(PermissionRequest::new(
        id,
        tool.as_str(),
        action,
        reason.into_inner(),
        args,
    ))
}

/// The real work of a tool, run after approval.
pub(crate) fn execute(tool: ToolName, store: &FileStore, args: &Value) -> Result<Value, ToolError> {
    match tool {
        ToolName::ProposeDocumentChange => propose(store, args).map(|p| p.to_value()),
        ToolName::ReadMarkdownFile => {
            let typed: ReadArgs = parse_args(args)?;
            let path = check_markdown_file(store, &typed.file_path)?;
            let content = store.read_file(&typed.file_path)?;
            Ok(json!({
                "path": path,
                "size": content.len(),
                "content": content,
            }))
        }
        ToolName::SearchMarkdownFiles => {
            let typed: SearchFilesArgs = parse_args(args)?;
            check_root(store)?;
            let found =
                search::find_markdown_files(store.root(), store.settings(), typed.pattern.as_deref());
            Ok(json!({
                "count": found.matches.len(),
                "files": found.matches,
                "truncated": found.truncated,
            }))
        }
        ToolName::SearchMarkdownContent => {
            let typed: SearchContentArgs = parse_args(args)?;
            check_root(store)?;
            let found = search::search_markdown_content(
                store.root(),
                store.settings(),
                &typed.query,
                typed.file_pattern.as_deref(),
            );
            Ok(json!({
                "count": found.matches.len(),
                "matches": found.matches,
                "truncated": found.truncated,
            }))
        }
        ToolName::ListFileTree => {
            let _: ListTreeArgs = parse_args(args)?;
            let root = store.root().to_string_lossy().into_owned();
            let tree = store.read_directory(&root)?;
            Ok(json!({ "root": root, "tree": tree }))
        }
    }
}

fn check_markdown_file(store: &FileStore, path: &str) -> Result<String, ToolError> {
    let resolved = store.resolve(path)?;
    if !resolved.exists() {
        return Err(ToolError::NotFound {
            path: path.to_string(),
        });
    }
    if !resolved.is_file() {
        return Err(ToolError::NotAFile {
            path: path.to_string(),
        });
    }
    if !is_markdown(&resolved) {
        return Err(ToolError::WrongFileType {
            path: path.to_string(),
            expected: "markdown",
        });
    }
    Ok(resolved.to_string_lossy().into_owned())
}

fn check_root(store: &FileStore) -> Result<(), ToolError> {
    if store.root().is_dir() {
        Ok(())
    } else {
        Err(ToolError::NotFound {
            path: store.root().to_string_lossy().into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ToolMode, ToolName};
    use crate::ToolError;

    #[test]
    fn names_round_trip_and_unknown_is_explicit() {
        for tool in ToolName::ALL {
            assert_eq!(tool.as_str().parse::<ToolName>().unwrap(), tool);
        }
        assert!(matches!(
            "ReadMarkdownFile".parse::<ToolName>(),
            Err(ToolError::UnknownTool { .. })
        ));
    }

    #[test]
    fn only_proposals_are_direct() {
        let direct: Vec<ToolName> = ToolName::ALL
            .into_iter()
            .filter(|tool| tool.mode() == ToolMode::Direct)
            .collect();
        assert_eq!(direct, [ToolName::ProposeDocumentChange]);
    }

    #[test]
    fn gated_schemas_require_reason() {
        for tool in ToolName::ALL {
            let required = tool.schema()["required"].clone();
            let has_reason = required
                .as_array()
                .unwrap()
                .iter()
                .any(|v| v == "reason");
            assert_eq!(has_reason, tool.mode() == ToolMode::Gated, "{tool}");
        }
    }

    #[test]
    fn schemas_are_closed() {
        for tool in ToolName::ALL {
            assert_eq!(tool.schema()["additionalProperties"], false, "{tool}");
        }
    }
}

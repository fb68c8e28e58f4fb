//! Staging, review and commit of whole-file rewrites.

use serde::Serialize;

use quire_tools::{FileStore, Proposal, ToolError};
use quire_types::PendingChange;
use quire_utils::DocumentDiff;

/// The editor's single source of truth for the active file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentState {
    pub path: Option<String>,
    pub content: String,
    pub dirty: bool,
    /// Bumped whenever content is replaced from outside the editor.
    pub version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_text: Option<String>,
}

impl DocumentState {
    #[must_use]
    pub fn open(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            content: content.into(),
            dirty: false,
            version: 0,
            selected_text: None,
        }
    }

    /// Replace the document with another file loaded from disk.
    pub fn load(&mut self, path: Option<String>, content: String) {
        self.path = path;
        self.content = content;
        self.dirty = false;
        self.version += 1;
        self.selected_text = None;
    }

    /// A user edit: content changes, nothing is persisted.
    pub fn edit(&mut self, content: impl Into<String>) {
        self.content = content.into();
        self.dirty = true;
    }

    /// Content was persisted: adopt it, mark clean, force views to resync.
    ///
    /// One transition so no reader can observe "saved" content that is
    /// still dirty or a clean flag on stale content.
    pub fn apply_saved(&mut self, content: String) {
        self.content = content;
        self.dirty = false;
        self.version += 1;
    }

    #[must_use]
    pub fn is_active(&self, store: &FileStore, path: &str) -> bool {
        self.path
            .as_deref()
            .is_some_and(|active| same_file(store, active, path))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("No change is pending")]
    NoPendingChange,
    #[error(transparent)]
    Tool(#[from] ToolError),
}

/// At most one staged change per session; a newer proposal replaces the older.
#[derive(Debug, Default)]
pub struct ProposalPipeline {
    pending: Option<PendingChange>,
}

impl ProposalPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pending(&self) -> Option<&PendingChange> {
        self.pending.as_ref()
    }

    /// Stage `proposal` against the live document.
    ///
    /// The original side of the diff is the in-memory content when the
    /// proposal targets the active file, so unsaved edits show up. For any
    /// other file it is the content on disk, or empty for a new file.
    pub fn stage(
        &mut self,
        proposal: Proposal,
        document: &DocumentState,
        store: &FileStore,
    ) -> &PendingChange {
        let original = if document.is_active(store, &proposal.path) {
            document.content.clone()
        } else {
            match store.read_file(&proposal.path) {
                Ok(content) => content,
                Err(ToolError::NotFound { .. }) => String::new(),
                Err(e) => {
                    tracing::warn!(path = %proposal.path, "Staging against empty original: {e}");
                    String::new()
                }
            }
        };

        if let Some(previous) = &self.pending {
            tracing::info!(path = %previous.file_path, "Pending change replaced by newer proposal");
        }
        tracing::info!(path = %proposal.path, summary = %proposal.summary, "Change staged");
        self.pending.insert(PendingChange::new(
            proposal.path,
            original,
            proposal.proposed_content,
            proposal.summary,
        ))
    }

    #[must_use]
    pub fn diff(&self) -> Option<DocumentDiff> {
        self.pending
            .as_ref()
            .map(|change| DocumentDiff::compute(&change.original_content, &change.proposed_content))
    }

    /// Write the pending change and sync the document.
    ///
    /// Order: write, then document update, then clear. A failed write keeps
    /// the change pending so the user can retry.
    pub fn accept(
        &mut self,
        store: &FileStore,
        document: &mut DocumentState,
    ) -> Result<u64, ProposalError> {
        let change = self.pending.as_ref().ok_or(ProposalError::NoPendingChange)?;
        let bytes = match commit(store, &change.file_path, &change.proposed_content) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(path = %change.file_path, "Accept failed, change kept: {e}");
                return Err(e.into());
            }
        };

        if document.is_active(store, &change.file_path) {
            document.apply_saved(change.proposed_content.clone());
        }
        self.pending = None;
        Ok(bytes)
    }

    pub fn reject(&mut self) -> Option<PendingChange> {
        let rejected = self.pending.take();
        if let Some(change) = &rejected {
            tracing::info!(path = %change.file_path, "Change rejected");
        }
        rejected
    }

    /// Drop a change staged for a file other than the newly active one.
    pub fn invalidate_for(
        &mut self,
        store: &FileStore,
        active: Option<&str>,
    ) -> Option<PendingChange> {
        let stale = self.pending.as_ref().is_some_and(|change| {
            active.is_none_or(|path| !same_file(store, &change.file_path, path))
        });
        if !stale {
            return None;
        }
        let dropped = self.pending.take();
        if let Some(change) = &dropped {
            tracing::info!(path = %change.file_path, "Stale pending change discarded");
        }
        dropped
    }
}

/// Sandboxed write of accepted content, returning the size on disk.
pub fn commit(store: &FileStore, path: &str, content: &str) -> Result<u64, ToolError> {
    let bytes = store.write_file(path, content)?;
    store.touch_recent(path);
    tracing::info!(path, bytes, "Change committed");
    Ok(bytes)
}

fn same_file(store: &FileStore, a: &str, b: &str) -> bool {
    match (store.resolve(a), store.resolve(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::{DocumentState, ProposalError, ProposalPipeline};
    use quire_config::Settings;
    use quire_tools::{FileStore, Proposal, ToolError};
    use std::fs;

    fn store() -> (tempfile::TempDir, std::path::PathBuf, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("a.md"), "# A\n").unwrap();
        let store = FileStore::new(Settings::with_root(&root));
        (dir, root, store)
    }

    fn proposal(path: &str, content: &str) -> Proposal {
        Proposal {
            path: path.to_string(),
            proposed_content: content.to_string(),
            summary: "add heading".to_string(),
        }
    }

    #[test]
    fn accept_writes_and_cleans_the_document() {
        let (_dir, root, store) = store();
        let path = root.join("a.md").to_string_lossy().into_owned();
        let mut document = DocumentState::open(&path, "# A\n");
        document.edit("# A\nunsaved\n");

        let mut pipeline = ProposalPipeline::new();
        let staged = pipeline.stage(proposal(&path, "# Hi"), &document, &store);
        assert_eq!(staged.original_content, "# A\nunsaved\n");
        let diff = pipeline.diff().unwrap();
        assert_eq!((diff.added, diff.removed), (1, 2));

        let bytes = pipeline.accept(&store, &mut document).unwrap();
        assert_eq!(bytes, 4);
        assert_eq!(store.read_file(&path).unwrap(), "# Hi");
        assert_eq!(document.content, "# Hi");
        assert!(!document.dirty);
        assert_eq!(document.version, 1);
        assert!(pipeline.pending().is_none());
    }

    #[test]
    fn reject_leaves_disk_and_document_untouched() {
        let (_dir, root, store) = store();
        let path = root.join("a.md").to_string_lossy().into_owned();
        let document = DocumentState::open(&path, "# A\n");

        let mut pipeline = ProposalPipeline::new();
        pipeline.stage(proposal(&path, "# Hi"), &document, &store);
        assert!(pipeline.reject().is_some());
        assert!(pipeline.pending().is_none());
        assert_eq!(store.read_file(&path).unwrap(), "# A\n");
        assert!(pipeline.reject().is_none());
    }

    #[test]
    fn newer_proposal_replaces_older() {
        let (_dir, root, store) = store();
        let a = root.join("a.md").to_string_lossy().into_owned();
        let b = root.join("b.md").to_string_lossy().into_owned();
        let document = DocumentState::open(&a, "# A\n");

        let mut pipeline = ProposalPipeline::new();
        pipeline.stage(proposal(&a, "one"), &document, &store);
        let staged = pipeline.stage(proposal(&b, "two"), &document, &store);
        assert_eq!(staged.file_path, b);
        assert_eq!(staged.original_content, "");
        assert_eq!(pipeline.pending().unwrap().proposed_content, "two");
    }

    #[test]
    fn failed_write_keeps_the_change() {
        let (_dir, root, store) = store();
        let path = root.join("missing").join("x.md").to_string_lossy().into_owned();
        let mut document = DocumentState::default();

        let mut pipeline = ProposalPipeline::new();
        pipeline.stage(proposal(&path, "x"), &document, &store);
        let err = pipeline.accept(&store, &mut document).unwrap_err();
        assert!(matches!(err, ProposalError::Tool(ToolError::NotFound { .. })));
        assert!(pipeline.pending().is_some());
        assert_eq!(document.version, 0);
    }

    #[test]
    fn switching_files_discards_stale_change() {
        let (_dir, root, store) = store();
        let a = root.join("a.md").to_string_lossy().into_owned();
        let b = root.join("b.md").to_string_lossy().into_owned();
        let document = DocumentState::open(&a, "# A\n");

        let mut pipeline = ProposalPipeline::new();
        pipeline.stage(proposal(&a, "# Hi"), &document, &store);
        assert!(pipeline.invalidate_for(&store, Some(&a)).is_none());
        assert!(pipeline.invalidate_for(&store, Some(&b)).is_some());
        assert!(pipeline.pending().is_none());
        assert!(matches!(
            pipeline.accept(&store, &mut DocumentState::default()),
            Err(ProposalError::NoPendingChange)
        ));
    }
}

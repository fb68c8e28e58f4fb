//! One user's conversation with the notes agent.
//!
//! [`Session`] is the single state container: the conversation, the active
//! document, the permission gate, the pending change and the file tree. Each
//! field has its own mutation methods; nothing reaches it through globals.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;

use quire_tools::{FileStore, ToolError, ToolRegistry};
use quire_types::{ChatMessage, FileNode, PendingChange, PermissionRequest};
use quire_utils::DocumentDiff;

use crate::commands::{CommandName, CommandTable};
use crate::gate::{GateError, PermissionGate};
use crate::orchestrator::{
    AbortSignal, DocumentSnapshot, DocumentSource, ModelClient, Orchestrator, TurnError,
    TurnEvent, TurnOutcome, TurnReport,
};
use crate::proposal::{DocumentState, ProposalError, ProposalPipeline};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Turn(#[from] TurnError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error(transparent)]
    Proposal(#[from] ProposalError),
    #[error(transparent)]
    Tool(#[from] ToolError),
    #[error("No file is open")]
    NoActiveFile,
}

/// Shared handle on the editor document.
///
/// The editor writes through it on every (debounced) keystroke; the
/// orchestrator reads it at the start of every step.
#[derive(Debug, Clone, Default)]
pub struct LiveDocument {
    state: Arc<Mutex<DocumentState>>,
}

impl LiveDocument {
    #[must_use]
    pub fn new(state: DocumentState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, DocumentState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn edit(&self, content: impl Into<String>) {
        self.lock().edit(content);
    }

    pub fn select(&self, selected: Option<String>) {
        self.lock().selected_text = selected;
    }

    #[must_use]
    pub fn current(&self) -> DocumentState {
        self.lock().clone()
    }
}

impl DocumentSource for LiveDocument {
    fn snapshot(&self) -> DocumentSnapshot {
        let state = self.lock();
        DocumentSnapshot {
            path: state.path.clone(),
            content: state.path.as_ref().map(|_| state.content.clone()),
            selected_text: state.selected_text.clone(),
        }
    }
}

pub struct Session {
    registry: ToolRegistry,
    client: Arc<dyn ModelClient>,
    document: LiveDocument,
    conversation: Vec<ChatMessage>,
    gate: PermissionGate,
    proposals: ProposalPipeline,
    tree: Vec<FileNode>,
    show_headings: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("root", &self.registry.store().root())
            .field("messages", &self.conversation.len())
            .field("gate", &self.gate)
            .field("proposals", &self.proposals)
            .finish_non_exhaustive()
    }
}

impl Session {
    #[must_use]
    pub fn new(registry: ToolRegistry, client: Arc<dyn ModelClient>) -> Self {
        Self {
            registry,
            client,
            document: LiveDocument::default(),
            conversation: Vec::new(),
            gate: PermissionGate::new(),
            proposals: ProposalPipeline::new(),
            tree: Vec::new(),
            show_headings: true,
        }
    }

    /// Switch models; applies from the next turn.
    pub fn set_client(&mut self, client: Arc<dyn ModelClient>) {
        self.client = client;
    }

    fn store(&self) -> &FileStore {
        self.registry.store()
    }

    #[must_use]
    pub fn conversation(&self) -> &[ChatMessage] {
        &self.conversation
    }

    #[must_use]
    pub fn document(&self) -> &LiveDocument {
        &self.document
    }

    #[must_use]
    pub fn pending_permission(&self) -> Option<&PermissionRequest> {
        self.gate.pending()
    }

    #[must_use]
    pub fn pending_change(&self) -> Option<&PendingChange> {
        self.proposals.pending()
    }

    #[must_use]
    pub fn pending_diff(&self) -> Option<DocumentDiff> {
        self.proposals.diff()
    }

    #[must_use]
    pub fn tree(&self) -> &[FileNode] {
        &self.tree
    }

    #[must_use]
    pub fn show_headings(&self) -> bool {
        self.show_headings
    }

    pub fn toggle_headings(&mut self) {
        self.show_headings = !self.show_headings;
    }

    /// Make `path` the active file, discarding a change staged for another file.
    pub fn open_file(&mut self, path: &str) -> Result<(), SessionError> {
        let content = self.store().read_file(path)?;
        self.proposals.invalidate_for(self.registry.store(), Some(path));
        self.document.lock().load(Some(path.to_string()), content);
        self.store().touch_recent(path);
        tracing::debug!(path, "File opened");
        Ok(())
    }

    pub fn close_file(&mut self) {
        self.proposals.invalidate_for(self.registry.store(), None);
        self.document.lock().load(None, String::new());
    }

    pub fn edit_content(&self, content: impl Into<String>) {
        self.document.edit(content);
    }

    pub fn refresh_tree(&mut self) -> Result<(), SessionError> {
        let root = self.store().root().to_string_lossy().into_owned();
        self.tree = self.store().read_directory(&root)?;
        Ok(())
    }

    /// Persist the active document as typed.
    pub fn save(&mut self) -> Result<u64, SessionError> {
        let mut document = self.document.lock();
        let path = document.path.clone().ok_or(SessionError::NoActiveFile)?;
        let content = document.content.clone();
        let bytes = self.registry.store().write_file(&path, &content)?;
        document.apply_saved(content);
        Ok(bytes)
    }

    /// Clear the conversation and any permission request it was waiting on.
    pub fn clear_chat(&mut self) {
        self.conversation.clear();
        self.gate.cancel();
        tracing::debug!("Conversation cleared");
    }

    /// Append a user message and run a turn.
    ///
    /// Refused while a permission request is awaiting a decision: the
    /// conversation is parked until the user acts.
    pub async fn send(
        &mut self,
        text: impl Into<String>,
        events: &mpsc::Sender<TurnEvent>,
        abort: &mut AbortSignal,
    ) -> Result<TurnOutcome, SessionError> {
        if self.gate.is_pending() {
            return Err(TurnError::PermissionPending.into());
        }
        self.conversation.push(ChatMessage::user(text));
        let report = Orchestrator::new(self.client.as_ref(), &self.registry, &self.document)
            .run_turn(&self.conversation, events, abort)
            .await;
        Ok(self.apply_report(report))
    }

    pub async fn approve(
        &mut self,
        id: &str,
        events: &mpsc::Sender<TurnEvent>,
        abort: &mut AbortSignal,
    ) -> Result<TurnOutcome, SessionError> {
        let message = self.gate.approve(&self.registry, id).await?;
        self.resume(message, events, abort).await
    }

    pub async fn deny(
        &mut self,
        id: &str,
        events: &mpsc::Sender<TurnEvent>,
        abort: &mut AbortSignal,
    ) -> Result<TurnOutcome, SessionError> {
        let message = self.gate.deny(id)?;
        self.resume(message, events, abort).await
    }

    async fn resume(
        &mut self,
        decision: ChatMessage,
        events: &mpsc::Sender<TurnEvent>,
        abort: &mut AbortSignal,
    ) -> Result<TurnOutcome, SessionError> {
        self.conversation.push(decision);
        let report = Orchestrator::new(self.client.as_ref(), &self.registry, &self.document)
            .resume_turn(&self.conversation, events, abort)
            .await;
        Ok(self.apply_report(report))
    }

    fn apply_report(&mut self, report: TurnReport) -> TurnOutcome {
        self.conversation.extend(report.messages);
        if let Some(proposal) = report.proposal {
            let document = self.document.lock();
            self.proposals.stage(proposal, &document, self.registry.store());
        }
        if let TurnOutcome::AwaitingPermission { request, call } = &report.outcome
            && let Err(e) = self.gate.open(request.clone(), call.clone())
        {
            tracing::warn!("Permission request not opened: {e}");
        }
        report.outcome
    }

    /// Commit the pending change; on failure it stays pending.
    pub fn accept_change(&mut self) -> Result<u64, SessionError> {
        let mut document = self.document.lock();
        let bytes = self
            .proposals
            .accept(self.registry.store(), &mut document)?;
        Ok(bytes)
    }

    pub fn reject_change(&mut self) -> Option<PendingChange> {
        self.proposals.reject()
    }
}

/// The session's commands, ready for the UI to invoke by name.
#[must_use]
pub fn default_commands() -> CommandTable<Session> {
    let mut commands = CommandTable::new();
    commands.register(CommandName::Save, |session: &mut Session| {
        session.save().map(|_| ()).map_err(|e| e.to_string())
    });
    commands.register(CommandName::ClearChat, |session: &mut Session| {
        session.clear_chat();
        Ok(())
    });
    commands.register(CommandName::RefreshTree, |session: &mut Session| {
        session.refresh_tree().map_err(|e| e.to_string())
    });
    commands.register(CommandName::ToggleHeadings, |session: &mut Session| {
        session.toggle_headings();
        Ok(())
    });
    commands
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use super::{Session, SessionError, default_commands};
    use crate::commands::CommandName;
    use crate::gate::GateError;
    use crate::orchestrator::tests::{ScriptedModel, call, text};
    use crate::orchestrator::{AbortHandle, AbortSignal, TurnError, TurnEvent, TurnOutcome};
    use quire_config::Settings;
    use quire_tools::{FileStore, ToolRegistry};
    use quire_types::{MessagePart, PermissionStatus, Role, StreamEvent};
    use serde_json::json;
    use tokio::sync::mpsc;

    struct Fixture {
        _dir: tempfile::TempDir,
        path: String,
        model: Arc<ScriptedModel>,
        session: Session,
        tx: mpsc::Sender<TurnEvent>,
        _rx: mpsc::Receiver<TurnEvent>,
    }

    /// A session over a root holding `a.md`; `script` gets the path of `a.md`.
    fn fixture(script: impl FnOnce(&str) -> Vec<Vec<StreamEvent>>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().canonicalize().unwrap();
        fs::write(root.join("a.md"), "# A\n").unwrap();
        let path = root.join("a.md").to_string_lossy().into_owned();
        let registry = ToolRegistry::new(FileStore::new(Settings::with_root(&root)));
        let model = Arc::new(ScriptedModel::new(script(&path)));
        let session = Session::new(registry, model.clone());
        let (tx, rx) = mpsc::channel(256);
        Fixture {
            _dir: dir,
            path,
            model,
            session,
            tx,
            _rx: rx,
        }
    }

    fn with_done(mut events: Vec<StreamEvent>) -> Vec<StreamEvent> {
        events.push(StreamEvent::Done);
        events
    }

    fn propose(path: &str, content: &str) -> Vec<StreamEvent> {
        with_done(call(
            "c1",
            "proposeDocumentChange",
            &json!({"path": path, "newContent": content, "summary": "add heading"}),
        ))
    }

    fn read(path: &str) -> Vec<StreamEvent> {
        with_done(call(
            "c1",
            "readMarkdownFile",
            &json!({"filePath": path, "reason": "check content"}),
        ))
    }

    #[tokio::test]
    async fn proposal_diffs_against_unsaved_edits_and_accepts() {
        let mut f = fixture(|path| {
            vec![
                propose(path, "# Hi\n"),
                with_done(vec![text("Review the change.")]),
            ]
        });
        f.session.open_file(&f.path).unwrap();
        f.session.edit_content("# A\nunsaved\n");

        let outcome = f
            .session
            .send("add a heading", &f.tx, &mut AbortSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);

        let pending = f.session.pending_change().unwrap();
        assert_eq!(pending.original_content, "# A\nunsaved\n");
        assert_eq!(fs::read_to_string(&f.path).unwrap(), "# A\n");
        assert!(f.session.pending_diff().is_some_and(|d| d.added == 1));

        assert_eq!(f.session.accept_change().unwrap(), 5);
        assert_eq!(fs::read_to_string(&f.path).unwrap(), "# Hi\n");
        let document = f.session.document().current();
        assert!(!document.dirty);
        assert_eq!(document.content, "# Hi\n");
        assert_eq!(document.version, 2);
        assert!(f.session.pending_change().is_none());
    }

    #[tokio::test]
    async fn reject_keeps_disk_and_switching_files_drops_the_change() {
        let mut f = fixture(|path| {
            vec![
                propose(path, "# Hi\n"),
                with_done(vec![text("Proposed.")]),
                propose(path, "# Again\n"),
                with_done(vec![text("Proposed again.")]),
            ]
        });
        f.session.open_file(&f.path).unwrap();
        f.session
            .send("fix it", &f.tx, &mut AbortSignal::never())
            .await
            .unwrap();
        assert!(f.session.reject_change().is_some());
        assert_eq!(fs::read_to_string(&f.path).unwrap(), "# A\n");

        let other = Path::new(&f.path).with_file_name("b.md");
        fs::write(&other, "# B\n").unwrap();
        f.session
            .send("fix it", &f.tx, &mut AbortSignal::never())
            .await
            .unwrap();
        assert!(f.session.pending_change().is_some());
        f.session.open_file(&other.to_string_lossy()).unwrap();
        assert!(f.session.pending_change().is_none());
        assert!(matches!(
            f.session.accept_change(),
            Err(SessionError::Proposal(_))
        ));
    }

    #[tokio::test]
    async fn approval_resumes_the_conversation_with_the_result() {
        let mut f = fixture(|path| vec![read(path), with_done(vec![text("It has a heading.")])]);

        let outcome = f
            .session
            .send("what is in a.md?", &f.tx, &mut AbortSignal::never())
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::AwaitingPermission { .. }));
        let id = f.session.pending_permission().unwrap().id.clone();

        let refused = f
            .session
            .send("hello?", &f.tx, &mut AbortSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(
            refused,
            SessionError::Turn(TurnError::PermissionPending)
        ));

        let outcome = f
            .session
            .approve(&id, &f.tx, &mut AbortSignal::never())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Completed);
        assert!(f.session.pending_permission().is_none());

        let roles: Vec<Role> = f.session.conversation().iter().map(|m| m.role).collect();
        assert_eq!(roles, [Role::User, Role::Assistant, Role::Tool, Role::Assistant]);
        let MessagePart::ToolResult {
            tool_call_id,
            result,
            ..
        } = &f.session.conversation()[2].parts[0]
        else {
            panic!("expected the approved result");
        };
        assert_eq!(tool_call_id, "c1");
        assert_eq!(result["data"]["content"], "# A\n");
        assert_eq!(f.model.requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn denial_is_reported_and_final() {
        let mut f = fixture(|path| vec![read(path), with_done(vec![text("Understood.")])]);
        f.session
            .send("read a.md", &f.tx, &mut AbortSignal::never())
            .await
            .unwrap();
        let id = f.session.pending_permission().unwrap().id.clone();

        f.session
            .deny(&id, &f.tx, &mut AbortSignal::never())
            .await
            .unwrap();
        let MessagePart::ToolResult {
            result, is_error, ..
        } = &f.session.conversation()[2].parts[0]
        else {
            panic!("expected the denial result");
        };
        assert!(*is_error);
        assert_eq!(result["error"], "Permission denied by user for readMarkdownFile");

        let err = f
            .session
            .approve(&id, &f.tx, &mut AbortSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SessionError::Gate(GateError::AlreadyResolved {
                status: PermissionStatus::Denied,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn abort_mid_stream_leaves_no_pending_state() {
        let mut f = fixture(|path| {
            let mut step = call(
                "c1",
                "proposeDocumentChange",
                &json!({"path": path, "newContent": "# Hi\n", "summary": "add heading"}),
            );
            step.extend(call(
                "c2",
                "readMarkdownFile",
                &json!({"filePath": path, "reason": "check content"}),
            ));
            vec![step]
        });
        let (handle, mut signal) = AbortHandle::new();
        f.model.abort_after_last_step(handle);

        let outcome = f
            .session
            .send("fix the heading", &f.tx, &mut signal)
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::Aborted);
        assert!(f.session.pending_change().is_none());
        assert!(f.session.pending_permission().is_none());
        assert_eq!(fs::read_to_string(&f.path).unwrap(), "# A\n");
        assert_eq!(f.session.conversation().len(), 1);
    }

    #[tokio::test]
    async fn each_step_reads_the_live_document() {
        let mut f = fixture(|_| vec![with_done(vec![text("ok")])]);
        f.session.open_file(&f.path).unwrap();
        let editor = f.session.document().clone();
        editor.edit("# Typed after opening\n");
        editor.select(Some("Typed".to_string()));

        f.session
            .send("what does it say?", &f.tx, &mut AbortSignal::never())
            .await
            .unwrap();
        let requests = f.model.requests.lock().unwrap();
        let prompt = &requests[0].1;
        assert!(prompt.contains("# Typed after opening"));
        assert!(prompt.contains("<selection>\nTyped\n</selection>"));
    }

    #[test]
    fn commands_drive_the_session() {
        let mut f = fixture(|_| Vec::new());
        let commands = default_commands();
        for name in CommandName::ALL {
            assert!(commands.is_registered(name));
        }

        assert!(f.session.show_headings());
        commands
            .invoke(CommandName::ToggleHeadings, &mut f.session)
            .unwrap();
        assert!(!f.session.show_headings());

        commands
            .invoke(CommandName::RefreshTree, &mut f.session)
            .unwrap();
        assert_eq!(f.session.tree().len(), 1);

        // Nothing open yet.
        assert!(commands.invoke(CommandName::Save, &mut f.session).is_err());
        f.session.open_file(&f.path).unwrap();
        f.session.edit_content("# Saved\n");
        commands.invoke(CommandName::Save, &mut f.session).unwrap();
        assert_eq!(fs::read_to_string(&f.path).unwrap(), "# Saved\n");
        assert!(!f.session.document().current().dirty);

        commands
            .invoke(CommandName::ClearChat, &mut f.session)
            .unwrap();
        assert!(f.session.conversation().is_empty());
    }
}

//! Core engine for Quire: the conversation loop and the human checkpoints around it.
//!
//! - [`Orchestrator`]: bounded tool-use loop per user turn
//! - [`PermissionGate`]: approve/deny for gated tools
//! - [`ProposalPipeline`]: staged rewrites, reviewed as a diff, committed on accept
//! - [`Session`]: the state container tying them to one conversation
//!
//! This crate has no HTTP or UI dependencies.

pub mod commands;
pub mod gate;
pub mod intent;
pub mod orchestrator;
pub mod proposal;
pub mod session;
pub mod streaming;

pub use commands::{CommandError, CommandName, CommandTable};
pub use gate::{GateError, PermissionGate, run_approved};
pub use intent::{is_edit_request, tool_choice_for};
pub use orchestrator::{
    AbortHandle, AbortSignal, DocumentSnapshot, DocumentSource, FinishReason, MAX_STEPS,
    ModelClient, ModelFut, ModelRequest, Orchestrator, ProviderClient, TurnError, TurnEvent,
    TurnOutcome, TurnReport, build_system_prompt,
};
pub use proposal::{DocumentState, ProposalError, ProposalPipeline, commit};
pub use session::{LiveDocument, Session, SessionError, default_commands};
pub use streaming::StreamingMessage;

pub use quire_providers::{self, ApiConfig};
pub use quire_tools::{self, OpResult, Proposal, ToolError, ToolRegistry};
pub use quire_types::{self, ChatMessage, PermissionRequest, PredefinedModel, Provider};

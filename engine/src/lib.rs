//! Feedback synchronization engine.
//!
//! Keeps per-document sessions in step with an editor surface while
//! analysis and suggestion requests run against the remote assistant:
//!
//! - [`Debouncer`] collapses bursts of edits into one request per pipeline.
//! - [`SessionStore`] holds every open document and applies responses only if
//!   they were computed from the current generation of its content.
//! - [`parse_report`] turns assistant text into diagnostics and a fix.
//! - [`MarkerSynchronizer`] is the single writer to the [`EditorSurface`].
//! - [`FeedbackEngine`] wires these together behind one event channel.
//!
//! [`ChatSession`] and [`Workspace`] are the conversational panel and the
//! project filesystem the editor works against.

mod chat;
mod debounce;
mod engine;
mod markers;
mod parse;
mod session;
mod suggestion;
mod surface;
mod workspace;

#[cfg(test)]
mod test_support;

pub use chat::{ChatSession, GREETING, NO_ANSWER, TRANSPORT_FAILURE};
pub use debounce::Debouncer;
pub use engine::{
    DEFAULT_DEBOUNCE, DEFAULT_EVENT_BUDGET, EVENT_CHANNEL_CAPACITY, EngineEvent, EngineOptions,
    EventOutcome, FeedbackEngine,
};
pub use markers::{MARKER_OWNER, MARKER_SOURCE, Marker, MarkerSeverity, MarkerSynchronizer, markers_for};
pub use parse::{FeedbackReport, extract_fix, parse_diagnostics, parse_report};
pub use session::{
    DocumentSession, PipelineState, RecordOutcome, SessionStore, SuggestionPayload,
};
pub use suggestion::{
    AcceptOutcome, SelectionAction, accept, completion_payload, propose_document_fix, reject,
    selection_payload,
};
pub use surface::{BufferSurface, EditorSurface};
pub use workspace::{NodeKind, TreeNode, VERSIONS_DIR, Workspace, WorkspaceError};

pub use onpoint_gateway;
pub use onpoint_types;

//! Per-document state and the ordered store of open documents.
//!
//! Every response is tagged with the generation of the content it was
//! computed from, and it is applied only while the session is still at that
//! generation. Anything older is stale and dropped without touching
//! diagnostics or errors.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use onpoint_types::{
    Diagnostic, DocumentPath, Generation, Language, Pipeline, SessionEpoch, SessionError,
    Suggestion, SuggestionEdit, SuggestionId,
};

use crate::parse::FeedbackReport;

/// Where a pipeline is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    /// Debounce timer armed for this generation.
    Editing { generation: Generation },
    /// Request in flight for this generation.
    Requesting { generation: Generation },
}

impl PipelineState {
    #[must_use]
    pub fn is_loading(self) -> bool {
        matches!(self, Self::Requesting { .. })
    }
}

/// What happened to a recorded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    Applied,
    Failed,
    /// The session has moved past the response's generation.
    Stale,
    /// No session for the path (closed, or reopened as a new incarnation).
    NoSession,
}

impl RecordOutcome {
    /// Whether session state visible to the user changed.
    #[must_use]
    pub fn changed(self) -> bool {
        matches!(self, Self::Applied | Self::Failed)
    }
}

/// Successful result of the suggestion pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuggestionPayload {
    /// A new pending suggestion, replacing any previous one.
    Proposal {
        edit: SuggestionEdit,
        reason: Option<String>,
    },
    /// Explanatory text with nothing to apply.
    Explanation(String),
    /// The assistant proposed nothing; any pending suggestion is dropped.
    Empty,
}

#[derive(Debug, Clone)]
pub struct DocumentSession {
    path: DocumentPath,
    epoch: SessionEpoch,
    language: Language,
    pub(crate) content: String,
    saved_content: String,
    dirty: bool,
    pub(crate) generation: Generation,
    analysis: PipelineState,
    suggestion: PipelineState,
    diagnostics: Vec<Diagnostic>,
    report: Option<FeedbackReport>,
    /// Generation the report was computed from.
    report_generation: Generation,
    analysis_error: Option<SessionError>,
    suggestion_error: Option<SessionError>,
    pub(crate) pending_suggestion: Option<Suggestion>,
    last_explanation: Option<String>,
    next_suggestion_id: u64,
}

impl DocumentSession {
    fn new(path: DocumentPath, epoch: SessionEpoch, content: String) -> Self {
        Self {
            language: Language::from_path(&path),
            path,
            epoch,
            saved_content: content.clone(),
            content,
            dirty: false,
            generation: Generation::ZERO,
            analysis: PipelineState::Idle,
            suggestion: PipelineState::Idle,
            diagnostics: Vec::new(),
            report: None,
            report_generation: Generation::ZERO,
            analysis_error: None,
            suggestion_error: None,
            pending_suggestion: None,
            last_explanation: None,
            next_suggestion_id: 1,
        }
    }

    #[must_use]
    pub fn path(&self) -> &DocumentPath {
        &self.path
    }

    #[must_use]
    pub fn epoch(&self) -> SessionEpoch {
        self.epoch
    }

    #[must_use]
    pub fn language(&self) -> Language {
        self.language
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[must_use]
    pub fn generation(&self) -> Generation {
        self.generation
    }

    #[must_use]
    pub fn pipeline(&self, pipeline: Pipeline) -> PipelineState {
        match pipeline {
            Pipeline::Analysis => self.analysis,
            Pipeline::Suggestion => self.suggestion,
        }
    }

    #[must_use]
    pub fn is_loading_analysis(&self) -> bool {
        self.analysis.is_loading()
    }

    #[must_use]
    pub fn is_loading_suggestion(&self) -> bool {
        self.suggestion.is_loading()
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn report(&self) -> Option<&FeedbackReport> {
        self.report.as_ref()
    }

    /// Whether the report describes the current content.
    #[must_use]
    pub fn report_is_current(&self) -> bool {
        self.report.is_some() && self.report_generation == self.generation
    }

    #[must_use]
    pub fn analysis_error(&self) -> Option<&SessionError> {
        self.analysis_error.as_ref()
    }

    #[must_use]
    pub fn suggestion_error(&self) -> Option<&SessionError> {
        self.suggestion_error.as_ref()
    }

    #[must_use]
    pub fn pending_suggestion(&self) -> Option<&Suggestion> {
        self.pending_suggestion.as_ref()
    }

    #[must_use]
    pub fn last_explanation(&self) -> Option<&str> {
        self.last_explanation.as_deref()
    }

    /// Replace the content as an edit event. Returns the new generation.
    pub(crate) fn replace_content(&mut self, content: String) -> Generation {
        self.content = content;
        self.dirty = true;
        self.generation = self.generation.next();
        self.generation
    }

    pub(crate) fn propose(
        &mut self,
        edit: SuggestionEdit,
        reason: Option<String>,
        origin: Generation,
    ) -> SuggestionId {
        let id = SuggestionId::new(self.next_suggestion_id);
        self.next_suggestion_id += 1;
        self.pending_suggestion = Some(Suggestion::new(id, edit, reason, origin));
        id
    }

    fn pipeline_mut(&mut self, pipeline: Pipeline) -> &mut PipelineState {
        match pipeline {
            Pipeline::Analysis => &mut self.analysis,
            Pipeline::Suggestion => &mut self.suggestion,
        }
    }

    /// Common staleness guard for both pipelines.
    fn admit(&mut self, pipeline: Pipeline, generation: Generation) -> bool {
        let current = self.generation;
        let state = self.pipeline_mut(pipeline);
        if current == generation {
            *state = PipelineState::Idle;
            return true;
        }
        if *state == (PipelineState::Requesting { generation }) {
            *state = PipelineState::Idle;
        }
        false
    }
}

/// Ordered map of open documents plus the active-tab pointer.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: IndexMap<DocumentPath, DocumentSession>,
    active: Option<DocumentPath>,
    workspace_root: Option<PathBuf>,
    next_epoch: u64,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate `path`, creating its session from `initial_content` if it is
    /// not open yet. An existing session keeps its content. Returns whether a
    /// session was created.
    pub fn open_or_activate(&mut self, path: &DocumentPath, initial_content: &str) -> bool {
        self.active = Some(path.clone());
        if self.sessions.contains_key(path) {
            return false;
        }

        let epoch = SessionEpoch::new(self.next_epoch);
        self.next_epoch += 1;
        self.sessions.insert(
            path.clone(),
            DocumentSession::new(path.clone(), epoch, initial_content.to_string()),
        );
        tracing::info!(path = %path, epoch = epoch.value(), "Document opened");
        true
    }

    pub fn activate(&mut self, path: &DocumentPath) -> bool {
        if self.sessions.contains_key(path) {
            self.active = Some(path.clone());
            true
        } else {
            false
        }
    }

    /// Record an edit. Returns the new generation for tagging requests.
    pub fn apply_edit(
        &mut self,
        path: &DocumentPath,
        content: impl Into<String>,
    ) -> Option<Generation> {
        let session = self.sessions.get_mut(path)?;
        let generation = session.replace_content(content.into());
        tracing::trace!(path = %path, generation = generation.value(), "Edit applied");
        Some(generation)
    }

    /// Remove a session. If it was active, the tab before it (or the new
    /// first tab) becomes active.
    pub fn close(&mut self, path: &DocumentPath) -> Option<DocumentSession> {
        let index = self.sessions.get_index_of(path)?;
        let (_, session) = self.sessions.shift_remove_index(index)?;

        if self.active.as_ref() == Some(path) {
            self.active = self
                .sessions
                .get_index(index.saturating_sub(1))
                .map(|(next, _)| next.clone());
        }
        tracing::info!(path = %path, "Document closed");
        Some(session)
    }

    /// Apply an analysis response tagged with `generation`.
    ///
    /// A failure clears the diagnostics and the report so the error shows in
    /// their place.
    pub fn record_analysis_result(
        &mut self,
        path: &DocumentPath,
        generation: Generation,
        result: Result<FeedbackReport, SessionError>,
    ) -> RecordOutcome {
        let Some(session) = self.sessions.get_mut(path) else {
            tracing::debug!(path = %path, "Analysis response for closed document dropped");
            return RecordOutcome::NoSession;
        };
        if !session.admit(Pipeline::Analysis, generation) {
            tracing::debug!(
                path = %path,
                generation = generation.value(),
                current = session.generation.value(),
                "Stale analysis response dropped"
            );
            return RecordOutcome::Stale;
        }

        match result {
            Ok(report) => {
                session.diagnostics = report.diagnostics().to_vec();
                session.report = Some(report);
                session.report_generation = generation;
                session.analysis_error = None;
                RecordOutcome::Applied
            }
            Err(error) => {
                session.diagnostics.clear();
                session.report = None;
                session.analysis_error = Some(error);
                RecordOutcome::Failed
            }
        }
    }

    /// Apply a suggestion-pipeline response tagged with `generation`.
    ///
    /// A failure also clears the pending suggestion.
    pub fn record_suggestion_result(
        &mut self,
        path: &DocumentPath,
        generation: Generation,
        result: Result<SuggestionPayload, SessionError>,
    ) -> RecordOutcome {
        let Some(session) = self.sessions.get_mut(path) else {
            tracing::debug!(path = %path, "Suggestion response for closed document dropped");
            return RecordOutcome::NoSession;
        };
        if !session.admit(Pipeline::Suggestion, generation) {
            tracing::debug!(
                path = %path,
                generation = generation.value(),
                current = session.generation.value(),
                "Stale suggestion response dropped"
            );
            return RecordOutcome::Stale;
        }

        match result {
            Ok(payload) => {
                session.suggestion_error = None;
                match payload {
                    SuggestionPayload::Proposal { edit, reason } => {
                        session.propose(edit, reason, generation);
                        session.last_explanation = None;
                    }
                    SuggestionPayload::Explanation(text) => {
                        session.last_explanation = Some(text);
                    }
                    SuggestionPayload::Empty => {
                        session.pending_suggestion = None;
                    }
                }
                RecordOutcome::Applied
            }
            Err(error) => {
                session.pending_suggestion = None;
                session.suggestion_error = Some(error);
                RecordOutcome::Failed
            }
        }
    }

    pub fn mark_armed(&mut self, path: &DocumentPath, pipeline: Pipeline, generation: Generation) {
        if let Some(session) = self.sessions.get_mut(path) {
            *session.pipeline_mut(pipeline) = PipelineState::Editing { generation };
        }
    }

    pub fn mark_requesting(
        &mut self,
        path: &DocumentPath,
        pipeline: Pipeline,
        generation: Generation,
    ) {
        if let Some(session) = self.sessions.get_mut(path) {
            *session.pipeline_mut(pipeline) = PipelineState::Requesting { generation };
        }
    }

    /// Record `content` as persisted. The session stays dirty if it has been
    /// edited past what was written.
    pub fn mark_saved(&mut self, path: &DocumentPath, content: &str) {
        if let Some(session) = self.sessions.get_mut(path) {
            session.saved_content = content.to_string();
            session.dirty = session.content != session.saved_content;
        }
    }

    #[must_use]
    pub fn get(&self, path: &DocumentPath) -> Option<&DocumentSession> {
        self.sessions.get(path)
    }

    pub(crate) fn get_mut(&mut self, path: &DocumentPath) -> Option<&mut DocumentSession> {
        self.sessions.get_mut(path)
    }

    #[must_use]
    pub fn active_path(&self) -> Option<&DocumentPath> {
        self.active.as_ref()
    }

    #[must_use]
    pub fn active(&self) -> Option<&DocumentSession> {
        self.active.as_ref().and_then(|path| self.sessions.get(path))
    }

    #[must_use]
    pub fn is_active(&self, path: &DocumentPath) -> bool {
        self.active.as_ref() == Some(path)
    }

    /// Open paths in tab order.
    pub fn paths(&self) -> impl Iterator<Item = &DocumentPath> {
        self.sessions.keys()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[must_use]
    pub fn workspace_root(&self) -> Option<&Path> {
        self.workspace_root.as_deref()
    }

    pub fn set_workspace_root(&mut self, root: impl Into<PathBuf>) {
        self.workspace_root = Some(root.into());
    }
}

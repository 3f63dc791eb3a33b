//! The feedback engine: edits in, diagnostics and suggestions out.
//!
//! Spawned tasks (debounce timers and assistant calls) never touch session
//! state. They post [`EngineEvent`]s to a channel, and only the task that
//! drains it ([`FeedbackEngine::poll_events`] or
//! [`FeedbackEngine::next_event`] + [`FeedbackEngine::handle_event`]) mutates
//! the store and the surface. Every event carries the `(epoch, generation)`
//! it was issued for, so anything that outlived its content or its session
//! is dropped on arrival.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use onpoint_gateway::{
    ANALYZE_ENDPOINT, AnalysisResult, Assistant, CHECK_ENDPOINT, CheckResult, GatewayError,
    SUGGEST_ENDPOINT, SuggestResult,
};
use onpoint_types::{
    AnalysisKind, DocumentPath, Generation, Language, Pipeline, Selection, SessionEpoch,
    SessionError, SuggestionEdit, SuggestionId,
};
use tokio::sync::mpsc;

use crate::debounce::Debouncer;
use crate::markers::MarkerSynchronizer;
use crate::parse::parse_report;
use crate::session::{DocumentSession, RecordOutcome, SessionStore, SuggestionPayload};
use crate::suggestion::{self, AcceptOutcome, SelectionAction};
use crate::surface::EditorSurface;
use crate::workspace::{Workspace, WorkspaceError};

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Events handled per [`FeedbackEngine::poll_events`] call by hosts that
/// drain on a UI tick.
pub const DEFAULT_EVENT_BUDGET: usize = 32;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Quiet period after the last edit before a request goes out.
    pub debounce: Duration,
    pub auto_analyze: bool,
    pub auto_suggest: bool,
    /// Bound on a whole assistant call; expiry counts as a network failure.
    pub request_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            auto_analyze: true,
            auto_suggest: true,
            request_timeout: onpoint_gateway::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug)]
pub enum EngineEvent {
    DebounceElapsed {
        path: DocumentPath,
        epoch: SessionEpoch,
        pipeline: Pipeline,
        generation: Generation,
    },
    AnalysisFinished {
        path: DocumentPath,
        epoch: SessionEpoch,
        generation: Generation,
        kind: AnalysisKind,
        result: Result<String, GatewayError>,
    },
    SuggestionFinished {
        path: DocumentPath,
        epoch: SessionEpoch,
        generation: Generation,
        result: Result<String, GatewayError>,
    },
    SelectionActionFinished {
        path: DocumentPath,
        epoch: SessionEpoch,
        generation: Generation,
        action: SelectionAction,
        range: Selection,
        result: Result<String, GatewayError>,
    },
    /// Completion for the text before the caret at `offset`.
    CompletionFinished {
        path: DocumentPath,
        epoch: SessionEpoch,
        generation: Generation,
        offset: usize,
        result: Result<String, GatewayError>,
    },
}

/// What handling one event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// A debounce timer fired and a request went out.
    Dispatched {
        path: DocumentPath,
        pipeline: Pipeline,
    },
    /// A response arrived.
    Recorded {
        path: DocumentPath,
        pipeline: Pipeline,
        outcome: RecordOutcome,
    },
    /// Timer for a closed document or superseded content.
    Ignored,
}

type TimerKey = (DocumentPath, Pipeline);

pub struct FeedbackEngine<A, S> {
    assistant: Arc<A>,
    store: SessionStore,
    debouncer: Debouncer<TimerKey>,
    markers: MarkerSynchronizer,
    surface: S,
    options: EngineOptions,
    event_rx: mpsc::Receiver<EngineEvent>,
    event_tx: mpsc::Sender<EngineEvent>,
}

impl<A, S> FeedbackEngine<A, S>
where
    A: Assistant,
    S: EditorSurface,
{
    #[must_use]
    pub fn new(assistant: Arc<A>, surface: S, options: EngineOptions) -> Self {
        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            assistant,
            store: SessionStore::new(),
            debouncer: Debouncer::new(),
            markers: MarkerSynchronizer::new(),
            surface,
            options,
            event_rx,
            event_tx,
        }
    }

    // ------------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------------

    /// Open `path` (or activate it if already open) and show it.
    pub fn open_document(&mut self, path: &DocumentPath, content: &str) -> bool {
        let created = self.store.open_or_activate(path, content);
        self.project_active();
        created
    }

    pub fn activate(&mut self, path: &DocumentPath) -> bool {
        if !self.store.activate(path) {
            return false;
        }
        self.project_active();
        true
    }

    /// Record an edit from the host and arm the debounce timers.
    pub fn on_content_change(
        &mut self,
        path: &DocumentPath,
        content: impl Into<String>,
    ) -> Option<Generation> {
        let generation = self.store.apply_edit(path, content)?;
        if self.options.auto_analyze {
            self.arm(path, Pipeline::Analysis, generation);
        }
        if self.options.auto_suggest {
            self.arm(path, Pipeline::Suggestion, generation);
        }
        Some(generation)
    }

    /// Close `path`. Responses still in flight for it are dropped on arrival.
    pub fn close_document(&mut self, path: &DocumentPath) -> bool {
        self.debouncer.cancel(&(path.clone(), Pipeline::Analysis));
        self.debouncer.cancel(&(path.clone(), Pipeline::Suggestion));

        let was_active = self.store.is_active(path);
        if self.store.close(path).is_none() {
            return false;
        }
        if was_active {
            self.project_active();
        }
        true
    }

    /// Persist the session content. Returns `false` if `path` is not open.
    pub fn save_document(
        &mut self,
        path: &DocumentPath,
        workspace: &Workspace,
    ) -> Result<bool, WorkspaceError> {
        let Some(session) = self.store.get(path) else {
            return Ok(false);
        };
        let content = session.content().to_string();
        workspace.write(path.as_str(), &content)?;
        self.store.mark_saved(path, &content);
        Ok(true)
    }

    // ------------------------------------------------------------------------
    // Explicit requests
    // ------------------------------------------------------------------------

    /// Run an analysis now, superseding any armed timer.
    pub fn request_analysis(&mut self, path: &DocumentPath, kind: AnalysisKind) -> bool {
        self.debouncer.cancel(&(path.clone(), Pipeline::Analysis));
        self.dispatch_analysis(path, kind)
    }

    pub fn request_suggestion(&mut self, path: &DocumentPath) -> bool {
        self.debouncer.cancel(&(path.clone(), Pipeline::Suggestion));
        self.dispatch_suggestion(path)
    }

    /// Send the surface selection of the active document to the assistant.
    ///
    /// Ignored when `path` is not active or the selection is blank.
    pub fn request_selection_action(
        &mut self,
        path: &DocumentPath,
        action: SelectionAction,
    ) -> bool {
        if !self.store.is_active(path) {
            return false;
        }
        let Some(session) = self.store.get(path) else {
            return false;
        };
        let Some(range) = self.surface.selection() else {
            return false;
        };
        let Ok(selected) = range.text_in(session.content()) else {
            tracing::debug!(path = %path, "Selection does not fit the document");
            return false;
        };
        if selected.trim().is_empty() {
            return false;
        }

        let code = selected.to_string();
        let (epoch, generation, language) =
            (session.epoch(), session.generation(), session.language());
        self.debouncer.cancel(&(path.clone(), Pipeline::Suggestion));
        self.store
            .mark_requesting(path, Pipeline::Suggestion, generation);
        tracing::debug!(path = %path, action = action.as_str(), "Selection action dispatched");

        let assistant = Arc::clone(&self.assistant);
        let path = path.clone();
        let kind = action.analysis_kind();
        let timeout = self.options.request_timeout;
        self.spawn_request(async move {
            let result = call_analysis(&*assistant, kind, code, language, timeout).await;
            EngineEvent::SelectionActionFinished {
                path,
                epoch,
                generation,
                action,
                range,
                result,
            }
        });
        true
    }

    /// Ask for a completion at the caret of the active document.
    ///
    /// Only the text before the caret is sent. With a range selected, the
    /// caret is the end of the range.
    pub fn request_completion(&mut self, path: &DocumentPath) -> bool {
        if !self.store.is_active(path) {
            return false;
        }
        let Some(session) = self.store.get(path) else {
            return false;
        };
        let Some(offset) = self.surface.selection().map(|selection| selection.end()) else {
            return false;
        };
        let Ok(prefix) = Selection::new(0, offset).text_in(session.content()) else {
            tracing::debug!(path = %path, offset, "Caret does not fit the document");
            return false;
        };

        let code = prefix.to_string();
        let (epoch, generation, language) =
            (session.epoch(), session.generation(), session.language());
        self.debouncer.cancel(&(path.clone(), Pipeline::Suggestion));
        self.store
            .mark_requesting(path, Pipeline::Suggestion, generation);
        tracing::debug!(path = %path, offset, "Completion dispatched");

        let assistant = Arc::clone(&self.assistant);
        let path = path.clone();
        let timeout = self.options.request_timeout;
        self.spawn_request(async move {
            let result = call_suggest(&*assistant, code, language, timeout).await;
            EngineEvent::CompletionFinished {
                path,
                epoch,
                generation,
                offset,
                result,
            }
        });
        true
    }

    // ------------------------------------------------------------------------
    // Suggestions
    // ------------------------------------------------------------------------

    /// Apply the pending suggestion `id`. Accepting is an edit: the
    /// generation advances and analysis is re-armed for the new content.
    pub fn accept_suggestion(&mut self, path: &DocumentPath, id: SuggestionId) -> AcceptOutcome {
        let Some(session) = self.store.get_mut(path) else {
            return AcceptOutcome::NotPending;
        };
        let outcome = suggestion::accept(session, id);
        if let AcceptOutcome::Applied { generation, edit } = &outcome {
            if self.store.is_active(path)
                && let Some(session) = self.store.get(path)
            {
                let in_place = match edit {
                    SuggestionEdit::ReplaceRange { range, text } => Some((*range, text)),
                    SuggestionEdit::InsertAt { offset, text } => {
                        Some((Selection::caret(*offset), text))
                    }
                    SuggestionEdit::Append { .. } | SuggestionEdit::ReplaceDocument { .. } => None,
                };
                if let Some((range, text)) = in_place
                    && let Err(err) = self.surface.execute_edit(range, text)
                {
                    tracing::debug!(path = %path, "In-place edit failed, pushing content: {err}");
                }
                self.markers.push_content(session, &mut self.surface);
            }
            if self.options.auto_analyze {
                self.arm(path, Pipeline::Analysis, *generation);
            }
        }
        outcome
    }

    pub fn reject_suggestion(&mut self, path: &DocumentPath, id: SuggestionId) -> bool {
        self.store
            .get_mut(path)
            .is_some_and(|session| suggestion::reject(session, id))
    }

    /// Offer the current report's fix as a whole-document suggestion.
    pub fn propose_document_fix(&mut self, path: &DocumentPath) -> Option<SuggestionId> {
        suggestion::propose_document_fix(self.store.get_mut(path)?)
    }

    // ------------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------------

    /// Drain up to `budget` pending events without waiting.
    pub fn poll_events(&mut self, budget: usize) -> usize {
        let mut count = 0;
        while count < budget {
            match self.event_rx.try_recv() {
                Ok(event) => {
                    self.handle_event(event);
                    count += 1;
                }
                Err(mpsc::error::TryRecvError::Empty | mpsc::error::TryRecvError::Disconnected) => {
                    break;
                }
            }
        }
        count
    }

    /// Wait for the next event. The engine holds a sender, so this only
    /// returns `None` if the channel is closed from outside.
    pub async fn next_event(&mut self) -> Option<EngineEvent> {
        self.event_rx.recv().await
    }

    pub fn handle_event(&mut self, event: EngineEvent) -> EventOutcome {
        match event {
            EngineEvent::DebounceElapsed {
                path,
                epoch,
                pipeline,
                generation,
            } => {
                let current = self
                    .session_for(&path, epoch)
                    .is_some_and(|session| session.generation() == generation);
                if !current {
                    return EventOutcome::Ignored;
                }
                let dispatched = match pipeline {
                    Pipeline::Analysis => self.dispatch_analysis(&path, AnalysisKind::Analyze),
                    Pipeline::Suggestion => self.dispatch_suggestion(&path),
                };
                if dispatched {
                    EventOutcome::Dispatched { path, pipeline }
                } else {
                    EventOutcome::Ignored
                }
            }
            EngineEvent::AnalysisFinished {
                path,
                epoch,
                generation,
                kind,
                result,
            } => {
                let outcome = if self.session_for(&path, epoch).is_some() {
                    let result = result
                        .map(|text| parse_report(kind, text))
                        .map_err(|err| {
                            tracing::warn!(path = %path, "Analysis request failed: {err}");
                            SessionError::analysis(kind, err.failure_kind(), err.to_string())
                        });
                    self.store.record_analysis_result(&path, generation, result)
                } else {
                    RecordOutcome::NoSession
                };
                // Markers are cleared on dispatch. A stale response leaves the
                // diagnostics as they were, so they are shown again unless a
                // newer request is still in flight.
                let resync = match outcome {
                    RecordOutcome::Applied | RecordOutcome::Failed => true,
                    RecordOutcome::Stale => self
                        .store
                        .get(&path)
                        .is_some_and(|session| !session.is_loading_analysis()),
                    RecordOutcome::NoSession => false,
                };
                if resync && self.store.is_active(&path) {
                    self.sync_markers(&path);
                }
                EventOutcome::Recorded {
                    path,
                    pipeline: Pipeline::Analysis,
                    outcome,
                }
            }
            EngineEvent::SuggestionFinished {
                path,
                epoch,
                generation,
                result,
            } => {
                let payload = result.map(|text| {
                    if text.trim().is_empty() {
                        SuggestionPayload::Empty
                    } else {
                        SuggestionPayload::Proposal {
                            edit: SuggestionEdit::Append { text },
                            reason: None,
                        }
                    }
                });
                self.record_suggestion(path, epoch, generation, payload)
            }
            EngineEvent::SelectionActionFinished {
                path,
                epoch,
                generation,
                action,
                range,
                result,
            } => {
                tracing::debug!(path = %path, action = action.as_str(), "Selection action answered");
                let payload = result.map(|text| suggestion::selection_payload(range, text));
                self.record_suggestion(path, epoch, generation, payload)
            }
            EngineEvent::CompletionFinished {
                path,
                epoch,
                generation,
                offset,
                result,
            } => {
                let payload = result.map(|text| suggestion::completion_payload(offset, text));
                self.record_suggestion(path, epoch, generation, payload)
            }
        }
    }

    /// Cancel every armed timer. In-flight requests finish but are never
    /// handled unless the host keeps draining events.
    pub fn shutdown(&mut self) {
        self.debouncer.cancel_all();
        tracing::debug!("Feedback engine shut down");
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn session(&self, path: &DocumentPath) -> Option<&DocumentSession> {
        self.store.get(path)
    }

    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }

    /// Direct access for the host (selection changes, user typing). Edits
    /// made here must be reported through [`Self::on_content_change`].
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    #[must_use]
    pub fn markers(&self) -> &MarkerSynchronizer {
        &self.markers
    }

    #[must_use]
    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    #[must_use]
    pub fn assistant(&self) -> &Arc<A> {
        &self.assistant
    }

    #[must_use]
    pub fn is_armed(&self, path: &DocumentPath, pipeline: Pipeline) -> bool {
        self.debouncer.is_armed(&(path.clone(), pipeline))
    }

    #[cfg(test)]
    pub(crate) fn event_tx(&self) -> &mpsc::Sender<EngineEvent> {
        &self.event_tx
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn session_for(&self, path: &DocumentPath, epoch: SessionEpoch) -> Option<&DocumentSession> {
        self.store
            .get(path)
            .filter(|session| session.epoch() == epoch)
    }

    fn arm(&mut self, path: &DocumentPath, pipeline: Pipeline, generation: Generation) {
        let Some(epoch) = self.store.get(path).map(DocumentSession::epoch) else {
            return;
        };
        self.store.mark_armed(path, pipeline, generation);

        let tx = self.event_tx.clone();
        let event = EngineEvent::DebounceElapsed {
            path: path.clone(),
            epoch,
            pipeline,
            generation,
        };
        self.debouncer
            .schedule((path.clone(), pipeline), self.options.debounce, async move {
                if tx.send(event).await.is_err() {
                    tracing::debug!("Engine dropped before debounce fired");
                }
            });
    }

    fn dispatch_analysis(&mut self, path: &DocumentPath, kind: AnalysisKind) -> bool {
        let Some(session) = self.store.get(path) else {
            return false;
        };
        let code = session.content().to_string();
        let (epoch, generation, language) =
            (session.epoch(), session.generation(), session.language());

        if self.store.is_active(path) {
            self.markers.clear(&mut self.surface);
        }
        self.store.mark_requesting(path, Pipeline::Analysis, generation);
        tracing::debug!(
            path = %path,
            generation = generation.value(),
            kind = kind.as_str(),
            "Analysis dispatched"
        );

        let assistant = Arc::clone(&self.assistant);
        let path = path.clone();
        let timeout = self.options.request_timeout;
        self.spawn_request(async move {
            let result = call_analysis(&*assistant, kind, code, language, timeout).await;
            EngineEvent::AnalysisFinished {
                path,
                epoch,
                generation,
                kind,
                result,
            }
        });
        true
    }

    fn dispatch_suggestion(&mut self, path: &DocumentPath) -> bool {
        let Some(session) = self.store.get(path) else {
            return false;
        };
        let code = session.content().to_string();
        let (epoch, generation, language) =
            (session.epoch(), session.generation(), session.language());
        self.store
            .mark_requesting(path, Pipeline::Suggestion, generation);
        tracing::debug!(path = %path, generation = generation.value(), "Suggestion dispatched");

        let assistant = Arc::clone(&self.assistant);
        let path = path.clone();
        let timeout = self.options.request_timeout;
        self.spawn_request(async move {
            let result = call_suggest(&*assistant, code, language, timeout).await;
            EngineEvent::SuggestionFinished {
                path,
                epoch,
                generation,
                result,
            }
        });
        true
    }

    fn spawn_request<F>(&self, request: F)
    where
        F: Future<Output = EngineEvent> + Send + 'static,
    {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let event = request.await;
            if tx.send(event).await.is_err() {
                tracing::debug!("Engine dropped before response arrived");
            }
        });
    }

    fn record_suggestion(
        &mut self,
        path: DocumentPath,
        epoch: SessionEpoch,
        generation: Generation,
        payload: Result<SuggestionPayload, GatewayError>,
    ) -> EventOutcome {
        let outcome = if self.session_for(&path, epoch).is_some() {
            let payload = payload.map_err(|err| {
                tracing::warn!(path = %path, "Suggestion request failed: {err}");
                SessionError::suggestion(err.failure_kind(), err.to_string())
            });
            self.store
                .record_suggestion_result(&path, generation, payload)
        } else {
            RecordOutcome::NoSession
        };
        EventOutcome::Recorded {
            path,
            pipeline: Pipeline::Suggestion,
            outcome,
        }
    }

    fn sync_markers(&mut self, path: &DocumentPath) {
        if let Some(session) = self.store.get(path) {
            self.markers.sync(session, &mut self.surface);
        }
    }

    /// Show the active document, or clear the surface if none is open.
    fn project_active(&mut self) {
        match self.store.active() {
            Some(session) => {
                self.markers.push_content(session, &mut self.surface);
                self.markers.sync(session, &mut self.surface);
            }
            None => {
                self.markers.clear(&mut self.surface);
                self.surface.set_value(String::new());
            }
        }
    }
}

async fn call_analysis<A: Assistant>(
    assistant: &A,
    kind: AnalysisKind,
    code: String,
    language: Language,
    timeout: Duration,
) -> Result<String, GatewayError> {
    match kind {
        AnalysisKind::Analyze => {
            let call = async {
                assistant
                    .analyze(&code, language)
                    .await
                    .map(AnalysisResult::into_text)
            };
            bounded(timeout, ANALYZE_ENDPOINT, call).await
        }
        AnalysisKind::Check => {
            let call = async {
                assistant
                    .check(&code, language)
                    .await
                    .map(CheckResult::into_text)
            };
            bounded(timeout, CHECK_ENDPOINT, call).await
        }
    }
}

async fn call_suggest<A: Assistant>(
    assistant: &A,
    code: String,
    language: Language,
    timeout: Duration,
) -> Result<String, GatewayError> {
    let call = async {
        assistant
            .suggest(&code, language)
            .await
            .map(SuggestResult::into_text)
    };
    bounded(timeout, SUGGEST_ENDPOINT, call).await
}

async fn bounded<T>(
    limit: Duration,
    endpoint: &'static str,
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or_else(|_| Err(GatewayError::timeout(endpoint)))
}

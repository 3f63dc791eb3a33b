//! Accept/reject semantics for pending suggestions.
//!
//! Both operations name the suggestion they act on. If that suggestion is no
//! longer the pending one (it was superseded, accepted, or rejected), the
//! call does nothing.

use onpoint_types::{AnalysisKind, Generation, Selection, SuggestionEdit, SuggestionId};
use onpoint_utils::unified_diff;

use crate::parse::extract_fix;
use crate::session::{DocumentSession, SuggestionPayload};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcceptOutcome {
    /// Content changed; `generation` is the session's new generation.
    Applied {
        generation: Generation,
        edit: SuggestionEdit,
    },
    /// A positional or whole-document edit was computed from content that has
    /// since changed. The suggestion was dropped and the content left alone.
    Conflict,
    /// No pending suggestion with that id.
    NotPending,
}

/// Editor context-menu actions on the current selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectionAction {
    Explain,
    Fix,
}

impl SelectionAction {
    /// Endpoint the selected text is sent to.
    #[must_use]
    pub fn analysis_kind(self) -> AnalysisKind {
        match self {
            Self::Explain => AnalysisKind::Analyze,
            Self::Fix => AnalysisKind::Check,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Explain => "explain",
            Self::Fix => "fix",
        }
    }
}

/// Merge the pending suggestion `id` into the session content.
pub fn accept(session: &mut DocumentSession, id: SuggestionId) -> AcceptOutcome {
    if session
        .pending_suggestion
        .as_ref()
        .is_none_or(|pending| pending.id() != id)
    {
        return AcceptOutcome::NotPending;
    }
    let Some(suggestion) = session.pending_suggestion.take() else {
        return AcceptOutcome::NotPending;
    };

    let content = match suggestion.edit() {
        SuggestionEdit::Append { text } => format!("{}\n{text}", session.content),
        edit if session.generation != suggestion.origin() => {
            tracing::debug!(
                path = %session.path(),
                suggestion = %id,
                kind = edit.kind_label(),
                "Suggestion conflicts with later edits"
            );
            return AcceptOutcome::Conflict;
        }
        SuggestionEdit::ReplaceRange { range, text } => {
            let Some(content) = splice(session, id, *range, text) else {
                return AcceptOutcome::Conflict;
            };
            content
        }
        SuggestionEdit::InsertAt { offset, text } => {
            let Some(content) = splice(session, id, Selection::caret(*offset), text) else {
                return AcceptOutcome::Conflict;
            };
            content
        }
        SuggestionEdit::ReplaceDocument { text, .. } => text.clone(),
    };

    let generation = session.replace_content(content);
    AcceptOutcome::Applied {
        generation,
        edit: suggestion.edit().clone(),
    }
}

fn splice(
    session: &DocumentSession,
    id: SuggestionId,
    range: Selection,
    text: &str,
) -> Option<String> {
    range
        .replace_in(&session.content, text)
        .map_err(|err| {
            tracing::debug!(path = %session.path(), suggestion = %id, "Edit rejected: {err}");
        })
        .ok()
}

/// Drop the pending suggestion `id`. Returns whether anything was dropped.
pub fn reject(session: &mut DocumentSession, id: SuggestionId) -> bool {
    if session
        .pending_suggestion
        .as_ref()
        .is_some_and(|pending| pending.id() == id)
    {
        session.pending_suggestion = None;
        true
    } else {
        false
    }
}

/// Interpret a selection-action response.
///
/// A fenced fix becomes a range replacement over `range`, with the full
/// response as its reason. Otherwise the response is an explanation.
#[must_use]
pub fn selection_payload(range: Selection, response: String) -> SuggestionPayload {
    if response.trim().is_empty() {
        return SuggestionPayload::Empty;
    }
    match extract_fix(&response) {
        Some(fix) => SuggestionPayload::Proposal {
            edit: SuggestionEdit::ReplaceRange {
                range,
                text: fix.to_string(),
            },
            reason: Some(response.clone()),
        },
        None => SuggestionPayload::Explanation(response),
    }
}

/// Interpret a completion response for the caret at `offset`.
#[must_use]
pub fn completion_payload(offset: usize, response: String) -> SuggestionPayload {
    if response.trim().is_empty() {
        return SuggestionPayload::Empty;
    }
    SuggestionPayload::Proposal {
        edit: SuggestionEdit::InsertAt {
            offset,
            text: response,
        },
        reason: None,
    }
}

/// Turn the current report's fix into a whole-document suggestion.
///
/// Returns `None` when there is no fix or the report predates the content.
pub fn propose_document_fix(session: &mut DocumentSession) -> Option<SuggestionId> {
    if !session.report_is_current() {
        return None;
    }
    let report = session.report()?;
    let fix = report.fix()?.to_string();
    let reason = Some(report.text().to_string());
    let diff = unified_diff(session.path().file_name(), session.content(), &fix);
    let origin = session.generation();
    Some(session.propose(
        SuggestionEdit::ReplaceDocument { text: fix, diff },
        reason,
        origin,
    ))
}

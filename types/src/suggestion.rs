//! Proposed edits awaiting accept/reject.

use serde::{Deserialize, Serialize};

use crate::{Generation, Selection, SuggestionId};

/// How a suggestion changes the document when accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SuggestionEdit {
    /// Whole-suggestion completion, appended as a new trailing segment.
    Append { text: String },
    /// Range-scoped fix over the selection active when it was requested.
    ReplaceRange { range: Selection, text: String },
    /// Completion inserted at the byte offset of the caret it was requested at.
    InsertAt { offset: usize, text: String },
    /// Full-document fix. `diff` is a unified diff for review.
    ReplaceDocument { text: String, diff: String },
}

impl SuggestionEdit {
    /// The proposed text, regardless of edit kind.
    #[must_use]
    pub fn text(&self) -> &str {
        match self {
            Self::Append { text }
            | Self::ReplaceRange { text, .. }
            | Self::InsertAt { text, .. }
            | Self::ReplaceDocument { text, .. } => text,
        }
    }

    #[must_use]
    pub fn kind_label(&self) -> &'static str {
        match self {
            Self::Append { .. } => "append",
            Self::ReplaceRange { .. } => "replace-range",
            Self::InsertAt { .. } => "insert",
            Self::ReplaceDocument { .. } => "replace-document",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    id: SuggestionId,
    edit: SuggestionEdit,
    reason: Option<String>,
    origin: Generation,
}

impl Suggestion {
    #[must_use]
    pub fn new(
        id: SuggestionId,
        edit: SuggestionEdit,
        reason: Option<String>,
        origin: Generation,
    ) -> Self {
        Self {
            id,
            edit,
            reason,
            origin,
        }
    }

    #[must_use]
    pub fn id(&self) -> SuggestionId {
        self.id
    }

    #[must_use]
    pub fn edit(&self) -> &SuggestionEdit {
        &self.edit
    }

    #[must_use]
    pub fn text(&self) -> &str {
        self.edit.text()
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    /// Generation of the document when the suggestion was requested.
    #[must_use]
    pub fn origin(&self) -> Generation {
        self.origin
    }
}

//! Core domain types for Onpoint.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies.
//! Everything here can be used from any layer of the application.

#![allow(clippy::missing_errors_doc)]

mod chat;
mod diagnostic;
mod ids;
mod selection;
mod suggestion;

pub use chat::{ChatMessage, ChatRole};
pub use diagnostic::{DEFAULT_CATEGORY, Diagnostic, InvalidDiagnostic};
pub use ids::{Generation, SessionEpoch, SuggestionId};
pub use selection::{Selection, SelectionError};
pub use suggestion::{Suggestion, SuggestionEdit};

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Document identity
// ============================================================================

/// Identifier of an open document (its workspace-relative path).
///
/// Stable for as long as the tab is open; used as the session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentPath(String);

impl DocumentPath {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final path component, used as the tab label.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.0
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.0)
    }

    /// Extension of the final component, without the dot.
    #[must_use]
    pub fn extension(&self) -> Option<&str> {
        let name = self.file_name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            None
        } else {
            Some(ext)
        }
    }
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentPath {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentPath {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for DocumentPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// Language
// ============================================================================

/// Language id sent to the assistant alongside code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Rust,
    Go,
    Java,
    C,
    Cpp,
    Json,
    Markdown,
    Html,
    Css,
    Shell,
    #[default]
    PlainText,
}

impl Language {
    #[must_use]
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyi" => Self::Python,
            "js" | "jsx" | "mjs" | "cjs" => Self::JavaScript,
            "ts" | "tsx" => Self::TypeScript,
            "rs" => Self::Rust,
            "go" => Self::Go,
            "java" => Self::Java,
            "c" | "h" => Self::C,
            "cpp" | "cc" | "cxx" | "hpp" => Self::Cpp,
            "json" => Self::Json,
            "md" | "markdown" => Self::Markdown,
            "html" | "htm" => Self::Html,
            "css" => Self::Css,
            "sh" | "bash" => Self::Shell,
            _ => Self::PlainText,
        }
    }

    #[must_use]
    pub fn from_path(path: &DocumentPath) -> Self {
        path.extension()
            .map_or(Self::PlainText, Self::from_extension)
    }

    /// The id the assistant expects (editor language ids).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Python => "python",
            Self::JavaScript => "javascript",
            Self::TypeScript => "typescript",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Java => "java",
            Self::C => "c",
            Self::Cpp => "cpp",
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Html => "html",
            Self::Css => "css",
            Self::Shell => "shell",
            Self::PlainText => "plaintext",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Pipelines and failures
// ============================================================================

/// The two independent request pipelines of a document session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pipeline {
    Analysis,
    Suggestion,
}

impl Pipeline {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Suggestion => "suggestion",
        }
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which assistant endpoint produced diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisKind {
    /// `/analyze`: unfinished code, missing imports, proposed code.
    #[default]
    Analyze,
    /// `/check`: correctness, syntax and style problems.
    Check,
}

impl AnalysisKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Check => "check",
        }
    }
}

/// Transport-level failure class, mirrored from the gateway error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Network,
    Server { status: u16 },
    Decode,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network error"),
            Self::Server { status } => write!(f, "server error (HTTP {status})"),
            Self::Decode => f.write_str("malformed response"),
        }
    }
}

/// Error descriptor stored on a session when a request fails.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionError {
    pipeline: Pipeline,
    analysis: AnalysisKind,
    kind: FailureKind,
    detail: String,
}

impl SessionError {
    #[must_use]
    pub fn analysis(analysis: AnalysisKind, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            pipeline: Pipeline::Analysis,
            analysis,
            kind,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn suggestion(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            pipeline: Pipeline::Suggestion,
            analysis: AnalysisKind::default(),
            kind,
            detail: detail.into(),
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> Pipeline {
        self.pipeline
    }

    #[must_use]
    pub fn kind(&self) -> FailureKind {
        self.kind
    }

    /// Underlying error text, for logs and tooltips.
    #[must_use]
    pub fn detail(&self) -> &str {
        &self.detail
    }

    /// Generic message shown in place of results.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match (self.pipeline, self.analysis) {
            (Pipeline::Analysis, AnalysisKind::Analyze) => "Error analyzing code.",
            (Pipeline::Analysis, AnalysisKind::Check) => "Error checking code.",
            (Pipeline::Suggestion, _) => "AI analysis failed.",
        }
    }
}

//! Line-addressed diagnostics derived from assistant text.

use std::fmt;
use std::num::NonZeroU32;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Category used when the assistant text does not name one.
pub const DEFAULT_CATEGORY: &str = "General";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidDiagnostic {
    #[error("diagnostic line numbers are 1-based, got 0")]
    ZeroLine,
    #[error("diagnostic message must not be empty")]
    EmptyMessage,
}

/// A single issue reported against one line of a document.
///
/// Fields are private so the 1-based line invariant holds after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Diagnostic {
    line_number: NonZeroU32,
    category: String,
    message: String,
}

impl Diagnostic {
    /// Build a diagnostic. A missing or blank category becomes
    /// [`DEFAULT_CATEGORY`].
    pub fn new(
        line_number: u32,
        category: Option<&str>,
        message: impl Into<String>,
    ) -> Result<Self, InvalidDiagnostic> {
        let line_number = NonZeroU32::new(line_number).ok_or(InvalidDiagnostic::ZeroLine)?;
        let message = message.into();
        if message.trim().is_empty() {
            return Err(InvalidDiagnostic::EmptyMessage);
        }
        let category = category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string();
        Ok(Self {
            line_number,
            category,
            message,
        })
    }

    /// 1-based line number.
    #[must_use]
    pub fn line_number(&self) -> u32 {
        self.line_number.get()
    }

    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Text shown on the editor marker: `[Category] message`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("[{}] {}", self.category, self.message)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Line {} [{}]: {}",
            self.line_number, self.category, self.message
        )
    }
}

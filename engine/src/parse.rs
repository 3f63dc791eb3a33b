//! Conversion of free-form assistant text into diagnostics and fixes.
//!
//! The assistant is asked to report problems as `Line <N> [<Category>]: <Message>`
//! and to put proposed code in a fenced block. Neither is guaranteed: text
//! that follows neither convention yields no diagnostics and no fix, and that
//! is treated as "nothing to report" rather than an error.

use std::sync::LazyLock;

use onpoint_types::{AnalysisKind, Diagnostic};
use regex::Regex;

static DIAGNOSTIC_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Line (\d+)(?: \[(\w+)\])?: (.+)").expect("diagnostic pattern is valid")
});

const FENCE: &str = "```";

/// Parse every line matching the diagnostic convention, in input order.
///
/// Duplicates are kept. Lines whose number is zero or does not fit in `u32`
/// are skipped along with non-matching lines.
#[must_use]
pub fn parse_diagnostics(text: &str) -> Vec<Diagnostic> {
    text.lines()
        .filter_map(|line| {
            let caps = DIAGNOSTIC_LINE.captures(line)?;
            let number = caps.get(1)?.as_str().parse::<u32>().ok()?;
            let category = caps.get(2).map(|m| m.as_str());
            let message = caps.get(3)?.as_str();
            Diagnostic::new(number, category, message).ok()
        })
        .collect()
}

/// Interior of the first fenced code block, byte for byte.
///
/// The opening fence is a line starting with three backticks, optionally
/// followed by a language tag. The interior runs from just after that line's
/// newline up to the start of the next line that begins with a fence. A block
/// that is never closed yields `None`.
#[must_use]
pub fn extract_fix(text: &str) -> Option<&str> {
    let mut offset = 0;
    let mut interior_start: Option<usize> = None;

    for line in text.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\n', '\r']).trim_start();
        match interior_start {
            None => {
                if line.ends_with('\n')
                    && let Some(tag) = bare.strip_prefix(FENCE)
                    && is_language_tag(tag)
                {
                    interior_start = Some(offset + line.len());
                }
            }
            Some(start) => {
                if bare.starts_with(FENCE) {
                    return Some(&text[start..offset]);
                }
            }
        }
        offset += line.len();
    }

    None
}

fn is_language_tag(tag: &str) -> bool {
    tag.trim()
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '+' | '#' | '.'))
}

/// Everything the engine keeps from one accepted analysis response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackReport {
    kind: AnalysisKind,
    text: String,
    diagnostics: Vec<Diagnostic>,
    fix: Option<String>,
}

impl FeedbackReport {
    /// Which endpoint produced the report.
    #[must_use]
    pub fn kind(&self) -> AnalysisKind {
        self.kind
    }

    /// Raw assistant text, as shown in the feedback panel.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    #[must_use]
    pub fn fix(&self) -> Option<&str> {
        self.fix.as_deref()
    }
}

#[must_use]
pub fn parse_report(kind: AnalysisKind, text: String) -> FeedbackReport {
    let diagnostics = parse_diagnostics(&text);
    let fix = extract_fix(&text).map(str::to_owned);
    FeedbackReport {
        kind,
        text,
        diagnostics,
        fix,
    }
}

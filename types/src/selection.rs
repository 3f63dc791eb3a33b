use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("selection {start}..{end} exceeds document length {len}")]
    OutOfBounds { start: usize, end: usize, len: usize },
    #[error("selection offset {offset} is not on a character boundary")]
    NotCharBoundary { offset: usize },
}

/// A byte range in a document, as reported by the editor selection.
///
/// The range is normalised on construction (`start <= end`), so a
/// backwards selection (anchor after cursor) describes the same span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    start: usize,
    end: usize,
}

impl Selection {
    #[must_use]
    pub fn new(anchor: usize, head: usize) -> Self {
        Self {
            start: anchor.min(head),
            end: anchor.max(head),
        }
    }

    /// A caret with no extent.
    #[must_use]
    pub fn caret(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check the selection against `content` and return it as a byte range.
    pub fn range_in(&self, content: &str) -> Result<Range<usize>, SelectionError> {
        if self.end > content.len() {
            return Err(SelectionError::OutOfBounds {
                start: self.start,
                end: self.end,
                len: content.len(),
            });
        }
        for offset in [self.start, self.end] {
            if !content.is_char_boundary(offset) {
                return Err(SelectionError::NotCharBoundary { offset });
            }
        }
        Ok(self.start..self.end)
    }

    /// The selected text.
    pub fn text_in<'a>(&self, content: &'a str) -> Result<&'a str, SelectionError> {
        self.range_in(content).map(|range| &content[range])
    }

    /// Replace the selected span of `content` with `replacement`.
    pub fn replace_in(&self, content: &str, replacement: &str) -> Result<String, SelectionError> {
        let range = self.range_in(content)?;
        let mut out = String::with_capacity(content.len() - range.len() + replacement.len());
        out.push_str(&content[..range.start]);
        out.push_str(replacement);
        out.push_str(&content[range.end..]);
        Ok(out)
    }
}

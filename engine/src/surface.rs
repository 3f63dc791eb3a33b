//! The editor widget as seen by the engine.

use std::collections::HashMap;

use onpoint_types::{Selection, SelectionError};

use crate::markers::Marker;

/// Text buffer with a marker layer and a selection.
///
/// Content-change notifications flow the other way: the host calls
/// [`FeedbackEngine::on_content_change`](crate::FeedbackEngine::on_content_change).
pub trait EditorSurface {
    fn value(&self) -> &str;

    /// Replace the whole buffer.
    fn set_value(&mut self, text: String);

    /// Replace every marker published under `owner`.
    fn set_markers(&mut self, owner: &str, markers: Vec<Marker>);

    fn markers(&self, owner: &str) -> &[Marker];

    /// Current selection, if the widget has focus.
    fn selection(&self) -> Option<Selection>;

    /// Replace `range` in place, keeping the rest of the buffer (and the
    /// widget's undo history) intact.
    fn execute_edit(&mut self, range: Selection, text: &str) -> Result<(), SelectionError>;
}

/// In-memory surface for headless use and tests.
#[derive(Debug, Default, Clone)]
pub struct BufferSurface {
    value: String,
    markers: HashMap<String, Vec<Marker>>,
    selection: Option<Selection>,
    set_value_count: usize,
}

impl BufferSurface {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            ..Self::default()
        }
    }

    pub fn select(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    /// How many times the whole buffer was replaced.
    #[must_use]
    pub fn set_value_count(&self) -> usize {
        self.set_value_count
    }
}

impl EditorSurface for BufferSurface {
    fn value(&self) -> &str {
        &self.value
    }

    fn set_value(&mut self, text: String) {
        self.value = text;
        self.set_value_count += 1;
    }

    fn set_markers(&mut self, owner: &str, markers: Vec<Marker>) {
        if markers.is_empty() {
            self.markers.remove(owner);
        } else {
            self.markers.insert(owner.to_string(), markers);
        }
    }

    fn markers(&self, owner: &str) -> &[Marker] {
        self.markers.get(owner).map_or(&[], Vec::as_slice)
    }

    fn selection(&self) -> Option<Selection> {
        self.selection
    }

    fn execute_edit(&mut self, range: Selection, text: &str) -> Result<(), SelectionError> {
        self.value = range.replace_in(&self.value, text)?;
        self.selection = Some(Selection::caret(range.start() + text.len()));
        Ok(())
    }
}

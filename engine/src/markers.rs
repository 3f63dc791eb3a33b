//! Projection of session diagnostics onto the editor's marker layer.
//!
//! Diagnostics are replaced wholesale on every accepted response, so the
//! projection is too: each sync clears the owner's markers and republishes
//! the full set. All writes to the surface (markers and content) go through
//! this module.

use onpoint_types::Diagnostic;

use crate::session::DocumentSession;
use crate::surface::EditorSurface;

/// Owner tag under which assistant markers are published.
pub const MARKER_OWNER: &str = "ai";
pub const MARKER_SOURCE: &str = "AI";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerSeverity {
    Hint,
    Info,
    Warning,
    Error,
}

/// One full-line decoration. Lines and columns are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    pub start_line: u32,
    pub end_line: u32,
    pub start_column: u32,
    pub end_column: u32,
    pub message: String,
    pub severity: MarkerSeverity,
    pub source: &'static str,
}

/// Build markers for `diagnostics` against `content`.
///
/// Lines past the end of the document are clamped to the last line.
#[must_use]
pub fn markers_for(content: &str, diagnostics: &[Diagnostic]) -> Vec<Marker> {
    let lines: Vec<&str> = content.split('\n').collect();
    let last = lines.len();

    diagnostics
        .iter()
        .map(|diag| {
            let line = (diag.line_number() as usize).min(last);
            let text = lines[line - 1].strip_suffix('\r').unwrap_or(lines[line - 1]);
            let width = u32::try_from(text.chars().count()).unwrap_or(u32::MAX - 1);
            Marker {
                start_line: line as u32,
                end_line: line as u32,
                start_column: 1,
                end_column: width + 1,
                message: diag.label(),
                severity: MarkerSeverity::Warning,
                source: MARKER_SOURCE,
            }
        })
        .collect()
}

#[derive(Debug, Default)]
pub struct MarkerSynchronizer {
    projected: usize,
}

impl MarkerSynchronizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the surface's assistant markers with `session`'s diagnostics.
    pub fn sync(&mut self, session: &DocumentSession, surface: &mut impl EditorSurface) {
        let markers = markers_for(session.content(), session.diagnostics());
        self.projected = markers.len();
        surface.set_markers(MARKER_OWNER, Vec::new());
        surface.set_markers(MARKER_OWNER, markers);
        tracing::debug!(
            path = %session.path(),
            count = self.projected,
            "Markers projected"
        );
    }

    pub fn clear(&mut self, surface: &mut impl EditorSurface) {
        self.projected = 0;
        surface.set_markers(MARKER_OWNER, Vec::new());
    }

    /// Push the session content into the surface if it differs. Returns
    /// whether the surface was written.
    pub fn push_content(
        &self,
        session: &DocumentSession,
        surface: &mut impl EditorSurface,
    ) -> bool {
        if surface.value() == session.content() {
            return false;
        }
        surface.set_value(session.content().to_string());
        true
    }

    /// Number of markers published by the last sync.
    #[must_use]
    pub fn projected_count(&self) -> usize {
        self.projected
    }
}

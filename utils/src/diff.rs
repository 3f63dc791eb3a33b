//! Diff rendering for proposed document changes.

use similar::{ChangeTag, TextDiff};

/// Render a standard unified diff (`---`/`+++` headers, `@@` hunks, three
/// lines of context) from `original` to `proposed`.
///
/// Returns an empty string when the two texts are identical.
#[must_use]
pub fn unified_diff(file_name: &str, original: &str, proposed: &str) -> String {
    if original == proposed {
        return String::new();
    }
    TextDiff::from_lines(original, proposed)
        .unified_diff()
        .context_radius(3)
        .header(
            &format!("original/{file_name}"),
            &format!("suggested/{file_name}"),
        )
        .to_string()
}

/// Count added and removed lines between two texts.
#[must_use]
pub fn diff_stats(original: &str, proposed: &str) -> (u32, u32) {
    let diff = TextDiff::from_lines(original, proposed);

    let mut additions: u32 = 0;
    let mut deletions: u32 = 0;
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => additions += 1,
            ChangeTag::Delete => deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    (additions, deletions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unified_diff_has_headers_and_hunks() {
        let diff = unified_diff("main.py", "a\nb\nc\n", "a\nB\nc\n");
        assert!(diff.starts_with("--- original/main.py\n+++ suggested/main.py\n"));
        assert!(diff.contains("@@"));
        assert!(diff.contains("-b\n"));
        assert!(diff.contains("+B\n"));
    }

    #[test]
    fn unified_diff_of_identical_text_is_empty() {
        assert_eq!(unified_diff("x", "same\n", "same\n"), "");
    }

    #[test]
    fn unified_diff_handles_empty_sides() {
        let diff = unified_diff("new.py", "", "print(1)\n");
        assert!(diff.contains("+print(1)"));
        let diff = unified_diff("old.py", "print(1)\n", "");
        assert!(diff.contains("-print(1)"));
    }

    #[test]
    fn stats_count_lines() {
        assert_eq!(diff_stats("a\nb\n", "a\nc\nd\n"), (2, 1));
        assert_eq!(diff_stats("", ""), (0, 0));
    }
}

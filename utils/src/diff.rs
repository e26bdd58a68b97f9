//! Line-diff statistics.

use std::str;

use similar::{ChangeTag, TextDiff};

/// Inserted and deleted line counts going from one file state to another.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffCounts {
    pub insertions: u32,
    pub deletions: u32,
}

impl DiffCounts {
    #[must_use]
    pub fn any(self) -> bool {
        self.insertions > 0 || self.deletions > 0
    }

    pub fn accumulate(&mut self, other: DiffCounts) {
        self.insertions = self.insertions.saturating_add(other.insertions);
        self.deletions = self.deletions.saturating_add(other.deletions);
    }
}

/// Count inserted and deleted lines between `old` and `new` content.
///
/// A missing file state is represented by empty bytes: diffing from empty
/// counts every line of `new` as an insertion, and diffing to empty counts
/// every line of `old` as a deletion. Non-UTF-8 content is treated as empty.
#[must_use]
pub fn count_line_changes(old: &[u8], new: &[u8]) -> DiffCounts {
    let old_text = str::from_utf8(old).unwrap_or("");
    let new_text = str::from_utf8(new).unwrap_or("");

    let diff = TextDiff::from_lines(old_text, new_text);

    let mut counts = DiffCounts::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => counts.insertions += 1,
            ChangeTag::Delete => counts.deletions += 1,
            ChangeTag::Equal => {}
        }
    }

    counts
}

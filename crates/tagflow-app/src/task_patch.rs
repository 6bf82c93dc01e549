use tagflow_core::status::TaskStatus;
use tagflow_core::tag_text::{add_tag_to_item, remove_tag_from_item};

/// Entries to add and remove.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SetDiff<T> {
    /// Entries to add.
    pub added: Vec<T>,
    /// Entries to remove.
    pub removed: Vec<T>,
}

impl<T> SetDiff<T> {
    /// Returns true when both added/removed are empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Apply tag removals, then additions, to item text.
///
/// Additions already present as a whole token are skipped.
#[must_use]
pub fn apply_tag_diff(text: &str, tags: &SetDiff<String>) -> String {
    let mut out = text.to_owned();
    for tag in &tags.removed {
        out = remove_tag_from_item(&out, tag);
    }
    for tag in &tags.added {
        if !tagflow_core::tags::extract_tags(&out).contains(tag) {
            out = add_tag_to_item(&out, tag);
        }
    }
    out
}

/// Combined status, text and tag change applied in one rewrite.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskUpdate {
    /// New status glyph.
    pub status: Option<TaskStatus>,
    /// Replacement item text (tag diff is applied on top of it).
    pub text: Option<String>,
    /// Tag additions/removals.
    pub tags: SetDiff<String>,
}

impl TaskUpdate {
    /// Returns true when the update would not touch the document.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.status.is_none() && self.text.is_none() && self.tags.is_empty()
    }

    /// Text to write for an item currently holding `current`, `None` when unchanged.
    #[must_use]
    pub fn resolve_text(&self, current: &str) -> Option<String> {
        let base = self.text.as_deref().unwrap_or(current);
        let next = apply_tag_diff(base, &self.tags);
        (next != current).then_some(next)
    }
}

use serde::{Deserialize, Serialize};

use crate::id::TaskId;
use crate::status::TaskStatus;

/// One checklist item as reported by a task source, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawItem {
    /// Vault-relative path with `/` separators.
    pub path: String,
    /// Zero-based line of the item's first line.
    pub line: usize,
    /// Number of document lines the item spans (at least one).
    pub line_count: usize,
    /// List marker (`-`, `*`, `+`, `1.`, `1)`).
    pub symbol: String,
    /// Status glyph.
    pub status: TaskStatus,
    /// Item text: first line, then continuation lines joined with `\n`.
    pub text: String,
}

impl RawItem {
    /// Identifier of this item.
    #[must_use]
    pub fn id(&self) -> TaskId {
        TaskId::new(self.path.clone(), self.line)
    }

    /// First line of the text.
    #[must_use]
    pub fn first_line(&self) -> &str {
        self.text.split('\n').next().unwrap_or_default()
    }

    /// Zero-based line just past the item's last line.
    #[must_use]
    pub fn end_line(&self) -> usize {
        self.line + self.line_count.max(1)
    }
}

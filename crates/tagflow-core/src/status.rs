use serde::{Deserialize, Serialize};
use std::fmt;

/// Glyph inside the `[ ]` brackets of a checklist item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskStatus(pub char);

impl TaskStatus {
    /// The unchecked glyph.
    pub const OPEN: Self = Self(' ');
    /// The canonical checked glyph.
    pub const DONE: Self = Self('x');

    /// Parse a user supplied glyph; an empty string means unchecked.
    ///
    /// Only the first character is kept.
    #[must_use]
    pub fn from_glyph(glyph: &str) -> Self {
        glyph.chars().next().map_or(Self::OPEN, Self)
    }

    /// The raw glyph.
    #[must_use]
    pub const fn glyph(self) -> char {
        self.0
    }

    /// Classification of the glyph.
    #[must_use]
    pub const fn kind(self) -> StatusKind {
        match self.0 {
            ' ' => StatusKind::Todo,
            'x' | 'X' => StatusKind::Done,
            '/' => StatusKind::InProgress,
            '-' => StatusKind::Cancelled,
            _ => StatusKind::Other,
        }
    }

    /// Done or cancelled.
    #[must_use]
    pub const fn is_closed(self) -> bool {
        matches!(self.kind(), StatusKind::Done | StatusKind::Cancelled)
    }

    /// Glyph a toggle would switch to.
    #[must_use]
    pub const fn toggled(self) -> Self {
        if self.is_closed() { Self::OPEN } else { Self::DONE }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::OPEN
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Classification of status glyphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// `[ ]`
    Todo,
    /// `[/]`
    InProgress,
    /// `[x]` or `[X]`
    Done,
    /// `[-]`
    Cancelled,
    /// Any other glyph.
    Other,
}

impl StatusKind {
    /// String representation used in filters and output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }

    /// Parse the [`as_str`](Self::as_str) form (case-insensitive).
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "todo" => Some(Self::Todo),
            "in_progress" | "in-progress" | "doing" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            "cancelled" | "canceled" => Some(Self::Cancelled),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

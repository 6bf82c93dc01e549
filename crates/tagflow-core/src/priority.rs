//! Priority ranks derived from an ordered list of priority tags.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::tags::normalize_tag;

/// Upper bound on configured priority tags.
pub const MAX_PRIORITY_TAGS: usize = 5;

/// Built-in priority tags, highest first.
pub const DEFAULT_PRIORITY_TAGS: [&str; MAX_PRIORITY_TAGS] = [
    "#tpm/tag/hi",
    "#tpm/tag/med_hi",
    "#tpm/tag/med",
    "#tpm/tag/med_lo",
    "#tpm/tag/lo",
];

/// Priority of a task. Rank 0 is the highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rank", rename_all = "snake_case")]
pub enum Priority {
    /// Exactly one priority tag present.
    Explicit(usize),
    /// No priority tag present; the configured default rank applies.
    Default(usize),
    /// Several priority tags present. Reported, never resolved.
    Conflict,
}

impl Priority {
    /// Effective rank, `None` for conflicts.
    #[must_use]
    pub const fn rank(self) -> Option<usize> {
        match self {
            Self::Explicit(rank) | Self::Default(rank) => Some(rank),
            Self::Conflict => None,
        }
    }

    /// True for [`Priority::Conflict`].
    #[must_use]
    pub const fn is_conflict(self) -> bool {
        matches!(self, Self::Conflict)
    }
}

/// Invalid priority tag configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PriorityError {
    /// More than [`MAX_PRIORITY_TAGS`] entries.
    #[error("at most 5 priority tags are allowed, got {0}")]
    TooMany(usize),
    /// The same tag listed twice.
    #[error("priority tag '{0}' is listed more than once")]
    Duplicate(String),
    /// Not a valid tag name.
    #[error("priority tag '{0}' is not a valid tag")]
    InvalidTag(String),
}

/// Validated, ordered priority tag list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTags {
    tags: Vec<String>,
}

impl Default for PriorityTags {
    fn default() -> Self {
        Self {
            tags: DEFAULT_PRIORITY_TAGS.iter().map(|tag| (*tag).to_owned()).collect(),
        }
    }
}

impl PriorityTags {
    /// Validate and normalise an ordered tag list (`name` or `#name`).
    ///
    /// # Errors
    /// Returns [`PriorityError`] for too many, duplicate, or invalid tags.
    pub fn new<I, T>(tags: I) -> Result<Self, PriorityError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        let mut normalized = Vec::new();
        let mut seen = HashSet::new();
        for raw in tags {
            let raw = raw.as_ref();
            let tag = normalize_tag(raw).map_err(|_| PriorityError::InvalidTag(raw.to_owned()))?;
            if !seen.insert(tag.clone()) {
                return Err(PriorityError::Duplicate(tag));
            }
            normalized.push(tag);
        }
        if normalized.len() > MAX_PRIORITY_TAGS {
            return Err(PriorityError::TooMany(normalized.len()));
        }
        Ok(Self { tags: normalized })
    }

    /// Tags, highest priority first.
    #[must_use]
    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Rank used when a task carries no priority tag: the middle entry.
    #[must_use]
    pub const fn default_rank(&self) -> usize {
        self.tags.len() / 2
    }

    /// Tag for a rank, if configured.
    #[must_use]
    pub fn tag_for_rank(&self, rank: usize) -> Option<&str> {
        self.tags.get(rank).map(String::as_str)
    }

    /// Resolve a task's tag set against this list.
    #[must_use]
    pub fn resolve(&self, tag_set: &BTreeSet<String>) -> Priority {
        resolve_priority(tag_set, &self.tags, self.default_rank())
    }
}

/// Map a tag set to a priority using `ordered` (highest first).
#[must_use]
pub fn resolve_priority(tag_set: &BTreeSet<String>, ordered: &[String], default_rank: usize) -> Priority {
    let mut hits = ordered
        .iter()
        .enumerate()
        .filter(|(_, tag)| tag_set.contains(*tag))
        .map(|(rank, _)| rank);
    match (hits.next(), hits.next()) {
        (None, _) => Priority::Default(default_rank),
        (Some(rank), None) => Priority::Explicit(rank),
        (Some(_), Some(_)) => Priority::Conflict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|tag| (*tag).to_owned()).collect()
    }

    #[test]
    fn single_match_yields_its_rank() {
        let priorities = PriorityTags::default();
        assert_eq!(
            priorities.resolve(&set(&["#tpm/tag/med_lo", "#other"])),
            Priority::Explicit(3)
        );
        assert_eq!(priorities.resolve(&set(&["#tpm/tag/hi"])).rank(), Some(0));
    }

    #[test]
    fn no_match_yields_middle_default() {
        let priorities = PriorityTags::default();
        assert_eq!(priorities.default_rank(), 2);
        assert_eq!(priorities.resolve(&set(&["#unrelated"])), Priority::Default(2));
    }

    #[test]
    fn two_matches_conflict() {
        let priorities = PriorityTags::default();
        let resolved = priorities.resolve(&set(&["#tpm/tag/hi", "#tpm/tag/lo"]));
        assert_eq!(resolved, Priority::Conflict);
        assert!(resolved.is_conflict());
        assert_eq!(resolved.rank(), None);
    }

    #[test]
    fn prefix_tags_do_not_count() {
        let priorities = PriorityTags::default();
        assert_eq!(
            priorities.resolve(&set(&["#tpm/tag/med_hi_extra"])),
            Priority::Default(2)
        );
    }

    #[test]
    fn new_normalizes_and_validates() {
        let Ok(tags) = PriorityTags::new(["urgent", "#later"]) else {
            panic!("valid tags");
        };
        assert_eq!(tags.tags(), ["#urgent".to_owned(), "#later".to_owned()]);
        assert_eq!(tags.default_rank(), 1);
        assert_eq!(tags.tag_for_rank(1), Some("#later"));

        assert_eq!(
            PriorityTags::new(["a", "b", "c", "d", "e", "f"]),
            Err(PriorityError::TooMany(6))
        );
        assert_eq!(
            PriorityTags::new(["a", "#a"]),
            Err(PriorityError::Duplicate("#a".into()))
        );
        assert_eq!(
            PriorityTags::new(["bad tag"]),
            Err(PriorityError::InvalidTag("bad tag".into()))
        );
    }

    #[test]
    fn empty_list_defaults_to_rank_zero() {
        let Ok(tags) = PriorityTags::new(Vec::<String>::new()) else {
            panic!("empty list is valid");
        };
        assert_eq!(tags.resolve(&set(&["#x"])), Priority::Default(0));
    }
}

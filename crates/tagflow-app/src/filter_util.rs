use tagflow_core::priority::PriorityTags;
use tagflow_core::project::normalize_project;
use tagflow_core::status::StatusKind;
use tagflow_core::tags::{TagError, normalize_tag};
use tagflow_core::{StatusKindFilter, TaskFilter};
use thiserror::Error;

/// Error type returned while constructing task filters from user-facing inputs.
#[derive(Debug, Error)]
pub enum FilterBuildError {
    #[error("invalid status kind: {token}")]
    InvalidStatusKind { token: String },
    #[error("invalid tag filter: {0}")]
    InvalidTag(#[from] TagError),
    #[error("unknown priority: {token} (expected a rank below {len} or a priority tag)")]
    UnknownPriority { token: String, len: usize },
}

/// Result alias for filter construction helpers.
pub type FilterBuildResult<T> = Result<T, FilterBuildError>;

/// Builder that accepts user-facing strings and normalizes them into [`TaskFilter`] values.
#[derive(Debug, Clone, Default)]
pub struct TaskFilterBuilder {
    filter: TaskFilter,
}

impl TaskFilterBuilder {
    /// Create an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Extend the workflow name filter (logical OR).
    #[must_use]
    pub fn with_workflows(mut self, workflows: &[String]) -> Self {
        self.filter.workflows.extend(non_blank(workflows));
        self
    }

    /// Extend the step filter; names and full step tags are both accepted.
    #[must_use]
    pub fn with_steps(mut self, steps: &[String]) -> Self {
        self.filter.steps.extend(non_blank(steps));
        self
    }

    /// Extend the project filter. Paths are normalised; `/` selects the root
    /// project and therefore everything.
    #[must_use]
    pub fn with_projects(mut self, projects: &[String]) -> Self {
        self.filter
            .projects
            .extend(projects.iter().map(|project| normalize_project(project)));
        self
    }

    /// Extend the required tag list (logical AND). `name` and `#name` are accepted.
    ///
    /// # Errors
    /// Returns an error if any tag is not a valid tag name.
    pub fn with_tags(mut self, tags: &[String]) -> FilterBuildResult<Self> {
        for tag in tags {
            self.filter.tags.insert(normalize_tag(tag)?);
        }
        Ok(self)
    }

    /// Configure status kind include/exclude clauses.
    ///
    /// # Errors
    /// Returns an error if any of the provided tokens cannot be mapped to a known status kind.
    pub fn with_status_kinds(mut self, include: &[String], exclude: &[String]) -> FilterBuildResult<Self> {
        let StatusKindFilter {
            include: included,
            exclude: excluded,
        } = &mut self.filter.status_kinds;
        included.extend(parse_status_kind_tokens(include)?);
        excluded.extend(parse_status_kind_tokens(exclude)?);
        Ok(self)
    }

    /// Extend the priority filter with ranks (`0`, `1`, ...) or configured priority tags.
    ///
    /// # Errors
    /// Returns an error if a token is neither a configured rank nor a priority tag.
    pub fn with_priorities(mut self, tokens: &[String], priority: &PriorityTags) -> FilterBuildResult<Self> {
        for token in tokens {
            self.filter.priorities.insert(parse_priority_token(token, priority)?);
        }
        Ok(self)
    }

    /// Configure the optional search text (whitespace-only inputs become `None`).
    #[must_use]
    pub fn with_text(mut self, text: Option<String>) -> Self {
        self.filter.text = text.and_then(|raw| {
            let trimmed = raw.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_owned())
        });
        self
    }

    /// Keep only tasks outside every workflow.
    #[must_use]
    pub const fn unclassified_only(mut self, enabled: bool) -> Self {
        self.filter.unclassified_only = enabled;
        self
    }

    /// Keep only orphaned tasks.
    #[must_use]
    pub const fn orphans_only(mut self, enabled: bool) -> Self {
        self.filter.orphans_only = enabled;
        self
    }

    /// Build the final [`TaskFilter`].
    #[must_use]
    pub fn build(self) -> TaskFilter {
        self.filter
    }
}

fn non_blank(values: &[String]) -> impl Iterator<Item = String> + '_ {
    values
        .iter()
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

/// Convert arbitrary tokens into [`StatusKind`] values.
///
/// # Errors
/// Returns an error if any token does not match a valid status kind.
pub fn parse_status_kind_tokens(tokens: &[String]) -> FilterBuildResult<Vec<StatusKind>> {
    tokens
        .iter()
        .map(|token| {
            StatusKind::parse(&token.replace(' ', "_")).ok_or_else(|| FilterBuildError::InvalidStatusKind {
                token: token.clone(),
            })
        })
        .collect()
}

/// Resolve a rank number or a configured priority tag to a rank.
///
/// # Errors
/// Returns an error if the token matches neither.
pub fn parse_priority_token(token: &str, priority: &PriorityTags) -> FilterBuildResult<usize> {
    let unknown = || FilterBuildError::UnknownPriority {
        token: token.to_owned(),
        len: priority.tags().len(),
    };
    if let Ok(rank) = token.trim().parse::<usize>() {
        return (rank < priority.tags().len()).then_some(rank).ok_or_else(unknown);
    }
    let tag = normalize_tag(token).map_err(|_| unknown())?;
    priority
        .tags()
        .iter()
        .position(|candidate| *candidate == tag)
        .ok_or_else(unknown)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn builder_normalizes_inputs() {
        let filter = TaskFilterBuilder::new()
            .with_workflows(&strings(&["render", "  "]))
            .with_steps(&strings(&["model"]))
            .with_projects(&strings(&["/work/site/", "/"]))
            .with_tags(&strings(&["urgent", "#phone"]))
            .unwrap_or_else(|err| panic!("tags: {err}"))
            .with_text(Some("  call bob ".into()))
            .orphans_only(true)
            .build();

        assert_eq!(filter.workflows.len(), 1);
        assert!(filter.steps.contains("model"));
        assert!(filter.projects.contains("work/site"));
        assert!(filter.projects.contains(""));
        assert!(filter.tags.contains("#urgent"));
        assert!(filter.tags.contains("#phone"));
        assert_eq!(filter.text.as_deref(), Some("call bob"));
        assert!(filter.orphans_only);
        assert!(!filter.unclassified_only);
    }

    #[test]
    fn blank_text_is_dropped() {
        let filter = TaskFilterBuilder::new().with_text(Some("   ".into())).build();
        assert!(filter.text.is_none());
        assert!(filter.is_empty());
    }

    #[test]
    fn status_kinds_are_parsed() {
        let filter = TaskFilterBuilder::new()
            .with_status_kinds(&strings(&["todo", "In Progress"]), &strings(&["cancelled"]))
            .unwrap_or_else(|err| panic!("kinds: {err}"))
            .build();
        assert!(filter.status_kinds.include.contains(&StatusKind::Todo));
        assert!(filter.status_kinds.include.contains(&StatusKind::InProgress));
        assert!(filter.status_kinds.exclude.contains(&StatusKind::Cancelled));

        let err = TaskFilterBuilder::new()
            .with_status_kinds(&strings(&["someday"]), &[])
            .expect_err("unknown kind");
        assert!(matches!(err, FilterBuildError::InvalidStatusKind { token } if token == "someday"));
    }

    #[test]
    fn priorities_accept_ranks_and_tags() {
        let priority = PriorityTags::default();
        assert_eq!(parse_priority_token("0", &priority).ok(), Some(0));
        assert_eq!(parse_priority_token("tpm/tag/lo", &priority).ok(), Some(4));
        assert_eq!(parse_priority_token("#tpm/tag/med", &priority).ok(), Some(2));
        assert!(matches!(
            parse_priority_token("5", &priority),
            Err(FilterBuildError::UnknownPriority { len: 5, .. })
        ));
        assert!(parse_priority_token("#other", &priority).is_err());

        let filter = TaskFilterBuilder::new()
            .with_priorities(&strings(&["1", "#tpm/tag/hi"]), &priority)
            .unwrap_or_else(|err| panic!("priorities: {err}"))
            .build();
        assert_eq!(filter.priorities.into_iter().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn invalid_tag_is_rejected() {
        let err = TaskFilterBuilder::new()
            .with_tags(&strings(&["two words"]))
            .expect_err("invalid tag");
        assert!(matches!(err, FilterBuildError::InvalidTag(_)));
    }
}

//! Domain types and pure text logic for tagflow checklists.

/// Checklist line matching, document scanning and rewriting.
pub mod checklist;
/// Identifier types.
pub mod id;
/// Raw items produced by task sources.
pub mod item;
/// Priority tags and ranks.
pub mod priority;
/// Project paths and tree nodes.
pub mod project;
/// Status glyphs.
pub mod status;
/// Adding and removing tag tokens in item text.
pub mod tag_text;
/// Tag, inline code and block reference tokenizers.
pub mod tags;
/// Text search helper.
pub mod text_matcher;
/// Workflows and steps.
pub mod workflow;

use std::collections::BTreeSet;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::id::TaskId;
use crate::item::RawItem;
use crate::priority::Priority;
use crate::project::is_same_or_descendant;
use crate::status::{StatusKind, TaskStatus};
use crate::text_matcher::TextMatcher;

pub use crate::workflow::{Step, Workflow, WorkflowKind};

/// Workflow membership of a task, derived from its step tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "workflows", rename_all = "snake_case")]
pub enum WorkflowBinding {
    /// No step tag of a registered workflow.
    #[default]
    Unbound,
    /// Step tags of exactly one registered workflow.
    Bound(String),
    /// Step tags of several registered workflows.
    Ambiguous(Vec<String>),
}

impl WorkflowBinding {
    /// Workflow name when bound to exactly one.
    #[must_use]
    pub fn workflow(&self) -> Option<&str> {
        match self {
            Self::Bound(name) => Some(name),
            Self::Unbound | Self::Ambiguous(_) => None,
        }
    }

    /// True when the task belongs to `name`, including ambiguous bindings.
    #[must_use]
    pub fn involves(&self, name: &str) -> bool {
        match self {
            Self::Unbound => false,
            Self::Bound(bound) => bound == name,
            Self::Ambiguous(names) => names.iter().any(|candidate| candidate == name),
        }
    }
}

/// A checklist item classified by one index generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Source item.
    #[serde(flatten)]
    pub item: RawItem,
    /// Tags found in the item text.
    pub tags: BTreeSet<String>,
    /// Workflow membership.
    pub workflow: WorkflowBinding,
    /// Names of the carried steps of the bound workflow, in workflow order.
    pub steps: Vec<String>,
    /// Name of the workflow this item defines, if any.
    pub defines_workflow: Option<String>,
    /// Project path, `""` for the root project.
    pub project: String,
    /// Resolved priority.
    pub priority: Priority,
    /// The task's project is marked completed.
    pub project_completed: bool,
}

impl Task {
    /// Unclassified task carrying only the item and its tags.
    #[must_use]
    pub fn from_item(item: RawItem, tags: BTreeSet<String>, priority: Priority) -> Self {
        Self {
            item,
            tags,
            workflow: WorkflowBinding::Unbound,
            steps: Vec::new(),
            defines_workflow: None,
            project: String::new(),
            priority,
            project_completed: false,
        }
    }

    /// Identifier of the task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.item.id()
    }

    /// Status glyph.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.item.status
    }

    /// Full item text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.item.text
    }

    /// Bound workflow name.
    #[must_use]
    pub fn workflow_name(&self) -> Option<&str> {
        self.workflow.workflow()
    }

    /// First line with `trim` matches removed and whitespace collapsed.
    #[must_use]
    pub fn summary(&self, trim: Option<&Regex>) -> String {
        let first = self.item.first_line();
        let stripped = trim.map_or_else(|| first.to_owned(), |re| re.replace_all(first, "").into_owned());
        stripped.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

/// Include/exclude clauses over [`StatusKind`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusKindFilter {
    /// Kinds to keep; empty keeps every kind.
    pub include: BTreeSet<StatusKind>,
    /// Kinds to drop.
    pub exclude: BTreeSet<StatusKind>,
}

impl StatusKindFilter {
    fn matches(&self, kind: StatusKind) -> bool {
        (self.include.is_empty() || self.include.contains(&kind)) && !self.exclude.contains(&kind)
    }
}

/// Task filter. Empty clauses match everything; distinct clauses combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    /// Workflow names (any of). Ambiguous tasks match each candidate.
    pub workflows: BTreeSet<String>,
    /// Carried step names or full step tags (any of).
    pub steps: BTreeSet<String>,
    /// Projects, matching descendants too (any of).
    pub projects: BTreeSet<String>,
    /// Status kinds.
    pub status_kinds: StatusKindFilter,
    /// Required tags (all of).
    pub tags: BTreeSet<String>,
    /// Priority ranks (any of). Conflicting priorities never match.
    pub priorities: BTreeSet<usize>,
    /// Case-insensitive text query.
    pub text: Option<String>,
    /// Only tasks outside every workflow that do not define one.
    pub unclassified_only: bool,
    /// Only orphaned tasks. Evaluated by the index, which owns orphan state.
    pub orphans_only: bool,
}

impl TaskFilter {
    /// Whether the task satisfies every task-local clause.
    #[must_use]
    pub fn matches(&self, task: &Task) -> bool {
        if !self.workflows.is_empty()
            && !self
                .workflows
                .iter()
                .any(|name| task.workflow.involves(name))
        {
            return false;
        }
        if !self.steps.is_empty() && !self.matches_steps(task) {
            return false;
        }
        if !self.projects.is_empty()
            && !self
                .projects
                .iter()
                .any(|project| is_same_or_descendant(&task.project, project))
        {
            return false;
        }
        if !self.status_kinds.matches(task.status().kind()) {
            return false;
        }
        if !self.tags.iter().all(|tag| task.tags.contains(tag)) {
            return false;
        }
        if !self.priorities.is_empty()
            && !task
                .priority
                .rank()
                .is_some_and(|rank| self.priorities.contains(&rank))
        {
            return false;
        }
        if self.unclassified_only
            && (task.workflow != WorkflowBinding::Unbound || task.defines_workflow.is_some())
        {
            return false;
        }
        self.text
            .as_deref()
            .and_then(TextMatcher::new)
            .is_none_or(|matcher| matcher.matches(task))
    }

    fn matches_steps(&self, task: &Task) -> bool {
        task.steps.iter().any(|step| self.steps.contains(step))
            || self.steps.iter().any(|step| task.tags.contains(step))
    }

    /// True when no clause is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

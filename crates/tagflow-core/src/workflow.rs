use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::TaskId;

/// How the steps of a workflow relate to each other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Ordered steps; a task sits at its furthest step.
    #[default]
    Chain,
    /// Unordered steps, each completed independently.
    Checkbox,
}

impl WorkflowKind {
    /// Tag suffix / configuration form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chain => "chain",
            Self::Checkbox => "checkbox",
        }
    }

    /// Parse the [`as_str`](Self::as_str) form.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "chain" => Some(Self::Chain),
            "checkbox" => Some(Self::Checkbox),
            _ => None,
        }
    }
}

/// One named step of a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    /// Step name, unique within its workflow.
    pub name: String,
    /// Full tag marking membership, e.g. `#tpm/step/render/model`.
    pub tag: String,
}

/// A tag-defined workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    /// Workflow name (suffix of the workflow tag).
    pub name: String,
    /// Step semantics.
    pub kind: WorkflowKind,
    /// Steps in definition order. Never empty.
    pub steps: Vec<Step>,
    /// Item whose text declares the workflow.
    pub definition: TaskId,
    /// Project of the defining item.
    pub home_project: String,
}

impl Workflow {
    /// Build the tag for `step` of `workflow` under `step_namespace`.
    #[must_use]
    pub fn step_tag(step_namespace: &str, workflow: &str, step: &str) -> String {
        format!("{step_namespace}/{workflow}/{step}")
    }

    /// Look up a step by name.
    #[must_use]
    pub fn step(&self, name: &str) -> Option<&Step> {
        self.steps.iter().find(|step| step.name == name)
    }

    /// Position of a step by name.
    #[must_use]
    pub fn step_index(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.name == name)
    }

    /// Steps whose tag is in `tags`, in workflow order.
    #[must_use]
    pub fn steps_carried<'a>(&'a self, tags: &BTreeSet<String>) -> Vec<&'a Step> {
        self.steps.iter().filter(|step| tags.contains(&step.tag)).collect()
    }

    /// Furthest step carried by `tags`.
    #[must_use]
    pub fn current_step(&self, tags: &BTreeSet<String>) -> Option<&Step> {
        self.steps.iter().rev().find(|step| tags.contains(&step.tag))
    }

    /// Step following `name`, `None` at the end or for unknown names.
    #[must_use]
    pub fn next_step_after(&self, name: &str) -> Option<&Step> {
        self.step_index(name).and_then(|idx| self.steps.get(idx + 1))
    }

    /// Chain: the last step is reached. Checkbox: every step is carried.
    #[must_use]
    pub fn is_complete_for(&self, tags: &BTreeSet<String>) -> bool {
        match self.kind {
            WorkflowKind::Chain => self
                .steps
                .last()
                .is_some_and(|step| tags.contains(&step.tag)),
            WorkflowKind::Checkbox => self.steps.iter().all(|step| tags.contains(&step.tag)),
        }
    }
}

/// Split a step tag suffix (`workflow/step`) at its last `/`.
#[must_use]
pub fn split_step_suffix(suffix: &str) -> Option<(&str, &str)> {
    suffix
        .rsplit_once('/')
        .filter(|(workflow, step)| !workflow.is_empty() && !step.is_empty())
}

use std::collections::BTreeSet;
use std::sync::Arc;

use tagflow_core::id::TaskId;
use tagflow_core::status::TaskStatus;
use tagflow_core::tags::{normalize_tag, strip_namespace};
use tagflow_core::{Task, Workflow, WorkflowKind};
use tracing::debug;

use crate::task_patch::{SetDiff, TaskUpdate};
use crate::task_repository::{IndexRepository, TaskSource};
use crate::task_writer::{FileStore, RewriteOutcome, TaskWriteError, TaskWriter};

/// Service façade that encapsulates all task-related side effects.
///
/// Tasks are looked up in the repository's current snapshot; every write
/// that lands triggers an incremental refresh.
pub struct TaskService<S, F> {
    repository: Arc<IndexRepository<S>>,
    writer: TaskWriter<F>,
}

impl<S, F> TaskService<S, F> {
    pub const fn new(repository: Arc<IndexRepository<S>>, store: F) -> Self {
        Self {
            repository,
            writer: TaskWriter::new(store),
        }
    }

    pub const fn repository(&self) -> &Arc<IndexRepository<S>> {
        &self.repository
    }
}

impl<S, F> TaskService<S, F>
where
    S: TaskSource,
    F: FileStore,
{
    fn lookup(&self, id: &TaskId) -> Result<Task, TaskWriteError> {
        let index = self.repository.snapshot()?;
        index
            .task(id)
            .cloned()
            .ok_or_else(|| TaskWriteError::MissingTask(id.clone()))
    }

    fn bound_workflow(&self, task: &Task, expected: WorkflowKind) -> Result<Workflow, TaskWriteError> {
        let name = task
            .workflow_name()
            .ok_or_else(|| TaskWriteError::NotInWorkflow(task.id()))?;
        let index = self.repository.snapshot()?;
        let workflow = index
            .workflow(name)
            .cloned()
            .ok_or_else(|| TaskWriteError::NotInWorkflow(task.id()))?;
        if workflow.kind != expected {
            return Err(TaskWriteError::WrongWorkflowKind {
                workflow: workflow.name,
                expected: expected.as_str(),
            });
        }
        Ok(workflow)
    }

    /// Every tag on `task` in the step namespace of `workflow`, known steps or not.
    fn workflow_step_tags(&self, task: &Task, workflow: &Workflow) -> Result<Vec<String>, TaskWriteError> {
        let config = self.repository.config()?;
        let namespace = format!("{}/{}", config.tags.step, workflow.name);
        Ok(task
            .tags
            .iter()
            .filter(|tag| strip_namespace(tag, &namespace).is_some())
            .cloned()
            .collect())
    }

    fn write(
        &self,
        task: &Task,
        status: TaskStatus,
        text: Option<String>,
    ) -> Result<RewriteOutcome, TaskWriteError> {
        let outcome = self.writer.rewrite(&task.item, status, text.as_deref())?;
        if outcome.is_written() {
            self.repository.refresh()?;
        } else {
            debug!(task = %task.id(), ?outcome, "Task left unchanged");
        }
        Ok(outcome)
    }

    fn write_tags(&self, task: &Task, tags: &SetDiff<String>) -> Result<RewriteOutcome, TaskWriteError> {
        let update = TaskUpdate {
            tags: tags.clone(),
            ..TaskUpdate::default()
        };
        match update.resolve_text(&task.item.text) {
            Some(text) => self.write(task, task.status(), Some(text)),
            None => Ok(RewriteOutcome::Unchanged),
        }
    }

    /// Set the status glyph.
    ///
    /// # Errors
    /// Returns an error if the task is missing or the store fails.
    pub fn set_status(&self, id: &TaskId, status: TaskStatus) -> Result<RewriteOutcome, TaskWriteError> {
        let task = self.lookup(id)?;
        self.write(&task, status, None)
    }

    /// Flip between open and done.
    ///
    /// # Errors
    /// Returns an error if the task is missing or the store fails.
    pub fn toggle_status(&self, id: &TaskId) -> Result<RewriteOutcome, TaskWriteError> {
        let task = self.lookup(id)?;
        self.write(&task, task.status().toggled(), None)
    }

    /// Replace the item text.
    ///
    /// # Errors
    /// Returns an error if the task is missing or the store fails.
    pub fn set_text(&self, id: &TaskId, text: &str) -> Result<RewriteOutcome, TaskWriteError> {
        let task = self.lookup(id)?;
        self.write(&task, task.status(), Some(text.to_owned()))
    }

    /// Append a tag unless the task already carries it.
    ///
    /// # Errors
    /// Returns [`TaskWriteError::InvalidTag`] for malformed tags, or an error
    /// if the task is missing or the store fails.
    pub fn add_tag(&self, id: &TaskId, tag: &str) -> Result<RewriteOutcome, TaskWriteError> {
        let tag = normalize_tag(tag)?;
        let task = self.lookup(id)?;
        if task.tags.contains(&tag) {
            return Ok(RewriteOutcome::Unchanged);
        }
        self.write_tags(
            &task,
            &SetDiff {
                added: vec![tag],
                removed: Vec::new(),
            },
        )
    }

    /// Remove a tag.
    ///
    /// # Errors
    /// Returns [`TaskWriteError::InvalidTag`] for malformed tags, or an error
    /// if the task is missing or the store fails.
    pub fn remove_tag(&self, id: &TaskId, tag: &str) -> Result<RewriteOutcome, TaskWriteError> {
        let tag = normalize_tag(tag)?;
        let task = self.lookup(id)?;
        if !task.tags.contains(&tag) {
            return Ok(RewriteOutcome::Unchanged);
        }
        self.write_tags(
            &task,
            &SetDiff {
                added: Vec::new(),
                removed: vec![tag],
            },
        )
    }

    /// Replace every configured priority tag with the one for `rank`, or clear
    /// them all with `None`.
    ///
    /// # Errors
    /// Returns [`TaskWriteError::PriorityOutOfRange`] for unknown ranks, or an
    /// error if the task is missing or the store fails.
    pub fn set_priority(&self, id: &TaskId, rank: Option<usize>) -> Result<RewriteOutcome, TaskWriteError> {
        let config = self.repository.config()?;
        let priority = config
            .priority
            .priority_tags()
            .map_err(|err| TaskWriteError::Store(err.into()))?;
        let added = match rank {
            Some(rank) => {
                let tag = priority
                    .tag_for_rank(rank)
                    .ok_or(TaskWriteError::PriorityOutOfRange {
                        rank,
                        len: priority.tags().len(),
                    })?;
                vec![tag.to_owned()]
            }
            None => Vec::new(),
        };

        let task = self.lookup(id)?;
        let removed = priority
            .tags()
            .iter()
            .filter(|tag| task.tags.contains(*tag) && !added.contains(*tag))
            .cloned()
            .collect();
        let added = added.into_iter().filter(|tag| !task.tags.contains(tag)).collect();
        self.write_tags(&task, &SetDiff { added, removed })
    }

    /// Move a chain task to the step after its current one. A task without a
    /// known step enters the first step; at the last step nothing changes.
    ///
    /// # Errors
    /// Returns an error if the task is not bound to a chain workflow, is
    /// missing, or the store fails.
    pub fn advance_step(&self, id: &TaskId) -> Result<RewriteOutcome, TaskWriteError> {
        let task = self.lookup(id)?;
        let workflow = self.bound_workflow(&task, WorkflowKind::Chain)?;
        let next = match workflow.current_step(&task.tags) {
            Some(current) => workflow.next_step_after(&current.name),
            None => workflow.steps.first(),
        };
        let Some(next) = next else {
            return Ok(RewriteOutcome::Unchanged);
        };
        let removed = self.workflow_step_tags(&task, &workflow)?;
        self.write_tags(
            &task,
            &SetDiff {
                added: vec![next.tag.clone()],
                removed,
            },
        )
    }

    /// Put a chain task on exactly `step`.
    ///
    /// # Errors
    /// Returns [`TaskWriteError::UnknownStep`] for steps the workflow does not
    /// define, or an error if the task is not bound to a chain workflow, is
    /// missing, or the store fails.
    pub fn set_step(&self, id: &TaskId, step: &str) -> Result<RewriteOutcome, TaskWriteError> {
        let task = self.lookup(id)?;
        let workflow = self.bound_workflow(&task, WorkflowKind::Chain)?;
        let target = workflow
            .step(step)
            .map(|step| step.tag.clone())
            .ok_or_else(|| TaskWriteError::UnknownStep {
                workflow: workflow.name.clone(),
                step: step.to_owned(),
            })?;
        let removed = self
            .workflow_step_tags(&task, &workflow)?
            .into_iter()
            .filter(|tag| *tag != target)
            .collect();
        let added = if task.tags.contains(&target) {
            Vec::new()
        } else {
            vec![target]
        };
        self.write_tags(&task, &SetDiff { added, removed })
    }

    /// Add or remove one step of a checkbox task.
    ///
    /// # Errors
    /// Returns [`TaskWriteError::UnknownStep`] for steps the workflow does not
    /// define, or an error if the task is not bound to a checkbox workflow, is
    /// missing, or the store fails.
    pub fn toggle_step(&self, id: &TaskId, step: &str) -> Result<RewriteOutcome, TaskWriteError> {
        let task = self.lookup(id)?;
        let workflow = self.bound_workflow(&task, WorkflowKind::Checkbox)?;
        let tag = workflow
            .step(step)
            .map(|step| step.tag.clone())
            .ok_or_else(|| TaskWriteError::UnknownStep {
                workflow: workflow.name.clone(),
                step: step.to_owned(),
            })?;
        let diff = if task.tags.contains(&tag) {
            SetDiff {
                added: Vec::new(),
                removed: vec![tag],
            }
        } else {
            SetDiff {
                added: vec![tag],
                removed: Vec::new(),
            }
        };
        self.write_tags(&task, &diff)
    }

    /// Apply status, text and tag changes in one rewrite.
    ///
    /// # Errors
    /// Returns [`TaskWriteError::InvalidTag`] for malformed added tags, or an
    /// error if the task is missing or the store fails.
    pub fn apply(&self, id: &TaskId, update: TaskUpdate) -> Result<RewriteOutcome, TaskWriteError> {
        let TaskUpdate { status, text, tags } = update;
        let added: BTreeSet<String> = tags
            .added
            .iter()
            .map(|tag| normalize_tag(tag))
            .collect::<Result<_, _>>()?;
        let removed: BTreeSet<String> = tags
            .removed
            .iter()
            .map(|tag| normalize_tag(tag))
            .collect::<Result<_, _>>()?;
        let update = TaskUpdate {
            status,
            text,
            tags: SetDiff {
                added: added.into_iter().collect(),
                removed: removed.into_iter().collect(),
            },
        };

        let task = self.lookup(id)?;
        if update.is_empty() {
            return Ok(RewriteOutcome::Unchanged);
        }
        let status = update.status.unwrap_or_else(|| task.status());
        let text = update.resolve_text(&task.item.text);
        self.write(&task, status, text)
    }
}

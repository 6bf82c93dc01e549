//! One immutable generation of classified tasks, workflows and projects.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::Serialize;
use tagflow_core::id::TaskId;
use tagflow_core::item::RawItem;
use tagflow_core::priority::{Priority, PriorityTags};
use tagflow_core::project::{
    Project, ProjectSource, ROOT_PROJECT, is_same_or_descendant, normalize_project, parent_project,
    project_from_location,
};
use tagflow_core::tags::{extract_tags, strip_namespace, tag_occurrences};
use tagflow_core::workflow::split_step_suffix;
use tagflow_core::{Step, Task, TaskFilter, Workflow, WorkflowBinding, WorkflowKind};

use crate::config::{ConfigError, ProjectConfig, TagPrefixes};

/// Classification inputs derived from [`ProjectConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSettings {
    /// Tag namespace prefixes.
    pub prefixes: TagPrefixes,
    /// Validated priority tags.
    pub priority: PriorityTags,
    /// Location-derived project source.
    pub project_source: ProjectSource,
    /// Normalised completed projects.
    pub completed_projects: Vec<String>,
    /// Orphan relaxation for descendants of the home project.
    pub allow_subproject_workflows: bool,
    /// Orphan relaxation for workflows homed in the root project.
    pub unclassified_workflows_everywhere: bool,
}

impl Default for IndexSettings {
    fn default() -> Self {
        let config = ProjectConfig::default();
        Self {
            prefixes: config.tags,
            priority: PriorityTags::default(),
            project_source: config.projects.source,
            completed_projects: Vec::new(),
            allow_subproject_workflows: false,
            unclassified_workflows_everywhere: false,
        }
    }
}

impl IndexSettings {
    /// Derive settings from a configuration.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the priority tags are invalid.
    pub fn from_config(config: &ProjectConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            prefixes: config.tags.clone(),
            priority: config.priority.priority_tags()?,
            project_source: config.projects.source,
            completed_projects: config
                .projects
                .completed_projects()
                .into_iter()
                .filter(|project| !project.is_empty())
                .collect(),
            allow_subproject_workflows: config.projects.allow_subproject_workflows,
            unclassified_workflows_everywhere: config.projects.unclassified_workflows_everywhere,
        })
    }
}

/// Consistency problem found while building an index. Never auto-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum IndexIssue {
    /// An item carries more than one workflow tag.
    MultipleWorkflowTags {
        /// Offending item.
        task: TaskId,
        /// Workflow names found.
        workflows: Vec<String>,
    },
    /// A workflow name is defined twice; the first definition wins.
    DuplicateWorkflow {
        /// Workflow name.
        workflow: String,
        /// Ignored definition.
        task: TaskId,
        /// Registered definition.
        first: TaskId,
    },
    /// A workflow definition without step tags.
    WorkflowWithoutSteps {
        /// Workflow name.
        workflow: String,
        /// Defining item.
        task: TaskId,
    },
    /// A step listed twice on a definition.
    DuplicateStep {
        /// Workflow name.
        workflow: String,
        /// Step name.
        step: String,
        /// Defining item.
        task: TaskId,
    },
    /// A definition carries a step tag naming another workflow.
    ForeignStep {
        /// Workflow being defined.
        workflow: String,
        /// Offending step tag.
        tag: String,
        /// Defining item.
        task: TaskId,
    },
    /// A workflow type tag with an unknown kind.
    UnknownWorkflowKind {
        /// Workflow name.
        workflow: String,
        /// Rejected kind.
        kind: String,
        /// Defining item.
        task: TaskId,
    },
    /// A task carries steps of several registered workflows.
    AmbiguousWorkflow {
        /// Offending task.
        task: TaskId,
        /// Candidate workflows.
        workflows: Vec<String>,
    },
    /// A step tag names a workflow that is not registered.
    UnknownWorkflow {
        /// Offending task.
        task: TaskId,
        /// Unregistered workflow name.
        workflow: String,
    },
    /// A step tag names a step the workflow does not have.
    UnknownStep {
        /// Offending task.
        task: TaskId,
        /// Workflow name.
        workflow: String,
        /// Unknown step name.
        step: String,
    },
    /// Several explicit project tags; the location-derived project is used.
    MultipleProjects {
        /// Offending task.
        task: TaskId,
        /// Projects found.
        projects: Vec<String>,
    },
    /// More than one priority tag.
    PriorityConflict {
        /// Offending task.
        task: TaskId,
        /// Priority tags found, highest first.
        tags: Vec<String>,
    },
}

impl IndexIssue {
    /// Item the issue was raised for.
    #[must_use]
    pub const fn task(&self) -> &TaskId {
        match self {
            Self::MultipleWorkflowTags { task, .. }
            | Self::DuplicateWorkflow { task, .. }
            | Self::WorkflowWithoutSteps { task, .. }
            | Self::DuplicateStep { task, .. }
            | Self::ForeignStep { task, .. }
            | Self::UnknownWorkflowKind { task, .. }
            | Self::AmbiguousWorkflow { task, .. }
            | Self::UnknownWorkflow { task, .. }
            | Self::UnknownStep { task, .. }
            | Self::MultipleProjects { task, .. }
            | Self::PriorityConflict { task, .. } => task,
        }
    }
}

impl fmt::Display for IndexIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MultipleWorkflowTags { task, workflows } => {
                write!(f, "{task}: several workflow tags ({})", workflows.join(", "))
            }
            Self::DuplicateWorkflow { workflow, task, first } => {
                write!(f, "{task}: workflow '{workflow}' is already defined at {first}")
            }
            Self::WorkflowWithoutSteps { workflow, task } => {
                write!(f, "{task}: workflow '{workflow}' has no steps")
            }
            Self::DuplicateStep { workflow, step, task } => {
                write!(f, "{task}: step '{step}' is listed twice in workflow '{workflow}'")
            }
            Self::ForeignStep { workflow, tag, task } => {
                write!(f, "{task}: step tag {tag} does not belong to workflow '{workflow}'")
            }
            Self::UnknownWorkflowKind { workflow, kind, task } => {
                write!(f, "{task}: workflow '{workflow}' has unknown type '{kind}'")
            }
            Self::AmbiguousWorkflow { task, workflows } => {
                write!(f, "{task}: steps of several workflows ({})", workflows.join(", "))
            }
            Self::UnknownWorkflow { task, workflow } => {
                write!(f, "{task}: workflow '{workflow}' is not defined")
            }
            Self::UnknownStep { task, workflow, step } => {
                write!(f, "{task}: workflow '{workflow}' has no step '{step}'")
            }
            Self::MultipleProjects { task, projects } => {
                write!(f, "{task}: several project tags ({})", projects.join(", "))
            }
            Self::PriorityConflict { task, tags } => {
                write!(f, "{task}: conflicting priority tags ({})", tags.join(", "))
            }
        }
    }
}

/// Completion counts of one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowProgress {
    /// Workflow name.
    pub workflow: String,
    /// Bound tasks.
    pub total: usize,
    /// Bound tasks for which the workflow is complete.
    pub complete: usize,
    /// Bound tasks carrying each step, in workflow order.
    pub per_step: Vec<(String, usize)>,
}

struct Prepared {
    item: RawItem,
    tags: BTreeSet<String>,
    /// Tag occurrences in text order, duplicates kept.
    ordered: Vec<String>,
    project: String,
}

/// Classified graph of one generation.
#[derive(Debug, Clone, Default)]
pub struct TaskIndex {
    generation: u64,
    tasks: Vec<Task>,
    task_lookup: HashMap<TaskId, usize>,
    workflows: BTreeMap<String, Workflow>,
    projects: BTreeMap<String, Project>,
    orphans: BTreeSet<TaskId>,
    issues: Vec<IndexIssue>,
}

impl TaskIndex {
    /// Classify `items` into a new index with generation 0.
    #[must_use]
    pub fn build(mut items: Vec<RawItem>, settings: &IndexSettings) -> Self {
        items.sort_by(|a, b| (&a.path, a.line).cmp(&(&b.path, b.line)));
        items.dedup_by(|next, prev| next.path == prev.path && next.line == prev.line);

        let mut issues = Vec::new();
        let prepared: Vec<Prepared> = items
            .into_iter()
            .map(|item| prepare(item, settings, &mut issues))
            .collect();

        let (workflows, definitions) = register_workflows(&prepared, &settings.prefixes, &mut issues);

        let mut tasks = Vec::with_capacity(prepared.len());
        for entry in prepared {
            let id = entry.item.id();
            let priority = settings.priority.resolve(&entry.tags);
            if priority.is_conflict() {
                issues.push(IndexIssue::PriorityConflict {
                    task: id.clone(),
                    tags: settings
                        .priority
                        .tags()
                        .iter()
                        .filter(|tag| entry.tags.contains(*tag))
                        .cloned()
                        .collect(),
                });
            }

            let mut task = Task::from_item(entry.item, entry.tags, priority);
            task.project = entry.project;
            match definitions.get(&id) {
                Some(Definition::Registered(name)) => task.defines_workflow = Some(name.clone()),
                Some(Definition::Rejected) => {}
                None => classify(&mut task, &entry.ordered, &workflows, &settings.prefixes, &mut issues),
            }
            tasks.push(task);
        }

        let mut index = Self {
            generation: 0,
            task_lookup: tasks
                .iter()
                .enumerate()
                .map(|(idx, task)| (task.id(), idx))
                .collect(),
            tasks,
            workflows,
            projects: BTreeMap::new(),
            orphans: BTreeSet::new(),
            issues,
        };
        index.build_projects(&settings.completed_projects);
        index.detect_orphans(settings);
        index
    }

    /// Stamp the generation number.
    #[must_use]
    pub const fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    fn build_projects(&mut self, completed: &[String]) {
        let mut projects = BTreeMap::new();
        ensure_project(&mut projects, ROOT_PROJECT);
        for task in &self.tasks {
            ensure_project(&mut projects, &task.project);
            if let Some(project) = projects.get_mut(&task.project) {
                project.tasks.push(task.id());
            }
        }
        for workflow in self.workflows.values() {
            ensure_project(&mut projects, &workflow.home_project);
            if let Some(project) = projects.get_mut(&workflow.home_project) {
                project.workflows.push(workflow.name.clone());
            }
        }
        for project in projects.values_mut() {
            project.completed = completed
                .iter()
                .any(|done| is_same_or_descendant(&project.name, done));
        }
        for task in &mut self.tasks {
            task.project_completed = projects
                .get(&task.project)
                .is_some_and(|project| project.completed);
        }
        self.projects = projects;
    }

    fn detect_orphans(&mut self, settings: &IndexSettings) {
        let orphans = self
            .tasks
            .iter()
            .filter(|task| {
                let Some(workflow) = task.workflow_name().and_then(|name| self.workflows.get(name)) else {
                    return false;
                };
                !workflow_valid_in(workflow, &task.project, settings)
            })
            .map(Task::id)
            .collect();
        self.orphans = orphans;
    }

    /// Generation number assigned by the repository.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// All tasks sorted by `(path, line)`.
    #[must_use]
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Look up a task.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.task_lookup.get(id).and_then(|&idx| self.tasks.get(idx))
    }

    /// Registered workflows by name.
    pub fn workflows(&self) -> impl Iterator<Item = &Workflow> {
        self.workflows.values()
    }

    /// Look up a workflow.
    #[must_use]
    pub fn workflow(&self, name: &str) -> Option<&Workflow> {
        self.workflows.get(name)
    }

    /// Tasks bound to `workflow`.
    #[must_use]
    pub fn tasks_in_workflow(&self, workflow: &str) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.workflow_name() == Some(workflow))
            .collect()
    }

    /// Tasks bound to `workflow` that carry `step`.
    #[must_use]
    pub fn tasks_in_step(&self, workflow: &str, step: &str) -> Vec<&Task> {
        let Some(step) = self.workflows.get(workflow).and_then(|wf| wf.step(step)) else {
            return Vec::new();
        };
        self.tasks
            .iter()
            .filter(|task| task.workflow_name() == Some(workflow) && task.tags.contains(&step.tag))
            .collect()
    }

    /// Tasks outside every workflow that do not define one.
    #[must_use]
    pub fn unclassified_tasks(&self) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| task.workflow == WorkflowBinding::Unbound && task.defines_workflow.is_none())
            .collect()
    }

    /// Project tree nodes by path.
    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Look up a project.
    #[must_use]
    pub fn project(&self, path: &str) -> Option<&Project> {
        self.projects.get(path)
    }

    /// Direct children of a project.
    #[must_use]
    pub fn children_of(&self, path: &str) -> Vec<&Project> {
        self.projects
            .get(path)
            .map(|project| {
                project
                    .children
                    .iter()
                    .filter_map(|child| self.projects.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Tasks bound to a workflow that is not valid in their project.
    #[must_use]
    pub fn orphans(&self) -> Vec<&Task> {
        self.orphans.iter().filter_map(|id| self.task(id)).collect()
    }

    /// Whether a task is an orphan.
    #[must_use]
    pub fn is_orphan(&self, id: &TaskId) -> bool {
        self.orphans.contains(id)
    }

    /// Every issue found during the build.
    #[must_use]
    pub fn issues(&self) -> &[IndexIssue] {
        &self.issues
    }

    /// Issues raised for one task.
    #[must_use]
    pub fn issues_for(&self, id: &TaskId) -> Vec<&IndexIssue> {
        self.issues.iter().filter(|issue| issue.task() == id).collect()
    }

    /// Tasks matching `filter`.
    #[must_use]
    pub fn filtered(&self, filter: &TaskFilter) -> Vec<&Task> {
        self.tasks
            .iter()
            .filter(|task| filter.matches(task))
            .filter(|task| !filter.orphans_only || self.orphans.contains(&task.id()))
            .collect()
    }

    /// Completion counts of a workflow.
    #[must_use]
    pub fn workflow_progress(&self, name: &str) -> Option<WorkflowProgress> {
        let workflow = self.workflows.get(name)?;
        let bound = self.tasks_in_workflow(name);
        let complete = bound
            .iter()
            .filter(|task| workflow.is_complete_for(&task.tags))
            .count();
        let per_step = workflow
            .steps
            .iter()
            .map(|step| {
                let count = bound.iter().filter(|task| task.tags.contains(&step.tag)).count();
                (step.name.clone(), count)
            })
            .collect();
        Some(WorkflowProgress {
            workflow: name.to_owned(),
            total: bound.len(),
            complete,
            per_step,
        })
    }
}

/// True when a task in `project` may use `workflow`.
#[must_use]
pub fn workflow_valid_in(workflow: &Workflow, project: &str, settings: &IndexSettings) -> bool {
    if workflow.home_project == project {
        return true;
    }
    if settings.unclassified_workflows_everywhere && workflow.home_project == ROOT_PROJECT {
        return true;
    }
    settings.allow_subproject_workflows && is_same_or_descendant(project, &workflow.home_project)
}

fn prepare(item: RawItem, settings: &IndexSettings, issues: &mut Vec<IndexIssue>) -> Prepared {
    let ordered = tag_occurrences(&item.text);
    let tags = extract_tags(&item.text);

    let mut explicit: Vec<String> = Vec::new();
    for tag in &ordered {
        if let Some(path) = strip_namespace(tag, &settings.prefixes.project) {
            let project = normalize_project(path);
            if !explicit.contains(&project) {
                explicit.push(project);
            }
        }
    }
    let project = match explicit.len() {
        0 => project_from_location(&item.path, settings.project_source),
        1 => explicit.swap_remove(0),
        _ => {
            issues.push(IndexIssue::MultipleProjects {
                task: item.id(),
                projects: explicit,
            });
            project_from_location(&item.path, settings.project_source)
        }
    };

    Prepared {
        item,
        tags,
        ordered,
        project,
    }
}

enum Definition {
    Registered(String),
    Rejected,
}

fn register_workflows(
    prepared: &[Prepared],
    prefixes: &TagPrefixes,
    issues: &mut Vec<IndexIssue>,
) -> (BTreeMap<String, Workflow>, HashMap<TaskId, Definition>) {
    let mut workflows: BTreeMap<String, Workflow> = BTreeMap::new();
    let mut definitions = HashMap::new();

    for entry in prepared {
        let mut names: Vec<&str> = Vec::new();
        for name in entry
            .ordered
            .iter()
            .filter_map(|tag| strip_namespace(tag, &prefixes.workflow))
        {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        let id = entry.item.id();
        let name = match names.as_slice() {
            [] => continue,
            [name] => (*name).to_owned(),
            _ => {
                issues.push(IndexIssue::MultipleWorkflowTags {
                    task: id,
                    workflows: names.iter().map(|name| (*name).to_owned()).collect(),
                });
                continue;
            }
        };

        if let Some(existing) = workflows.get(&name) {
            issues.push(IndexIssue::DuplicateWorkflow {
                workflow: name,
                task: id.clone(),
                first: existing.definition.clone(),
            });
            definitions.insert(id, Definition::Rejected);
            continue;
        }

        let kind = workflow_kind(entry, &name, prefixes, issues);
        let steps = definition_steps(entry, &name, prefixes, issues);
        if steps.is_empty() {
            issues.push(IndexIssue::WorkflowWithoutSteps {
                workflow: name,
                task: id.clone(),
            });
            definitions.insert(id, Definition::Rejected);
            continue;
        }

        definitions.insert(id.clone(), Definition::Registered(name.clone()));
        workflows.insert(
            name.clone(),
            Workflow {
                name,
                kind,
                steps,
                definition: id,
                home_project: entry.project.clone(),
            },
        );
    }

    (workflows, definitions)
}

fn workflow_kind(
    entry: &Prepared,
    name: &str,
    prefixes: &TagPrefixes,
    issues: &mut Vec<IndexIssue>,
) -> WorkflowKind {
    let mut kind = None;
    let raw_kinds: BTreeSet<&str> = entry
        .ordered
        .iter()
        .filter_map(|tag| strip_namespace(tag, &prefixes.workflow_type))
        .collect();
    for raw in raw_kinds {
        match WorkflowKind::parse(raw) {
            Some(parsed) => {
                kind.get_or_insert(parsed);
            }
            None => issues.push(IndexIssue::UnknownWorkflowKind {
                workflow: name.to_owned(),
                kind: raw.to_owned(),
                task: entry.item.id(),
            }),
        }
    }
    kind.unwrap_or_default()
}

fn definition_steps(
    entry: &Prepared,
    name: &str,
    prefixes: &TagPrefixes,
    issues: &mut Vec<IndexIssue>,
) -> Vec<Step> {
    let mut steps: Vec<Step> = Vec::new();
    for tag in &entry.ordered {
        let Some(suffix) = strip_namespace(tag, &prefixes.step) else {
            continue;
        };
        let Some((workflow, step)) = split_step_suffix(suffix).filter(|(workflow, _)| *workflow == name)
        else {
            issues.push(IndexIssue::ForeignStep {
                workflow: name.to_owned(),
                tag: tag.clone(),
                task: entry.item.id(),
            });
            continue;
        };
        if steps.iter().any(|existing| existing.name == step) {
            issues.push(IndexIssue::DuplicateStep {
                workflow: workflow.to_owned(),
                step: step.to_owned(),
                task: entry.item.id(),
            });
            continue;
        }
        steps.push(Step {
            name: step.to_owned(),
            tag: tag.clone(),
        });
    }
    steps
}

fn classify(
    task: &mut Task,
    ordered: &[String],
    workflows: &BTreeMap<String, Workflow>,
    prefixes: &TagPrefixes,
    issues: &mut Vec<IndexIssue>,
) {
    let id = task.id();
    let mut bound: BTreeSet<&str> = BTreeSet::new();
    let mut unknown: BTreeSet<&str> = BTreeSet::new();

    for tag in ordered {
        let Some((workflow, step)) = strip_namespace(tag, &prefixes.step).and_then(split_step_suffix) else {
            continue;
        };
        match workflows.get(workflow) {
            Some(registered) => {
                bound.insert(registered.name.as_str());
                if registered.step(step).is_none() {
                    issues.push(IndexIssue::UnknownStep {
                        task: id.clone(),
                        workflow: workflow.to_owned(),
                        step: step.to_owned(),
                    });
                }
            }
            None => {
                if unknown.insert(workflow) {
                    issues.push(IndexIssue::UnknownWorkflow {
                        task: id.clone(),
                        workflow: workflow.to_owned(),
                    });
                }
            }
        }
    }

    let names: Vec<String> = bound.into_iter().map(str::to_owned).collect();
    match names.len() {
        0 => {}
        1 => {
            let name = &names[0];
            if let Some(workflow) = workflows.get(name) {
                task.steps = workflow
                    .steps_carried(&task.tags)
                    .into_iter()
                    .map(|step| step.name.clone())
                    .collect();
            }
            task.workflow = WorkflowBinding::Bound(name.clone());
        }
        _ => {
            issues.push(IndexIssue::AmbiguousWorkflow {
                task: id,
                workflows: names.clone(),
            });
            task.workflow = WorkflowBinding::Ambiguous(names);
        }
    }
}

fn ensure_project(projects: &mut BTreeMap<String, Project>, path: &str) {
    if projects.contains_key(path) {
        return;
    }
    let parent = parent_project(path).map(str::to_owned);
    projects.insert(
        path.to_owned(),
        Project {
            name: path.to_owned(),
            parent: parent.clone(),
            ..Project::default()
        },
    );
    if let Some(parent) = parent {
        ensure_project(projects, &parent);
        if let Some(node) = projects.get_mut(&parent) {
            node.children.insert(path.to_owned());
        }
    }
}

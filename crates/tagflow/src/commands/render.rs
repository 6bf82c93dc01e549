use std::io::{self, Write};

use tagflow_app::{TaskIndex, WorkflowProgress};
use tagflow_core::priority::Priority;
use tagflow_core::project::ROOT_PROJECT;
use tagflow_core::{Task, Workflow, WorkflowBinding};

/// One pre-formatted `ls` row.
pub struct TaskRow {
    id: String,
    status: String,
    priority: String,
    workflow: String,
    steps: String,
    project: String,
    summary: String,
}

impl TaskRow {
    pub fn new(task: &Task, summary: String) -> Self {
        let workflow = match &task.workflow {
            WorkflowBinding::Unbound => "-".to_owned(),
            WorkflowBinding::Bound(name) => name.clone(),
            WorkflowBinding::Ambiguous(names) => format!("?{}", names.join("|")),
        };
        let steps = if task.steps.is_empty() {
            "-".to_owned()
        } else {
            task.steps.join(",")
        };
        Self {
            id: task.id().to_string(),
            status: format!("[{}]", task.status().glyph()),
            priority: priority_label(task.priority),
            workflow,
            steps,
            project: project_label(&task.project).to_owned(),
            summary,
        }
    }
}

fn priority_label(priority: Priority) -> String {
    match priority {
        Priority::Explicit(rank) => rank.to_string(),
        Priority::Default(rank) => format!("{rank}*"),
        Priority::Conflict => "!".to_owned(),
    }
}

/// Display name of a project path.
pub fn project_label(project: &str) -> &str {
    if project == ROOT_PROJECT { "/" } else { project }
}

pub fn task_table<W: Write>(out: &mut W, rows: &[TaskRow]) -> io::Result<()> {
    let width = |pick: fn(&TaskRow) -> &str, header: &str| {
        rows.iter()
            .map(|row| pick(row).chars().count())
            .max()
            .unwrap_or(0)
            .max(header.len())
    };
    let id_w = width(|row| row.id.as_str(), "ID");
    let wf_w = width(|row| row.workflow.as_str(), "WORKFLOW");
    let step_w = width(|row| row.steps.as_str(), "STEP");
    let proj_w = width(|row| row.project.as_str(), "PROJECT");

    writeln!(
        out,
        "{:<id_w$}  ST   PRI  {:<wf_w$}  {:<step_w$}  {:<proj_w$}  SUMMARY",
        "ID", "WORKFLOW", "STEP", "PROJECT"
    )?;
    for row in rows {
        writeln!(
            out,
            "{:<id_w$}  {:<3}  {:<3}  {:<wf_w$}  {:<step_w$}  {:<proj_w$}  {}",
            row.id, row.status, row.priority, row.workflow, row.steps, row.project, row.summary
        )?;
    }
    Ok(())
}

pub fn workflow<W: Write>(out: &mut W, workflow: &Workflow, progress: Option<&WorkflowProgress>) -> io::Result<()> {
    writeln!(
        out,
        "{} ({}) home {} defined at {}",
        workflow.name,
        workflow.kind.as_str(),
        project_label(&workflow.home_project),
        workflow.definition
    )?;
    let Some(progress) = progress else {
        return Ok(());
    };
    for (step, count) in &progress.per_step {
        writeln!(out, "  {step}: {count}")?;
    }
    writeln!(out, "  complete: {}/{}", progress.complete, progress.total)
}

pub fn project_tree<W: Write>(out: &mut W, index: &TaskIndex) -> io::Result<()> {
    write_project(out, index, ROOT_PROJECT, 0)
}

fn write_project<W: Write>(out: &mut W, index: &TaskIndex, name: &str, depth: usize) -> io::Result<()> {
    let Some(project) = index.project(name) else {
        return Ok(());
    };
    let label = if depth == 0 {
        "/"
    } else {
        name.rsplit('/').next().unwrap_or(name)
    };
    write!(out, "{:indent$}{label} ({} tasks)", "", project.tasks.len(), indent = depth * 2)?;
    if !project.workflows.is_empty() {
        write!(out, " workflows: {}", project.workflows.join(", "))?;
    }
    if project.completed {
        write!(out, " [completed]")?;
    }
    writeln!(out)?;
    for child in &project.children {
        write_project(out, index, child, depth + 1)?;
    }
    Ok(())
}

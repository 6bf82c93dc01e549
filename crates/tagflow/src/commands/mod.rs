use std::io::Write;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::Serialize;
use tagflow_app::{
    FileStore, IndexIssue, RewriteOutcome, TaskFilterBuilder, TaskService, TaskSource, WorkflowProgress,
};
use tagflow_core::id::TaskId;
use tagflow_core::status::TaskStatus;
use tagflow_core::{TaskFilter, Workflow};

use crate::{Command, LsArgs, OutputFormat, TagAction};

mod render;

use render::TaskRow;

pub fn run<S, F, W>(command: Command, service: &TaskService<S, F>, out: &mut W) -> Result<()>
where
    S: TaskSource,
    F: FileStore,
    W: Write,
{
    match command {
        Command::Ls(args) => handle_ls(service, &args, out),
        Command::Workflows { format } => handle_workflows(service, format, out),
        Command::Projects { format } => handle_projects(service, format, out),
        Command::Check { format } => handle_check(service, format, out),
        Command::Status { task, set } => {
            let id = parse_task_id(&task)?;
            let outcome = service.set_status(&id, TaskStatus::from_glyph(&set))?;
            report(out, &id, outcome)
        }
        Command::Toggle { task } => {
            let id = parse_task_id(&task)?;
            let outcome = service.toggle_status(&id)?;
            report(out, &id, outcome)
        }
        Command::Edit { task, text } => {
            let id = parse_task_id(&task)?;
            let outcome = service.set_text(&id, &text)?;
            report(out, &id, outcome)
        }
        Command::Tag { action } => {
            let (id, outcome) = match action {
                TagAction::Add { task, tag } => {
                    let id = parse_task_id(&task)?;
                    let outcome = service.add_tag(&id, &tag)?;
                    (id, outcome)
                }
                TagAction::Remove { task, tag } => {
                    let id = parse_task_id(&task)?;
                    let outcome = service.remove_tag(&id, &tag)?;
                    (id, outcome)
                }
            };
            report(out, &id, outcome)
        }
        Command::Priority { task, rank, clear } => {
            let id = parse_task_id(&task)?;
            let rank = if clear { None } else { rank };
            let outcome = service.set_priority(&id, rank)?;
            report(out, &id, outcome)
        }
        Command::Step { task, set, toggle, .. } => {
            let id = parse_task_id(&task)?;
            // clap guarantees exactly one of advance, set and toggle.
            let outcome = match (set, toggle) {
                (Some(step), _) => service.set_step(&id, &step)?,
                (None, Some(step)) => service.toggle_step(&id, &step)?,
                (None, None) => service.advance_step(&id)?,
            };
            report(out, &id, outcome)
        }
    }
}

fn build_filter(args: &LsArgs, priority: &tagflow_core::priority::PriorityTags) -> Result<TaskFilter> {
    let filter = TaskFilterBuilder::new()
        .with_workflows(&args.workflows)
        .with_steps(&args.steps)
        .with_projects(&args.projects)
        .with_status_kinds(&args.statuses, &args.exclude_statuses)?
        .with_priorities(&args.priorities, priority)?
        .with_tags(&args.tags)?
        .with_text(args.text.clone())
        .orphans_only(args.orphans)
        .unclassified_only(args.unclassified)
        .build();
    Ok(filter)
}

fn handle_ls<S, F, W>(service: &TaskService<S, F>, args: &LsArgs, out: &mut W) -> Result<()>
where
    S: TaskSource,
    F: FileStore,
    W: Write,
{
    let config = service.repository().config()?;
    let filter = build_filter(args, &config.priority.priority_tags()?)?;
    let index = service.repository().snapshot()?;
    let tasks = index.filtered(&filter);

    match args.format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&tasks)?)?,
        OutputFormat::Table if tasks.is_empty() => {
            if filter.is_empty() {
                writeln!(out, "No tasks found")?;
            } else {
                writeln!(out, "No tasks matched the provided filters")?;
            }
        }
        OutputFormat::Table => {
            let trim = config.display.trim_regex()?;
            let rows: Vec<TaskRow> = tasks
                .iter()
                .map(|task| TaskRow::new(task, task.summary(trim.as_ref())))
                .collect();
            render::task_table(out, &rows)?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct WorkflowRow<'a> {
    #[serde(flatten)]
    workflow: &'a Workflow,
    progress: Option<WorkflowProgress>,
}

fn handle_workflows<S, F, W>(service: &TaskService<S, F>, format: OutputFormat, out: &mut W) -> Result<()>
where
    S: TaskSource,
    F: FileStore,
    W: Write,
{
    let index = service.repository().snapshot()?;
    let rows: Vec<WorkflowRow<'_>> = index
        .workflows()
        .map(|workflow| WorkflowRow {
            workflow,
            progress: index.workflow_progress(&workflow.name),
        })
        .collect();

    match format {
        OutputFormat::Json => writeln!(out, "{}", serde_json::to_string_pretty(&rows)?)?,
        OutputFormat::Table if rows.is_empty() => writeln!(out, "No workflows defined")?,
        OutputFormat::Table => {
            for row in &rows {
                render::workflow(out, row.workflow, row.progress.as_ref())?;
            }
        }
    }
    Ok(())
}

fn handle_projects<S, F, W>(service: &TaskService<S, F>, format: OutputFormat, out: &mut W) -> Result<()>
where
    S: TaskSource,
    F: FileStore,
    W: Write,
{
    let index = service.repository().snapshot()?;
    match format {
        OutputFormat::Json => {
            let projects: Vec<_> = index.projects().collect();
            writeln!(out, "{}", serde_json::to_string_pretty(&projects)?)?;
        }
        OutputFormat::Table => render::project_tree(out, &index)?,
    }
    Ok(())
}

#[derive(Serialize)]
struct CheckReport<'a> {
    issues: &'a [IndexIssue],
    orphans: Vec<TaskId>,
}

fn handle_check<S, F, W>(service: &TaskService<S, F>, format: OutputFormat, out: &mut W) -> Result<()>
where
    S: TaskSource,
    F: FileStore,
    W: Write,
{
    let index = service.repository().snapshot()?;
    let orphans = index.orphans();

    match format {
        OutputFormat::Json => {
            let report = CheckReport {
                issues: index.issues(),
                orphans: orphans.iter().map(|task| task.id()).collect(),
            };
            writeln!(out, "{}", serde_json::to_string_pretty(&report)?)?;
        }
        OutputFormat::Table if index.issues().is_empty() && orphans.is_empty() => {
            writeln!(out, "No issues found")?;
        }
        OutputFormat::Table => {
            if !index.issues().is_empty() {
                writeln!(out, "Issues ({}):", index.issues().len())?;
                for issue in index.issues() {
                    writeln!(out, "  {issue}")?;
                }
            }
            if !orphans.is_empty() {
                writeln!(out, "Orphans ({}):", orphans.len())?;
                for task in orphans {
                    writeln!(
                        out,
                        "  {} | {} | {}",
                        task.id(),
                        task.workflow_name().unwrap_or("-"),
                        render::project_label(&task.project)
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn report<W: Write>(out: &mut W, id: &TaskId, outcome: RewriteOutcome) -> Result<()> {
    match outcome {
        RewriteOutcome::Written => writeln!(out, "updated task: {id}")?,
        RewriteOutcome::Unchanged => writeln!(out, "unchanged: {id}")?,
        RewriteOutcome::Aborted(reason) => writeln!(out, "skipped {id}: {}", reason.describe())?,
    }
    Ok(())
}

fn parse_task_id(raw: &str) -> Result<TaskId> {
    TaskId::from_str(raw).with_context(|| format!("Invalid task id: {raw}"))
}

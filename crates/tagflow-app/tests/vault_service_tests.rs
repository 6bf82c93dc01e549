#![allow(missing_docs, clippy::expect_used)]

use anyhow::Result;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tagflow_app::{
    IndexEvent, IndexIssue, IndexRepository, ProjectConfig, RewriteOutcome, SettingsChange, TaskFilterBuilder,
    TaskService,
};
use tagflow_core::id::TaskId;
use tagflow_core::status::TaskStatus;
use tagflow_store_fs::FsStore;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, content: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

const WORKFLOWS: &str = "# Workflows\n\n\
- [ ] Render #tpm/workflow/render #tpm/step/render/model #tpm/step/render/light #tpm/step/render/export\n";

fn vault() -> Result<TempDir> {
    let dir = TempDir::new()?;
    write(dir.path(), "art/workflows.md", WORKFLOWS)?;
    write(
        dir.path(),
        "art/scene/shots.md",
        "- [ ] Shot one #tpm/step/render/model #tpm/tag/hi\n- [x] Shot two #tpm/step/render/export\n",
    )?;
    write(dir.path(), "home/chores.md", "- [ ] Groceries #tpm/step/render/light\n- [ ] Laundry\n")?;
    write(
        dir.path(),
        ".tagflow/config.toml",
        "[projects]\ncompleted = [\"home/old\"]\nallow_subproject_workflows = true\n",
    )?;
    Ok(dir)
}

type Service = TaskService<Arc<FsStore>, Arc<FsStore>>;

fn open(dir: &Path) -> Result<Service> {
    let store = Arc::new(FsStore::open(dir)?);
    let config = ProjectConfig::from_workdir(dir)?;
    let repository = Arc::new(IndexRepository::new(Arc::clone(&store), config));
    repository.reload()?;
    Ok(TaskService::new(repository, store))
}

#[test]
fn index_classifies_vault() -> Result<()> {
    let dir = vault()?;
    let service = open(dir.path())?;
    let index = service.repository().snapshot()?;

    assert_eq!(index.generation(), 1);
    let render = index.workflow("render").expect("render workflow");
    assert_eq!(render.steps.len(), 3);
    assert_eq!(render.home_project, "art");

    assert_eq!(index.tasks_in_workflow("render").len(), 3);
    assert_eq!(index.tasks_in_step("render", "model").len(), 1);
    assert_eq!(index.unclassified_tasks().len(), 1);

    let groceries = TaskId::new("home/chores.md", 0);
    assert!(index.is_orphan(&groceries));
    assert_eq!(index.orphans().len(), 1);
    assert!(index.project("art/scene").is_some());
    assert_eq!(index.children_of("art").len(), 1);
    Ok(())
}

#[test]
fn filters_combine_clauses() -> Result<()> {
    let dir = vault()?;
    let service = open(dir.path())?;
    let index = service.repository().snapshot()?;

    let filter = TaskFilterBuilder::new()
        .with_projects(&["art".to_owned()])
        .with_status_kinds(&["todo".to_owned()], &[])?
        .build();
    let hits = index.filtered(&filter);
    assert_eq!(hits.len(), 2);

    let orphans = TaskFilterBuilder::new().orphans_only(true).build();
    let hits = index.filtered(&orphans);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].item.path, "home/chores.md");
    Ok(())
}

#[test]
fn service_edits_land_on_disk_and_refresh_index() -> Result<()> {
    let dir = vault()?;
    let service = open(dir.path())?;
    let mut events = service.repository().subscribe();
    let shot = TaskId::new("art/scene/shots.md", 0);

    assert_eq!(service.advance_step(&shot)?, RewriteOutcome::Written);
    assert_eq!(
        fs::read_to_string(dir.path().join("art/scene/shots.md"))?,
        "- [ ] Shot one #tpm/tag/hi #tpm/step/render/light \n- [x] Shot two #tpm/step/render/export\n"
    );

    let index = service.repository().snapshot()?;
    assert_eq!(index.generation(), 2);
    assert_eq!(index.task(&shot).map(|task| task.steps.clone()), Some(vec!["light".to_owned()]));
    assert_eq!(events.try_recv()?, IndexEvent::Reloaded { generation: 2 });

    assert_eq!(service.set_status(&shot, TaskStatus::DONE)?, RewriteOutcome::Written);
    let index = service.repository().snapshot()?;
    assert_eq!(index.task(&shot).map(|task| task.status()), Some(TaskStatus::DONE));
    Ok(())
}

#[test]
fn external_edit_aborts_rewrite() -> Result<()> {
    let dir = vault()?;
    let service = open(dir.path())?;
    let edited = "- [ ] Laundry and ironing\n";
    write(dir.path(), "home/chores.md", edited)?;

    let laundry = TaskId::new("home/chores.md", 1);
    let outcome = service.toggle_status(&laundry)?;
    assert!(matches!(outcome, RewriteOutcome::Aborted(_)));
    assert_eq!(fs::read_to_string(dir.path().join("home/chores.md"))?, edited);
    Ok(())
}

#[test]
fn relaxed_orphans_after_settings_change() -> Result<()> {
    let dir = vault()?;
    let service = open(dir.path())?;
    let repository = service.repository();

    repository.update_settings(SettingsChange::UnclassifiedWorkflowsEverywhere(true))?;
    assert_eq!(repository.snapshot()?.orphans().len(), 1);

    write(dir.path(), "workflows.md", "- [ ] Errands #tpm/workflow/errand #tpm/step/errand/go\n")?;
    write(dir.path(), "home/chores.md", "- [ ] Groceries #tpm/step/errand/go\n- [ ] Laundry\n")?;
    repository.refresh()?;
    let index = repository.snapshot()?;
    assert!(index.orphans().is_empty());
    assert!(
        index
            .issues()
            .iter()
            .all(|issue| !matches!(issue, IndexIssue::UnknownWorkflow { .. }))
    );
    Ok(())
}

#[test]
fn missing_config_uses_defaults() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "inbox.md", "- [ ] one #tpm/tag/lo\n")?;
    let service = open(dir.path())?;
    let index = service.repository().snapshot()?;
    assert_eq!(index.tasks().len(), 1);
    assert_eq!(index.tasks()[0].priority.rank(), Some(4));
    Ok(())
}

#[test]
fn non_utf8_document_is_skipped() -> Result<()> {
    let dir = vault()?;
    fs::write(dir.path().join("home/latin1.md"), b"- [ ] caf\xE9\n")?;
    let service = open(dir.path())?;
    let index = service.repository().snapshot()?;
    assert_eq!(index.tasks().len(), 5);
    assert!(index.tasks().iter().all(|task| task.item.path != "home/latin1.md"));
    assert!(index.workflow("render").is_some());
    Ok(())
}

#![allow(missing_docs)]

use anyhow::Result;
use std::fs;
use std::path::Path;
use tagflow_core::status::TaskStatus;
use tagflow_store_fs::FsStore;
use tempfile::TempDir;
use time::{Duration, OffsetDateTime};

fn write(root: &Path, relative: &str, content: &str) -> Result<()> {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, content)?;
    Ok(())
}

#[test]
fn lists_markdown_files_and_skips_hidden_entries() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "inbox.md", "- [ ] a\n")?;
    write(dir.path(), "work/site/plan.md", "- [ ] b\n")?;
    write(dir.path(), "work/notes.txt", "- [ ] not markdown\n")?;
    write(dir.path(), ".tagflow/config.md", "- [ ] hidden dir\n")?;
    write(dir.path(), "work/.draft.md", "- [ ] hidden file\n")?;

    let store = FsStore::open(dir.path())?;
    assert_eq!(store.list_files()?, vec!["inbox.md", "work/site/plan.md"]);
    Ok(())
}

#[test]
fn scans_items_with_relative_paths() -> Result<()> {
    let dir = TempDir::new()?;
    write(
        dir.path(),
        "work/plan.md",
        "# Plan\n\n- [ ] first #tpm/tag/hi\n  continued here\n- [x] second\n- plain bullet\n",
    )?;

    let store = FsStore::open(dir.path())?;
    let items = store.load_items("work/plan.md")?;
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].path, "work/plan.md");
    assert_eq!(items[0].line, 2);
    assert_eq!(items[0].line_count, 2);
    assert_eq!(items[0].text, "first #tpm/tag/hi\ncontinued here");
    assert_eq!(items[1].status, TaskStatus::DONE);
    Ok(())
}

#[test]
fn modified_since_filters_by_mtime() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "a.md", "- [ ] a\n")?;
    let store = FsStore::open(dir.path())?;

    let past = OffsetDateTime::now_utc() - Duration::hours(1);
    assert_eq!(store.list_files_modified_since(past)?, vec!["a.md"]);

    let future = OffsetDateTime::now_utc() + Duration::hours(1);
    assert!(store.list_files_modified_since(future)?.is_empty());
    Ok(())
}

#[test]
fn read_and_write_round_trip_raw_text() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "crlf.md", "- [ ] a\r\n- [ ] b\r\n")?;
    let store = FsStore::open(dir.path())?;

    let content = store.read("crlf.md")?;
    assert_eq!(content, "- [ ] a\r\n- [ ] b\r\n");
    store.write("crlf.md", "- [x] a\r\n- [ ] b\r\n")?;
    assert_eq!(fs::read_to_string(dir.path().join("crlf.md"))?, "- [x] a\r\n- [ ] b\r\n");

    assert!(store.write("../escape.md", "x").is_err());
    assert!(!dir.path().join("../escape.md").exists());
    Ok(())
}

#[test]
fn write_replaces_document_without_leaving_staging_files() -> Result<()> {
    let dir = TempDir::new()?;
    write(dir.path(), "notes/todo.md", "- [ ] a\n- [ ] b\n- [ ] c\n")?;
    let store = FsStore::open(dir.path())?;

    store.write("notes/todo.md", "- [x] a\n")?;
    assert_eq!(fs::read_to_string(dir.path().join("notes/todo.md"))?, "- [x] a\n");

    let entries: Vec<_> = fs::read_dir(dir.path().join("notes"))?
        .map(|entry| entry.map(|e| e.file_name()))
        .collect::<std::io::Result<_>>()?;
    assert_eq!(entries, vec![std::ffi::OsString::from("todo.md")]);

    assert!(store.write("missing/new.md", "- [ ] x\n").is_err());
    assert!(!dir.path().join("missing").exists());
    Ok(())
}

#[cfg(unix)]
#[test]
fn write_keeps_document_permissions() -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new()?;
    write(dir.path(), "todo.md", "- [ ] a\n")?;
    let path = dir.path().join("todo.md");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o640))?;
    let store = FsStore::open(dir.path())?;

    store.write("todo.md", "- [x] a\n")?;
    assert_eq!(fs::metadata(&path)?.permissions().mode() & 0o777, 0o640);
    Ok(())
}

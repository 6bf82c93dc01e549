//! Checklist-line rewriter backed by a raw document store.

use anyhow::Error;
use serde::Serialize;
use std::sync::Arc;
use tagflow_core::checklist::{AbortReason, DocumentRewrite, is_noop, rewrite_document};
use tagflow_core::id::TaskId;
use tagflow_core::item::RawItem;
use tagflow_core::status::TaskStatus;
use tagflow_core::tags::TagError;
use tagflow_store_fs::{FsStore, FsStoreError};
use tracing::{debug, info};

/// Raw document access required by [`TaskWriter`].
pub trait FileStore {
    /// Error type bubbled up from the backing store.
    type Error: Into<Error>;

    /// Read the full text of a document.
    ///
    /// # Errors
    /// Returns a store-specific error when the document cannot be read.
    fn read(&self, path: &str) -> Result<String, Self::Error>;

    /// Replace the full text of a document.
    ///
    /// # Errors
    /// Returns a store-specific error when the document cannot be written.
    fn write(&self, path: &str, content: &str) -> Result<(), Self::Error>;
}

/// Result of a rewrite attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum RewriteOutcome {
    /// The document was rewritten.
    Written,
    /// Nothing to change; the document was not touched.
    Unchanged,
    /// The document no longer matches the task; nothing was written.
    Aborted(AbortReason),
}

impl RewriteOutcome {
    /// True for [`RewriteOutcome::Written`].
    #[must_use]
    pub const fn is_written(self) -> bool {
        matches!(self, Self::Written)
    }
}

/// Writes status and text changes of one checklist item back to its document.
pub struct TaskWriter<F> {
    store: F,
}

impl<F> TaskWriter<F> {
    /// Construct a new writer.
    pub const fn new(store: F) -> Self {
        Self { store }
    }

    /// Expose a reference to the underlying store.
    pub const fn store(&self) -> &F {
        &self.store
    }
}

impl<F> TaskWriter<F>
where
    F: FileStore,
{
    fn store_error(err: F::Error) -> TaskWriteError {
        TaskWriteError::Store(err.into())
    }

    /// Rewrite `item` with `status` and, when given, replacement `text`.
    ///
    /// The document is read fresh and re-validated; a stale item yields
    /// [`RewriteOutcome::Aborted`] and leaves the file byte-identical.
    ///
    /// # Errors
    /// Returns [`TaskWriteError::Store`] when reading or writing fails.
    pub fn rewrite(
        &self,
        item: &RawItem,
        status: TaskStatus,
        text: Option<&str>,
    ) -> Result<RewriteOutcome, TaskWriteError> {
        if is_noop(item, status, text) {
            return Ok(RewriteOutcome::Unchanged);
        }

        let content = self.store.read(&item.path).map_err(Self::store_error)?;
        match rewrite_document(&content, item, status, text) {
            DocumentRewrite::Unchanged => Ok(RewriteOutcome::Unchanged),
            DocumentRewrite::Aborted(reason) => {
                debug!(task = %item.id(), reason = reason.describe(), "Aborted checklist rewrite");
                Ok(RewriteOutcome::Aborted(reason))
            }
            DocumentRewrite::Rewritten(updated) => {
                if updated == content {
                    return Ok(RewriteOutcome::Unchanged);
                }
                self.store
                    .write(&item.path, &updated)
                    .map_err(Self::store_error)?;
                info!(task = %item.id(), status = %status.glyph(), "Rewrote checklist item");
                Ok(RewriteOutcome::Written)
            }
        }
    }
}

/// Errors surfaced by [`TaskWriter`] and the task service.
#[derive(thiserror::Error, Debug)]
pub enum TaskWriteError {
    /// Target task could not be found.
    #[error("task {0} not found")]
    MissingTask(TaskId),
    /// User supplied tag is not a valid tag.
    #[error(transparent)]
    InvalidTag(#[from] TagError),
    /// The task is not bound to exactly one workflow.
    #[error("task {0} is not bound to a workflow")]
    NotInWorkflow(TaskId),
    /// The workflow has no such step.
    #[error("workflow '{workflow}' has no step '{step}'")]
    UnknownStep {
        /// Workflow name.
        workflow: String,
        /// Requested step.
        step: String,
    },
    /// The operation needs a workflow of another kind.
    #[error("workflow '{workflow}' is not a {expected} workflow")]
    WrongWorkflowKind {
        /// Workflow name.
        workflow: String,
        /// Kind the operation requires.
        expected: &'static str,
    },
    /// The requested priority rank is not configured.
    #[error("priority rank {rank} is out of range (0..{len})")]
    PriorityOutOfRange {
        /// Requested rank.
        rank: usize,
        /// Configured priority tag count.
        len: usize,
    },
    /// Backing store returned an error.
    #[error("store error: {0}")]
    Store(#[from] Error),
}

impl FileStore for FsStore {
    type Error = FsStoreError;

    fn read(&self, path: &str) -> Result<String, Self::Error> {
        Self::read(self, path)
    }

    fn write(&self, path: &str, content: &str) -> Result<(), Self::Error> {
        Self::write(self, path, content)
    }
}

impl<S> FileStore for &S
where
    S: FileStore + ?Sized,
{
    type Error = S::Error;

    fn read(&self, path: &str) -> Result<String, Self::Error> {
        (*self).read(path)
    }

    fn write(&self, path: &str, content: &str) -> Result<(), Self::Error> {
        (*self).write(path, content)
    }
}

impl<S> FileStore for Arc<S>
where
    S: FileStore + ?Sized,
{
    type Error = S::Error;

    fn read(&self, path: &str) -> Result<String, Self::Error> {
        (**self).read(path)
    }

    fn write(&self, path: &str, content: &str) -> Result<(), Self::Error> {
        (**self).write(path, content)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    #[derive(Default)]
    struct MockStore {
        files: RefCell<HashMap<String, String>>,
        reads: RefCell<usize>,
        writes: RefCell<usize>,
    }

    impl MockStore {
        fn with_file(self, path: &str, content: &str) -> Self {
            self.files.borrow_mut().insert(path.into(), content.into());
            self
        }

        fn content(&self, path: &str) -> String {
            self.files.borrow().get(path).cloned().unwrap_or_default()
        }
    }

    impl FileStore for MockStore {
        type Error = anyhow::Error;

        fn read(&self, path: &str) -> Result<String, Self::Error> {
            *self.reads.borrow_mut() += 1;
            self.files
                .borrow()
                .get(path)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("missing {path}"))
        }

        fn write(&self, path: &str, content: &str) -> Result<(), Self::Error> {
            *self.writes.borrow_mut() += 1;
            self.files.borrow_mut().insert(path.into(), content.into());
            Ok(())
        }
    }

    fn item(line: usize, line_count: usize, status: char, text: &str) -> RawItem {
        RawItem {
            path: "note.md".into(),
            line,
            line_count,
            symbol: "-".into(),
            status: TaskStatus(status),
            text: text.into(),
        }
    }

    #[test]
    fn noop_does_not_read_the_file() {
        let store = MockStore::default();
        let writer = TaskWriter::new(&store);
        let outcome = writer
            .rewrite(&item(0, 1, ' ', "task"), TaskStatus::OPEN, Some("task"))
            .expect("noop");
        assert_eq!(outcome, RewriteOutcome::Unchanged);
        assert_eq!(*store.reads.borrow(), 0);
    }

    #[test]
    fn status_change_preserves_prefix_and_crlf() {
        let store = MockStore::default().with_file("note.md", "# T\r\n  > - [ ] call bob\r\n- [ ] other\r\n");
        let writer = TaskWriter::new(&store);
        let outcome = writer
            .rewrite(&item(1, 1, ' ', "call bob"), TaskStatus::DONE, None)
            .expect("rewrite");
        assert_eq!(outcome, RewriteOutcome::Written);
        assert_eq!(store.content("note.md"), "# T\r\n  > - [x] call bob\r\n- [ ] other\r\n");
    }

    #[test]
    fn concurrent_edit_aborts_without_writing() {
        let original = "- [ ] edited elsewhere\n";
        let store = MockStore::default().with_file("note.md", original);
        let writer = TaskWriter::new(&store);
        let outcome = writer
            .rewrite(&item(0, 1, ' ', "original text"), TaskStatus::DONE, None)
            .expect("rewrite");
        assert_eq!(outcome, RewriteOutcome::Aborted(AbortReason::StaleText));
        assert_eq!(store.content("note.md"), original);
        assert_eq!(*store.writes.borrow(), 0);
    }

    #[test]
    fn multi_line_text_replaces_recorded_span() {
        let store = MockStore::default().with_file("note.md", "- [ ] first\n  more\n- [ ] next\n");
        let writer = TaskWriter::new(&store);
        let outcome = writer
            .rewrite(
                &item(0, 2, ' ', "first\nmore"),
                TaskStatus('/'),
                Some("first #t\nmore\nextra"),
            )
            .expect("rewrite");
        assert!(outcome.is_written());
        assert_eq!(
            store.content("note.md"),
            "- [/] first #t\n\tmore\n\textra\n- [ ] next\n"
        );
    }

    #[test]
    fn store_errors_propagate() {
        let store = MockStore::default();
        let writer = TaskWriter::new(&store);
        let err = writer
            .rewrite(&item(0, 1, ' ', "x"), TaskStatus::DONE, None)
            .expect_err("missing file");
        assert!(matches!(err, TaskWriteError::Store(_)));
    }
}

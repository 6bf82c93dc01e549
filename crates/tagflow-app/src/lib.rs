//! Application layer logic for tagflow.
//!
//! This crate provides configuration, the workflow/task index and its
//! repository, the checklist rewriter, and the task service used by the CLI.

pub mod config;
pub mod filter_util;
pub mod index;
pub mod service;
pub mod task_patch;
pub mod task_repository;
pub mod task_writer;

// Re-exports for convenience
pub use config::{ConfigError, ProjectConfig, SettingsChange, TagPrefixes};
pub use filter_util::{FilterBuildError, TaskFilterBuilder, parse_priority_token, parse_status_kind_tokens};
pub use index::{IndexIssue, IndexSettings, TaskIndex, WorkflowProgress};
pub use service::TaskService;
pub use task_patch::{SetDiff, TaskUpdate, apply_tag_diff};
pub use task_repository::{IndexEvent, IndexPhase, IndexRepository, TaskSource};
pub use task_writer::{FileStore, RewriteOutcome, TaskWriteError, TaskWriter};

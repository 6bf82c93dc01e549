//! Project paths and the project tree node.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::id::TaskId;

/// The root project that holds everything without a more specific project.
pub const ROOT_PROJECT: &str = "";

/// Where location-derived projects come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectSource {
    /// The folder holding the file (`a/b/note.md` → `a/b`).
    #[default]
    Folder,
    /// The file itself, without extension (`a/b/note.md` → `a/b/note`).
    File,
}

/// Node of the project tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Full project path, `""` for the root.
    pub name: String,
    /// Parent project, `None` only for the root.
    pub parent: Option<String>,
    /// Direct children.
    pub children: BTreeSet<String>,
    /// Tasks whose own project is this one.
    pub tasks: Vec<TaskId>,
    /// Workflows whose home is this project.
    pub workflows: Vec<String>,
    /// Marked completed in configuration, directly or through an ancestor.
    pub completed: bool,
}

/// Trim surrounding whitespace and slashes, collapse empty segments.
#[must_use]
pub fn normalize_project(raw: &str) -> String {
    raw.trim()
        .split('/')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent of a project path; the root has none.
#[must_use]
pub fn parent_project(project: &str) -> Option<&str> {
    if project.is_empty() {
        return None;
    }
    Some(project.rsplit_once('/').map_or(ROOT_PROJECT, |(parent, _)| parent))
}

/// True when `project` equals `ancestor` or lies below it.
#[must_use]
pub fn is_same_or_descendant(project: &str, ancestor: &str) -> bool {
    if ancestor.is_empty() || project == ancestor {
        return true;
    }
    project
        .strip_prefix(ancestor)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Project implied by a file's location.
#[must_use]
pub fn project_from_location(path: &str, source: ProjectSource) -> String {
    match source {
        ProjectSource::Folder => path
            .rsplit_once('/')
            .map_or_else(String::new, |(dir, _)| normalize_project(dir)),
        ProjectSource::File => {
            let stem = path
                .rsplit_once('.')
                .filter(|(_, ext)| !ext.contains('/'))
                .map_or(path, |(stem, _)| stem);
            normalize_project(stem)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_walk_to_root() {
        assert_eq!(parent_project("a/b/c"), Some("a/b"));
        assert_eq!(parent_project("a"), Some(ROOT_PROJECT));
        assert_eq!(parent_project(ROOT_PROJECT), None);
    }

    #[test]
    fn descendant_checks_respect_segments() {
        assert!(is_same_or_descendant("a/b", "a"));
        assert!(is_same_or_descendant("a", "a"));
        assert!(is_same_or_descendant("anything", ROOT_PROJECT));
        assert!(!is_same_or_descendant("ab", "a"));
        assert!(!is_same_or_descendant("a", "a/b"));
    }

    #[test]
    fn location_projects() {
        assert_eq!(project_from_location("work/site/todo.md", ProjectSource::Folder), "work/site");
        assert_eq!(project_from_location("todo.md", ProjectSource::Folder), "");
        assert_eq!(project_from_location("work/todo.md", ProjectSource::File), "work/todo");
        assert_eq!(project_from_location("v1.2/notes", ProjectSource::File), "v1.2/notes");
    }

    #[test]
    fn normalization_drops_empty_segments() {
        assert_eq!(normalize_project(" /a//b/ "), "a/b");
        assert_eq!(normalize_project("/"), "");
    }
}

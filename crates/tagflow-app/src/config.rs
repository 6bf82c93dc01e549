use std::{fs, path::Path};

use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tagflow_core::priority::{DEFAULT_PRIORITY_TAGS, PriorityError, PriorityTags};
use tagflow_core::project::{ProjectSource, normalize_project};
use tagflow_core::tags::is_tag_name_valid;
use thiserror::Error;

const CONFIG_DIR: &str = ".tagflow";
const CONFIG_FILE: &str = "config.toml";

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A namespace prefix is not a `#`-prefixed valid tag.
    #[error("tag prefix '{key}' must be a valid tag starting with '#', got '{value}'")]
    InvalidPrefix {
        /// Prefix key in the `[tags]` table.
        key: &'static str,
        /// Rejected value.
        value: String,
    },
    /// Priority tag list rejected.
    #[error(transparent)]
    Priority(#[from] PriorityError),
    /// The summary trim pattern does not compile.
    #[error("summary trim pattern '{pattern}' is invalid: {source}")]
    InvalidTrimPattern {
        /// Rejected pattern.
        pattern: String,
        /// Regex compilation error.
        #[source]
        source: regex::Error,
    },
}

/// Top-level vault configuration loaded from `.tagflow/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Tag namespace prefixes.
    #[serde(default)]
    pub tags: TagPrefixes,
    /// Priority tag list.
    #[serde(default)]
    pub priority: PriorityConfig,
    /// Project derivation and orphan rules.
    #[serde(default)]
    pub projects: ProjectsConfig,
    /// Display-only options.
    #[serde(default)]
    pub display: DisplayConfig,
}

impl ProjectConfig {
    /// Load configuration from a vault directory; a missing file yields defaults.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, parsed, or validated.
    pub fn from_workdir(workdir: impl AsRef<Path>) -> Result<Self> {
        let config_path = workdir.as_ref().join(CONFIG_DIR).join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse {}", config_path.display()))?;
        config
            .validate()
            .with_context(|| format!("invalid configuration in {}", config_path.display()))?;
        Ok(config)
    }

    /// Check every constrained value.
    ///
    /// # Errors
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tags.validate()?;
        self.priority.priority_tags()?;
        self.display.trim_regex()?;
        Ok(())
    }

    /// Return a copy with `change` applied, leaving `self` untouched.
    ///
    /// # Errors
    /// Returns a [`ConfigError`] when the changed configuration is invalid.
    pub fn with_change(&self, change: &SettingsChange) -> Result<Self, ConfigError> {
        let mut next = self.clone();
        match change {
            SettingsChange::PriorityTags(tags) => next.priority.tags.clone_from(tags),
            SettingsChange::CompletedProjects(projects) => {
                next.projects.completed.clone_from(projects);
            }
            SettingsChange::AllowSubprojectWorkflows(flag) => {
                next.projects.allow_subproject_workflows = *flag;
            }
            SettingsChange::UnclassifiedWorkflowsEverywhere(flag) => {
                next.projects.unclassified_workflows_everywhere = *flag;
            }
            SettingsChange::ProjectSource(source) => next.projects.source = *source,
            SettingsChange::SummaryTrimPattern(pattern) => {
                next.display.summary_trim_pattern.clone_from(pattern);
            }
        }
        next.validate()?;
        Ok(next)
    }
}

/// Namespace prefixes of the recognised tag families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TagPrefixes {
    /// Workflow definitions: `<workflow>/<name>`.
    pub workflow: String,
    /// Workflow kinds: `<workflow_type>/chain|checkbox`.
    pub workflow_type: String,
    /// Step membership: `<step>/<workflow>/<step>`.
    pub step: String,
    /// Plain tags (priority tags live here by default).
    pub tag: String,
    /// Explicit projects: `<project>/<path>`.
    pub project: String,
}

impl Default for TagPrefixes {
    fn default() -> Self {
        Self {
            workflow: "#tpm/workflow".into(),
            workflow_type: "#tpm/workflow_type".into(),
            step: "#tpm/step".into(),
            tag: "#tpm/tag".into(),
            project: "#tpm/project".into(),
        }
    }
}

impl TagPrefixes {
    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("workflow", &self.workflow),
            ("workflow_type", &self.workflow_type),
            ("step", &self.step),
            ("tag", &self.tag),
            ("project", &self.project),
        ] {
            let valid = value
                .strip_prefix('#')
                .is_some_and(|name| is_tag_name_valid(name) && !name.ends_with('/'));
            if !valid {
                return Err(ConfigError::InvalidPrefix {
                    key,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }
}

/// `[priority]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityConfig {
    /// Priority tags, highest first.
    pub tags: Vec<String>,
}

impl Default for PriorityConfig {
    fn default() -> Self {
        Self {
            tags: DEFAULT_PRIORITY_TAGS.iter().map(|tag| (*tag).to_owned()).collect(),
        }
    }
}

impl PriorityConfig {
    /// Validated priority list.
    ///
    /// # Errors
    /// Returns [`ConfigError::Priority`] for too many, duplicate or invalid tags.
    pub fn priority_tags(&self) -> Result<PriorityTags, ConfigError> {
        Ok(PriorityTags::new(&self.tags)?)
    }
}

/// `[projects]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectsConfig {
    /// Where location-derived projects come from.
    pub source: ProjectSource,
    /// Projects marked completed; descendants inherit the flag.
    pub completed: Vec<String>,
    /// Tasks in descendants of a workflow's home project are not orphans.
    pub allow_subproject_workflows: bool,
    /// Workflows defined in the root project are valid everywhere.
    pub unclassified_workflows_everywhere: bool,
}

impl ProjectsConfig {
    /// Completed projects, normalised.
    #[must_use]
    pub fn completed_projects(&self) -> Vec<String> {
        self.completed.iter().map(|project| normalize_project(project)).collect()
    }
}

/// `[display]` table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Regex whose matches are removed from task summaries.
    pub summary_trim_pattern: Option<String>,
}

impl DisplayConfig {
    /// Compiled trim pattern, `None` when unset or blank.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidTrimPattern`] when the pattern does not compile.
    pub fn trim_regex(&self) -> Result<Option<Regex>, ConfigError> {
        let Some(pattern) = self
            .summary_trim_pattern
            .as_deref()
            .filter(|pattern| !pattern.trim().is_empty())
        else {
            return Ok(None);
        };
        Regex::new(pattern)
            .map(Some)
            .map_err(|source| ConfigError::InvalidTrimPattern {
                pattern: pattern.to_owned(),
                source,
            })
    }
}

/// A single runtime settings mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsChange {
    /// Replace the priority tag list.
    PriorityTags(Vec<String>),
    /// Replace the completed project list.
    CompletedProjects(Vec<String>),
    /// Toggle the subproject relaxation of orphan detection.
    AllowSubprojectWorkflows(bool),
    /// Toggle the root-project relaxation of orphan detection.
    UnclassifiedWorkflowsEverywhere(bool),
    /// Switch between folder and file derived projects.
    ProjectSource(ProjectSource),
    /// Replace the summary trim pattern.
    SummaryTrimPattern(Option<String>),
}

impl SettingsChange {
    /// Dotted configuration key.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::PriorityTags(_) => "priority.tags",
            Self::CompletedProjects(_) => "projects.completed",
            Self::AllowSubprojectWorkflows(_) => "projects.allow_subproject_workflows",
            Self::UnclassifiedWorkflowsEverywhere(_) => "projects.unclassified_workflows_everywhere",
            Self::ProjectSource(_) => "projects.source",
            Self::SummaryTrimPattern(_) => "display.summary_trim_pattern",
        }
    }

    /// New value as JSON, for change notifications.
    #[must_use]
    pub fn value(&self) -> Value {
        match self {
            Self::PriorityTags(values) | Self::CompletedProjects(values) => json!(values),
            Self::AllowSubprojectWorkflows(flag) | Self::UnclassifiedWorkflowsEverywhere(flag) => json!(flag),
            Self::ProjectSource(source) => json!(source),
            Self::SummaryTrimPattern(pattern) => json!(pattern),
        }
    }

    /// Whether the change alters task classification and needs a rebuild.
    #[must_use]
    pub const fn affects_classification(&self) -> bool {
        !matches!(self, Self::SummaryTrimPattern(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_config(dir: &Path, body: &str) -> Result<()> {
        let cfg_dir = dir.join(CONFIG_DIR);
        fs::create_dir_all(&cfg_dir)?;
        let mut file = fs::File::create(cfg_dir.join(CONFIG_FILE))?;
        writeln!(file, "{body}")?;
        Ok(())
    }

    #[test]
    fn missing_config_returns_defaults() -> Result<()> {
        let dir = tempdir()?;
        let cfg = ProjectConfig::from_workdir(dir.path())?;
        assert_eq!(cfg.tags.step, "#tpm/step");
        assert_eq!(cfg.priority.tags.len(), 5);
        assert_eq!(cfg.projects.source, ProjectSource::Folder);
        assert!(!cfg.projects.allow_subproject_workflows);
        assert!(cfg.display.trim_regex()?.is_none());
        Ok(())
    }

    #[test]
    fn partial_config_keeps_other_defaults() -> Result<()> {
        let dir = tempdir()?;
        write_config(
            dir.path(),
            "[tags]\nstep = \"#flow/step\"\n\n[priority]\ntags = [\"urgent\", \"#later\"]\n\n[projects]\nsource = \"file\"\ncompleted = [\"/archive/\"]\nallow_subproject_workflows = true\n\n[display]\nsummary_trim_pattern = \"#flow/\\\\S+\"",
        )?;

        let cfg = ProjectConfig::from_workdir(dir.path())?;
        assert_eq!(cfg.tags.step, "#flow/step");
        assert_eq!(cfg.tags.workflow, "#tpm/workflow");
        assert_eq!(cfg.priority.priority_tags()?.tags(), ["#urgent", "#later"]);
        assert_eq!(cfg.projects.source, ProjectSource::File);
        assert_eq!(cfg.projects.completed_projects(), vec!["archive".to_owned()]);
        assert!(cfg.projects.allow_subproject_workflows);
        let Some(trim) = cfg.display.trim_regex()? else {
            panic!("trim pattern configured");
        };
        assert!(trim.is_match("#flow/step/x"));
        Ok(())
    }

    #[test]
    fn too_many_priority_tags_are_rejected() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path(), "[priority]\ntags = [\"a\", \"b\", \"c\", \"d\", \"e\", \"f\"]")?;

        let Err(err) = ProjectConfig::from_workdir(dir.path()) else {
            panic!("six priority tags should error");
        };
        assert!(format!("{err:#}").contains("at most 5 priority tags"));
        Ok(())
    }

    #[test]
    fn invalid_prefix_is_rejected() -> Result<()> {
        let dir = tempdir()?;
        write_config(dir.path(), "[tags]\nworkflow = \"tpm/workflow\"")?;

        let Err(err) = ProjectConfig::from_workdir(dir.path()) else {
            panic!("prefix without '#' should error");
        };
        assert!(format!("{err:#}").contains("tag prefix 'workflow'"));
        Ok(())
    }

    #[test]
    fn with_change_validates_and_leaves_original() {
        let cfg = ProjectConfig::default();
        let rejected = cfg.with_change(&SettingsChange::PriorityTags(vec!["bad tag".into()]));
        assert!(matches!(rejected, Err(ConfigError::Priority(PriorityError::InvalidTag(_)))));
        assert_eq!(cfg, ProjectConfig::default());

        let rejected = cfg.with_change(&SettingsChange::SummaryTrimPattern(Some("(".into())));
        assert!(matches!(rejected, Err(ConfigError::InvalidTrimPattern { .. })));

        let Ok(next) = cfg.with_change(&SettingsChange::AllowSubprojectWorkflows(true)) else {
            panic!("flag change is valid");
        };
        assert!(next.projects.allow_subproject_workflows);
    }

    #[test]
    fn settings_change_metadata() {
        let change = SettingsChange::CompletedProjects(vec!["done".into()]);
        assert_eq!(change.key(), "projects.completed");
        assert_eq!(change.value(), json!(["done"]));
        assert!(change.affects_classification());

        let trim = SettingsChange::SummaryTrimPattern(None);
        assert!(!trim.affects_classification());
        assert_eq!(trim.value(), Value::Null);
        assert_eq!(SettingsChange::ProjectSource(ProjectSource::File).value(), json!("file"));
    }
}

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Identifier of a checklist item: owning file plus zero-based line.
///
/// Rendered as `path:line`. Identifiers are only stable within one index
/// generation; an edit above the item shifts its line.
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Default)]
pub struct TaskId {
    /// Vault-relative path with `/` separators.
    pub path: String,
    /// Zero-based line number of the item's first line.
    pub line: usize,
}

impl TaskId {
    /// Build an identifier from its parts.
    #[must_use]
    pub fn new(path: impl Into<String>, line: usize) -> Self {
        Self {
            path: path.into(),
            line,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.path, self.line)
    }
}

/// Failure to parse a `path:line` identifier.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskIdError {
    /// No `:` separator.
    #[error("task id '{0}' must look like path:line")]
    MissingLine(String),
    /// The part after the last `:` is not a number.
    #[error("task id '{0}' has an invalid line number")]
    InvalidLine(String),
    /// Nothing before the separator.
    #[error("task id '{0}' has an empty path")]
    EmptyPath(String),
}

impl FromStr for TaskId {
    type Err = TaskIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, line) = s
            .rsplit_once(':')
            .ok_or_else(|| TaskIdError::MissingLine(s.to_owned()))?;
        if path.is_empty() {
            return Err(TaskIdError::EmptyPath(s.to_owned()));
        }
        let line = line
            .trim()
            .parse()
            .map_err(|_| TaskIdError::InvalidLine(s.to_owned()))?;
        Ok(Self::new(path, line))
    }
}

impl Serialize for TaskId {
    fn serialize<S>(&self, s: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D>(d: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(d)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used)]

    use super::*;

    #[test]
    fn task_id_roundtrip() {
        let id = TaskId::new("notes/a:b.md", 12);
        let parsed: TaskId = id.to_string().parse().expect("must parse task id");
        assert_eq!(parsed, id);
    }

    #[test]
    fn task_id_rejects_malformed_input() {
        assert_eq!(
            "notes.md".parse::<TaskId>(),
            Err(TaskIdError::MissingLine("notes.md".into()))
        );
        assert_eq!(
            "notes.md:x".parse::<TaskId>(),
            Err(TaskIdError::InvalidLine("notes.md:x".into()))
        );
        assert_eq!(":3".parse::<TaskId>(), Err(TaskIdError::EmptyPath(":3".into())));
    }

    #[test]
    fn task_id_serializes_as_string() {
        let id = TaskId::new("a.md", 3);
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"a.md:3\"");
        let back: TaskId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }
}

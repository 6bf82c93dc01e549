//! Error types for vault store operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during `FsStore` operations.
#[derive(Error, Debug)]
pub enum FsStoreError {
    /// The vault root is missing or not a directory.
    #[error("Vault root is not a directory: {0}")]
    NotADirectory(PathBuf),

    /// A relative path escapes the vault root.
    #[error("Path is outside the vault root: {0}")]
    PathOutsideRoot(String),

    /// I/O operation failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path involved in the failing operation.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to acquire the item cache lock.
    #[error("Item cache lock error")]
    LockError,
}

impl FsStoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

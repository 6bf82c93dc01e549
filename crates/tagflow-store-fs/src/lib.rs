//! Directory-backed vault of Markdown documents for tagflow.

/// Error types for the vault store.
pub mod error;

use anyhow::{Context, Result, anyhow};
use lru::LruCache;
use std::fs;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use tagflow_core::checklist::scan_document;
use tagflow_core::item::RawItem;
use tempfile::NamedTempFile;
use time::OffsetDateTime;
use tracing::{debug, info};

pub use crate::error::FsStoreError;

const ITEM_CACHE_CAPACITY: usize = 256;
const DOCUMENT_EXTENSION: &str = "md";

/// Modification time plus size; mtimes alone are too coarse to spot quick rewrites.
#[derive(Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: SystemTime,
    len: u64,
}

#[derive(Clone)]
struct ScannedFile {
    stamp: FileStamp,
    items: Vec<RawItem>,
}

/// Storage over a directory of `*.md` files.
///
/// Paths handed in and out are vault-relative with `/` separators. Hidden
/// files and directories (leading `.`) are never listed.
pub struct FsStore {
    root: PathBuf,
    item_cache: Mutex<LruCache<String, ScannedFile>>,
}

impl FsStore {
    /// Open the vault rooted at `root`.
    ///
    /// # Errors
    /// Returns an error if `root` does not exist or is not a directory.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        let root = root
            .canonicalize()
            .with_context(|| format!("Failed to resolve vault root {}", root.display()))?;
        if !root.is_dir() {
            return Err(FsStoreError::NotADirectory(root).into());
        }
        let capacity = NonZeroUsize::new(ITEM_CACHE_CAPACITY)
            .ok_or_else(|| anyhow!("cache capacity must be non-zero"))?;
        Ok(Self {
            root,
            item_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    /// Absolute vault root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a vault-relative path onto the filesystem, refusing to leave the root.
    ///
    /// # Errors
    /// Returns [`FsStoreError::PathOutsideRoot`] for absolute paths, `..`
    /// components, or empty paths.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, FsStoreError> {
        let candidate = Path::new(relative);
        let mut resolved = self.root.clone();
        let mut depth = 0usize;
        for component in candidate.components() {
            match component {
                Component::Normal(part) => {
                    resolved.push(part);
                    depth += 1;
                }
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(FsStoreError::PathOutsideRoot(relative.to_owned()));
                }
            }
        }
        if depth == 0 {
            return Err(FsStoreError::PathOutsideRoot(relative.to_owned()));
        }
        Ok(resolved)
    }

    /// List every Markdown document, sorted by path.
    ///
    /// # Errors
    /// Returns an error if a directory cannot be read.
    pub fn list_files(&self) -> Result<Vec<String>, FsStoreError> {
        let mut files = Vec::new();
        self.walk(&self.root, &mut files)?;
        files.sort();
        Ok(files)
    }

    fn walk(&self, dir: &Path, out: &mut Vec<String>) -> Result<(), FsStoreError> {
        let entries = fs::read_dir(dir).map_err(|err| FsStoreError::io(dir, err))?;
        for entry in entries {
            let entry = entry.map_err(|err| FsStoreError::io(dir, err))?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with('.') {
                continue;
            }
            let path = entry.path();
            let file_type = entry.file_type().map_err(|err| FsStoreError::io(&path, err))?;
            if file_type.is_dir() {
                self.walk(&path, out)?;
            } else if file_type.is_file()
                && path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION)
                && let Some(relative) = self.relative_name(&path)
            {
                out.push(relative);
            }
        }
        Ok(())
    }

    fn relative_name(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|component| component.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }

    /// Last modification time of a document.
    ///
    /// # Errors
    /// Returns an error if the path is invalid or its metadata cannot be read.
    pub fn modified(&self, relative: &str) -> Result<OffsetDateTime, FsStoreError> {
        self.modified_system_time(relative).map(OffsetDateTime::from)
    }

    fn modified_system_time(&self, relative: &str) -> Result<SystemTime, FsStoreError> {
        self.stamp(relative).map(|stamp| stamp.modified)
    }

    fn stamp(&self, relative: &str) -> Result<FileStamp, FsStoreError> {
        let path = self.resolve(relative)?;
        fs::metadata(&path)
            .and_then(|meta| {
                Ok(FileStamp {
                    modified: meta.modified()?,
                    len: meta.len(),
                })
            })
            .map_err(|err| FsStoreError::io(path, err))
    }

    /// Documents whose modification time is at or after `since`.
    ///
    /// # Errors
    /// Returns an error if listing or reading metadata fails.
    pub fn list_files_modified_since(&self, since: OffsetDateTime) -> Result<Vec<String>, FsStoreError> {
        let mut modified = Vec::new();
        for file in self.list_files()? {
            if self.modified(&file)? >= since {
                modified.push(file);
            }
        }
        Ok(modified)
    }

    /// Read a document's raw text.
    ///
    /// # Errors
    /// Returns an error if the path is invalid or the file cannot be read.
    pub fn read(&self, relative: &str) -> Result<String, FsStoreError> {
        let path = self.resolve(relative)?;
        fs::read_to_string(&path).map_err(|err| FsStoreError::io(path, err))
    }

    /// Replace a document's raw text.
    ///
    /// The text is staged in a sibling temporary file and renamed over the
    /// document, so a failed write leaves the previous content in place.
    ///
    /// # Errors
    /// Returns an error if the path is invalid or the file cannot be written.
    pub fn write(&self, relative: &str, content: &str) -> Result<(), FsStoreError> {
        let path = self.resolve(relative)?;
        let dir = path.parent().unwrap_or(&self.root);
        let mut staged = NamedTempFile::new_in(dir).map_err(|err| FsStoreError::io(dir, err))?;
        if let Ok(meta) = fs::metadata(&path) {
            staged
                .as_file()
                .set_permissions(meta.permissions())
                .map_err(|err| FsStoreError::io(staged.path(), err))?;
        }
        staged
            .write_all(content.as_bytes())
            .and_then(|()| staged.as_file().sync_all())
            .map_err(|err| FsStoreError::io(&path, err))?;
        staged
            .persist(&path)
            .map_err(|err| FsStoreError::io(&path, err.error))?;
        self.invalidate(relative);
        info!(path = relative, bytes = content.len(), "Wrote document");
        Ok(())
    }

    /// Scan a document into checklist items, reusing the cached scan while
    /// the file's modification time and size are unchanged.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read.
    pub fn load_items(&self, relative: &str) -> Result<Vec<RawItem>, FsStoreError> {
        let stamp = self.stamp(relative)?;
        if let Some(items) = self.cached_items(relative, stamp) {
            debug!(path = relative, "Item cache hit");
            return Ok(items);
        }
        let content = self.read(relative)?;
        let items = scan_document(relative, &content);
        self.cache_items(relative, stamp, items.clone());
        Ok(items)
    }

    fn cached_items(&self, relative: &str, stamp: FileStamp) -> Option<Vec<RawItem>> {
        self.item_cache.lock().ok().and_then(|mut cache| {
            cache
                .get(relative)
                .filter(|scan| scan.stamp == stamp)
                .map(|scan| scan.items.clone())
        })
    }

    fn cache_items(&self, relative: &str, stamp: FileStamp, items: Vec<RawItem>) {
        if let Ok(mut cache) = self.item_cache.lock() {
            cache.put(relative.to_owned(), ScannedFile { stamp, items });
        }
    }

    /// Drop the cached scan of a document.
    pub fn invalidate(&self, relative: &str) {
        if let Ok(mut cache) = self.item_cache.lock() {
            cache.pop(relative);
        }
    }

    /// Drop every cached scan.
    ///
    /// # Errors
    /// Returns [`FsStoreError::LockError`] if the cache lock is poisoned.
    pub fn clear_cache(&self) -> Result<(), FsStoreError> {
        self.item_cache
            .lock()
            .map_err(|_| FsStoreError::LockError)?
            .clear();
        Ok(())
    }

    /// Number of cached document scans.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.item_cache.lock().map_or(0, |cache| cache.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn vault() -> Result<(TempDir, FsStore)> {
        let dir = TempDir::new()?;
        let store = FsStore::open(dir.path())?;
        Ok((dir, store))
    }

    #[test]
    fn resolve_rejects_escaping_paths() -> Result<()> {
        let (_dir, store) = vault()?;
        for bad in ["../x.md", "a/../../x.md", "/etc/passwd", "", "."] {
            assert!(
                matches!(store.resolve(bad), Err(FsStoreError::PathOutsideRoot(_))),
                "{bad} must be rejected"
            );
        }
        assert!(store.resolve("a/./b.md")?.ends_with("a/b.md"));
        Ok(())
    }

    #[test]
    fn load_items_caches_by_modification_time() -> Result<()> {
        let (dir, store) = vault()?;
        fs::write(dir.path().join("todo.md"), "- [ ] one\n- [x] two\n")?;

        let first = store.load_items("todo.md")?;
        assert_eq!(first.len(), 2);
        assert_eq!(store.cached_len(), 1);

        let again = store.load_items("todo.md")?;
        assert_eq!(first, again);

        store.write("todo.md", "- [ ] only\n")?;
        assert_eq!(store.cached_len(), 0);
        let rewritten = store.load_items("todo.md")?;
        assert_eq!(rewritten.len(), 1);
        assert_eq!(rewritten[0].text, "only");
        Ok(())
    }

    #[test]
    fn open_rejects_files() -> Result<()> {
        let dir = TempDir::new()?;
        let file = dir.path().join("plain.md");
        fs::write(&file, "")?;
        assert!(FsStore::open(&file).is_err());
        assert!(FsStore::open(dir.path().join("missing")).is_err());
        Ok(())
    }
}

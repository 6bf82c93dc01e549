//! Index repository: pulls raw items from a source and publishes immutable
//! [`TaskIndex`] generations.

use anyhow::{Context, Error, Result, anyhow};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tagflow_core::item::RawItem;
use tagflow_store_fs::{FsStore, FsStoreError};
use time::{Duration, OffsetDateTime};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::config::{ProjectConfig, SettingsChange};
use crate::index::{IndexSettings, TaskIndex};

const EVENT_CAPACITY: usize = 64;

// Filesystem mtimes come from a coarse clock and can trail `now_utc()`.
const MTIME_SLACK: Duration = Duration::seconds(1);

/// Read access to checklist items, grouped by document.
pub trait TaskSource {
    /// Error type bubbled up from the backing source.
    type Error: Into<Error>;

    /// Enumerate every document path.
    ///
    /// # Errors
    /// Returns a source-specific error when enumeration fails.
    fn list_files(&self) -> Result<Vec<String>, Self::Error>;

    /// Load the checklist items of one document.
    ///
    /// # Errors
    /// Returns a source-specific error when the document cannot be loaded.
    fn load_items(&self, path: &str) -> Result<Vec<RawItem>, Self::Error>;

    /// Documents modified at or after `since`. Defaults to every document.
    ///
    /// # Errors
    /// Returns a source-specific error when enumeration fails.
    fn list_files_modified_since(&self, _since: OffsetDateTime) -> Result<Vec<String>, Self::Error> {
        self.list_files()
    }

    /// Load every document's items. Documents that fail to load are logged
    /// and left out.
    ///
    /// # Errors
    /// Returns a source-specific error when enumeration fails.
    fn load_all_items(&self) -> Result<Vec<(String, Vec<RawItem>)>, Self::Error> {
        let mut loaded = Vec::new();
        for path in self.list_files()? {
            match self.load_items(&path) {
                Ok(items) => loaded.push((path, items)),
                Err(err) => skip_document(&path, &err.into()),
            }
        }
        Ok(loaded)
    }
}

fn skip_document(path: &str, err: &Error) {
    let error = format!("{err:#}");
    warn!(path, %error, "Skipping unreadable document");
}

impl TaskSource for FsStore {
    type Error = FsStoreError;

    fn list_files(&self) -> Result<Vec<String>, Self::Error> {
        Self::list_files(self)
    }

    fn load_items(&self, path: &str) -> Result<Vec<RawItem>, Self::Error> {
        Self::load_items(self, path)
    }

    fn list_files_modified_since(&self, since: OffsetDateTime) -> Result<Vec<String>, Self::Error> {
        Self::list_files_modified_since(self, since)
    }
}

impl<S> TaskSource for &S
where
    S: TaskSource + ?Sized,
{
    type Error = S::Error;

    fn list_files(&self) -> Result<Vec<String>, Self::Error> {
        (*self).list_files()
    }

    fn load_items(&self, path: &str) -> Result<Vec<RawItem>, Self::Error> {
        (*self).load_items(path)
    }

    fn list_files_modified_since(&self, since: OffsetDateTime) -> Result<Vec<String>, Self::Error> {
        (*self).list_files_modified_since(since)
    }

    fn load_all_items(&self) -> Result<Vec<(String, Vec<RawItem>)>, Self::Error> {
        (*self).load_all_items()
    }
}

impl<S> TaskSource for Arc<S>
where
    S: TaskSource + ?Sized,
{
    type Error = S::Error;

    fn list_files(&self) -> Result<Vec<String>, Self::Error> {
        (**self).list_files()
    }

    fn load_items(&self, path: &str) -> Result<Vec<RawItem>, Self::Error> {
        (**self).load_items(path)
    }

    fn list_files_modified_since(&self, since: OffsetDateTime) -> Result<Vec<String>, Self::Error> {
        (**self).list_files_modified_since(since)
    }

    fn load_all_items(&self) -> Result<Vec<(String, Vec<RawItem>)>, Self::Error> {
        (**self).load_all_items()
    }
}

/// Lifecycle of the published index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexPhase {
    /// Nothing has been loaded yet.
    Empty,
    /// A build is in progress; the previous generation stays readable.
    Loading,
    /// A generation is published.
    Ready,
}

/// Change notifications sent to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum IndexEvent {
    /// A new index generation was published.
    Reloaded {
        /// Generation number of the new index.
        generation: u64,
    },
    /// A setting was changed.
    SettingsChanged {
        /// Dotted configuration key.
        key: String,
        /// New value.
        value: Value,
    },
}

struct RepoState {
    phase: IndexPhase,
    index: Arc<TaskIndex>,
    files: BTreeMap<String, Vec<RawItem>>,
    last_refresh: Option<OffsetDateTime>,
    published_seq: u64,
}

struct Build {
    seq: u64,
    files: BTreeMap<String, Vec<RawItem>>,
    refreshed_at: Option<OffsetDateTime>,
    index: TaskIndex,
}

/// Repository that keeps raw items per document and publishes index snapshots.
pub struct IndexRepository<S> {
    source: S,
    config: RwLock<ProjectConfig>,
    state: RwLock<RepoState>,
    build_seq: AtomicU64,
    events: broadcast::Sender<IndexEvent>,
}

impl<S> IndexRepository<S> {
    /// Create an empty repository; nothing is loaded until [`Self::reload`].
    pub fn new(source: S, config: ProjectConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            source,
            config: RwLock::new(config),
            state: RwLock::new(RepoState {
                phase: IndexPhase::Empty,
                index: Arc::new(TaskIndex::default()),
                files: BTreeMap::new(),
                last_refresh: None,
                published_seq: 0,
            }),
            build_seq: AtomicU64::new(0),
            events,
        }
    }

    /// Expose the underlying source.
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Current lifecycle phase.
    ///
    /// # Errors
    /// Returns an error if the state lock is poisoned.
    pub fn phase(&self) -> Result<IndexPhase> {
        let state = self.state.read().map_err(|_| anyhow!("Failed to lock index state"))?;
        Ok(state.phase)
    }

    /// Last published index. Before the first build this is an empty index
    /// with generation 0.
    ///
    /// # Errors
    /// Returns an error if the state lock is poisoned.
    pub fn snapshot(&self) -> Result<Arc<TaskIndex>> {
        let state = self.state.read().map_err(|_| anyhow!("Failed to lock index state"))?;
        Ok(Arc::clone(&state.index))
    }

    /// Copy of the active configuration.
    ///
    /// # Errors
    /// Returns an error if the config lock is poisoned.
    pub fn config(&self) -> Result<ProjectConfig> {
        let config = self.config.read().map_err(|_| anyhow!("Failed to lock config"))?;
        Ok(config.clone())
    }

    /// Receive [`IndexEvent`]s published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: IndexEvent) {
        if self.events.send(event).is_err() {
            debug!("No index subscribers");
        }
    }

    fn begin_build(&self) -> Result<u64> {
        let seq = self.build_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.write().map_err(|_| anyhow!("Failed to lock index state"))?;
        state.phase = IndexPhase::Loading;
        drop(state);
        Ok(seq)
    }

    fn abandon_build(&self) {
        if let Ok(mut state) = self.state.write()
            && state.phase == IndexPhase::Loading
        {
            state.phase = if state.published_seq == 0 {
                IndexPhase::Empty
            } else {
                IndexPhase::Ready
            };
        }
    }

    fn index_settings(&self) -> Result<IndexSettings> {
        let config = self.config.read().map_err(|_| anyhow!("Failed to lock config"))?;
        IndexSettings::from_config(&config).context("Invalid index settings")
    }

    fn build_from(
        &self,
        seq: u64,
        files: BTreeMap<String, Vec<RawItem>>,
        refreshed_at: Option<OffsetDateTime>,
    ) -> Result<Build> {
        let settings = self.index_settings()?;
        let items: Vec<RawItem> = files.values().flatten().cloned().collect();
        let index = TaskIndex::build(items, &settings);
        Ok(Build {
            seq,
            files,
            refreshed_at,
            index,
        })
    }

    /// Swap in a finished build unless a newer one already won. Returns the
    /// published generation.
    fn publish(&self, build: Build) -> Result<Option<u64>> {
        let Build {
            seq,
            files,
            refreshed_at,
            index,
        } = build;
        let mut state = self.state.write().map_err(|_| anyhow!("Failed to lock index state"))?;
        if seq <= state.published_seq {
            debug!(seq, published = state.published_seq, "Discarded superseded index build");
            return Ok(None);
        }
        let generation = state.index.generation() + 1;
        let index = index.with_generation(generation);
        let issues = index.issues().len();
        let tasks = index.tasks().len();
        state.index = Arc::new(index);
        state.files = files;
        if refreshed_at.is_some() {
            state.last_refresh = refreshed_at;
        }
        state.published_seq = seq;
        if self.build_seq.load(Ordering::SeqCst) == seq {
            state.phase = IndexPhase::Ready;
        }
        drop(state);

        info!(generation, tasks, "Published task index");
        if issues > 0 {
            warn!(generation, issues, "Task index has issues");
        }
        self.emit(IndexEvent::Reloaded { generation });
        Ok(Some(generation))
    }

    fn run_build<F>(&self, load: F) -> Result<Option<u64>>
    where
        F: FnOnce(u64) -> Result<Option<Build>>,
    {
        let seq = self.begin_build()?;
        match load(seq) {
            Ok(Some(build)) => self.publish(build),
            Ok(None) => {
                self.abandon_build();
                Ok(None)
            }
            Err(err) => {
                self.abandon_build();
                Err(err)
            }
        }
    }

    /// Rebuild the graph from the cached raw items without touching the source.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid or a lock is poisoned.
    pub fn rebuild(&self) -> Result<Option<u64>> {
        self.run_build(|seq| {
            let files = {
                let state = self.state.read().map_err(|_| anyhow!("Failed to lock index state"))?;
                state.files.clone()
            };
            self.build_from(seq, files, None).map(Some)
        })
    }

    /// Apply a settings change, notify subscribers, and rebuild when the
    /// change affects classification.
    ///
    /// An invalid change is rejected and the previous configuration kept.
    ///
    /// # Errors
    /// Returns the [`crate::config::ConfigError`] of a rejected change, or an
    /// error if rebuilding fails.
    pub fn update_settings(&self, change: SettingsChange) -> Result<()> {
        let key = change.key();
        {
            let mut config = self.config.write().map_err(|_| anyhow!("Failed to lock config"))?;
            let next = match config.with_change(&change) {
                Ok(next) => next,
                Err(err) => {
                    warn!(key, error = %err, "Rejected settings change");
                    return Err(err.into());
                }
            };
            *config = next;
        }

        info!(key, "Settings changed");
        self.emit(IndexEvent::SettingsChanged {
            key: key.to_owned(),
            value: change.value(),
        });

        let loaded = self.phase()? != IndexPhase::Empty;
        if change.affects_classification() && loaded {
            self.rebuild()?;
        }
        Ok(())
    }
}

impl<S> IndexRepository<S>
where
    S: TaskSource,
{
    fn load_file(&self, path: &str) -> Result<Vec<RawItem>> {
        self.source
            .load_items(path)
            .map_err(Into::into)
            .with_context(|| format!("Failed to load items from {path}"))
    }

    /// Pull every document from the source and publish a new generation.
    ///
    /// # Errors
    /// Returns an error if the source fails or the configuration is invalid.
    pub fn reload(&self) -> Result<Option<u64>> {
        self.run_build(|seq| {
            let started = OffsetDateTime::now_utc() - MTIME_SLACK;
            let files: BTreeMap<String, Vec<RawItem>> = self
                .source
                .load_all_items()
                .map_err(Into::into)
                .context("Failed to load task source")?
                .into_iter()
                .collect();
            debug!(files = files.len(), "Loaded task source");
            self.build_from(seq, files, Some(started)).map(Some)
        })
    }

    /// Reload documents changed since the last refresh, drop removed ones,
    /// and rebuild. Falls back to [`Self::reload`] before the first load.
    /// A document that no longer loads is dropped from the index.
    ///
    /// Returns `None` when nothing changed.
    ///
    /// # Errors
    /// Returns an error if the source fails or the configuration is invalid.
    pub fn refresh(&self) -> Result<Option<u64>> {
        let (last_refresh, mut files) = {
            let state = self.state.read().map_err(|_| anyhow!("Failed to lock index state"))?;
            (state.last_refresh, state.files.clone())
        };
        let Some(last_refresh) = last_refresh else {
            return self.reload();
        };

        self.run_build(|seq| {
            let started = OffsetDateTime::now_utc() - MTIME_SLACK;
            let listed: BTreeSet<String> = self
                .source
                .list_files()
                .map_err(Into::into)
                .context("Failed to list task source")?
                .into_iter()
                .collect();
            let modified = self
                .source
                .list_files_modified_since(last_refresh)
                .map_err(Into::into)
                .context("Failed to list modified documents")?;

            let before = files.len();
            files.retain(|path, _| listed.contains(path));
            let removed = before - files.len();

            let mut changed: BTreeSet<String> = modified.into_iter().collect();
            changed.extend(listed.iter().filter(|path| !files.contains_key(*path)).cloned());
            if removed == 0 && changed.is_empty() {
                return Ok(None);
            }
            for path in &changed {
                match self.load_file(path) {
                    Ok(items) => {
                        files.insert(path.clone(), items);
                    }
                    Err(err) => {
                        skip_document(path, &err);
                        files.remove(path);
                    }
                }
            }
            debug!(changed = changed.len(), removed, "Refreshing task index");
            self.build_from(seq, files, Some(started)).map(Some)
        })
    }
}

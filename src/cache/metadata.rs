//! Metadata Store Module
//!
//! The authoritative in-memory record of every live entry, together with the
//! keyword index, mirrored to a side-car file in the cache root.
//!
//! Mutations are visible to readers immediately. Only the disk mirror is
//! deferred: `persist` schedules a debounced write, `flush` writes now. A
//! failed write leaves the in-memory state untouched; the next successful
//! write reconciles the file.

use std::collections::{BTreeMap, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::entry::current_timestamp_ms;
use crate::cache::{CacheEntry, KeywordIndex, SearchLogic};
use crate::error::{report, CacheError, ErrorSink, Result};
use crate::fs::FileSystem;
use crate::tasks::spawn_flush_task;

/// Name of the side-car file inside the cache root.
pub const SIDECAR_FILE_NAME: &str = "metadata.json";

// == Side-car File ==
/// On-disk form of the metadata store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SidecarFile {
    /// When the cache root was first initialized (Unix milliseconds)
    pub created_at: i64,
    /// Default compression flag in effect at the last write
    pub compress: bool,
    /// Hot-read buffer window in effect at the last write
    pub buffer_window_ms: u64,
    pub entries: BTreeMap<String, CacheEntry>,
    #[serde(default)]
    pub tags: KeywordIndex,
}

/// Settings recorded in the side-car header.
#[derive(Debug, Clone, Copy)]
pub struct SidecarSettings {
    pub compress: bool,
    pub buffer_window_ms: u64,
    pub debounce: Duration,
}

#[derive(Debug, Default)]
struct Records {
    entries: HashMap<String, CacheEntry>,
    tags: KeywordIndex,
}

#[derive(Debug)]
struct Sidecar {
    records: RwLock<Records>,
    path: PathBuf,
    tmp_path: PathBuf,
    fs: Arc<dyn FileSystem>,
    created_at: i64,
    settings: SidecarSettings,
    write_lock: AsyncMutex<()>,
}

impl Sidecar {
    fn snapshot(&self) -> SidecarFile {
        let records = self.records.read();
        SidecarFile {
            created_at: self.created_at,
            compress: self.settings.compress,
            buffer_window_ms: self.settings.buffer_window_ms,
            entries: records
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.clone()))
                .collect(),
            tags: records.tags.clone(),
        }
    }

    /// Writes the current state to a temp file and renames it into place.
    async fn write(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let snapshot = self.snapshot();
        let bytes = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| CacheError::Persist(format!("serialize metadata: {}", e)))?;

        self.fs
            .write(&self.tmp_path, &bytes)
            .await
            .map_err(|e| CacheError::Persist(format!("{}: {}", self.tmp_path.display(), e)))?;
        self.fs
            .rename(&self.tmp_path, &self.path)
            .await
            .map_err(|e| CacheError::Persist(format!("{}: {}", self.path.display(), e)))?;

        debug!(
            "Persisted {} entries to {}",
            snapshot.entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

// == Metadata Store ==
#[derive(Debug)]
pub struct MetadataStore {
    sidecar: Arc<Sidecar>,
    dirty: Arc<Notify>,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl MetadataStore {
    // == Load ==
    /// Opens the store for `root`, reading the side-car file if present.
    ///
    /// A missing file starts an empty store. A file that exists but cannot be
    /// read or parsed is a fatal error. Starts the debounced flush task, so
    /// this must run inside a tokio runtime.
    pub async fn load(
        root: &Path,
        fs: Arc<dyn FileSystem>,
        settings: SidecarSettings,
        error_sink: Option<ErrorSink>,
    ) -> Result<Self> {
        let path = root.join(SIDECAR_FILE_NAME);
        let tmp_path = root.join(format!("{}.tmp", SIDECAR_FILE_NAME));

        let (created_at, records) = match fs.read(&path).await {
            Ok(bytes) => {
                let file: SidecarFile =
                    serde_json::from_slice(&bytes).map_err(|e| CacheError::CorruptMetadata {
                        path: path.clone(),
                        reason: e.to_string(),
                    })?;
                info!(
                    "Loaded {} entries from {}",
                    file.entries.len(),
                    path.display()
                );
                (file.created_at, Records::from_file(file))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No metadata file at {}, starting empty", path.display());
                (current_timestamp_ms(), Records::default())
            }
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let sidecar = Arc::new(Sidecar {
            records: RwLock::new(records),
            path,
            tmp_path,
            fs,
            created_at,
            settings,
            write_lock: AsyncMutex::new(()),
        });

        let dirty = Arc::new(Notify::new());
        let flusher = {
            let sidecar = sidecar.clone();
            spawn_flush_task(dirty.clone(), settings.debounce, move || {
                let sidecar = sidecar.clone();
                let sink = error_sink.clone();
                async move {
                    if let Err(e) = sidecar.write().await {
                        report(sink.as_ref(), &e);
                    }
                }
            })
        };

        Ok(Self {
            sidecar,
            dirty,
            flusher: Mutex::new(Some(flusher)),
        })
    }

    // == Upsert ==
    /// Inserts or replaces the entry for `entry.key`, replacing its keyword
    /// registrations with `entry.search_tags`.
    pub fn upsert(&self, entry: CacheEntry) -> Option<CacheEntry> {
        let mut records = self.sidecar.records.write();
        records.tags.remove_key(&entry.key);
        for tag in &entry.search_tags {
            records.tags.add_tag(tag, &entry.key);
        }
        records.entries.insert(entry.key.clone(), entry)
    }

    // == Read ==
    pub fn read(&self, key: &str) -> Option<CacheEntry> {
        self.sidecar.records.read().entries.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sidecar.records.read().entries.contains_key(key)
    }

    // == Remove ==
    /// Removes the entry and its keyword registrations. Absent keys are a no-op.
    pub fn remove(&self, key: &str) -> Option<CacheEntry> {
        let mut records = self.sidecar.records.write();
        let removed = records.entries.remove(key);
        if removed.is_some() {
            records.tags.remove_key(key);
        }
        removed
    }

    // == Search ==
    pub fn search<S: AsRef<str>>(&self, keywords: &[S], logic: SearchLogic) -> Vec<String> {
        self.sidecar.records.read().tags.search(keywords, logic)
    }

    /// All live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let records = self.sidecar.records.read();
        let mut keys: Vec<String> = records.entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.sidecar.records.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sidecar.records.read().entries.is_empty()
    }

    /// Sum of formatted sizes of all entries.
    pub fn total_bytes(&self) -> u64 {
        self.sidecar
            .records
            .read()
            .entries
            .values()
            .map(|e| e.size_bytes as u64)
            .sum()
    }

    /// Entries carrying an expiry, for re-arming timers after a load.
    pub fn expiring_entries(&self) -> Vec<CacheEntry> {
        self.sidecar
            .records
            .read()
            .entries
            .values()
            .filter(|e| e.expire_after_ms > 0)
            .cloned()
            .collect()
    }

    /// Snapshot of what the side-car file would contain now.
    #[allow(dead_code)]
    pub fn snapshot(&self) -> SidecarFile {
        self.sidecar.snapshot()
    }

    // == Persist ==
    /// Schedules a debounced side-car write.
    pub fn persist(&self) {
        self.dirty.notify_one();
    }

    /// Writes the side-car file now.
    pub async fn flush(&self) -> Result<()> {
        self.sidecar.write().await
    }

    /// Stops the debounced flush task. Pending debounced writes are dropped;
    /// call `flush` first to keep them.
    pub fn shutdown(&self) {
        if let Some(handle) = self.flusher.lock().take() {
            handle.abort();
        }
    }
}

impl Drop for MetadataStore {
    fn drop(&mut self) {
        if let Some(handle) = self.flusher.get_mut().take() {
            handle.abort();
        }
    }
}

impl Records {
    /// Rebuilds records from a side-car file, dropping index references to
    /// keys the file has no entry for.
    fn from_file(file: SidecarFile) -> Self {
        let mut tags = file.tags;
        let dangling: Vec<String> = tags
            .keys()
            .into_iter()
            .filter(|k| !file.entries.contains_key(*k))
            .cloned()
            .collect();
        for key in dangling {
            tags.remove_key(&key);
        }
        Self {
            entries: file.entries.into_iter().collect(),
            tags,
        }
    }
}

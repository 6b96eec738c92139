//! Cache Store Module
//!
//! The cache engine. Coordinates the metadata store, keyword index, hot-read
//! buffer and expiry timers with the value files on disk.
//!
//! Per key an entry moves `absent -> live -> absent`; an overwriting `set`
//! keeps it live and re-arms or clears its expiry. All mutations of one key
//! run under that key's lock, so they apply in submission order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, trace, warn};

use crate::cache::entry::{current_timestamp_ms, storage_file_name};
use crate::cache::locks::KeyLocks;
use crate::cache::metadata::{MetadataStore, SidecarSettings};
use crate::cache::stats::Counters;
use crate::cache::{
    CacheEntry, CacheStats, ExpiryTimers, HotBuffer, SearchLogic, StoredValue,
};
use crate::codec::{Codec, GzipCodec};
use crate::config::CacheConfig;
use crate::error::{report, CacheError, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::pubsub::Notifier;

// == Set Options ==
/// Per-call overrides for `set`.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Compress this value; falls back to the configured default
    pub compress: Option<bool>,
    /// Expiry in milliseconds; falls back to the configured default. 0 = never
    pub expire_ms: Option<u64>,
    /// Keywords to make this entry searchable under
    pub search: Vec<String>,
}

impl SetOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compress(mut self, enabled: bool) -> Self {
        self.compress = Some(enabled);
        self
    }

    pub fn expire_ms(mut self, ms: u64) -> Self {
        self.expire_ms = Some(ms);
        self
    }

    pub fn search<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.search = tags.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug)]
struct Inner {
    root: PathBuf,
    config: CacheConfig,
    fs: Arc<dyn FileSystem>,
    codec: Arc<dyn Codec>,
    metadata: MetadataStore,
    buffer: HotBuffer,
    timers: ExpiryTimers,
    locks: KeyLocks,
    counters: Counters,
    notifier: Notifier,
    /// Mutations hold it shared; `shutdown` takes it exclusively
    gate: RwLock<()>,
    shut_down: AtomicBool,
}

// == File Cache ==
/// Handle to a cache instance. Clones share the same instance.
#[derive(Debug, Clone)]
pub struct FileCache {
    inner: Arc<Inner>,
}

impl FileCache {
    // == Setup ==
    /// Initializes a cache on the real filesystem with gzip compression.
    ///
    /// Creates the root directory, loads the side-car metadata file if
    /// present and re-arms expiry timers for loaded entries.
    pub async fn setup(config: CacheConfig) -> Result<Self> {
        Self::setup_with(config, Arc::new(TokioFileSystem), Arc::new(GzipCodec::default())).await
    }

    /// Initializes a cache with a custom filesystem and codec.
    pub async fn setup_with(
        config: CacheConfig,
        fs: Arc<dyn FileSystem>,
        codec: Arc<dyn Codec>,
    ) -> Result<Self> {
        let root = config.root_dir.clone();
        fs.create_dir_all(&root)
            .await
            .map_err(|e| CacheError::io(&root, e))?;

        let metadata = MetadataStore::load(
            &root,
            fs.clone(),
            SidecarSettings {
                compress: config.auto_compress,
                buffer_window_ms: config.buffer_window_ms,
                debounce: config.persist_debounce(),
            },
            config.error_sink.clone(),
        )
        .await?;

        let inner = Arc::new(Inner {
            buffer: HotBuffer::start(config.buffer_window()),
            root,
            config,
            fs,
            codec,
            metadata,
            timers: ExpiryTimers::new(),
            locks: KeyLocks::new(),
            counters: Counters::default(),
            notifier: Notifier::new(),
            gate: RwLock::new(()),
            shut_down: AtomicBool::new(false),
        });

        // already-elapsed entries get a 1ms timer rather than an inline delete
        let now = current_timestamp_ms();
        let mut stale = 0usize;
        for entry in inner.metadata.expiring_entries() {
            if let Some(delay) = entry.timer_delay_ms(now) {
                if entry.is_expired_at(now) {
                    stale += 1;
                }
                Inner::arm_expiry(&inner, &entry.key, delay);
            }
        }

        info!(
            "File cache ready at {} ({} entries, {} pending expiry, {} stale)",
            inner.root.display(),
            inner.metadata.len(),
            inner.timers.len(),
            stale
        );
        Ok(Self { inner })
    }

    // == Set ==
    /// Stores `content` under `key`, overwriting any previous value.
    ///
    /// Oversized content is reported and still written unless
    /// `strict_size_limit` is configured.
    pub async fn set(
        &self,
        key: &str,
        content: impl Into<StoredValue>,
        options: SetOptions,
    ) -> Result<()> {
        let inner = &self.inner;
        let value = content.into();
        let text = value.encode().map_err(|e| inner.fail(e))?;

        let size = text.len();
        let max = inner.config.max_size_bytes;
        if max > 0 && size > max {
            let err = CacheError::SizeExceeded {
                key: key.to_string(),
                size,
                max,
            };
            if inner.config.strict_size_limit {
                return Err(inner.fail(err));
            }
            report(inner.config.error_sink.as_ref(), &err);
        }

        let _open = inner.gate.read().await;
        inner.ensure_open("set")?;
        let _guard = inner.locks.lock(key).await;

        let file = storage_file_name(key);
        let path = inner.root.join(&file);
        let compressed = options.compress.unwrap_or(inner.config.auto_compress);
        let bytes = if compressed {
            inner.run_codec(text.into_bytes(), true).await?
        } else {
            text.into_bytes()
        };

        inner
            .fs
            .write(&path, &bytes)
            .await
            .map_err(|e| inner.fail(CacheError::io(&path, e)))?;

        let now = current_timestamp_ms();
        let created_at = inner
            .metadata
            .read(key)
            .map_or(now, |previous| previous.created_at);
        let expire_after_ms = options.expire_ms.unwrap_or(inner.config.default_expire_ms);

        inner.metadata.upsert(CacheEntry {
            key: key.to_string(),
            file,
            size_bytes: size,
            value_type: value.value_type(),
            compressed,
            expire_after_ms,
            search_tags: options.search.into_iter().collect(),
            created_at,
            updated_at: now,
        });
        inner.buffer.evict(key);
        inner.metadata.persist();

        if expire_after_ms > 0 {
            Inner::arm_expiry(inner, key, expire_after_ms);
        } else {
            inner.timers.cancel(key);
        }

        debug!(
            "Set {} ({} bytes, {} on disk, expire {}ms)",
            key,
            size,
            bytes.len(),
            expire_after_ms
        );
        Ok(())
    }

    /// Stores any serializable value as an object.
    pub async fn set_json<T: Serialize>(
        &self,
        key: &str,
        content: &T,
        options: SetOptions,
    ) -> Result<()> {
        let value = serde_json::to_value(content)
            .map_err(|e| self.inner.fail(CacheError::ContentInvalid(e.to_string())))?;
        self.set(key, StoredValue::Object(value), options).await
    }

    // == Get ==
    /// Retrieves the value stored under `key`.
    ///
    /// Served from the hot-read buffer when possible, otherwise read from disk
    /// and buffered.
    pub async fn get(&self, key: &str) -> Result<StoredValue> {
        let inner = &self.inner;
        let _guard = inner.locks.lock(key).await;

        if let Some(value) = inner.buffer.get(key) {
            inner.counters.record_buffer_hit();
            trace!("Buffer hit for {}", key);
            return Ok(value);
        }

        let Some(entry) = inner.metadata.read(key) else {
            inner.counters.record_miss();
            return Err(inner.fail(CacheError::NotFound(key.to_string())));
        };

        let path = inner.root.join(&entry.file);
        let bytes = inner
            .fs
            .read(&path)
            .await
            .map_err(|e| inner.fail(CacheError::io(&path, e)))?;
        inner.counters.record_disk_read();

        let bytes = if entry.compressed {
            inner.run_codec(bytes, false).await?
        } else {
            bytes
        };
        let text = String::from_utf8(bytes).map_err(|e| {
            inner.fail(CacheError::Codec(format!("{} is not UTF-8: {}", key, e)))
        })?;
        let value = StoredValue::decode(text, entry.value_type).map_err(|e| inner.fail(e))?;

        inner.buffer.put(key, value.clone());
        Ok(value)
    }

    /// Retrieves a value and deserializes it into `T`.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self.get(key).await?.into_json();
        serde_json::from_value(value).map_err(|e| {
            self.inner.fail(CacheError::ContentInvalid(format!(
                "{} does not match the requested type: {}",
                key, e
            )))
        })
    }

    // == Delete ==
    /// Removes `key`. Returns false when the key was absent.
    ///
    /// The entry leaves the metadata store even if its file cannot be
    /// deleted; that failure is only reported.
    pub async fn del(&self, key: &str) -> Result<bool> {
        let inner = &self.inner;
        let _open = inner.gate.read().await;
        inner.ensure_open("del")?;
        let _guard = inner.locks.lock(key).await;

        let Some(entry) = inner.metadata.remove(key) else {
            debug!("Delete of absent key {}", key);
            return Ok(false);
        };
        inner.timers.cancel(key);
        inner.buffer.evict(key);
        inner.metadata.persist();

        let path = inner.root.join(&entry.file);
        inner.remove_file(&path).await;
        debug!("Deleted {}", key);
        Ok(true)
    }

    // == Exist ==
    /// Membership check against the metadata store. Never touches disk.
    pub fn exist(&self, key: &str) -> bool {
        self.inner.metadata.contains(key)
    }

    // == Search ==
    /// Keys tagged with the given keywords. An empty keyword list matches nothing.
    pub fn search<S: AsRef<str>>(&self, keywords: &[S], logic: SearchLogic) -> Vec<String> {
        self.inner.metadata.search(keywords, logic)
    }

    // == Introspection ==
    /// Metadata snapshot for `key`.
    pub fn entry(&self, key: &str) -> Option<CacheEntry> {
        self.inner.metadata.read(key)
    }

    /// All live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.inner.metadata.keys()
    }

    pub fn len(&self) -> usize {
        self.inner.metadata.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.metadata.is_empty()
    }

    /// Milliseconds until `key` expires; None if it never expires or is absent.
    pub fn ttl_remaining_ms(&self, key: &str) -> Option<u64> {
        self.inner
            .metadata
            .read(key)
            .and_then(|e| e.ttl_remaining_ms(current_timestamp_ms()))
    }

    pub fn stats(&self) -> CacheStats {
        let metadata = &self.inner.metadata;
        self.inner
            .counters
            .snapshot(metadata.len(), metadata.total_bytes())
    }

    /// Root directory holding the value files.
    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Path of the value file for `key`, whether or not it exists.
    pub fn storage_path(&self, key: &str) -> PathBuf {
        self.inner.root.join(storage_file_name(key))
    }

    // == Pub/Sub ==
    /// Sends `message` to the listeners of `channel`; returns how many were reached.
    pub fn publish(&self, channel: &str, message: Value) -> usize {
        self.inner.notifier.publish(channel, message)
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Value> {
        self.inner.notifier.subscribe(channel)
    }

    // == Persistence ==
    /// Writes the side-car metadata file now.
    pub async fn flush(&self) -> Result<()> {
        self.inner
            .metadata
            .flush()
            .await
            .map_err(|e| self.inner.fail(e))
    }

    /// Cancels every expiry timer, stops background tasks and flushes the
    /// metadata file. Calling it again is a no-op.
    ///
    /// Afterwards `set` and `del` fail with `ShutDown`; reads keep working
    /// against the in-memory state.
    ///
    /// Entries keep their expiry in the metadata file and are re-armed by the
    /// next `setup`.
    pub async fn shutdown(&self) -> Result<()> {
        let _closed = self.inner.gate.write().await;
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.timers.shutdown();
        self.inner.buffer.shutdown();
        let flushed = self.flush().await;
        self.inner.metadata.shutdown();
        info!("File cache at {} shut down", self.inner.root.display());
        flushed
    }
}

impl Inner {
    /// Reports `err` through the error sink and hands it back for returning.
    fn fail(&self, err: CacheError) -> CacheError {
        report(self.config.error_sink.as_ref(), &err);
        err
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(self.fail(CacheError::ShutDown(operation)));
        }
        Ok(())
    }

    fn arm_expiry(this: &Arc<Self>, key: &str, delay_ms: u64) {
        let weak = Arc::downgrade(this);
        let owned = key.to_string();
        this.timers
            .arm(key, Duration::from_millis(delay_ms), move |id| async move {
                if let Some(inner) = weak.upgrade() {
                    inner.expire(&owned, id).await;
                }
            });
    }

    /// Timer callback. The metadata entry goes first so readers see the key
    /// as gone at once; the file is then removed by a separate worker task
    /// while the key lock is held, so a following `set` cannot be clobbered.
    async fn expire(&self, key: &str, timer_id: u64) {
        let _open = self.gate.read().await;
        if self.shut_down.load(Ordering::SeqCst) {
            return;
        }
        let _guard = self.locks.lock(key).await;
        if !self.timers.claim(key, timer_id) {
            trace!("Expiry timer {} for {} was superseded", timer_id, key);
            return;
        }

        let Some(entry) = self.metadata.remove(key) else {
            return;
        };
        self.buffer.evict(key);
        self.counters.record_expiration();
        self.metadata.persist();

        let path = self.root.join(&entry.file);
        let fs = self.fs.clone();
        let worker_path = path.clone();
        let worker = tokio::spawn(async move { fs.remove(&worker_path).await });

        match worker.await {
            Ok(Ok(())) => debug!("Expired {}", key),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Expired {}; file was already gone", key)
            }
            Ok(Err(e)) => {
                self.fail(CacheError::io(path, e));
            }
            Err(join) => {
                self.fail(CacheError::io(path, std::io::Error::other(join.to_string())));
            }
        }
    }

    /// Deletes a value file. A missing file is fine; other failures are
    /// reported and swallowed.
    async fn remove_file(&self, path: &Path) {
        if let Err(e) = self.fs.remove(path).await {
            let err = CacheError::io(path, e);
            if err.is_file_not_found() {
                debug!("{} was already gone", path.display());
            } else {
                warn!("Could not delete {}", path.display());
                self.fail(err);
            }
        }
    }

    /// Runs the codec on the blocking pool.
    async fn run_codec(&self, bytes: Vec<u8>, compress: bool) -> Result<Vec<u8>> {
        let codec = self.codec.clone();
        let name = codec.name();
        let direction = if compress { "compress" } else { "decompress" };

        let outcome = tokio::task::spawn_blocking(move || {
            if compress {
                codec.compress(&bytes)
            } else {
                codec.decompress(&bytes)
            }
        })
        .await;

        match outcome {
            Ok(Ok(out)) => Ok(out),
            Ok(Err(e)) => Err(self.fail(CacheError::Codec(format!(
                "{} {}: {}",
                name, direction, e
            )))),
            Err(join) => Err(self.fail(CacheError::Codec(format!(
                "{} {} worker: {}",
                name, direction, join
            )))),
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorSink;
    use parking_lot::Mutex;
    use serde_json::json;
    use tempfile::TempDir;

    async fn open(dir: &TempDir) -> FileCache {
        FileCache::setup(CacheConfig::new(dir.path()).with_persist_debounce_ms(10))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_store_set_and_get() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;

        cache.set("key1", "value1", SetOptions::new()).await.unwrap();
        assert_eq!(cache.get("key1").await.unwrap(), StoredValue::from("value1"));
        assert_eq!(cache.len(), 1);
        assert!(cache.storage_path("key1").exists());
    }

    #[tokio::test]
    async fn test_store_get_nonexistent() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;

        let result = cache.get("nonexistent").await;
        assert!(matches!(result, Err(CacheError::NotFound(_))));
        assert_eq!(cache.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_store_delete() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;

        cache.set("key1", "value1", SetOptions::new()).await.unwrap();
        assert!(cache.del("key1").await.unwrap());

        assert!(cache.is_empty());
        assert!(!cache.storage_path("key1").exists());
        assert!(matches!(
            cache.get("key1").await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_store_delete_nonexistent_is_noop() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;
        assert!(!cache.del("nonexistent").await.unwrap());
    }

    #[tokio::test]
    async fn test_store_overwrite() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;

        cache.set("key1", "value1", SetOptions::new()).await.unwrap();
        let first = cache.entry("key1").unwrap();
        cache.get("key1").await.unwrap(); // buffered
        cache.set("key1", 2i64, SetOptions::new()).await.unwrap();

        assert_eq!(cache.get("key1").await.unwrap(), StoredValue::Number(2.0));
        let second = cache.entry("key1").unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_compressed_entry() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;
        let text = "abc".repeat(200);

        cache
            .set("big", text.as_str(), SetOptions::new().compress(true))
            .await
            .unwrap();

        let entry = cache.entry("big").unwrap();
        assert!(entry.compressed);
        assert_eq!(entry.size_bytes, 600);
        let on_disk = std::fs::read(cache.storage_path("big")).unwrap();
        assert!(on_disk.len() < 600);

        assert_eq!(cache.get("big").await.unwrap(), StoredValue::Text(text));
    }

    #[tokio::test]
    async fn test_corrupt_compressed_bytes_are_not_buffered() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;

        cache
            .set("k", "value", SetOptions::new().compress(true))
            .await
            .unwrap();
        std::fs::write(cache.storage_path("k"), b"garbage").unwrap();

        assert!(matches!(cache.get("k").await, Err(CacheError::Codec(_))));
        assert!(!cache.inner.buffer.has("k"));
    }

    #[tokio::test]
    async fn test_size_limit_reports_but_writes() {
        let dir = TempDir::new().unwrap();
        let reported = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let reported = reported.clone();
            ErrorSink::new(move |e| reported.lock().push(e.to_string()))
        };
        let cache = FileCache::setup(
            CacheConfig::new(dir.path())
                .with_max_size_bytes(4)
                .with_error_sink(sink),
        )
        .await
        .unwrap();

        cache.set("k", "too long", SetOptions::new()).await.unwrap();

        assert!(cache.exist("k"));
        assert_eq!(reported.lock().len(), 1);
        assert!(reported.lock()[0].contains("exceeding the maximum of 4 bytes"));
    }

    #[tokio::test]
    async fn test_strict_size_limit_aborts() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::setup(
            CacheConfig::new(dir.path())
                .with_max_size_bytes(4)
                .with_strict_size_limit(true),
        )
        .await
        .unwrap();

        let result = cache.set("k", "too long", SetOptions::new()).await;
        assert!(matches!(result, Err(CacheError::SizeExceeded { size: 8, max: 4, .. })));
        assert!(!cache.exist("k"));
    }

    #[tokio::test]
    async fn test_invalid_content() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;
        let result = cache.set("nan", f64::NAN, SetOptions::new()).await;
        assert!(matches!(result, Err(CacheError::ContentInvalid(_))));
        assert!(!cache.exist("nan"));
    }

    #[tokio::test]
    async fn test_default_expiry_and_explicit_override() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::setup(CacheConfig::new(dir.path()).with_default_expire_ms(60_000))
            .await
            .unwrap();

        cache.set("defaulted", "v", SetOptions::new()).await.unwrap();
        cache
            .set("forever", "v", SetOptions::new().expire_ms(0))
            .await
            .unwrap();

        assert!(cache.ttl_remaining_ms("defaulted").unwrap() > 50_000);
        assert!(cache.ttl_remaining_ms("forever").is_none());
        assert!(cache.inner.timers.is_armed("defaulted"));
        assert!(!cache.inner.timers.is_armed("forever"));
    }

    #[tokio::test]
    async fn test_delete_cancels_timer() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;

        cache
            .set("k", "v", SetOptions::new().expire_ms(60_000))
            .await
            .unwrap();
        assert!(cache.inner.timers.is_armed("k"));

        cache.del("k").await.unwrap();
        assert!(!cache.inner.timers.is_armed("k"));
    }

    #[tokio::test]
    async fn test_json_helpers() {
        #[derive(Debug, PartialEq, Serialize, serde::Deserialize)]
        struct User {
            name: String,
            age: u32,
        }

        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;
        let user = User {
            name: "Jo".to_string(),
            age: 30,
        };

        cache.set_json("user:1", &user, SetOptions::new()).await.unwrap();
        let back: User = cache.get_json("user:1").await.unwrap();
        assert_eq!(back, user);
        assert_eq!(
            cache.get("user:1").await.unwrap(),
            StoredValue::Object(json!({"name": "Jo", "age": 30}))
        );

        let mismatch = cache.get_json::<Vec<u8>>("user:1").await;
        assert!(matches!(mismatch, Err(CacheError::ContentInvalid(_))));
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_flushes() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::setup(CacheConfig::new(dir.path()).with_persist_debounce_ms(60_000))
            .await
            .unwrap();

        cache
            .set("k", "v", SetOptions::new().expire_ms(60_000))
            .await
            .unwrap();
        cache.shutdown().await.unwrap();
        cache.shutdown().await.unwrap();

        assert!(cache.inner.timers.is_empty());
        let sidecar = std::fs::read_to_string(dir.path().join("metadata.json")).unwrap();
        assert!(sidecar.contains("\"k\""));
    }

    #[tokio::test]
    async fn test_mutations_rejected_after_shutdown() {
        let dir = TempDir::new().unwrap();
        let cache = open(&dir).await;

        cache.set("k", "v", SetOptions::new()).await.unwrap();
        cache.shutdown().await.unwrap();

        let set = cache.set("other", "v", SetOptions::new()).await;
        assert!(matches!(set, Err(CacheError::ShutDown("set"))));
        assert!(matches!(cache.del("k").await, Err(CacheError::ShutDown("del"))));

        assert!(cache.exist("k"));
        assert!(!cache.exist("other"));
        assert_eq!(cache.get("k").await.unwrap(), StoredValue::from("v"));
        assert!(!cache.storage_path("other").exists());
    }
}

//! Filesystem storage engine.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use tracing::{debug, warn};

use cachehub_core::config::engine::FileEngineConfig;
use cachehub_core::error::{CacheError, ErrorKind};
use cachehub_core::result::CacheResult;
use cachehub_core::traits::clock::{Clock, SystemClock};
use cachehub_core::traits::engine::{EngineCapabilities, StorageEngine};
use cachehub_core::types::{SerializationMode, Ttl, Value};

use super::record;
use crate::codec::{self, ValueCodec};
use crate::expiry;
use crate::keys::{FILE_EXTENSION, KeyCodec};

/// Times a locked operation reopens a file that was unlinked under it.
const LOCK_ATTEMPTS: usize = 8;

/// Blocking side of the engine: paths, locks, and directory upkeep.
#[derive(Debug)]
struct FileStore {
    /// Root directory shared by all scopes.
    root: PathBuf,
    /// Key namespacing; the prefix is the scope directory.
    keys: KeyCodec,
    /// Set once the scope directory exists and is writable.
    ready: AtomicBool,
}

impl FileStore {
    fn dir(&self) -> PathBuf {
        self.root.join(self.keys.scope())
    }

    fn path(&self, key: &str) -> PathBuf {
        self.dir().join(self.keys.file_name(key))
    }

    /// Create the scope directory and repair its permissions on first use.
    fn ensure_ready(&self) -> io::Result<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        let dir = self.dir();
        fs::create_dir_all(&dir)?;
        repair_permissions(&dir)?;
        self.ready.store(true, Ordering::Release);
        debug!(dir = %dir.display(), "Cache directory ready");
        Ok(())
    }

    /// Read a file under a shared lock. `None` if it does not exist.
    fn read(&self, key: &str) -> io::Result<Option<Vec<u8>>> {
        self.ensure_ready()?;
        let file = match File::open(self.path(key)) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        let lock = RwLock::new(file);
        let guard = lock.read()?;
        let mut buf = Vec::new();
        (&*guard).read_to_end(&mut buf)?;
        Ok(Some(buf))
    }

    /// Open `path` and run `op` under its exclusive lock.
    ///
    /// If the file was unlinked while this call waited for the lock, the
    /// path is opened again so `op` never works on a detached file. `None`
    /// when `create` is false and the file does not exist.
    fn locked<T>(
        &self,
        path: &Path,
        create: bool,
        op: impl FnOnce(&mut File) -> CacheResult<T>,
    ) -> CacheResult<Option<T>> {
        self.ensure_ready()?;
        for _ in 0..LOCK_ATTEMPTS {
            let opened = OpenOptions::new()
                .read(true)
                .write(true)
                .create(create)
                .truncate(false)
                .open(path);
            let file = match opened {
                Ok(file) => file,
                Err(e) if !create && e.kind() == io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let mut lock = RwLock::new(file);
            let mut guard = lock.write()?;
            if !is_linked_at(&*guard, path)? {
                continue;
            }
            return op(&mut *guard).map(Some);
        }
        Err(CacheError::new(
            ErrorKind::Io,
            format!("Cache file {} kept disappearing while locking", path.display()),
        ))
    }

    /// Replace a file's contents under an exclusive lock.
    fn write(&self, key: &str, contents: &[u8]) -> CacheResult<()> {
        self.locked(&self.path(key), true, |file| {
            file.set_len(0)?;
            file.write_all(contents)?;
            file.flush()?;
            Ok(())
        })?;
        Ok(())
    }

    /// Read, transform, and rewrite a file while holding one exclusive lock.
    ///
    /// `apply` receives the current contents (`None` if the file did not
    /// exist or was empty) and returns the new contents plus a result.
    fn update<T>(
        &self,
        key: &str,
        apply: impl FnOnce(Option<&[u8]>) -> CacheResult<(Vec<u8>, T)>,
    ) -> CacheResult<T> {
        let path = self.path(key);
        let updated = self.locked(&path, true, |file| {
            let mut current = Vec::new();
            file.read_to_end(&mut current)?;
            let existing = (!current.is_empty()).then_some(current.as_slice());

            match apply(existing) {
                Ok((contents, result)) => {
                    file.seek(SeekFrom::Start(0))?;
                    file.set_len(0)?;
                    file.write_all(&contents)?;
                    file.flush()?;
                    Ok(result)
                }
                Err(e) => {
                    if current.is_empty() {
                        // do not leave the placeholder behind
                        remove_if_exists(&path)?;
                    }
                    Err(e)
                }
            }
        })?;
        updated.ok_or_else(|| CacheError::new(ErrorKind::Io, format!("Cache file {} vanished", path.display())))
    }

    /// Delete the record for `key` if it is still expired at `now`, checked
    /// again under the exclusive lock. Returns whether it was removed.
    fn delete_if_expired(&self, key: &str, now: DateTime<Utc>) -> CacheResult<bool> {
        let path = self.path(key);
        let removed = self.locked(&path, false, |file| {
            let mut current = Vec::new();
            file.read_to_end(&mut current)?;
            let expired = record::parse(&current)
                .map(|parsed| !expiry::is_live(parsed.expires_at, now))
                .unwrap_or(false);
            if !expired {
                return Ok(false);
            }
            Ok(remove_if_exists(&path)?)
        })?;
        Ok(removed.unwrap_or(false))
    }

    /// Delete a file. Returns whether it existed.
    fn delete(&self, key: &str) -> io::Result<bool> {
        remove_if_exists(&self.path(key))
    }

    /// Delete every record in the scope, optionally only those modified
    /// before `older_than`. Returns the number of files removed.
    fn flush(&self, older_than: Option<DateTime<Utc>>) -> io::Result<usize> {
        let entries = match fs::read_dir(self.dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(FILE_EXTENSION) {
                continue;
            }
            if let Some(cutoff) = older_than {
                let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
                if modified >= cutoff {
                    continue;
                }
            }
            if remove_if_exists(&path)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether `path` still names the file behind `file`.
#[cfg(unix)]
fn is_linked_at(file: &File, path: &Path) -> io::Result<bool> {
    use std::os::unix::fs::MetadataExt;

    let held = file.metadata()?;
    match fs::metadata(path) {
        Ok(current) => Ok(held.dev() == current.dev() && held.ino() == current.ino()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn is_linked_at(_file: &File, path: &Path) -> io::Result<bool> {
    Ok(path.exists())
}

#[cfg(unix)]
fn repair_permissions(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mut permissions = fs::metadata(dir)?.permissions();
    let mode = permissions.mode();
    if mode & 0o700 != 0o700 {
        permissions.set_mode(mode | 0o700);
        fs::set_permissions(dir, permissions)?;
        warn!(dir = %dir.display(), "Repaired cache directory permissions");
    }
    Ok(())
}

#[cfg(not(unix))]
fn repair_permissions(_dir: &Path) -> io::Result<()> {
    Ok(())
}

/// Storage engine keeping one file per key under `{root}/{prefix}/`.
///
/// Writes take an exclusive advisory lock on the target file and reads a
/// shared one. Counters hold the exclusive lock for the whole
/// read-modify-write, so concurrent increments from several processes do
/// not lose updates.
#[derive(Debug, Clone)]
pub struct FileSystemEngine {
    /// Blocking file operations.
    store: Arc<FileStore>,
    /// Payload codec.
    codec: ValueCodec,
    /// Expiry applied to counters created from nothing.
    default_ttl: Duration,
    /// Time source.
    clock: Arc<dyn Clock>,
}

impl FileSystemEngine {
    /// Create a filesystem engine for the storage `name`.
    ///
    /// Nothing touches the disk until the first operation.
    pub fn new(name: &str, config: &FileEngineConfig) -> CacheResult<Self> {
        if config.root.trim().is_empty() {
            return Err(CacheError::configuration(format!(
                "File storage '{name}' has no root directory"
            )));
        }
        let keys = KeyCodec::new(config.prefix.as_deref().unwrap_or(name))?;
        Ok(Self {
            store: Arc::new(FileStore {
                root: PathBuf::from(&config.root),
                keys,
                ready: AtomicBool::new(false),
            }),
            codec: ValueCodec::from_config(&config.codec),
            default_ttl: Duration::from_secs(config.default_ttl_seconds),
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Directory holding this engine's records.
    pub fn directory(&self) -> PathBuf {
        self.store.dir()
    }

    /// Path of the record for `key`.
    pub fn record_path(&self, key: &str) -> PathBuf {
        self.store.path(key)
    }

    /// Run a blocking file operation off the async runtime.
    async fn blocking<T, F>(&self, op: F) -> CacheResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&FileStore) -> CacheResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || op(&store))
            .await
            .map_err(|e| CacheError::with_source(ErrorKind::Io, "Filesystem task failed", e))?
    }

    /// Load the live payload for `key`, deleting the file if it has expired.
    async fn load(&self, key: &str) -> CacheResult<Option<Vec<u8>>> {
        let owned = key.to_string();
        let contents = match self.blocking(move |store| Ok(store.read(&owned)?)).await {
            Ok(Some(contents)) if !contents.is_empty() => contents,
            Ok(_) => return Ok(None),
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache file");
                return Ok(None);
            }
        };

        let now = self.clock.now();
        let parsed = record::parse(&contents)?;
        if expiry::is_live(parsed.expires_at, now) {
            return Ok(Some(parsed.payload.to_vec()));
        }

        let owned = key.to_string();
        match self.blocking(move |store| store.delete_if_expired(&owned, now)).await {
            Ok(true) => debug!(key, "Dropped expired cache file"),
            Ok(false) => {}
            Err(e) => warn!(key, error = %e, "Failed to delete expired cache file"),
        }
        Ok(None)
    }

    async fn adjust(&self, key: &str, delta: i64) -> CacheResult<Option<i64>> {
        let now = self.clock.now();
        let default_expiry = expiry::resolve(
            &Ttl::from(Some(self.default_ttl).filter(|d| !d.is_zero())),
            now,
        )?;
        let codec = self.codec;
        let owned = key.to_string();

        let outcome = self
            .blocking(move |store| {
                store.update(&owned, |existing| {
                    let live = match existing {
                        Some(contents) => {
                            let parsed = record::parse(contents)?;
                            expiry::is_live(parsed.expires_at, now).then(|| {
                                (parsed.expires_at, parsed.payload.to_vec())
                            })
                        }
                        None => None,
                    };
                    let (expires_at, next) = match live {
                        Some((expires_at, payload)) => {
                            let current = codec::counter_value(&codec.decode(&payload)?)?;
                            let next = current.checked_add(delta).ok_or_else(|| {
                                CacheError::codec(format!("Counter '{owned}' would overflow"))
                            })?;
                            (expires_at, next)
                        }
                        None => (default_expiry, delta),
                    };
                    let payload = codec.encode(&Value::from(next))?;
                    Ok((record::render(expires_at, &payload), next))
                })
            })
            .await;

        match outcome {
            Ok(next) => Ok(Some(next)),
            Err(e) if e.is(ErrorKind::Codec) => Err(e),
            Err(e) => {
                warn!(key, error = %e, "Failed to update cache counter");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl StorageEngine for FileSystemEngine {
    fn kind(&self) -> &str {
        "file"
    }

    fn capabilities(&self) -> EngineCapabilities {
        EngineCapabilities {
            supports_native_exists: false,
            supports_flush_age: true,
            serialization: SerializationMode::Always,
        }
    }

    async fn get(&self, key: &str) -> CacheResult<Option<Value>> {
        match self.load(key).await? {
            Some(payload) => self.codec.decode(&payload).map(Some),
            None => Ok(None),
        }
    }

    async fn has(&self, key: &str) -> CacheResult<bool> {
        Ok(self.load(key).await?.is_some())
    }

    async fn set(&self, key: &str, value: &Value, ttl: Ttl) -> bool {
        let expires_at = match expiry::resolve(&ttl, self.clock.now()) {
            Ok(at) => at,
            Err(e) => {
                warn!(key, error = %e, "Rejected cache write");
                return false;
            }
        };
        let payload = match self.codec.encode(value) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(key, error = %e, "Failed to encode cache value");
                return false;
            }
        };

        let contents = record::render(expires_at, &payload);
        let owned = key.to_string();
        match self.blocking(move |store| store.write(&owned, &contents)).await {
            Ok(()) => {
                debug!(key, bytes = payload.len(), "Wrote cache file");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to write cache file");
                false
            }
        }
    }

    async fn remove(&self, key: &str) -> bool {
        let owned = key.to_string();
        match self.blocking(move |store| Ok(store.delete(&owned)?)).await {
            Ok(existed) => existed,
            Err(e) => {
                warn!(key, error = %e, "Failed to delete cache file");
                false
            }
        }
    }

    async fn increment(&self, key: &str, step: i64) -> CacheResult<Option<i64>> {
        self.adjust(key, step).await
    }

    async fn decrement(&self, key: &str, step: i64) -> CacheResult<Option<i64>> {
        let delta = step
            .checked_neg()
            .ok_or_else(|| CacheError::codec(format!("Cannot decrement by {step}")))?;
        self.adjust(key, delta).await
    }

    async fn flush(&self, older_than: Option<DateTime<Utc>>) -> bool {
        match self.blocking(move |store| Ok(store.flush(older_than)?)).await {
            Ok(removed) => {
                debug!(dir = %self.directory().display(), removed, "Flushed file engine");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to flush cache directory");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use cachehub_core::config::engine::{CodecConfig, ValueFormat};
    use cachehub_core::traits::clock::ManualClock;

    use super::*;

    fn make_engine(root: &TempDir, name: &str, clock: Arc<ManualClock>) -> FileSystemEngine {
        let config = FileEngineConfig {
            root: root.path().to_string_lossy().into_owned(),
            ..Default::default()
        };
        FileSystemEngine::new(name, &config).unwrap().with_clock(clock)
    }

    #[tokio::test]
    async fn test_set_get_writes_record_format() {
        let root = TempDir::new().unwrap();
        let engine = make_engine(&root, "pages", Arc::new(ManualClock::starting_now()));

        assert!(engine.set("home", &json!("<html>"), Ttl::Never).await);
        assert_eq!(engine.get("home").await.unwrap(), Some(json!("<html>")));

        let path = engine.record_path("home");
        assert!(path.starts_with(root.path().join("pages")));
        assert_eq!(fs::read(&path).unwrap(), b"0|\"<html>\"");
    }

    #[tokio::test]
    async fn test_construction_is_lazy() {
        let root = TempDir::new().unwrap();
        let engine = make_engine(&root, "lazy", Arc::new(ManualClock::starting_now()));
        assert!(!engine.directory().exists());
        engine.set("k", &json!(1), Ttl::Never).await;
        assert!(engine.directory().is_dir());
    }

    #[tokio::test]
    async fn test_expired_record_is_deleted() {
        let root = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let engine = make_engine(&root, "ttl", clock.clone());

        engine.set("token", &json!({"user": 7}), Ttl::seconds(30)).await;
        clock.advance(Duration::from_secs(29));
        assert!(engine.has("token").await.unwrap());

        clock.advance(Duration::from_secs(2));
        assert_eq!(engine.get("token").await.unwrap(), None);
        assert!(!engine.record_path("token").exists());
        assert!(!engine.has("token").await.unwrap());
    }

    #[tokio::test]
    async fn test_no_expiry_outlives_any_ttl() {
        let root = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let engine = make_engine(&root, "forever", clock.clone());

        engine.set("pinned", &json!({"keep": true}), Ttl::Never).await;
        engine.set("brief", &json!(1), Ttl::seconds(60)).await;
        clock.advance(Duration::from_secs(10 * 365 * 86_400));

        assert_eq!(engine.get("pinned").await.unwrap(), Some(json!({"keep": true})));
        assert!(engine.has("pinned").await.unwrap());
        assert_eq!(engine.get("brief").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_expired_cleanup_spares_rewritten_record() {
        let root = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let engine = make_engine(&root, "rewrite", clock.clone());

        engine.set("k", &json!("stale"), Ttl::seconds(10)).await;
        clock.advance(Duration::from_secs(20));
        // a writer replaces the record after a reader saw it expired
        engine.set("k", &json!("fresh"), Ttl::Never).await;
        assert!(!engine.store.delete_if_expired("k", clock.now()).unwrap());
        assert_eq!(engine.get("k").await.unwrap(), Some(json!("fresh")));

        engine.set("k", &json!("stale"), Ttl::seconds(10)).await;
        clock.advance(Duration::from_secs(20));
        assert!(engine.store.delete_if_expired("k", clock.now()).unwrap());
        assert!(!engine.record_path("k").exists());
        assert!(!engine.store.delete_if_expired("k", clock.now()).unwrap());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_write_waiting_on_unlinked_file_reopens_path() {
        let root = TempDir::new().unwrap();
        let engine = make_engine(&root, "unlinked", Arc::new(ManualClock::starting_now()));
        engine.set("k", &json!("old"), Ttl::Never).await;

        let path = engine.record_path("k");
        let mut holder = RwLock::new(File::options().read(true).write(true).open(&path).unwrap());
        let guard = holder.write().unwrap();

        let writer = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.set("k", &json!("new"), Ttl::Never).await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        fs::remove_file(&path).unwrap();
        drop(guard);

        assert!(writer.await.unwrap());
        assert_eq!(engine.get("k").await.unwrap(), Some(json!("new")));
    }

    #[tokio::test]
    async fn test_corrupt_prefix_is_codec_error() {
        let root = TempDir::new().unwrap();
        let engine = make_engine(&root, "corrupt", Arc::new(ManualClock::starting_now()));
        engine.set("key", &json!("value"), Ttl::Never).await;

        fs::write(engine.record_path("key"), b"soon|\"value\"").unwrap();
        let err = engine.get("key").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Codec);

        fs::write(engine.record_path("key"), b"\"value\"").unwrap();
        assert_eq!(engine.get("key").await.unwrap_err().kind, ErrorKind::Codec);
    }

    #[tokio::test]
    async fn test_counters() {
        let root = TempDir::new().unwrap();
        let engine = make_engine(&root, "counters", Arc::new(ManualClock::starting_now()));

        for expected in 1..=5 {
            assert_eq!(engine.increment("hits", 1).await.unwrap(), Some(expected));
        }
        assert_eq!(engine.decrement("hits", 7).await.unwrap(), Some(-2));
        assert_eq!(engine.get("hits").await.unwrap(), Some(json!(-2)));
        assert_eq!(engine.decrement("fresh", 5).await.unwrap(), Some(-5));
    }

    #[tokio::test]
    async fn test_counter_keeps_existing_expiry() {
        let root = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let engine = make_engine(&root, "expiring", clock.clone());

        engine.set("n", &json!(10), Ttl::seconds(60)).await;
        assert_eq!(engine.increment("n", 5).await.unwrap(), Some(15));
        clock.advance(Duration::from_secs(61));
        assert_eq!(engine.get("n").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_counter_on_non_integer_leaves_record() {
        let root = TempDir::new().unwrap();
        let engine = make_engine(&root, "text", Arc::new(ManualClock::starting_now()));
        engine.set("name", &json!("bob"), Ttl::Never).await;
        let err = engine.increment("name", 1).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::Codec);
        assert_eq!(engine.get("name").await.unwrap(), Some(json!("bob")));
    }

    #[tokio::test]
    async fn test_concurrent_increments_do_not_lose_updates() {
        let root = TempDir::new().unwrap();
        let engine = make_engine(&root, "race", Arc::new(ManualClock::starting_now()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    engine.increment("shared", 1).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(engine.get("shared").await.unwrap(), Some(json!(80)));
    }

    #[tokio::test]
    async fn test_scopes_share_root_without_collisions() {
        let root = TempDir::new().unwrap();
        let clock = Arc::new(ManualClock::starting_now());
        let a = make_engine(&root, "a", clock.clone());
        let b = make_engine(&root, "b", clock);

        a.set("key", &json!("from a"), Ttl::Never).await;
        b.set("key", &json!("from b"), Ttl::Never).await;
        assert_eq!(a.get("key").await.unwrap(), Some(json!("from a")));
        assert_eq!(b.get("key").await.unwrap(), Some(json!("from b")));

        assert!(a.flush(None).await);
        assert_eq!(a.get("key").await.unwrap(), None);
        assert_eq!(b.get("key").await.unwrap(), Some(json!("from b")));
    }

    #[tokio::test]
    async fn test_flush_older_than_uses_mtime() {
        let root = TempDir::new().unwrap();
        let engine = make_engine(&root, "aged", Arc::new(ManualClock::starting_now()));
        engine.set("old", &json!(1), Ttl::Never).await;

        let past = std::time::SystemTime::now() - Duration::from_secs(3_600);
        File::options()
            .write(true)
            .open(engine.record_path("old"))
            .unwrap()
            .set_modified(past)
            .unwrap();
        engine.set("new", &json!(2), Ttl::Never).await;

        let cutoff = Utc::now() - chrono::Duration::minutes(30);
        assert!(engine.flush(Some(cutoff)).await);
        assert_eq!(engine.get("old").await.unwrap(), None);
        assert_eq!(engine.get("new").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_compressed_msgpack_payloads() {
        let root = TempDir::new().unwrap();
        let config = FileEngineConfig {
            root: root.path().to_string_lossy().into_owned(),
            codec: CodecConfig {
                format: ValueFormat::Msgpack,
                compress: true,
            },
            ..Default::default()
        };
        let engine = FileSystemEngine::new("packed", &config).unwrap();
        let value = json!({"rows": [[1, "a"], [2, "b"]]});
        assert!(engine.set("table", &value, Ttl::phrase("+1 hour")).await);
        assert_eq!(engine.get("table").await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn test_remove_reports_deletion() {
        let root = TempDir::new().unwrap();
        let engine = make_engine(&root, "rm", Arc::new(ManualClock::starting_now()));
        engine.set("k", &json!(true), Ttl::Never).await;
        assert!(engine.remove("k").await);
        assert!(!engine.remove("k").await);
    }
}

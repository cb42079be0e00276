use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    path::{Path, PathBuf},
    sync::atomic::{AtomicI64, Ordering},
};
use tokio::{
    fs,
    io::AsyncWriteExt,
    sync::{Mutex, RwLock, RwLockWriteGuard},
};
use tracing::{debug, info, warn};

use crate::error::CacheError;

/// Registro persistido por cada media descargada
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexRecord {
    path: PathBuf,
    last_access: DateTime<Utc>,
}

/// Formato del archivo JSON del índice
#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    data: BTreeMap<String, IndexRecord>,
}

#[derive(Debug)]
struct CacheEntry {
    artifact_path: PathBuf,
    // Milisegundos UTC; se actualiza bajo el lock de lectura
    last_access: AtomicI64,
}

impl CacheEntry {
    fn new(artifact_path: PathBuf, last_access: DateTime<Utc>) -> Self {
        Self {
            artifact_path,
            last_access: AtomicI64::new(last_access.timestamp_millis()),
        }
    }

    fn last_access(&self) -> DateTime<Utc> {
        millis_to_datetime(self.last_access.load(Ordering::Acquire))
    }
}

/// Durable `media ID -> artifact` index.
///
/// The index lives in memory behind a reader/writer lock and is mirrored to a
/// JSON file. Every mutation is written to disk before it becomes visible in
/// memory, so the file is never ahead of what callers have observed and a
/// failed flush leaves the in-memory state untouched.
///
/// Lookups share the read lock and refresh the entry's last access time (a hit
/// counts as a use). Their flushes are serialized by a separate mutex that is
/// always taken after the reader/writer lock.
#[derive(Debug)]
pub struct CacheStore {
    index_path: PathBuf,
    entries: RwLock<HashMap<String, CacheEntry>>,
    flush_lock: Mutex<()>,
}

impl CacheStore {
    /// Loads the index from `index_path`, creating an empty one if the file does not exist.
    pub async fn open(index_path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let index_path = index_path.into();

        let store = match fs::read(&index_path).await {
            Ok(content) => {
                let file: IndexFile =
                    serde_json::from_slice(&content).map_err(|source| CacheError::Corrupt {
                        path: index_path.clone(),
                        source,
                    })?;

                let entries = file
                    .data
                    .into_iter()
                    .map(|(id, record)| (id, CacheEntry::new(record.path, record.last_access)))
                    .collect::<HashMap<_, _>>();

                info!("📂 Índice de caché cargado: {} entradas", entries.len());
                Self::with_entries(index_path, entries)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let store = Self::with_entries(index_path, HashMap::new());
                store.write_index(&IndexFile::default()).await?;
                info!("📝 Índice de caché creado en {}", store.index_path.display());
                store
            }
            Err(source) => {
                return Err(CacheError::Persistence { path: index_path, source });
            }
        };

        Ok(store)
    }

    fn with_entries(index_path: PathBuf, entries: HashMap<String, CacheEntry>) -> Self {
        Self {
            index_path,
            entries: RwLock::new(entries),
            flush_lock: Mutex::new(()),
        }
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    /// Returns the artifact path for `media_id`, refreshing its last access time.
    ///
    /// An entry whose artifact no longer exists on disk is reported as a miss.
    pub async fn lookup(&self, media_id: &str) -> Result<Option<PathBuf>, CacheError> {
        let entries = self.entries.read().await;

        let Some(entry) = entries.get(media_id) else {
            return Ok(None);
        };

        if !fs::try_exists(&entry.artifact_path).await.unwrap_or(false) {
            warn!(
                "⚠️ Entrada de caché sin archivo para {}: {}",
                media_id,
                entry.artifact_path.display()
            );
            return Ok(None);
        }

        let now = Utc::now();
        {
            let _flush = self.flush_lock.lock().await;
            let snapshot = snapshot(&entries, Some((media_id, &entry.artifact_path, now)), &HashSet::new());
            self.write_index(&snapshot).await?;
            entry.last_access.store(now.timestamp_millis(), Ordering::Release);
        }

        debug!("💾 Cache hit: {}", media_id);
        Ok(Some(entry.artifact_path.clone()))
    }

    /// Records `artifact_path` for `media_id` with a last access of now, replacing any previous entry.
    pub async fn insert(&self, media_id: &str, artifact_path: impl Into<PathBuf>) -> Result<(), CacheError> {
        self.insert_at(media_id, artifact_path, Utc::now()).await
    }

    /// Like [`insert`](Self::insert) with an explicit last access time.
    pub async fn insert_at(
        &self,
        media_id: &str,
        artifact_path: impl Into<PathBuf>,
        last_access: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let artifact_path = artifact_path.into();
        let mut entries = self.entries.write().await;

        {
            let _flush = self.flush_lock.lock().await;
            let snapshot = snapshot(&entries, Some((media_id, &artifact_path, last_access)), &HashSet::new());
            self.write_index(&snapshot).await?;
        }

        entries.insert(media_id.to_string(), CacheEntry::new(artifact_path, last_access));
        debug!("💾 Cache insert: {}", media_id);
        Ok(())
    }

    pub async fn contains(&self, media_id: &str) -> bool {
        self.entries.read().await.contains_key(media_id)
    }

    pub async fn last_access(&self, media_id: &str) -> Option<DateTime<Utc>> {
        self.entries.read().await.get(media_id).map(CacheEntry::last_access)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Takes the writer lock for a batch of removals that is flushed once on commit.
    pub(crate) async fn exclusive(&self) -> ExclusiveIndex<'_> {
        ExclusiveIndex {
            store: self,
            entries: self.entries.write().await,
            removed: HashSet::new(),
        }
    }

    async fn write_index(&self, file: &IndexFile) -> Result<(), CacheError> {
        let content = serde_json::to_vec_pretty(file).map_err(CacheError::Encode)?;
        let tmp_path = self.index_path.with_extension("json.tmp");

        let persist = async {
            let mut tmp = fs::File::create(&tmp_path).await?;
            tmp.write_all(&content).await?;
            tmp.sync_all().await?;
            drop(tmp);
            fs::rename(&tmp_path, &self.index_path).await
        };

        persist.await.map_err(|source| {
            warn!("❌ Error persistiendo índice de caché: {}", source);
            CacheError::Persistence {
                path: self.index_path.clone(),
                source,
            }
        })
    }
}

/// Exclusive view of the index used by the janitor.
///
/// Removals are staged and only applied in memory after [`commit`](Self::commit)
/// has written the resulting index to disk.
pub(crate) struct ExclusiveIndex<'a> {
    store: &'a CacheStore,
    entries: RwLockWriteGuard<'a, HashMap<String, CacheEntry>>,
    removed: HashSet<String>,
}

impl ExclusiveIndex<'_> {
    /// Entries whose last access is strictly before `cutoff`.
    pub fn stale_before(&self, cutoff: DateTime<Utc>) -> Vec<(String, PathBuf)> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.last_access() < cutoff)
            .map(|(id, entry)| (id.clone(), entry.artifact_path.clone()))
            .collect()
    }

    pub fn artifacts(&self) -> Vec<(String, PathBuf)> {
        self.entries
            .iter()
            .map(|(id, entry)| (id.clone(), entry.artifact_path.clone()))
            .collect()
    }

    pub fn contains(&self, media_id: &str) -> bool {
        self.entries.contains_key(media_id) && !self.removed.contains(media_id)
    }

    pub fn remove(&mut self, media_id: &str) {
        self.removed.insert(media_id.to_string());
    }

    /// Persists the staged removals, then applies them. Returns how many entries were removed.
    pub async fn commit(mut self) -> Result<usize, CacheError> {
        if self.removed.is_empty() {
            return Ok(0);
        }

        {
            let _flush = self.store.flush_lock.lock().await;
            let snapshot = snapshot(&self.entries, None, &self.removed);
            self.store.write_index(&snapshot).await?;
        }

        let removed = std::mem::take(&mut self.removed);
        for id in &removed {
            self.entries.remove(id);
        }
        Ok(removed.len())
    }
}

/// Builds the on-disk form of `entries` with an optional upsert and a set of skipped keys.
fn snapshot(
    entries: &HashMap<String, CacheEntry>,
    upsert: Option<(&str, &Path, DateTime<Utc>)>,
    skip: &HashSet<String>,
) -> IndexFile {
    let mut data: BTreeMap<String, IndexRecord> = entries
        .iter()
        .filter(|(id, _)| !skip.contains(*id))
        .map(|(id, entry)| {
            (
                id.clone(),
                IndexRecord {
                    path: entry.artifact_path.clone(),
                    last_access: entry.last_access(),
                },
            )
        })
        .collect();

    if let Some((id, path, last_access)) = upsert {
        data.insert(
            id.to_string(),
            IndexRecord {
                path: path.to_path_buf(),
                last_access,
            },
        );
    }

    IndexFile { data }
}

fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn store_in(dir: &TempDir) -> CacheStore {
        CacheStore::open(dir.path().join("videos.json")).await.unwrap()
    }

    fn artifact(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"audio").unwrap();
        path
    }

    #[tokio::test]
    async fn test_open_creates_empty_index() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        assert!(store.is_empty().await);
        let content = std::fs::read_to_string(store.index_path()).unwrap();
        assert!(content.contains("\"data\""));
    }

    #[tokio::test]
    async fn test_insert_then_lookup_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, "vid42.m4a");

        let store = store_in(&dir).await;
        store.insert("vid42", &path).await.unwrap();
        assert_eq!(store.lookup("vid42").await.unwrap(), Some(path.clone()));
        drop(store);

        let reopened = store_in(&dir).await;
        assert_eq!(reopened.len().await, 1);
        assert_eq!(reopened.lookup("vid42").await.unwrap(), Some(path));
    }

    #[tokio::test]
    async fn test_lookup_refreshes_last_access_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = artifact(&dir, "old.m4a");
        let long_ago = Utc::now() - Duration::hours(50);

        let store = store_in(&dir).await;
        store.insert_at("old", &path, long_ago).await.unwrap();
        store.lookup("old").await.unwrap();

        let refreshed = store.last_access("old").await.unwrap();
        assert!(refreshed > long_ago + Duration::hours(49));
        drop(store);

        let reopened = store_in(&dir).await;
        assert_eq!(reopened.last_access("old").await, Some(refreshed));
    }

    #[tokio::test]
    async fn test_lookup_miss_and_missing_artifact() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;

        assert_eq!(store.lookup("nope").await.unwrap(), None);

        store.insert("gone", dir.path().join("gone.m4a")).await.unwrap();
        assert_eq!(store.lookup("gone").await.unwrap(), None);
        assert!(store.contains("gone").await);
    }

    #[tokio::test]
    async fn test_insert_overwrites_existing_entry() {
        let dir = TempDir::new().unwrap();
        let first = artifact(&dir, "a.m4a");
        let second = artifact(&dir, "b.m4a");

        let store = store_in(&dir).await;
        store.insert("vid", &first).await.unwrap();
        store.insert("vid", &second).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.lookup("vid").await.unwrap(), Some(second));
    }

    #[tokio::test]
    async fn test_failed_flush_leaves_memory_untouched() {
        let dir = TempDir::new().unwrap();
        let index_dir = dir.path().join("index");
        std::fs::create_dir_all(&index_dir).unwrap();
        let path = artifact(&dir, "vid42.m4a");

        let store = CacheStore::open(index_dir.join("videos.json")).await.unwrap();
        std::fs::remove_dir_all(&index_dir).unwrap();

        let err = store.insert("vid42", &path).await.unwrap_err();
        assert!(matches!(err, CacheError::Persistence { .. }));
        assert!(!store.contains("vid42").await);
    }

    #[tokio::test]
    async fn test_corrupt_index_is_reported() {
        let dir = TempDir::new().unwrap();
        let index = dir.path().join("videos.json");
        std::fs::write(&index, b"{not json").unwrap();

        let err = CacheStore::open(&index).await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_exclusive_commit_applies_removals_after_flush() {
        let dir = TempDir::new().unwrap();
        let store = store_in(&dir).await;
        store.insert("a", artifact(&dir, "a.m4a")).await.unwrap();
        store.insert("b", artifact(&dir, "b.m4a")).await.unwrap();

        let mut index = store.exclusive().await;
        index.remove("a");
        assert!(!index.contains("a"));
        assert_eq!(index.commit().await.unwrap(), 1);

        assert!(!store.contains("a").await);
        assert!(store.contains("b").await);
        let content = std::fs::read_to_string(store.index_path()).unwrap();
        assert!(!content.contains("\"a\""));
    }
}

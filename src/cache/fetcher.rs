use async_trait::async_trait;
use dashmap::DashMap;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

use super::{artifact_path, is_valid_media_id, partial_path, store::CacheStore};
use crate::error::FetchError;

/// External retrieval of the raw media for an ID.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Downloads `media_id` into `destination`, creating or truncating it.
    async fn download(&self, media_id: &str, destination: &Path) -> anyhow::Result<()>;
}

/// Turns media IDs into local artifacts, downloading each ID at most once.
///
/// Concurrent fetches of the same uncached ID are serialized on a per-ID gate:
/// the first caller downloads, the others wait and then find the cache entry.
/// Different IDs never wait on each other.
pub struct MediaFetcher {
    store: Arc<CacheStore>,
    videos_dir: PathBuf,
    downloader: Arc<dyn Downloader>,
    in_flight: DashMap<String, Arc<Mutex<()>>>,
}

impl MediaFetcher {
    pub fn new(store: Arc<CacheStore>, videos_dir: impl Into<PathBuf>, downloader: Arc<dyn Downloader>) -> Self {
        Self {
            store,
            videos_dir: videos_dir.into(),
            downloader,
            in_flight: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    /// Returns a ready-to-play artifact for `media_id`.
    ///
    /// A cache hit returns immediately. On a miss the downloader runs once for
    /// this call and its error, if any, is returned as is; nothing is retried.
    pub async fn fetch(&self, media_id: &str) -> Result<PathBuf, FetchError> {
        if !is_valid_media_id(media_id) {
            return Err(FetchError::InvalidMediaId(media_id.to_string()));
        }

        if let Some(path) = self.store.lookup(media_id).await? {
            return Ok(path);
        }

        let gate = self
            .in_flight
            .entry(media_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = gate.lock().await;
            match self.store.lookup(media_id).await {
                Ok(Some(path)) => {
                    debug!("🔁 {} ya fue descargado por otra tarea", media_id);
                    Ok(path)
                }
                Ok(None) => self.download(media_id).await,
                Err(e) => Err(e.into()),
            }
        };

        // Solo el mapa y esta tarea sostienen el gate: nadie más espera
        self.in_flight
            .remove_if(media_id, |_, gate| Arc::strong_count(gate) <= 2);

        result
    }

    async fn download(&self, media_id: &str) -> Result<PathBuf, FetchError> {
        let partial = partial_path(&self.videos_dir, media_id);
        let artifact = artifact_path(&self.videos_dir, media_id);
        let started = Instant::now();

        info!("⬇️ Descargando {}", media_id);
        if let Err(source) = self.downloader.download(media_id, &partial).await {
            if let Err(e) = fs::remove_file(&partial).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("⚠️ No se pudo limpiar {}: {}", partial.display(), e);
                }
            }
            warn!("❌ Descarga fallida para {}: {}", media_id, source);
            return Err(FetchError::Download {
                media_id: media_id.to_string(),
                source,
            });
        }

        fs::rename(&partial, &artifact)
            .await
            .map_err(|source| FetchError::Io {
                path: artifact.clone(),
                source,
            })?;

        self.store.insert(media_id, &artifact).await?;

        info!("✅ {} descargado en {:.1?}", media_id, started.elapsed());
        Ok(artifact)
    }
}

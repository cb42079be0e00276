use chrono::{DateTime, Utc};
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{fs, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{media_id_from_artifact, store::CacheStore, PARTIAL_EXTENSION};
use crate::error::CacheError;

/// Resultado de un ciclo de limpieza
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct JanitorReport {
    /// Entries whose artifact was deleted and that were dropped from the index.
    pub evicted: usize,
    /// Entries kept because their artifact could not be deleted; retried next cycle.
    pub failed: usize,
}

/// Resultado de la reconciliación de arranque
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Index entries dropped because their artifact was missing.
    pub dangling_entries: usize,
    /// Files deleted because no index entry referenced them.
    pub orphan_files: usize,
}

/// Periodic eviction of cache entries nobody used within the retention window.
///
/// The index is the source of truth: the janitor only deletes artifacts the
/// index points to, and holds the index writer lock for the whole cycle so a
/// concurrent lookup can never refresh an entry whose file is being deleted.
pub struct CacheJanitor {
    store: Arc<CacheStore>,
    retention: Duration,
    interval: Duration,
}

impl CacheJanitor {
    pub fn new(store: Arc<CacheStore>, retention: Duration, interval: Duration) -> Self {
        Self {
            store,
            retention,
            interval,
        }
    }

    /// Runs one eviction cycle against the current time.
    pub async fn run_cycle(&self) -> Result<JanitorReport, CacheError> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Runs one eviction cycle as if the current time were `now`.
    pub async fn run_cycle_at(&self, now: DateTime<Utc>) -> Result<JanitorReport, CacheError> {
        let retention = chrono::Duration::from_std(self.retention).unwrap_or(chrono::Duration::MAX);
        let cutoff = now.checked_sub_signed(retention).unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut index = self.store.exclusive().await;
        let mut report = JanitorReport::default();

        for (media_id, path) in index.stale_before(cutoff) {
            info!("🗑️ Eliminando {} ({})", path.display(), media_id);
            match remove_artifact(&path).await {
                Ok(()) => {
                    index.remove(&media_id);
                    report.evicted += 1;
                }
                Err(e) => {
                    warn!("⚠️ No se pudo eliminar {}: {} (se reintentará)", path.display(), e);
                    report.failed += 1;
                }
            }
        }

        index.commit().await?;

        if report.evicted > 0 || report.failed > 0 {
            info!(
                "🧹 Limpieza de caché: {} eliminadas, {} pendientes",
                report.evicted, report.failed
            );
        }

        Ok(report)
    }

    /// Aligns the index with the artifact directory.
    ///
    /// Drops entries whose artifact is missing and deletes files (including
    /// leftover partial downloads) that no entry references. Must run before any
    /// fetch starts: a download in progress would look like an orphan.
    pub async fn reconcile(&self, videos_dir: &Path) -> Result<ReconcileReport, CacheError> {
        let mut index = self.store.exclusive().await;
        let mut report = ReconcileReport::default();

        for (media_id, path) in index.artifacts() {
            if !fs::try_exists(&path).await.unwrap_or(false) {
                debug!("Entrada sin archivo: {} -> {}", media_id, path.display());
                index.remove(&media_id);
                report.dangling_entries += 1;
            }
        }

        let mut files = match fs::read_dir(videos_dir).await {
            Ok(files) => files,
            Err(e) => {
                warn!("⚠️ No se pudo leer {}: {}", videos_dir.display(), e);
                index.commit().await?;
                return Ok(report);
            }
        };

        let mut orphans: Vec<PathBuf> = Vec::new();
        while let Ok(Some(entry)) = files.next_entry().await {
            let path = entry.path();
            if !entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }

            let is_partial = path.extension().is_some_and(|ext| ext == PARTIAL_EXTENSION);
            let referenced = media_id_from_artifact(&path).is_some_and(|id| index.contains(id));
            if is_partial || (media_id_from_artifact(&path).is_some() && !referenced) {
                orphans.push(path);
            }
        }

        for path in orphans {
            match fs::remove_file(&path).await {
                Ok(()) => {
                    info!("🗑️ Archivo huérfano eliminado: {}", path.display());
                    report.orphan_files += 1;
                }
                Err(e) => warn!("⚠️ No se pudo eliminar huérfano {}: {}", path.display(), e),
            }
        }

        index.commit().await?;

        info!(
            "🔎 Reconciliación de caché: {} entradas sin archivo, {} archivos huérfanos",
            report.dangling_entries, report.orphan_files
        );
        Ok(report)
    }

    /// Spawns the periodic loop. It stops when `shutdown` is cancelled.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            info!(
                "🧹 Janitor de caché activo: cada {}, retención {}",
                humantime::format_duration(self.interval),
                humantime::format_duration(self.retention)
            );

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("🛑 Janitor de caché detenido");
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(e) = self.run_cycle().await {
                            error!("❌ Ciclo del janitor fallido: {}", e);
                        }
                    }
                }
            }
        })
    }
}

/// An artifact that is already gone counts as deleted.
async fn remove_artifact(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

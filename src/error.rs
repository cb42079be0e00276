//! Error taxonomy for the cache and playback core.
//!
//! Collaborators (downloader, resolver, voice transport) speak `anyhow`; the core
//! wraps their failures in these typed errors so callers can tell a rejected
//! request from a failed download or a broken stream.

use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Failures of the persisted cache index.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The durable flush failed; the in-memory index was left untouched.
    #[error("no se pudo persistir el índice de caché en {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no se pudo serializar el índice de caché: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("índice de caché corrupto en {}: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures while turning a media ID into a playable artifact.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("identificador de media inválido: {0:?}")]
    InvalidMediaId(String),

    /// The external downloader failed. The original error is kept as the source.
    #[error("la descarga de {media_id} falló: {source}")]
    Download {
        media_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("error de E/S en {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("la precarga de {0} fue abortada")]
    PrefetchAborted(String),
}

/// Per-request playback failures.
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// Rejected synchronously at enqueue time; the queue was not touched.
    #[error(
        "no se puede reproducir {title}: dura {} y el máximo es {}",
        fmt_duration(.duration),
        fmt_duration(.limit)
    )]
    Rejected {
        title: String,
        duration: Duration,
        limit: Duration,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("error de transmisión: {0}")]
    Stream(#[source] anyhow::Error),
}

fn fmt_duration(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

impl PlaybackError {
    pub fn is_rejection(&self) -> bool {
        matches!(self, PlaybackError::Rejected { .. })
    }
}

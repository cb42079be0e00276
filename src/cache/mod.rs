//! # Cache Module
//!
//! Durable media cache for the bot.
//!
//! Every track the bot plays is downloaded once into the artifact directory and
//! remembered in a small JSON index. Later requests for the same media ID reuse
//! the file instead of downloading it again, and a background janitor deletes
//! files nobody has asked for within the retention window.
//!
//! ## Components
//!
//! - [`store`]: the persisted `media ID -> {path, last access}` index
//! - [`fetcher`]: cache-or-download with one download per media ID at a time
//! - [`janitor`]: periodic eviction and the startup reconciliation pass
//!
//! ## Configuration
//!
//! ```env
//! CACHE_INDEX_PATH=/app/data/videos.json   # Persisted index
//! VIDEOS_DIR=/app/videos                   # Artifact directory
//! CACHE_RETENTION=48h                      # Unused entries older than this are evicted
//! JANITOR_INTERVAL=60s                     # Janitor period
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use pickup_bot::cache::{store::CacheStore, janitor::CacheJanitor};
//! use std::{sync::Arc, time::Duration};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(CacheStore::open("/app/data/videos.json").await?);
//!
//! if let Some(path) = store.lookup("dQw4w9WgXcQ").await? {
//!     println!("ya descargado en {}", path.display());
//! }
//!
//! let janitor = CacheJanitor::new(store.clone(), Duration::from_secs(48 * 3600), Duration::from_secs(60));
//! janitor.run_cycle().await?;
//! # Ok(())
//! # }
//! ```

pub mod fetcher;
pub mod janitor;
pub mod store;

use regex::Regex;
use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

/// Extension of every artifact written by the fetcher.
pub const ARTIFACT_EXTENSION: &str = "m4a";

/// Extension of in-progress downloads.
pub const PARTIAL_EXTENSION: &str = "part";

static MEDIA_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]{1,64}$").expect("media ID pattern is valid")
});

/// Media IDs become file names, so only a conservative alphabet is accepted.
pub fn is_valid_media_id(media_id: &str) -> bool {
    MEDIA_ID_RE.is_match(media_id)
}

/// Deterministic artifact location for a media ID.
pub fn artifact_path(videos_dir: &Path, media_id: &str) -> PathBuf {
    videos_dir.join(format!("{media_id}.{ARTIFACT_EXTENSION}"))
}

/// Location the downloader writes to before the artifact is moved into place.
pub fn partial_path(videos_dir: &Path, media_id: &str) -> PathBuf {
    videos_dir.join(format!("{media_id}.{ARTIFACT_EXTENSION}.{PARTIAL_EXTENSION}"))
}

/// Inverse of [`artifact_path`]. Returns `None` for anything that is not a finished artifact.
pub fn media_id_from_artifact(path: &Path) -> Option<&str> {
    if path.extension()? != ARTIFACT_EXTENSION {
        return None;
    }
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| is_valid_media_id(stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_id_validation() {
        assert!(is_valid_media_id("dQw4w9WgXcQ"));
        assert!(is_valid_media_id("vid42"));
        assert!(!is_valid_media_id(""));
        assert!(!is_valid_media_id("../etc/passwd"));
        assert!(!is_valid_media_id("a b"));
        assert!(!is_valid_media_id(&"x".repeat(65)));
    }

    #[test]
    fn test_artifact_path_is_deterministic_and_reversible() {
        let dir = Path::new("/app/videos");
        let path = artifact_path(dir, "vid42");

        assert_eq!(path, artifact_path(dir, "vid42"));
        assert_eq!(path, PathBuf::from("/app/videos/vid42.m4a"));
        assert_eq!(media_id_from_artifact(&path), Some("vid42"));
    }

    #[test]
    fn test_partial_files_are_not_artifacts() {
        let dir = Path::new("/app/videos");
        assert_eq!(media_id_from_artifact(&partial_path(dir, "vid42")), None);
        assert_eq!(media_id_from_artifact(Path::new("/app/videos/notes.txt")), None);
    }
}

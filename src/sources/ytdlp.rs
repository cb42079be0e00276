use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{extract_media_id, ResolvedTrack, Resolver};
use crate::cache::fetcher::Downloader;

const PRINT_FORMAT: &str = "%(id)s|%(title)s|%(duration)s";

/// Resolver and downloader backed by the `yt-dlp` executable.
pub struct YtDlpClient {
    binary: String,
    cookies: Option<PathBuf>,
}

impl YtDlpClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            cookies: find_cookies_file(),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "--no-playlist",
            "--quiet",
            "--no-warnings",
            "--socket-timeout",
            "15",
            "--retries",
            "3",
        ]);
        if let Some(cookies) = &self.cookies {
            cmd.arg("--cookies").arg(cookies);
        }
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Resolver for YtDlpClient {
    async fn resolve(&self, query: &str) -> Result<ResolvedTrack> {
        // IDs y URLs conocidas van directo; el resto se busca
        let target = match extract_media_id(query) {
            Some(id) => format!("https://www.youtube.com/watch?v={id}"),
            None => format!("ytsearch1:{}", query.trim()),
        };
        debug!("🔍 Resolviendo {}", target);

        let output = self
            .command()
            .args(["--skip-download", "--print", PRINT_FORMAT])
            .arg(&target)
            .output()
            .await
            .with_context(|| format!("no se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp info failed: {}", error.trim());
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .with_context(|| format!("sin resultados para {query:?}"))?;

        let track = parse_print_line(line)?;
        info!("🎵 Resuelto: {} ({})", track.title, track.media_id);
        Ok(track)
    }
}

#[async_trait]
impl Downloader for YtDlpClient {
    async fn download(&self, media_id: &str, destination: &Path) -> Result<()> {
        let output = self
            .command()
            .args([
                "--format",
                "bestaudio[ext=m4a]/bestaudio",
                "--no-part",
                "--force-overwrites",
                "--output",
            ])
            .arg(destination)
            .arg(format!("https://www.youtube.com/watch?v={media_id}"))
            .output()
            .await
            .with_context(|| format!("no se pudo ejecutar {}", self.binary))?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!("yt-dlp download failed: {}", error.trim());
        }

        if !tokio::fs::try_exists(destination).await.unwrap_or(false) {
            anyhow::bail!("yt-dlp terminó sin escribir {}", destination.display());
        }

        Ok(())
    }
}

/// Parses one `id|title|duration` line printed by yt-dlp.
fn parse_print_line(line: &str) -> Result<ResolvedTrack> {
    let mut parts = line.trim().splitn(2, '|');
    let media_id = parts.next().unwrap_or_default();
    let rest = parts.next().context("salida de yt-dlp sin título")?;

    // El título puede contener '|', la duración es siempre el último campo
    let (title, duration) = rest.rsplit_once('|').context("salida de yt-dlp sin duración")?;
    if media_id.is_empty() {
        anyhow::bail!("salida de yt-dlp sin id: {line:?}");
    }

    Ok(ResolvedTrack {
        media_id: media_id.to_string(),
        title: title.to_string(),
        duration: duration
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(Duration::from_secs_f64),
    })
}

/// Busca archivo de cookies disponible
fn find_cookies_file() -> Option<PathBuf> {
    let home = std::env::var("HOME").unwrap_or_default();
    let candidates = [
        PathBuf::from(format!("{home}/.config/yt-dlp/cookies.txt")),
        PathBuf::from("/app/.config/yt-dlp/cookies.txt"),
        PathBuf::from("./cookies.txt"),
    ];

    match candidates.into_iter().find(|path| path.exists()) {
        Some(path) => {
            info!("🍪 Cookies encontradas en: {}", path.display());
            Some(path)
        }
        None => {
            warn!("🍪 No se encontraron cookies - algunas descargas pueden fallar");
            None
        }
    }
}

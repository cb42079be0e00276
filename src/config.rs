use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub command_prefix: String,

    // Paths
    pub data_dir: PathBuf,
    pub cache_index_path: PathBuf,
    pub videos_dir: PathBuf,

    // Límites
    pub max_song_duration: u64, // En segundos

    // Caché
    pub cache_retention: Duration,
    pub janitor_interval: Duration,

    // Herramientas externas
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let data_dir: PathBuf = std::env::var("DATA_DIR")
            .unwrap_or_else(|_| "/app/data".to_string())
            .into();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")
                .context("DISCORD_TOKEN no está definido")?
                .replace('"', ""),
            command_prefix: std::env::var("COMMAND_PREFIX").unwrap_or_else(|_| "pub$".to_string()),

            // Paths
            cache_index_path: std::env::var("CACHE_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("videos.json")),
            videos_dir: std::env::var("VIDEOS_DIR")
                .unwrap_or_else(|_| "/app/videos".to_string())
                .into(),
            data_dir,

            // Límites
            max_song_duration: std::env::var("MAX_SONG_DURATION")
                .unwrap_or_else(|_| "600".to_string()) // 10 minutos
                .parse()?,

            // Caché
            cache_retention: humantime::parse_duration(
                &std::env::var("CACHE_RETENTION").unwrap_or_else(|_| "48h".to_string()),
            )
            .context("CACHE_RETENTION inválido")?,
            janitor_interval: humantime::parse_duration(
                &std::env::var("JANITOR_INTERVAL").unwrap_or_else(|_| "60s".to_string()),
            )
            .context("JANITOR_INTERVAL inválido")?,

            ytdlp_path: std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string()),
        };

        // Create directories if they don't exist
        std::fs::create_dir_all(&config.data_dir)?;
        std::fs::create_dir_all(&config.videos_dir)?;
        if let Some(parent) = config.cache_index_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Token and command prefix must not be empty
    /// - Max song duration, retention window and janitor interval must be non-zero
    /// - The janitor must run at least once per retention window
    pub fn validate(&self) -> Result<()> {
        if self.discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN está vacío");
        }

        if self.command_prefix.trim().is_empty() {
            anyhow::bail!("Command prefix must not be empty");
        }

        if self.max_song_duration == 0 {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        if self.cache_retention.is_zero() {
            anyhow::bail!("Cache retention must be greater than 0");
        }

        if self.janitor_interval.is_zero() {
            anyhow::bail!("Janitor interval must be greater than 0");
        }

        if self.janitor_interval > self.cache_retention {
            anyhow::bail!(
                "Janitor interval ({}) cannot exceed the cache retention ({})",
                humantime::format_duration(self.janitor_interval),
                humantime::format_duration(self.cache_retention)
            );
        }

        Ok(())
    }

    pub fn max_song_duration(&self) -> Duration {
        Duration::from_secs(self.max_song_duration)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Never includes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Prefix: {}\n  \
            Cache index: {}\n  \
            Videos: {}\n  \
            Limits: {}s max duration\n  \
            Janitor: every {}, retention {}",
            self.command_prefix,
            self.cache_index_path.display(),
            self.videos_dir.display(),
            self.max_song_duration,
            humantime::format_duration(self.janitor_interval),
            humantime::format_duration(self.cache_retention),
        )
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (token must be provided)
            discord_token: String::new(),
            command_prefix: "pub$".to_string(),

            data_dir: "/app/data".into(),
            cache_index_path: "/app/data/videos.json".into(),
            videos_dir: "/app/videos".into(),

            max_song_duration: 600, // 10 minutes

            cache_retention: Duration::from_secs(48 * 60 * 60),
            janitor_interval: Duration::from_secs(60),

            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}

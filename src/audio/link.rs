use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::path::Path;
use tracing::{info, warn};

use super::queue::PlaybackRequest;
use crate::error::PlaybackError;

/// How a stream finished.
#[derive(Debug)]
pub enum StreamEnd {
    /// All frames were sent. This is the normal completion signal, not an error.
    EndOfInput,
    /// The transport failed before the end of the input.
    Failed(anyhow::Error),
}

/// A voice destination the worker streams into.
#[async_trait]
pub trait VoiceLink: Send + Sync {
    /// `false` once the bot has been disconnected from the destination.
    async fn is_live(&self) -> bool;

    async fn set_speaking(&self, speaking: bool);

    /// Encodes `artifact` and streams it, returning once the stream is done.
    async fn stream(&self, artifact: &Path) -> StreamEnd;

    async fn leave(&self);

    /// Connects again to the channel this link was created for, after a
    /// [`leave`](Self::leave). Returns whether the link is live afterwards.
    async fn rejoin(&self) -> bool;
}

/// Status notifications for the people who requested tracks.
#[async_trait]
pub trait PlaybackEvents: Send + Sync {
    async fn now_playing(&self, request: &PlaybackRequest) {
        info!("🎵 Reproduciendo en {}: {}", request.destination, request.display_text);
    }

    async fn failed(&self, request: &PlaybackRequest, error: &PlaybackError) {
        warn!(
            "❌ No se pudo reproducir {} en {}: {}",
            request.display_text, request.destination, error
        );
    }

    async fn idle(&self, destination: GuildId) {
        info!("📭 Cola vacía en {}, saliendo del canal de voz", destination);
    }
}

/// Only logs.
pub struct LogEvents;

#[async_trait]
impl PlaybackEvents for LogEvents {}

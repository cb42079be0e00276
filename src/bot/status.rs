use async_trait::async_trait;
use serenity::{
    builder::{CreateEmbed, CreateMessage},
    http::Http,
    model::id::{ChannelId, GuildId},
};
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    audio::{link::PlaybackEvents, queue::PlaybackRequest},
    error::PlaybackError,
    ui::embeds,
};

/// Posts playback status to the text channel each request came from.
pub struct ChannelStatus {
    http: Arc<Http>,
}

impl ChannelStatus {
    pub fn new(http: Arc<Http>) -> Self {
        Self { http }
    }

    async fn send(&self, channel: Option<ChannelId>, embed: CreateEmbed) {
        let Some(channel) = channel else {
            return;
        };

        if let Err(e) = channel
            .send_message(&self.http, CreateMessage::new().embed(embed))
            .await
        {
            warn!("⚠️ No se pudo enviar estado a {}: {:?}", channel, e);
        }
    }
}

#[async_trait]
impl PlaybackEvents for ChannelStatus {
    async fn now_playing(&self, request: &PlaybackRequest) {
        self.send(request.status_channel, embeds::create_now_playing_embed(request))
            .await;
    }

    async fn failed(&self, request: &PlaybackRequest, error: &PlaybackError) {
        warn!("❌ {} en {}: {}", request.display_text, request.destination, error);
        let embed = embeds::create_error_embed(
            "No se pudo reproducir",
            &format!("**{}**\n{}", request.display_text, error),
        );
        self.send(request.status_channel, embed).await;
    }

    async fn idle(&self, destination: GuildId) {
        info!("📭 Cola terminada en {}", destination);
    }
}

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::File, tracks::PlayMode, Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird,
    TrackEvent,
};
use std::{path::Path, sync::Arc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::audio::link::{StreamEnd, VoiceLink};

/// Outcome reported by the track event handlers.
enum TrackOutcome {
    Ended,
    Errored(String),
}

/// [`VoiceLink`] over the guild's songbird call.
///
/// Every link of a guild shares one call, looked up through the manager on each
/// use, so a link made before a leave sees the call a later rejoin creates.
pub struct SongbirdLink {
    guild_id: GuildId,
    channel_id: ChannelId,
    manager: Arc<Songbird>,
}

impl SongbirdLink {
    pub fn new(guild_id: GuildId, channel_id: ChannelId, manager: Arc<Songbird>) -> Self {
        Self {
            guild_id,
            channel_id,
            manager,
        }
    }

    fn call(&self) -> Option<Arc<Mutex<Call>>> {
        self.manager.get(self.guild_id)
    }
}

#[async_trait]
impl VoiceLink for SongbirdLink {
    async fn is_live(&self) -> bool {
        match self.call() {
            Some(call) => call.lock().await.current_channel().is_some(),
            None => false,
        }
    }

    async fn set_speaking(&self, speaking: bool) {
        let Some(call) = self.call() else {
            return;
        };
        let mut call = call.lock().await;
        if let Err(e) = call.mute(!speaking).await {
            debug!("No se pudo cambiar el estado de voz en {}: {:?}", self.guild_id, e);
        }
    }

    async fn stream(&self, artifact: &Path) -> StreamEnd {
        let Some(call) = self.call() else {
            return StreamEnd::Failed(anyhow::anyhow!("no hay llamada de voz en {}", self.guild_id));
        };
        let (tx, rx) = flume::bounded(1);

        let handle = {
            let mut call = call.lock().await;
            call.play_input(File::new(artifact.to_path_buf()).into())
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            let notifier = TrackEndNotifier { tx: tx.clone() };
            if let Err(e) = handle.add_event(Event::Track(event), notifier) {
                return StreamEnd::Failed(anyhow::anyhow!("no se pudo observar el track: {e}"));
            }
        }
        drop(tx);

        match rx.recv_async().await {
            Ok(TrackOutcome::Ended) => StreamEnd::EndOfInput,
            Ok(TrackOutcome::Errored(reason)) => StreamEnd::Failed(anyhow::anyhow!(reason)),
            // El driver soltó el track sin avisar: la llamada se cerró
            Err(_) => StreamEnd::Failed(anyhow::anyhow!("la conexión de voz se cerró durante la reproducción")),
        }
    }

    async fn leave(&self) {
        if let Err(e) = self.manager.remove(self.guild_id).await {
            warn!("⚠️ Error al salir del canal de voz en {}: {:?}", self.guild_id, e);
        }
    }

    async fn rejoin(&self) -> bool {
        match self.manager.join(self.guild_id, self.channel_id).await {
            Ok(_) => {
                info!("🔊 Reconectado al canal de voz {} en guild {}", self.channel_id, self.guild_id);
                true
            }
            Err(e) => {
                warn!("⚠️ No se pudo volver al canal de voz en {}: {:?}", self.guild_id, e);
                false
            }
        }
    }
}

/// Forwards the first end/error event of a track to the streaming task.
struct TrackEndNotifier {
    tx: flume::Sender<TrackOutcome>,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let outcome = match ctx {
            EventContext::Track(tracks) => match tracks.first().map(|(state, _)| &state.playing) {
                Some(PlayMode::Errored(e)) => TrackOutcome::Errored(format!("error de reproducción: {e:?}")),
                _ => TrackOutcome::Ended,
            },
            _ => TrackOutcome::Ended,
        };

        // Solo importa el primer evento
        let _ = self.tx.try_send(outcome);
        Some(Event::Cancel)
    }
}

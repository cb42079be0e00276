//! # Bot Module
//!
//! Discord wiring around the playback core.
//!
//! [`PickupBot`] implements Serenity's [`EventHandler`]:
//!
//! - `<prefix> play <url-or-id>` resolves the track, joins the caller's voice
//!   channel and enqueues it on the guild's [`PlaybackService`]
//! - `<prefix> queue` lists what is waiting
//! - `<prefix> help` lists the commands, which the bot's presence advertises
//! - the bot leaves a voice channel once no human is left listening; the
//!   playback worker sees that as a disconnection
//!
//! Voice goes through [`voice::SongbirdLink`] and status messages through
//! [`status::ChannelStatus`].

use anyhow::Result;
use serenity::{
    all::{ActivityData, ChannelId, Context, EventHandler, GuildId, Message, Ready, VoiceState},
    async_trait,
    builder::CreateMessage,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod status;
pub mod voice;

use crate::{
    audio::{player::PlaybackService, queue::PlaybackRequest},
    config::Config,
    sources::Resolver,
    ui::embeds,
};
use voice::SongbirdLink;

/// Reacción para un pedido aceptado
const ACCEPTED_REACTION: char = '💦';

/// Chat commands understood by the bot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Play(String),
    Queue,
    Help,
}

/// Parses `<prefix> <command> [args]`. Returns `None` for anything else.
pub fn parse_command(prefix: &str, content: &str) -> Option<Command> {
    let rest = content.trim().strip_prefix(prefix)?.trim_start();
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name.to_lowercase().as_str() {
        "play" | "p" if !args.is_empty() => Some(Command::Play(args.to_string())),
        "queue" | "q" => Some(Command::Queue),
        "help" | "h" => Some(Command::Help),
        _ => None,
    }
}

pub struct PickupBot {
    config: Arc<Config>,
    player: Arc<PlaybackService>,
    resolver: Arc<dyn Resolver>,
}

impl PickupBot {
    pub fn new(config: Config, player: Arc<PlaybackService>, resolver: Arc<dyn Resolver>) -> Self {
        Self {
            config: Arc::new(config),
            player,
            resolver,
        }
    }

    async fn handle_play(&self, ctx: &Context, msg: &Message, query: &str) -> Result<()> {
        let guild_id = msg
            .guild_id
            .ok_or_else(|| anyhow::anyhow!("Este comando solo funciona en servidores"))?;
        let channel_id = user_voice_channel(ctx, guild_id, msg)
            .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

        let track = self.resolver.resolve(query).await?;
        let mut request = PlaybackRequest::new(track.media_id, guild_id, track.title)
            .with_status_channel(msg.channel_id);
        if let Some(duration) = track.duration {
            request = request.with_duration(duration);
        }
        // Rechazar antes de entrar al canal de voz
        self.player.admit(&request)?;

        let link = self.join_voice_channel(ctx, guild_id, channel_id).await?;
        self.player.enqueue(request, link)?;

        msg.react(&ctx.http, ACCEPTED_REACTION).await?;
        Ok(())
    }

    async fn handle_queue(&self, ctx: &Context, msg: &Message) -> Result<()> {
        let Some(guild_id) = msg.guild_id else {
            return Ok(());
        };

        let pending = self.player.pending(guild_id);
        msg.channel_id
            .send_message(&ctx.http, CreateMessage::new().embed(embeds::create_queue_embed(&pending)))
            .await?;
        Ok(())
    }

    async fn handle_help(&self, ctx: &Context, msg: &Message) -> Result<()> {
        let embed = embeds::create_help_embed(&self.config.command_prefix, self.config.max_song_duration());
        msg.channel_id
            .send_message(&ctx.http, CreateMessage::new().embed(embed))
            .await?;
        Ok(())
    }

    /// Joins `channel_id`, reusing the current call when already there.
    async fn join_voice_channel(
        &self,
        ctx: &Context,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Arc<SongbirdLink>> {
        let manager = songbird::get(ctx)
            .await
            .ok_or_else(|| anyhow::anyhow!("Songbird no inicializado"))?;

        if let Some(call) = manager.get(guild_id) {
            let current = call.lock().await.current_channel();
            if current.map(|c| c.0.get()) == Some(channel_id.get()) {
                return Ok(Arc::new(SongbirdLink::new(guild_id, channel_id, manager)));
            }
        }

        match manager.join(guild_id, channel_id).await {
            Ok(_) => {
                info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
                Ok(Arc::new(SongbirdLink::new(guild_id, channel_id, manager)))
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                Err(anyhow::anyhow!("Error al conectar al canal de voz"))
            }
        }
    }
}

/// Estado que se muestra bajo el nombre del bot
fn presence_text(prefix: &str) -> String {
    format!("🏁{prefix} help🏁")
}

/// Canal de voz en el que está el autor del mensaje
fn user_voice_channel(ctx: &Context, guild_id: GuildId, msg: &Message) -> Option<ChannelId> {
    let guild = ctx.cache.guild(guild_id)?;
    guild
        .voice_states
        .get(&msg.author.id)
        .and_then(|state| state.channel_id)
}

/// Humanos (sin contar bots) conectados a `channel_id`
fn human_listeners(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let Some(guild) = ctx.cache.guild(guild_id) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .filter(|state| !state.member.as_ref().is_some_and(|member| member.user.bot))
        .count()
}

#[async_trait]
impl EventHandler for PickupBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
        info!("⌨️ Prefijo de comandos: {}", self.config.command_prefix);

        ctx.set_activity(Some(ActivityData::playing(presence_text(&self.config.command_prefix))));
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }

        let Some(command) = parse_command(&self.config.command_prefix, &msg.content) else {
            return;
        };
        debug!("📨 Comando {:?} de {}", command, msg.author.name);

        let result = match &command {
            Command::Play(query) => self.handle_play(&ctx, &msg, query).await,
            Command::Queue => self.handle_queue(&ctx, &msg).await,
            Command::Help => self.handle_help(&ctx, &msg).await,
        };

        if let Err(e) = result {
            warn!("❌ Error manejando {:?}: {}", command, e);
            if let Err(e) = msg.reply(&ctx.http, format!("❌ {}", e)).await {
                error!("Error al responder: {:?}", e);
            }
        }
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };
        let Some(manager) = songbird::get(&ctx).await else {
            return;
        };
        let Some(call) = manager.get(guild_id) else {
            return;
        };

        let Some(current) = call.lock().await.current_channel() else {
            return;
        };
        let channel_id = ChannelId::new(current.0.get());

        // Salir si no queda nadie escuchando
        if human_listeners(&ctx, guild_id, channel_id) == 0 {
            info!("🚪 Sin oyentes en {}, saliendo del canal de voz", guild_id);
            if let Err(e) = manager.remove(guild_id).await {
                error!("Error al salir del canal de voz: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_play_command() {
        assert_eq!(
            parse_command("pub$", "pub$ play https://youtu.be/dQw4w9WgXcQ"),
            Some(Command::Play("https://youtu.be/dQw4w9WgXcQ".to_string()))
        );
        assert_eq!(
            parse_command("pub$", "  pub$PLAY   dQw4w9WgXcQ  "),
            Some(Command::Play("dQw4w9WgXcQ".to_string()))
        );
        assert_eq!(
            parse_command("pub$", "pub$ p never gonna give you up"),
            Some(Command::Play("never gonna give you up".to_string()))
        );
    }

    #[test]
    fn test_parse_queue_command() {
        assert_eq!(parse_command("pub$", "pub$ queue"), Some(Command::Queue));
        assert_eq!(parse_command("!", "!q"), Some(Command::Queue));
    }

    #[test]
    fn test_parse_help_command() {
        assert_eq!(parse_command("pub$", "pub$ help"), Some(Command::Help));
        assert_eq!(parse_command("pub$", "pub$H"), Some(Command::Help));
        assert_eq!(parse_command("pub$", "pub$ help me"), Some(Command::Help));
    }

    #[test]
    fn test_presence_points_to_help() {
        assert_eq!(presence_text("pub$"), "🏁pub$ help🏁");
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert_eq!(parse_command("pub$", "play dQw4w9WgXcQ"), None);
        assert_eq!(parse_command("pub$", "pub$ play"), None);
        assert_eq!(parse_command("pub$", "pub$ skip"), None);
        assert_eq!(parse_command("pub$", ""), None);
    }
}

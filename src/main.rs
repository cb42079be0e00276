use anyhow::Result;
use serenity::{http::Http, model::gateway::GatewayIntents, Client};
use songbird::SerenityInit;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use pickup_bot::{
    audio::player::PlaybackService,
    bot::{status::ChannelStatus, PickupBot},
    cache::{fetcher::MediaFetcher, janitor::CacheJanitor, store::CacheStore},
    config::Config,
    sources::YtDlpClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("pickup_bot=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("💦 Iniciando Pickup Bot v{}", env!("CARGO_PKG_VERSION"));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        let ytdlp_path = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());
        return health_check(&ytdlp_path).await;
    }

    // Cargar configuración
    let config = Config::load()?;
    info!("{}", config.summary());

    // Caché de artefactos
    let store = Arc::new(CacheStore::open(&config.cache_index_path).await?);

    let janitor = CacheJanitor::new(store.clone(), config.cache_retention, config.janitor_interval);
    // Antes de cualquier descarga: un .part en curso parecería huérfano
    janitor.reconcile(&config.videos_dir).await?;

    let shutdown = CancellationToken::new();
    let janitor_handle = janitor.spawn(shutdown.clone());

    let ytdlp = Arc::new(YtDlpClient::new(config.ytdlp_path.clone()));
    let fetcher = Arc::new(MediaFetcher::new(store, config.videos_dir.clone(), ytdlp.clone()));

    let http = Arc::new(Http::new(&config.discord_token));
    let events = Arc::new(ChannelStatus::new(http));
    let player = Arc::new(PlaybackService::new(fetcher, events, config.max_song_duration()));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let token = config.discord_token.clone();
    let handler = PickupBot::new(config, player, ytdlp);

    let mut client = Client::builder(&token, intents)
        .event_handler(handler)
        .register_songbird()
        .await?;

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    let signal_shutdown = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        signal_shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    shutdown.cancel();
    if let Err(e) = janitor_handle.await {
        error!("El janitor terminó con error: {:?}", e);
    }

    Ok(())
}

async fn health_check(ytdlp_path: &str) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = async_process::Command::new(ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = async_process::Command::new("ffmpeg")
        .arg("-version")
        .output()
        .await?;

    if yt_dlp.status.success() && ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("Dependencias faltantes");
    }
}

use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{sync::Arc, time::Duration};
use tokio::process::Command;
use tracing::{error, info, warn};

use open_queue::{
    audio::{FfmpegSessions, StreamFetcher},
    bot::{QueueBot, SongbirdTransport},
    config::Config,
    sources::{CachingResolver, YtDlpResolver},
};

/// Cada cuánto se purgan las entradas expiradas del caché
const CACHE_MAINTENANCE: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_queue=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    info!("🎵 Iniciando Open Queue v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;
    info!("{}", config.summary());

    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check(&config).await;
    }

    let resolver = Arc::new(CachingResolver::new(
        YtDlpResolver::new(&config.ytdlp_path),
        config.cache_size,
        Duration::from_secs(config.cache_ttl),
    ));
    let maintenance = resolver.spawn_maintenance(CACHE_MAINTENANCE);

    let fetcher = Arc::new(StreamFetcher::new(
        &config.ytdlp_path,
        config.audio.max_download_bytes,
    )?);
    let sessions = Arc::new(FfmpegSessions::new(config.audio.clone(), fetcher));
    if let Err(e) = sessions.verify().await {
        warn!("⚠️ {}: las canciones no podrán reproducirse", e);
    }

    let manager = Songbird::serenity();
    let transport = Arc::new(SongbirdTransport::new(manager.clone(), &config.audio));

    let bot = Arc::new(QueueBot::new(config.clone(), resolver, sessions, transport));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler_arc(bot.clone())
        .register_songbird_with(manager)
        .await?;

    // Manejar shutdown graceful: primero las colas, después los shards
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        bot.shutdown_all().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    maintenance.abort();
    info!("👋 Bot detenido");
    Ok(())
}

async fn health_check(config: &Config) -> Result<()> {
    // Verificar dependencias críticas
    let yt_dlp = Command::new(&config.ytdlp_path)
        .arg("--version")
        .output()
        .await?;

    let ffmpeg = Command::new(&config.audio.ffmpeg_path)
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

//! # Bot Module
//!
//! Capa de Discord: comandos slash, un scheduler de cola por servidor y el
//! transporte de voz sobre songbird.
//!
//! [`QueueBot`] implementa el [`EventHandler`] de serenity. Los comandos solo
//! traducen interacciones a operaciones del scheduler; los anuncios de "ahora
//! suena" y de fallos salen de los eventos del scheduler.

use anyhow::Result;
use dashmap::DashMap;
use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Http, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{num::NonZeroU64, sync::Arc};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

pub mod commands;
pub mod format;
pub mod handlers;
pub mod voice;

pub use voice::SongbirdTransport;

use crate::{
    audio::AudioSessions,
    config::Config,
    queue::{QueueScheduler, SchedulerEvent, SchedulerHandle},
    sources::TrackResolver,
    transport::VoiceTransport,
};

/// Handler principal del bot.
pub struct QueueBot {
    config: Arc<Config>,
    resolver: Arc<dyn TrackResolver>,
    sessions: Arc<dyn AudioSessions>,
    transport: Arc<dyn VoiceTransport>,
    /// Un scheduler por guild
    schedulers: DashMap<u64, SchedulerHandle>,
}

impl QueueBot {
    pub fn new(
        config: Config,
        resolver: Arc<dyn TrackResolver>,
        sessions: Arc<dyn AudioSessions>,
        transport: Arc<dyn VoiceTransport>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            resolver,
            sessions,
            transport,
            schedulers: DashMap::new(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn resolver(&self) -> &dyn TrackResolver {
        self.resolver.as_ref()
    }

    pub fn transport(&self) -> &dyn VoiceTransport {
        self.transport.as_ref()
    }

    /// Scheduler de la guild, creándolo (o reemplazando uno cerrado) si hace falta.
    pub fn scheduler(&self, http: &Arc<Http>, guild: u64) -> SchedulerHandle {
        let mut entry = self
            .schedulers
            .entry(guild)
            .or_insert_with(|| self.spawn_scheduler(http, guild));

        if entry.is_closed() {
            *entry = self.spawn_scheduler(http, guild);
        }

        entry.clone()
    }

    pub fn existing_scheduler(&self, guild: u64) -> Option<SchedulerHandle> {
        self.schedulers
            .get(&guild)
            .map(|handle| handle.clone())
            .filter(|handle| !handle.is_closed())
    }

    /// Cierra el scheduler de la guild. `false` si no había ninguno.
    pub async fn shutdown_guild(&self, guild: u64) -> bool {
        let Some((_, handle)) = self.schedulers.remove(&guild) else {
            return false;
        };

        if let Err(e) = handle.shutdown().await {
            warn!("⚠️ Scheduler de guild {} ya cerrado: {}", guild, e);
        }
        true
    }

    /// Cierra todos los schedulers (apagado del proceso).
    pub async fn shutdown_all(&self) {
        let guilds: Vec<u64> = self.schedulers.iter().map(|entry| *entry.key()).collect();
        info!("🛑 Cerrando {} schedulers", guilds.len());

        for guild in guilds {
            self.shutdown_guild(guild).await;
        }
    }

    fn spawn_scheduler(&self, http: &Arc<Http>, guild: u64) -> SchedulerHandle {
        info!("🎛️ Nuevo scheduler para guild {}", guild);
        let handle = QueueScheduler::spawn(
            self.config.scheduler.clone(),
            self.sessions.clone(),
            self.transport.clone(),
        );
        tokio::spawn(announce(http.clone(), handle.subscribe()));
        handle
    }

    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica el permiso 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

/// Publica los eventos del scheduler en el canal de texto de cada pista.
async fn announce(http: Arc<Http>, mut events: broadcast::Receiver<SchedulerEvent>) {
    loop {
        let (channel, content) = match events.recv().await {
            Ok(SchedulerEvent::Started { track, context, .. }) => (
                context.text_channel_id,
                format!(
                    "🎵 Reproduciendo: **{}** (`{}`)",
                    track.title(),
                    format::format_duration(track.duration())
                ),
            ),
            Ok(SchedulerEvent::Failed {
                track,
                context,
                reason,
            }) => (
                context.text_channel_id,
                format!("❌ No se pudo reproducir **{}**: {}", track.title(), reason),
            ),
            Ok(SchedulerEvent::Idle) => continue,
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ Se perdieron {} anuncios", skipped);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(channel) = NonZeroU64::new(channel).map(ChannelId::from) else {
            continue;
        };
        if let Err(e) = channel.say(&http, content).await {
            warn!("⚠️ No se pudo anunciar en {}: {}", channel, e);
        }
    }
}

#[async_trait]
impl EventHandler for QueueBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        if let Interaction::Command(command) = interaction {
            if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                error!("Error manejando comando: {:?}", e);
            }
        }
    }

    /// Si alguien desconecta al bot del canal de voz, la cola de esa guild se cierra.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }

        if let Some(guild_id) = new.guild_id {
            info!("🔌 Bot desconectado en guild {}", guild_id);
            self.shutdown_guild(guild_id.get()).await;
        }
    }
}

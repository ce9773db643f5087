use anyhow::Result;
use serenity::{
    builder::EditInteractionResponse,
    model::{
        application::CommandInteraction,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{error, info};

use super::{format, QueueBot};
use crate::{error::SchedulerError, queue::SubmissionContext, sources};

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &QueueBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    // Resolver y arrancar el decodificador puede tardar más que el plazo de Discord
    command.defer(&ctx.http).await?;

    let result = match command.data.name.as_str() {
        "join" => handle_join(ctx, &command, bot, guild_id).await,
        "leave" => handle_leave(&command, bot, guild_id).await,
        "play" => handle_play(ctx, &command, bot, guild_id).await,
        "search" => handle_search(&command, bot).await,
        "skip" => handle_skip(&command, bot, guild_id).await,
        "pause" => handle_pause(bot, guild_id).await,
        "resume" => handle_resume(bot, guild_id).await,
        "queue" => handle_queue(bot, guild_id).await,
        _ => Ok("❌ Comando no reconocido".to_string()),
    };

    let content = match result {
        Ok(content) => content,
        Err(e) => {
            if is_user_error(&e) {
                info!("🙅 /{} rechazado: {}", command.data.name, e);
            } else {
                error!("❌ /{} falló: {:#}", command.data.name, e);
            }
            format!("❌ {}", e)
        }
    };

    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(content))
        .await?;

    Ok(())
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QueueBot,
    guild_id: GuildId,
) -> Result<String> {
    let context = submission_context(ctx, command, guild_id)?;
    bot.transport().connect(&context).await?;
    Ok("🔊 Conectado al canal de voz".to_string())
}

async fn handle_leave(
    command: &CommandInteraction,
    bot: &QueueBot,
    guild_id: GuildId,
) -> Result<String> {
    if !bot.shutdown_guild(guild_id.get()).await {
        // Sin cola activa: solo soltar la conexión
        let context = SubmissionContext {
            guild_id: guild_id.get(),
            voice_channel_id: 0,
            text_channel_id: command.channel_id.get(),
            requested_by: command.user.id.get(),
        };
        bot.transport().disconnect(&context).await?;
    }
    Ok("👋 Desconectado del canal de voz".to_string())
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &QueueBot,
    guild_id: GuildId,
) -> Result<String> {
    let query = option_str(command, "query").filter(|q| !q.trim().is_empty());

    let Some(query) = query else {
        // `/play` sin argumentos reanuda una cola pausada
        let scheduler = bot
            .existing_scheduler(guild_id.get())
            .ok_or(SchedulerError::NothingPlaying)?;
        if !scheduler.status().await?.is_paused() {
            anyhow::bail!("Debes indicar una URL o un término de búsqueda");
        }
        scheduler.resume().await?;
        return Ok("▶️ Reproducción reanudada".to_string());
    };

    let context = submission_context(ctx, command, guild_id)?;

    // Resolver antes de tocar la cola: un fallo aquí no cambia nada
    let track = match option_int(command, "result") {
        Some(choice) => {
            let choice = usize::try_from(choice)
                .map_err(|_| anyhow::anyhow!("El número de resultado debe ser positivo"))?;
            sources::pick_result(bot.resolver(), query, bot.config().search_results, choice)
                .await?
        }
        None => bot.resolver().resolve(query).await?,
    };

    bot.transport().connect(&context).await?;
    let outcome = bot
        .scheduler(&ctx.http, guild_id.get())
        .enqueue(track, context)
        .await?;

    Ok(format::describe_enqueued(&outcome))
}

async fn handle_search(command: &CommandInteraction, bot: &QueueBot) -> Result<String> {
    let query = option_str(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    let results = bot
        .resolver()
        .search(query, bot.config().search_results)
        .await?;

    Ok(format::describe_search(query, &results))
}

async fn handle_skip(command: &CommandInteraction, bot: &QueueBot, guild_id: GuildId) -> Result<String> {
    let index = option_int(command, "index").unwrap_or(0);
    let index = usize::try_from(index).map_err(|_| anyhow::anyhow!("La posición no puede ser negativa"))?;

    let Some(scheduler) = bot.existing_scheduler(guild_id.get()) else {
        return Ok(format::describe_skip(&crate::queue::SkipOutcome::Idle));
    };

    let outcome = scheduler.skip(index).await?;
    Ok(format::describe_skip(&outcome))
}

async fn handle_pause(bot: &QueueBot, guild_id: GuildId) -> Result<String> {
    bot.existing_scheduler(guild_id.get())
        .ok_or(SchedulerError::NothingPlaying)?
        .pause()
        .await?;
    Ok("⏸️ Reproducción pausada".to_string())
}

async fn handle_resume(bot: &QueueBot, guild_id: GuildId) -> Result<String> {
    bot.existing_scheduler(guild_id.get())
        .ok_or(SchedulerError::NothingPlaying)?
        .resume()
        .await?;
    Ok("▶️ Reproducción reanudada".to_string())
}

async fn handle_queue(bot: &QueueBot, guild_id: GuildId) -> Result<String> {
    let snapshot = match bot.existing_scheduler(guild_id.get()) {
        Some(scheduler) => scheduler.status().await?,
        None => Default::default(),
    };
    Ok(format::describe_queue(&snapshot))
}

// Funciones auxiliares

/// Errores de la petición (índice inválido, cola llena...), no fallos del bot.
fn is_user_error(error: &anyhow::Error) -> bool {
    error
        .downcast_ref::<SchedulerError>()
        .is_some_and(SchedulerError::is_user_error)
}

fn option_str<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn option_int(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn submission_context(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
) -> Result<SubmissionContext> {
    let voice_channel = get_user_voice_channel(ctx, guild_id, command.user.id)?;

    Ok(SubmissionContext {
        guild_id: guild_id.get(),
        voice_channel_id: voice_channel.get(),
        text_channel_id: command.channel_id.get(),
        requested_by: command.user.id.get(),
    })
}

fn get_user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Result<ChannelId> {
    let guild = guild_id
        .to_guild_cached(&ctx.cache)
        .ok_or_else(|| anyhow::anyhow!("Guild no encontrada en caché"))?;

    let channel_id = guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
        .ok_or_else(|| anyhow::anyhow!("Debes estar en un canal de voz"))?;

    Ok(channel_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;

    #[test]
    fn only_request_mistakes_count_as_user_errors() {
        assert!(is_user_error(&SchedulerError::NothingPlaying.into()));
        assert!(is_user_error(
            &SchedulerError::InvalidIndex { index: 4, len: 1 }.into()
        ));
        assert!(!is_user_error(&SchedulerError::Closed.into()));
        assert!(!is_user_error(&ResolveError::NotFound("x".to_string()).into()));
        assert!(!is_user_error(&anyhow::anyhow!("Guild no encontrada en caché")));
    }
}

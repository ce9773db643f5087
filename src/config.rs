use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::{str::FromStr, time::Duration};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Herramientas externas
    pub ytdlp_path: String,

    // Audio y cola
    pub audio: AudioConfig,
    pub scheduler: SchedulerConfig,

    // Caché de metadata
    pub cache_size: usize,
    pub cache_ttl: u64, // En segundos

    pub search_results: usize,
}

/// Parámetros del decodificador externo y del formato de frame.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioConfig {
    pub ffmpeg_path: String,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u32,
    /// Argumentos extra antes de `-i`.
    pub before_options: String,
    /// Argumentos extra antes de la salida.
    pub options: String,
    pub max_download_bytes: u64,
}

impl AudioConfig {
    pub fn samples_per_frame(&self) -> usize {
        (self.sample_rate as usize * self.frame_duration_ms as usize) / 1000
    }

    /// Bytes de un frame PCM s16le entrelazado.
    pub fn frame_size(&self) -> usize {
        self.samples_per_frame() * self.channels as usize * 2
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".to_string(),
            sample_rate: 48000,   // Estándar de Discord
            channels: 2,          // Estéreo
            frame_duration_ms: 20, // 960 samples @ 48kHz
            before_options: String::new(),
            options: String::new(),
            max_download_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Límites de la cola por servidor.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    pub max_queue_size: usize,
    pub max_track_duration: Duration,
    pub command_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 100,
            max_track_duration: Duration::from_secs(7200), // 2 horas
            command_buffer: 64,
        }
    }
}

fn env_or<T>(key: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = match std::env::var(key) {
        Ok(val) if !val.trim().is_empty() => val,
        _ => default.to_string(),
    };
    raw.trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("Valor inválido para {}: {}", key, e))
}

fn megabytes(mb: u64) -> Result<u64> {
    mb.checked_mul(1024 * 1024)
        .ok_or_else(|| anyhow::anyhow!("MAX_DOWNLOAD_MB demasiado grande: {}", mb))
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            // Discord
            discord_token: std::env::var("DISCORD_TOKEN")?,
            application_id: std::env::var("APPLICATION_ID")?.parse()?,
            guild_id: std::env::var("GUILD_ID").ok().and_then(|s| s.parse().ok()),

            ytdlp_path: env_or("YTDLP_PATH", "yt-dlp")?,

            audio: AudioConfig {
                ffmpeg_path: env_or("FFMPEG_PATH", "ffmpeg")?,
                sample_rate: env_or("SAMPLE_RATE", "48000")?,
                channels: env_or("CHANNELS", "2")?,
                frame_duration_ms: env_or("FRAME_DURATION_MS", "20")?,
                before_options: std::env::var("FFMPEG_BEFORE_OPTIONS").unwrap_or_default(),
                options: std::env::var("FFMPEG_OPTIONS").unwrap_or_default(),
                max_download_bytes: megabytes(env_or("MAX_DOWNLOAD_MB", "64")?)?,
            },

            scheduler: SchedulerConfig {
                max_queue_size: env_or("MAX_QUEUE_SIZE", "100")?,
                max_track_duration: Duration::from_secs(env_or("MAX_SONG_DURATION", "7200")?),
                command_buffer: 64,
            },

            cache_size: env_or("CACHE_SIZE", "100")?,
            cache_ttl: env_or("CACHE_TTL", "3600")?,
            search_results: env_or("SEARCH_RESULTS", "5")?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Sample rate between 8kHz and 192kHz, mono or stereo
    /// - Frame duration of 10, 20, 40 or 60ms (Opus frame sizes)
    /// - Queue size, song duration, cache size and search results must be > 0
    pub fn validate(&self) -> Result<()> {
        if !(8000..=192000).contains(&self.audio.sample_rate) {
            anyhow::bail!("Sample rate must be between 8000 and 192000, got: {}", self.audio.sample_rate);
        }

        if !(1..=2).contains(&self.audio.channels) {
            anyhow::bail!("Channels must be 1 or 2, got: {}", self.audio.channels);
        }

        if ![10, 20, 40, 60].contains(&self.audio.frame_duration_ms) {
            anyhow::bail!(
                "Frame duration must be 10, 20, 40 or 60ms, got: {}",
                self.audio.frame_duration_ms
            );
        }

        if self.scheduler.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.scheduler.max_track_duration.is_zero() {
            anyhow::bail!("Max song duration must be greater than 0");
        }

        if self.cache_size == 0 {
            anyhow::bail!("Cache size must be greater than 0");
        }

        if self.search_results == 0 {
            anyhow::bail!("Search results must be greater than 0");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the Discord token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {})\n  \
            Audio: {}Hz, {}ch, {}ms frames ({} bytes) via {}\n  \
            Cola: {} máximo, {} por canción\n  \
            Cache: {} entradas, TTL {}s",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.audio.sample_rate,
            self.audio.channels,
            self.audio.frame_duration_ms,
            self.audio.frame_size(),
            self.audio.ffmpeg_path,
            self.scheduler.max_queue_size,
            humantime::format_duration(self.scheduler.max_track_duration),
            self.cache_size,
            self.cache_ttl,
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,

            ytdlp_path: "yt-dlp".to_string(),

            audio: AudioConfig::default(),
            scheduler: SchedulerConfig::default(),

            cache_size: 100,
            cache_ttl: 3600,
            search_results: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_frame_is_twenty_ms_of_stereo_s16() {
        let audio = AudioConfig::default();
        assert_eq!(audio.samples_per_frame(), 960);
        assert_eq!(audio.frame_size(), 3840);
    }

    #[test]
    fn default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn rejects_odd_frame_duration() {
        let mut config = Config::default();
        config.audio.frame_duration_ms = 25;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_empty_queue_limit() {
        let mut config = Config::default();
        config.scheduler.max_queue_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn download_limit_is_converted_without_overflow() {
        assert_eq!(megabytes(64).unwrap(), 64 * 1024 * 1024);
        assert!(megabytes(u64::MAX / 1024).is_err());
    }

    #[test]
    fn summary_hides_token() {
        let config = Config {
            discord_token: "super-secret".to_string(),
            ..Config::default()
        };
        let summary = config.summary();
        assert!(!summary.contains("super-secret"));
        assert!(summary.contains("3840 bytes"));
    }
}

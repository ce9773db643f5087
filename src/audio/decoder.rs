use async_trait::async_trait;
use std::{process::Stdio, sync::Arc};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    process::Command,
};
use tracing::{debug, info};

use super::{
    fetch::{AudioInput, Fetcher},
    frames::{DecodeProcess, FrameSource},
    AudioSessions,
};
use crate::{config::AudioConfig, error::AudioError, queue::SubmissionContext};

/// Flags de reconexión para entradas de red que ffmpeg abre directamente.
const RECONNECT_OPTIONS: [&str; 6] = [
    "-reconnect",
    "1",
    "-reconnect_streamed",
    "1",
    "-reconnect_delay_max",
    "5",
];

/// Argumentos del decodificador según el contrato fijo de salida:
/// PCM s16le entrelazado, sample rate y canales fijos, por stdout.
pub fn decoder_args(config: &AudioConfig, input: &AudioInput) -> Vec<String> {
    let mut args: Vec<String> = config
        .before_options
        .split_whitespace()
        .map(str::to_string)
        .collect();

    args.push("-i".to_string());
    match input {
        AudioInput::Url(url) => {
            // Las opciones de entrada deben ir antes de -i
            let at = args.len() - 1;
            args.splice(at..at, RECONNECT_OPTIONS.iter().map(|s| s.to_string()));
            args.push(url.clone());
        }
        AudioInput::Bytes(_) => args.push("-".to_string()),
    }

    args.extend(
        [
            "-f",
            "s16le",
            "-ar",
            &config.sample_rate.to_string(),
            "-ac",
            &config.channels.to_string(),
            "-loglevel",
            "warning",
        ]
        .iter()
        .map(|s| s.to_string()),
    );
    args.extend(config.options.split_whitespace().map(str::to_string));
    args.push("pipe:1".to_string());
    args
}

/// Lanza el decodificador para `input` y devuelve su stream de frames.
///
/// No encontrar el ejecutable o no poder lanzarlo es un error fatal para
/// este intento; no se reintenta.
pub async fn spawn_decoder(config: &AudioConfig, input: AudioInput) -> Result<FrameSource, AudioError> {
    let args = decoder_args(config, &input);
    debug!("🔧 {} {}", config.ffmpeg_path, args.join(" "));

    let piped = matches!(input, AudioInput::Bytes(_));
    let mut child = Command::new(&config.ffmpeg_path)
        .args(&args)
        .stdin(if piped { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => AudioError::ExecutableNotFound {
                path: config.ffmpeg_path.clone(),
            },
            _ => AudioError::Spawn {
                path: config.ffmpeg_path.clone(),
                source: e,
            },
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AudioError::Fetch("stdout del decodificador no disponible".to_string()))?;

    let mut tasks = Vec::new();

    if let (AudioInput::Bytes(bytes), Some(mut stdin)) = (input, child.stdin.take()) {
        tasks.push(tokio::spawn(async move {
            // Un pipe roto solo significa que el decodificador ya terminó
            if let Err(e) = stdin.write_all(&bytes).await {
                debug!("stdin del decodificador cerrado: {}", e);
            }
            let _ = stdin.shutdown().await;
        }));
    }

    if let Some(stderr) = child.stderr.take() {
        let path = config.ffmpeg_path.clone();
        tasks.push(tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!("[{}] {}", path, line);
            }
        }));
    }

    let process = DecodeProcess {
        child,
        path: config.ffmpeg_path.clone(),
        tasks,
    };

    Ok(FrameSource::from_process(stdout, config.frame_size(), process))
}

/// Adaptador de sesiones de audio basado en ffmpeg.
pub struct FfmpegSessions {
    config: AudioConfig,
    fetcher: Arc<dyn Fetcher>,
}

impl FfmpegSessions {
    pub fn new(config: AudioConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { config, fetcher }
    }

    /// Verifica que el decodificador esté disponible
    pub async fn verify(&self) -> Result<(), AudioError> {
        let output = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await
            .map_err(|_| AudioError::ExecutableNotFound {
                path: self.config.ffmpeg_path.clone(),
            })?;

        if !output.status.success() {
            return Err(AudioError::DecoderFailed {
                status: output.status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl AudioSessions for FfmpegSessions {
    async fn start(
        &self,
        locator: &str,
        context: &SubmissionContext,
    ) -> Result<FrameSource, AudioError> {
        let input = self.fetcher.open(locator).await?;
        let frames = spawn_decoder(&self.config, input).await?;
        info!("🎧 Decodificador iniciado para guild {}: {}", context.guild_id, locator);
        Ok(frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::fetch::MockFetcher;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;

    fn context() -> SubmissionContext {
        SubmissionContext {
            guild_id: 1,
            voice_channel_id: 2,
            text_channel_id: 3,
            requested_by: 4,
        }
    }

    #[test]
    fn piped_input_follows_output_contract() {
        let config = AudioConfig::default();
        let args = decoder_args(&config, &AudioInput::Bytes(Bytes::new()));
        assert_eq!(
            args,
            vec![
                "-i", "-", "-f", "s16le", "-ar", "48000", "-ac", "2", "-loglevel", "warning",
                "pipe:1"
            ]
        );
    }

    #[test]
    fn url_input_gets_reconnect_flags_before_input() {
        let config = AudioConfig {
            before_options: "-nostdin".to_string(),
            options: "-vn".to_string(),
            ..AudioConfig::default()
        };
        let args = decoder_args(&config, &AudioInput::Url("https://cdn/a.webm".to_string()));
        assert_eq!(
            args,
            vec![
                "-nostdin",
                "-reconnect",
                "1",
                "-reconnect_streamed",
                "1",
                "-reconnect_delay_max",
                "5",
                "-i",
                "https://cdn/a.webm",
                "-f",
                "s16le",
                "-ar",
                "48000",
                "-ac",
                "2",
                "-loglevel",
                "warning",
                "-vn",
                "pipe:1"
            ]
        );
    }

    #[tokio::test]
    async fn missing_executable_is_a_startup_error() {
        let config = AudioConfig {
            ffmpeg_path: "/nonexistent/ffmpeg".to_string(),
            ..AudioConfig::default()
        };
        let err = spawn_decoder(&config, AudioInput::Bytes(Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::ExecutableNotFound { .. }));
    }

    /// `sh -c cat decoder <args de ffmpeg>` copia stdin a stdout ignorando los argumentos.
    #[cfg(unix)]
    fn passthrough_config() -> AudioConfig {
        AudioConfig {
            ffmpeg_path: "/bin/sh".to_string(),
            before_options: "-c cat decoder".to_string(),
            ..AudioConfig::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn piped_bytes_come_back_as_whole_frames() {
        let config = passthrough_config();
        let frame = config.frame_size();
        let input = Bytes::from(vec![7u8; frame * 2 + 100]);

        let mut frames = spawn_decoder(&config, AudioInput::Bytes(input)).await.unwrap();
        assert_eq!(frames.read_frame().await.unwrap().unwrap().len(), frame);
        assert_eq!(frames.read_frame().await.unwrap().unwrap().len(), frame);
        assert!(frames.read_frame().await.unwrap().is_none());
        assert_eq!(frames.frames_read(), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_decoder_without_output_is_reported() {
        let config = AudioConfig {
            ffmpeg_path: "/bin/sh".to_string(),
            before_options: "-c false decoder".to_string(),
            ..AudioConfig::default()
        };
        let mut frames = spawn_decoder(&config, AudioInput::Bytes(Bytes::from_static(b"abc")))
            .await
            .unwrap();
        let err = frames.read_frame().await.unwrap_err();
        assert!(matches!(err, AudioError::DecoderFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn close_kills_a_running_decoder() {
        let config = AudioConfig {
            ffmpeg_path: "/bin/sh".to_string(),
            // `yes` escribe sin parar hasta que lo matan
            before_options: "-c yes decoder".to_string(),
            ..AudioConfig::default()
        };
        let mut frames = spawn_decoder(&config, AudioInput::Url("https://cdn/a".to_string()))
            .await
            .unwrap();
        assert!(frames.read_frame().await.unwrap().is_some());
        tokio::time::timeout(std::time::Duration::from_secs(5), frames.close())
            .await
            .expect("close no debe bloquearse")
            .unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn sessions_fetch_then_decode() {
        let config = passthrough_config();
        let frame = config.frame_size();

        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_open()
            .withf(|locator| locator == "https://example.com/a.mp3")
            .times(1)
            .returning(move |_| Ok(AudioInput::Bytes(Bytes::from(vec![1u8; frame]))));

        let sessions = FfmpegSessions::new(config, Arc::new(fetcher));
        let mut frames = sessions
            .start("https://example.com/a.mp3", &context())
            .await
            .unwrap();
        assert_eq!(frames.read_frame().await.unwrap().unwrap().len(), frame);
        assert!(frames.read_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_propagate_fetch_errors() {
        let mut fetcher = MockFetcher::new();
        fetcher
            .expect_open()
            .returning(|locator| Err(AudioError::UnsupportedLocator(locator.to_string())));

        let sessions = FfmpegSessions::new(AudioConfig::default(), Arc::new(fetcher));
        let err = sessions.start("ftp://x", &context()).await.unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedLocator(_)));
    }
}

//! Transporte de voz sobre songbird.
//!
//! Los frames s16le del decodificador se bombean a un canal `flume` y songbird
//! los lee como PCM f32 crudo a través de [`RawAdapter`].

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use serenity::all::{ChannelId, GuildId};
use songbird::{
    input::{Input, RawAdapter},
    tracks::{PlayMode, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    io::{self, Read, Seek, SeekFrom},
    num::NonZeroU64,
    sync::Arc,
};
use symphonia::core::io::MediaSource;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use crate::{
    audio::FrameSource,
    config::AudioConfig,
    error::TransportError,
    queue::{PlaybackDone, SubmissionContext},
    transport::VoiceTransport,
};

/// Frames que el bombeo puede adelantar a songbird (~1s con frames de 20ms).
const BRIDGE_FRAMES: usize = 50;

/// Convierte muestras s16le entrelazadas a f32le.
fn s16le_to_f32le(input: &[u8], out: &mut Vec<u8>) {
    out.reserve(input.len() * 2);
    for sample in input.chunks_exact(2) {
        let value = i16::from_le_bytes([sample[0], sample[1]]) as f32 / 32768.0;
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Lado de lectura del puente: lo que songbird consume.
pub struct PcmBridge {
    rx: flume::Receiver<Bytes>,
    buf: Vec<u8>,
    pos: usize,
}

impl PcmBridge {
    pub fn new(rx: flume::Receiver<Bytes>) -> Self {
        Self {
            rx,
            buf: Vec::new(),
            pos: 0,
        }
    }
}

impl Read for PcmBridge {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        while self.pos >= self.buf.len() {
            // songbird lee desde su propio hilo, bloquear aquí es seguro
            match self.rx.recv() {
                Ok(frame) => {
                    self.buf.clear();
                    s16le_to_f32le(&frame, &mut self.buf);
                    self.pos = 0;
                }
                Err(_) => return Ok(0),
            }
        }

        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl Seek for PcmBridge {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "stream en vivo sin seek",
        ))
    }
}

impl MediaSource for PcmBridge {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

/// Mueve frames del decodificador al puente hasta el fin, hasta que songbird
/// suelte la pista o hasta que se cancele `cancel`.
///
/// Al salir siempre cierra el decodificador, aunque esté bloqueado sin producir
/// audio.
async fn pump(
    mut frames: FrameSource,
    tx: flume::Sender<Bytes>,
    done: PlaybackDone,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => {
                debug!("🛑 Pista {} detenida, cerrando decodificador", done.token());
                break;
            }
            frame = frames.read_frame() => frame,
        };

        match frame {
            Ok(Some(frame)) => {
                let sent = tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send_async(frame) => sent,
                };
                if sent.is_err() {
                    debug!("Pista {} soltada, cerrando decodificador", done.token());
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("❌ Error leyendo audio de {}: {}", done.token(), e);
                done.failed(e.to_string()).await;
                break;
            }
        }
    }

    let frames_read = frames.frames_read();
    if let Err(e) = frames.close().await {
        debug!("Error cerrando decodificador: {}", e);
    }
    debug!("Bombeo de {} terminado tras {} frames", done.token(), frames_read);
}

struct StreamEndNotifier {
    done: PlaybackDone,
}

#[async_trait]
impl VoiceEventHandler for StreamEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        self.done.finished().await;
        Some(Event::Cancel)
    }
}

struct StreamErrorNotifier {
    done: PlaybackDone,
}

#[async_trait]
impl VoiceEventHandler for StreamErrorNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let mut reason = "error de reproducción".to_string();
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                if let PlayMode::Errored(e) = &state.playing {
                    reason = format!("{:?}", e);
                }
            }
        }
        self.done.failed(reason).await;
        Some(Event::Cancel)
    }
}

fn guild_id(context: &SubmissionContext) -> Result<GuildId, TransportError> {
    NonZeroU64::new(context.guild_id)
        .map(GuildId::from)
        .ok_or(TransportError::NotConnected(context.guild_id))
}

/// Pista activa de una guild. Soltarla cancela el bombeo y con él el decodificador.
struct ActiveTrack {
    handle: TrackHandle,
    _pump: DropGuard,
}

/// [`VoiceTransport`] de Discord.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    tracks: DashMap<u64, ActiveTrack>,
    sample_rate: u32,
    channels: u32,
}

impl SongbirdTransport {
    pub fn new(manager: Arc<Songbird>, audio: &AudioConfig) -> Self {
        Self {
            manager,
            tracks: DashMap::new(),
            sample_rate: audio.sample_rate,
            channels: audio.channels as u32,
        }
    }

    fn stop_track(&self, guild: u64) {
        if let Some((_, active)) = self.tracks.remove(&guild) {
            let _ = active.handle.stop();
        }
    }

    fn track(&self, context: &SubmissionContext) -> Result<TrackHandle, TransportError> {
        self.tracks
            .get(&context.guild_id)
            .map(|active| active.handle.clone())
            .ok_or(TransportError::NotConnected(context.guild_id))
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(&self, context: &SubmissionContext) -> Result<(), TransportError> {
        let guild = guild_id(context)?;
        let channel = NonZeroU64::new(context.voice_channel_id)
            .map(ChannelId::from)
            .ok_or_else(|| TransportError::Connect("canal de voz inválido".to_string()))?;

        if let Some(call) = self.manager.get(guild) {
            if call.lock().await.current_channel() == Some(channel.into()) {
                return Ok(());
            }
        }

        self.manager
            .join(guild, channel)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("🔊 Conectado al canal de voz en guild {}", guild);
        Ok(())
    }

    async fn send_frames(
        &self,
        context: &SubmissionContext,
        frames: FrameSource,
        done: PlaybackDone,
    ) -> Result<(), TransportError> {
        let guild = guild_id(context)?;
        let call = self
            .manager
            .get(guild)
            .ok_or(TransportError::NotConnected(context.guild_id))?;

        self.stop_track(context.guild_id);

        let (tx, rx) = flume::bounded(BRIDGE_FRAMES);
        let input: Input = RawAdapter::new(PcmBridge::new(rx), self.sample_rate, self.channels).into();

        let track = call.lock().await.play_input(input);

        track
            .add_event(
                Event::Track(TrackEvent::End),
                StreamEndNotifier { done: done.clone() },
            )
            .and_then(|_| {
                track.add_event(
                    Event::Track(TrackEvent::Error),
                    StreamErrorNotifier { done: done.clone() },
                )
            })
            .map_err(|e| TransportError::Playback(e.to_string()))?;

        let cancel = CancellationToken::new();
        tokio::spawn(pump(frames, tx, done, cancel.clone()));
        self.tracks.insert(
            context.guild_id,
            ActiveTrack {
                handle: track,
                _pump: cancel.drop_guard(),
            },
        );
        Ok(())
    }

    async fn pause(&self, context: &SubmissionContext) -> Result<(), TransportError> {
        self.track(context)?
            .pause()
            .map_err(|e| TransportError::Playback(e.to_string()))
    }

    async fn resume(&self, context: &SubmissionContext) -> Result<(), TransportError> {
        self.track(context)?
            .play()
            .map_err(|e| TransportError::Playback(e.to_string()))
    }

    async fn stop(&self, context: &SubmissionContext) -> Result<(), TransportError> {
        self.stop_track(context.guild_id);
        Ok(())
    }

    async fn disconnect(&self, context: &SubmissionContext) -> Result<(), TransportError> {
        self.stop_track(context.guild_id);
        let guild = guild_id(context)?;

        if self.manager.get(guild).is_some() {
            self.manager
                .remove(guild)
                .await
                .map_err(|e| TransportError::Connect(e.to_string()))?;
            info!("👋 Desconectado del canal de voz en guild {}", guild);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::JobToken;
    use std::time::Duration;

    #[test]
    fn converts_samples_to_float() {
        let mut out = Vec::new();
        s16le_to_f32le(&[0x00, 0x00, 0x00, 0x80, 0xff, 0x7f], &mut out);

        let samples: Vec<f32> = out
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(samples, vec![0.0, -1.0, 32767.0 / 32768.0]);
    }

    #[test]
    fn bridge_reads_across_frames_then_ends() {
        let (tx, rx) = flume::bounded(4);
        tx.send(Bytes::from_static(&[0x00, 0x40])).unwrap();
        tx.send(Bytes::from_static(&[0x00, 0xc0])).unwrap();
        drop(tx);

        let mut bridge = PcmBridge::new(rx);
        let mut all = Vec::new();
        bridge.read_to_end(&mut all).unwrap();

        let samples: Vec<f32> = all
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(samples, vec![0.5, -0.5]);
    }

    #[test]
    fn bridge_is_not_seekable() {
        let (_tx, rx) = flume::bounded::<Bytes>(1);
        let mut bridge = PcmBridge::new(rx);
        assert!(!bridge.is_seekable());
        assert!(bridge.seek(SeekFrom::Start(0)).is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cancelling_the_pump_kills_a_silent_decoder() {
        use crate::audio::{decoder::spawn_decoder, AudioInput};

        // Un decodificador que nunca escribe nada, como ffmpeg con la red colgada
        let config = AudioConfig {
            ffmpeg_path: "/bin/sh".to_string(),
            before_options: "-c exec${IFS}sleep${IFS}30 decoder".to_string(),
            ..AudioConfig::default()
        };
        let frames = spawn_decoder(&config, AudioInput::Url("https://cdn/a".to_string()))
            .await
            .unwrap();

        let (tx, rx) = flume::bounded(1);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(pump(
            frames,
            tx,
            PlaybackDone::detached(JobToken::new(1)),
            cancel.clone(),
        ));

        // Songbird soltó la pista, pero el bombeo sigue esperando al decodificador
        drop(rx);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!task.is_finished());

        drop(cancel.drop_guard());
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("el bombeo debe cerrar el decodificador al cancelarse")
            .unwrap();
    }

    #[tokio::test]
    async fn pump_forwards_frames_until_end() {
        let frames = FrameSource::from_reader(std::io::Cursor::new(vec![1u8; 10]), 4);
        let (tx, rx) = flume::bounded(4);

        pump(
            frames,
            tx,
            PlaybackDone::detached(JobToken::new(1)),
            CancellationToken::new(),
        )
        .await;

        let frames: Vec<Bytes> = rx.drain().collect();
        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.len() == 4));
    }
}

use std::{collections::VecDeque, fmt, sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    time::Instant,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    clock::PlaybackClock,
    track::{JobToken, QueuedJob, SubmissionContext, TrackDescriptor},
};
use crate::{
    audio::{AudioSessions, FrameSource},
    config::SchedulerConfig,
    error::{AudioError, SchedulerError},
    transport::VoiceTransport,
};

/// Dónde quedó una pista recién encolada.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// La cola estaba en reposo: la pista empieza de inmediato.
    PlayingNow,
    /// Posición (base 1) entre las pistas en espera.
    Queued { position: usize },
}

#[derive(Debug, Clone)]
pub struct EnqueueOutcome {
    pub token: JobToken,
    pub track: TrackDescriptor,
    pub placement: Placement,
    /// Espera estimada hasta que empiece a sonar.
    pub wait: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    /// No había nada sonando; nada cambió.
    Idle,
    Skipped {
        skipped: TrackDescriptor,
        next: Option<TrackDescriptor>,
    },
    Removed {
        position: usize,
        track: TrackDescriptor,
    },
}

#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub track: TrackDescriptor,
    pub context: SubmissionContext,
    pub elapsed: Duration,
    pub remaining: Duration,
    pub paused: bool,
    /// `false` mientras el decodificador todavía está arrancando.
    pub streaming: bool,
}

#[derive(Debug, Clone)]
pub struct Upcoming {
    pub position: usize,
    pub track: TrackDescriptor,
    pub context: SubmissionContext,
    pub starts_in: Duration,
}

/// Copia de solo lectura del estado de la cola.
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    pub now_playing: Option<NowPlaying>,
    pub upcoming: Vec<Upcoming>,
}

impl QueueSnapshot {
    pub fn is_idle(&self) -> bool {
        self.now_playing.is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.now_playing.as_ref().is_some_and(|np| np.paused)
    }

    /// `[actual, ...en espera]`, con `None` en lugar de la actual en reposo.
    pub fn playlist(&self) -> Vec<Option<&TrackDescriptor>> {
        std::iter::once(self.now_playing.as_ref().map(|np| &np.track))
            .chain(self.upcoming.iter().map(|up| Some(&up.track)))
            .collect()
    }

    /// Tiempo hasta que termine todo lo encolado.
    pub fn total_remaining(&self) -> Duration {
        let current = self
            .now_playing
            .as_ref()
            .map(|np| np.remaining)
            .unwrap_or_default();
        current + self.upcoming.iter().map(|up| up.track.duration()).sum::<Duration>()
    }
}

#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// El transporte recibió el stream de la pista.
    Started {
        token: JobToken,
        track: TrackDescriptor,
        context: SubmissionContext,
    },
    /// La pista no pudo arrancar o su stream falló; la cola avanzó.
    Failed {
        track: TrackDescriptor,
        context: SubmissionContext,
        reason: String,
    },
    /// No queda nada por reproducir.
    Idle,
}

/// Esperas estimadas de una serie de pistas detrás de la actual.
///
/// La k-ésima espera es `remaining + d1 + ... + d(k-1)`.
pub fn estimate_waits(
    remaining: Duration,
    durations: impl IntoIterator<Item = Duration>,
) -> Vec<Duration> {
    durations
        .into_iter()
        .scan(remaining, |acc, duration| {
            let wait = *acc;
            *acc += duration;
            Some(wait)
        })
        .collect()
}

enum Command {
    Enqueue {
        track: TrackDescriptor,
        context: SubmissionContext,
        reply: oneshot::Sender<Result<EnqueueOutcome, SchedulerError>>,
    },
    Skip {
        index: usize,
        reply: oneshot::Sender<Result<SkipOutcome, SchedulerError>>,
    },
    Pause {
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Resume {
        reply: oneshot::Sender<Result<(), SchedulerError>>,
    },
    Status {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    SessionReady {
        token: JobToken,
        frames: FrameSource,
    },
    SessionFailed {
        token: JobToken,
        error: AudioError,
    },
    StreamEnded {
        token: JobToken,
    },
    StreamFailed {
        token: JobToken,
        reason: String,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Aviso de fin de stream que el transporte recibe con cada pista.
///
/// Es la única forma en que una pista termina sola: la siguiente se promueve
/// cuando llega `finished` (o `failed`) con el token de la pista actual.
#[derive(Clone)]
pub struct PlaybackDone {
    token: JobToken,
    tx: mpsc::WeakSender<Command>,
}

impl PlaybackDone {
    pub fn token(&self) -> JobToken {
        self.token
    }

    /// Notificador sin scheduler detrás: sus avisos se pierden.
    #[cfg(test)]
    pub(crate) fn detached(token: JobToken) -> Self {
        let (tx, _rx) = mpsc::channel(1);
        Self {
            token,
            tx: tx.downgrade(),
        }
    }

    pub async fn finished(&self) {
        self.notify(Command::StreamEnded { token: self.token }).await;
    }

    pub async fn failed(&self, reason: impl Into<String>) {
        self.notify(Command::StreamFailed {
            token: self.token,
            reason: reason.into(),
        })
        .await;
    }

    async fn notify(&self, command: Command) {
        // Si el scheduler ya no existe no hay nadie a quien avisar
        if let Some(tx) = self.tx.upgrade() {
            let _ = tx.send(command).await;
        }
    }
}

impl fmt::Debug for PlaybackDone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackDone").field("token", &self.token).finish()
    }
}

/// Acceso clonable a un scheduler.
///
/// Cada operación es un mensaje al actor dueño del estado, así que las
/// operaciones concurrentes nunca se intercalan.
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<Command>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl SchedulerHandle {
    pub async fn enqueue(
        &self,
        track: TrackDescriptor,
        context: SubmissionContext,
    ) -> Result<EnqueueOutcome, SchedulerError> {
        self.request(|reply| Command::Enqueue {
            track,
            context,
            reply,
        })
        .await?
    }

    /// `0` salta la pista actual; `n >= 1` quita la n-ésima en espera.
    pub async fn skip(&self, index: usize) -> Result<SkipOutcome, SchedulerError> {
        self.request(|reply| Command::Skip { index, reply }).await?
    }

    pub async fn pause(&self) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Pause { reply }).await?
    }

    pub async fn resume(&self) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Resume { reply }).await?
    }

    pub async fn status(&self) -> Result<QueueSnapshot, SchedulerError> {
        self.request(|reply| Command::Status { reply }).await
    }

    /// Cancela todo lo pendiente, detiene el audio y desconecta.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.events.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SchedulerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| SchedulerError::Closed)?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }
}

/// Scheduler de la cola de un servidor.
///
/// Vive dentro de una tarea propia; se usa a través de [`SchedulerHandle`].
/// La promoción es por eventos: una pista pasa a sonar cuando la anterior
/// reporta fin de stream o cuando se salta, nunca por un temporizador.
pub struct QueueScheduler {
    config: SchedulerConfig,
    pending: VecDeque<QueuedJob>,
    clock: PlaybackClock,
    next_token: u64,
    /// Cancela el arranque en curso del decodificador.
    startup: Option<CancellationToken>,
    /// El transporte tiene el stream de la pista actual.
    streaming: bool,
    last_context: Option<SubmissionContext>,
    sessions: Arc<dyn AudioSessions>,
    transport: Arc<dyn VoiceTransport>,
    tx: mpsc::WeakSender<Command>,
    events: broadcast::Sender<SchedulerEvent>,
}

impl QueueScheduler {
    pub fn spawn(
        config: SchedulerConfig,
        sessions: Arc<dyn AudioSessions>,
        transport: Arc<dyn VoiceTransport>,
    ) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
        let (events, _) = broadcast::channel(32);

        let scheduler = Self {
            config,
            pending: VecDeque::new(),
            clock: PlaybackClock::new(),
            next_token: 1,
            startup: None,
            streaming: false,
            last_context: None,
            sessions,
            transport,
            tx: tx.downgrade(),
            events: events.clone(),
        };
        tokio::spawn(scheduler.run(rx));

        SchedulerHandle { tx, events }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        debug!("🎛️ Scheduler iniciado");

        while let Some(command) = rx.recv().await {
            match command {
                Command::Enqueue {
                    track,
                    context,
                    reply,
                } => {
                    let result = self.enqueue(track, context).await;
                    let _ = reply.send(result);
                }
                Command::Skip { index, reply } => {
                    let result = self.skip(index).await;
                    let _ = reply.send(result);
                }
                Command::Pause { reply } => {
                    let result = self.pause().await;
                    let _ = reply.send(result);
                }
                Command::Resume { reply } => {
                    let result = self.resume().await;
                    let _ = reply.send(result);
                }
                Command::Status { reply } => {
                    let _ = reply.send(self.snapshot(Instant::now()));
                }
                Command::SessionReady { token, frames } => {
                    self.on_session_ready(token, frames).await;
                }
                Command::SessionFailed { token, error } => {
                    self.on_failure(token, error.to_string()).await;
                }
                Command::StreamEnded { token } => {
                    self.on_stream_ended(token).await;
                }
                Command::StreamFailed { token, reason } => {
                    self.on_failure(token, reason).await;
                }
                Command::Shutdown { reply } => {
                    self.teardown().await;
                    let _ = reply.send(());
                    return;
                }
            }
        }

        // Todos los handles se soltaron
        self.teardown().await;
    }

    async fn enqueue(
        &mut self,
        track: TrackDescriptor,
        context: SubmissionContext,
    ) -> Result<EnqueueOutcome, SchedulerError> {
        if track.duration() > self.config.max_track_duration {
            return Err(SchedulerError::TrackTooLong {
                duration: track.duration(),
                max: self.config.max_track_duration,
            });
        }

        if self.pending.len() >= self.config.max_queue_size {
            return Err(SchedulerError::QueueFull {
                max: self.config.max_queue_size,
            });
        }

        let wait = self.clock.remaining(Instant::now()) + self.pending_duration();
        let token = JobToken::new(self.next_token);
        self.next_token += 1;
        self.last_context = Some(context);

        self.pending.push_back(QueuedJob {
            token,
            track: track.clone(),
            context,
        });

        let placement = if self.clock.is_idle() {
            self.promote().await;
            Placement::PlayingNow
        } else {
            Placement::Queued {
                position: self.pending.len(),
            }
        };

        info!(
            "➕ Agregado a la cola {}: {} (empieza en {})",
            token,
            track.title(),
            humantime::format_duration(wait)
        );

        Ok(EnqueueOutcome {
            token,
            track,
            placement,
            wait,
        })
    }

    async fn skip(&mut self, index: usize) -> Result<SkipOutcome, SchedulerError> {
        if index == 0 {
            let Some(skipped) = self.clock.track().cloned() else {
                debug!("⏭️ Nada que saltar");
                return Ok(SkipOutcome::Idle);
            };

            info!("⏭️ Saltando: {}", skipped.title());
            self.promote().await;

            return Ok(SkipOutcome::Skipped {
                skipped,
                next: self.clock.track().cloned(),
            });
        }

        let len = self.pending.len();
        let job = self
            .pending
            .remove(index - 1)
            .ok_or(SchedulerError::InvalidIndex { index, len })?;

        info!("❌ Eliminada de la cola en posición {}: {}", index, job.track.title());
        Ok(SkipOutcome::Removed {
            position: index,
            track: job.track,
        })
    }

    async fn pause(&mut self) -> Result<(), SchedulerError> {
        let Some(context) = self.clock.context().copied() else {
            return Err(SchedulerError::NothingPlaying);
        };

        if !self.clock.pause(Instant::now()) {
            return Ok(());
        }

        if self.streaming {
            if let Err(e) = self.transport.pause(&context).await {
                warn!("⚠️ El transporte no pudo pausar: {}", e);
            }
        }

        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), SchedulerError> {
        let Some(context) = self.clock.context().copied() else {
            return Err(SchedulerError::NothingPlaying);
        };

        if !self.clock.resume(Instant::now()) {
            return Ok(());
        }

        if self.streaming {
            if let Err(e) = self.transport.resume(&context).await {
                warn!("⚠️ El transporte no pudo reanudar: {}", e);
            }
        }

        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    /// Detiene lo actual y pone a sonar la cabeza de la cola, o queda en reposo.
    async fn promote(&mut self) {
        self.halt_current().await;

        match self.pending.pop_front() {
            Some(job) => {
                info!("➡️ Siguiente en cola {}: {}", job.token, job.track.title());
                self.clock
                    .start(job.token, job.track.clone(), job.context, Instant::now());
                self.begin_session(job);
            }
            None => {
                if let Some(track) = self.clock.clear() {
                    info!("📭 Cola vacía tras: {}", track.title());
                    let _ = self.events.send(SchedulerEvent::Idle);
                }
            }
        }
    }

    async fn halt_current(&mut self) {
        if let Some(startup) = self.startup.take() {
            startup.cancel();
        }

        if self.streaming {
            self.streaming = false;
            if let Some(context) = self.clock.context().copied() {
                if let Err(e) = self.transport.stop(&context).await {
                    warn!("⚠️ El transporte no pudo detener el stream: {}", e);
                }
            }
        }
    }

    /// Arranca el decodificador fuera del actor; el resultado vuelve como mensaje.
    fn begin_session(&mut self, job: QueuedJob) {
        let cancel = CancellationToken::new();
        self.startup = Some(cancel.clone());

        let sessions = self.sessions.clone();
        let tx = self.tx.clone();

        tokio::spawn(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("🛑 Arranque cancelado para {}", job.token);
                    return;
                }
                result = sessions.start(job.track.locator(), &job.context) => result,
            };

            let command = match result {
                Ok(frames) => Command::SessionReady {
                    token: job.token,
                    frames,
                },
                Err(error) => Command::SessionFailed {
                    token: job.token,
                    error,
                },
            };

            if let Some(tx) = tx.upgrade() {
                let _ = tx.send(command).await;
            }
        });
    }

    async fn on_session_ready(&mut self, token: JobToken, frames: FrameSource) {
        if self.clock.token() != Some(token) || self.streaming {
            debug!("🗑️ Sesión obsoleta {}, cerrando decodificador", token);
            tokio::spawn(async move {
                let _ = frames.close().await;
            });
            return;
        }

        self.startup = None;
        let Some(context) = self.clock.context().copied() else {
            return;
        };

        let done = PlaybackDone {
            token,
            tx: self.tx.clone(),
        };

        match self.transport.send_frames(&context, frames, done).await {
            Ok(()) => {
                self.streaming = true;
                // El tiempo de arranque no cuenta como reproducido
                self.clock.rebase(Instant::now());

                if self.clock.is_paused() {
                    if let Err(e) = self.transport.pause(&context).await {
                        warn!("⚠️ El transporte no pudo pausar: {}", e);
                    }
                }

                if let Some(track) = self.clock.track().cloned() {
                    info!("🎵 Reproduciendo: {}", track.title());
                    let _ = self.events.send(SchedulerEvent::Started {
                        token,
                        track,
                        context,
                    });
                }
            }
            Err(e) => self.fail_current(e.to_string()).await,
        }
    }

    async fn on_stream_ended(&mut self, token: JobToken) {
        if self.clock.token() != Some(token) {
            debug!("Fin de stream obsoleto {}", token);
            return;
        }

        if let Some(track) = self.clock.track() {
            info!("✅ Terminó: {}", track.title());
        }
        self.streaming = false;
        self.promote().await;
    }

    async fn on_failure(&mut self, token: JobToken, reason: String) {
        if self.clock.token() != Some(token) {
            debug!("Fallo obsoleto {}: {}", token, reason);
            return;
        }
        self.fail_current(reason).await;
    }

    /// Reporta la pista actual como fallida y avanza sin reintentar.
    async fn fail_current(&mut self, reason: String) {
        if let (Some(track), Some(context)) =
            (self.clock.track().cloned(), self.clock.context().copied())
        {
            warn!("❌ No se pudo reproducir {}: {}", track.title(), reason);
            let _ = self.events.send(SchedulerEvent::Failed {
                track,
                context,
                reason,
            });
        }
        self.promote().await;
    }

    async fn teardown(&mut self) {
        let context = self.clock.context().copied().or(self.last_context);

        self.halt_current().await;
        let dropped = self.pending.len();
        self.pending.clear();
        self.clock.clear();

        if let Some(context) = context {
            if let Err(e) = self.transport.disconnect(&context).await {
                warn!("⚠️ Error al desconectar: {}", e);
            }
        }

        info!("👋 Scheduler cerrado, {} canciones descartadas", dropped);
    }

    fn pending_duration(&self) -> Duration {
        self.pending.iter().map(|job| job.track.duration()).sum()
    }

    fn snapshot(&self, now: Instant) -> QueueSnapshot {
        let now_playing = match (self.clock.track(), self.clock.context()) {
            (Some(track), Some(context)) => Some(NowPlaying {
                track: track.clone(),
                context: *context,
                elapsed: self.clock.elapsed(now),
                remaining: self.clock.remaining(now),
                paused: self.clock.is_paused(),
                streaming: self.streaming,
            }),
            _ => None,
        };

        let waits = estimate_waits(
            self.clock.remaining(now),
            self.pending.iter().map(|job| job.track.duration()),
        );

        let upcoming = self
            .pending
            .iter()
            .zip(waits)
            .enumerate()
            .map(|(i, (job, starts_in))| Upcoming {
                position: i + 1,
                track: job.track.clone(),
                context: job.context,
                starts_in,
            })
            .collect();

        QueueSnapshot {
            now_playing,
            upcoming,
        }
    }
}

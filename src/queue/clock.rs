use std::time::Duration;
use tokio::time::Instant;

use super::track::{JobToken, SubmissionContext, TrackDescriptor};

/// Estado de "reproduciendo ahora".
///
/// El tiempo transcurrido no avanza mientras la pista está en pausa: cada
/// pausa acumula su duración en `paused_total` al reanudar.
#[derive(Debug, Default)]
pub struct PlaybackClock {
    current: Option<Playing>,
}

#[derive(Debug)]
struct Playing {
    token: JobToken,
    track: TrackDescriptor,
    context: SubmissionContext,
    started_at: Instant,
    paused_at: Option<Instant>,
    paused_total: Duration,
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marca `track` como la pista actual, corriendo desde `now`.
    pub fn start(
        &mut self,
        token: JobToken,
        track: TrackDescriptor,
        context: SubmissionContext,
        now: Instant,
    ) {
        self.current = Some(Playing {
            token,
            track,
            context,
            started_at: now,
            paused_at: None,
            paused_total: Duration::ZERO,
        });
    }

    /// Reinicia el tiempo transcurrido a cero en `now`, conservando la pausa.
    pub fn rebase(&mut self, now: Instant) {
        if let Some(playing) = self.current.as_mut() {
            playing.started_at = now;
            playing.paused_total = Duration::ZERO;
            if playing.paused_at.is_some() {
                playing.paused_at = Some(now);
            }
        }
    }

    /// Vuelve a reposo y devuelve la pista que sonaba.
    pub fn clear(&mut self) -> Option<TrackDescriptor> {
        self.current.take().map(|playing| playing.track)
    }

    /// Devuelve `false` si no había nada que pausar o ya estaba en pausa.
    pub fn pause(&mut self, now: Instant) -> bool {
        match self.current.as_mut() {
            Some(playing) if playing.paused_at.is_none() => {
                playing.paused_at = Some(now);
                true
            }
            _ => false,
        }
    }

    /// Devuelve `false` si no había nada en pausa.
    pub fn resume(&mut self, now: Instant) -> bool {
        match self.current.as_mut() {
            Some(playing) => match playing.paused_at.take() {
                Some(paused_at) => {
                    playing.paused_total += now.saturating_duration_since(paused_at);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match &self.current {
            Some(playing) => {
                let until = playing.paused_at.unwrap_or(now);
                until
                    .saturating_duration_since(playing.started_at)
                    .saturating_sub(playing.paused_total)
            }
            None => Duration::ZERO,
        }
    }

    /// Tiempo restante de la pista actual; cero en reposo o si ya se pasó.
    pub fn remaining(&self, now: Instant) -> Duration {
        match &self.current {
            Some(playing) => playing.track.duration().saturating_sub(self.elapsed(now)),
            None => Duration::ZERO,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    pub fn is_paused(&self) -> bool {
        self.current
            .as_ref()
            .is_some_and(|playing| playing.paused_at.is_some())
    }

    pub fn token(&self) -> Option<JobToken> {
        self.current.as_ref().map(|playing| playing.token)
    }

    pub fn track(&self) -> Option<&TrackDescriptor> {
        self.current.as_ref().map(|playing| &playing.track)
    }

    pub fn context(&self) -> Option<&SubmissionContext> {
        self.current.as_ref().map(|playing| &playing.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> SubmissionContext {
        SubmissionContext {
            guild_id: 1,
            voice_channel_id: 2,
            text_channel_id: 3,
            requested_by: 4,
        }
    }

    fn clock_with(duration_secs: u64, now: Instant) -> PlaybackClock {
        let mut clock = PlaybackClock::new();
        let track = TrackDescriptor::new("A", "https://a", Duration::from_secs(duration_secs));
        clock.start(JobToken::new(1), track, context(), now);
        clock
    }

    #[test]
    fn idle_clock_has_nothing_remaining() {
        let clock = PlaybackClock::new();
        let now = Instant::now();
        assert!(clock.is_idle());
        assert!(!clock.is_paused());
        assert_eq!(clock.remaining(now), Duration::ZERO);
        assert_eq!(clock.elapsed(now), Duration::ZERO);
    }

    #[test]
    fn remaining_counts_down_while_running() {
        let t0 = Instant::now();
        let clock = clock_with(100, t0);
        assert_eq!(clock.remaining(t0 + Duration::from_secs(60)), Duration::from_secs(40));
    }

    #[test]
    fn remaining_saturates_at_zero() {
        let t0 = Instant::now();
        let clock = clock_with(100, t0);
        assert_eq!(clock.remaining(t0 + Duration::from_secs(500)), Duration::ZERO);
    }

    #[test]
    fn paused_time_is_not_counted() {
        let t0 = Instant::now();
        let mut clock = clock_with(100, t0);

        assert!(clock.pause(t0 + Duration::from_secs(60)));
        // 30s de pausa
        assert_eq!(clock.remaining(t0 + Duration::from_secs(90)), Duration::from_secs(40));
        assert!(clock.resume(t0 + Duration::from_secs(90)));

        assert_eq!(clock.remaining(t0 + Duration::from_secs(90)), Duration::from_secs(40));
        assert_eq!(clock.remaining(t0 + Duration::from_secs(100)), Duration::from_secs(30));
    }

    #[test]
    fn pause_and_resume_are_idempotent() {
        let t0 = Instant::now();
        let mut clock = clock_with(100, t0);

        assert!(clock.pause(t0 + Duration::from_secs(10)));
        assert!(!clock.pause(t0 + Duration::from_secs(20)));
        assert!(clock.resume(t0 + Duration::from_secs(30)));
        assert!(!clock.resume(t0 + Duration::from_secs(40)));

        // 20s de pausa desde el primer pause
        assert_eq!(clock.elapsed(t0 + Duration::from_secs(40)), Duration::from_secs(20));
    }

    #[test]
    fn rebase_restarts_elapsed_and_keeps_pause() {
        let t0 = Instant::now();
        let mut clock = clock_with(100, t0);
        clock.pause(t0 + Duration::from_secs(5));

        let t1 = t0 + Duration::from_secs(8);
        clock.rebase(t1);
        assert!(clock.is_paused());
        assert_eq!(clock.remaining(t1 + Duration::from_secs(50)), Duration::from_secs(100));

        clock.resume(t1 + Duration::from_secs(50));
        assert_eq!(clock.remaining(t1 + Duration::from_secs(60)), Duration::from_secs(90));
    }

    #[test]
    fn clear_returns_the_track() {
        let t0 = Instant::now();
        let mut clock = clock_with(100, t0);
        assert_eq!(clock.clear().map(|t| t.title().to_string()), Some("A".to_string()));
        assert!(clock.is_idle());
        assert!(!clock.pause(t0));
    }
}

use serde::{Deserialize, Serialize};
use std::{fmt, time::Duration};

/// Metadata inmutable de una pista reproducible.
///
/// Se crea cuando una petición es resuelta y nunca se modifica; el scheduler
/// la descarta junto con su trabajo en cola.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackDescriptor {
    title: String,
    duration: Duration,
    locator: String,
    artwork: Option<String>,
}

impl TrackDescriptor {
    pub fn new(title: impl Into<String>, locator: impl Into<String>, duration: Duration) -> Self {
        Self {
            title: title.into(),
            duration,
            locator: locator.into(),
            artwork: None,
        }
    }

    pub fn with_artwork(mut self, artwork: impl Into<String>) -> Self {
        self.artwork = Some(artwork.into());
        self
    }

    // Getters
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn duration(&self) -> Duration {
        self.duration
    }
    pub fn locator(&self) -> &str {
        &self.locator
    }
    pub fn artwork(&self) -> Option<&str> {
        self.artwork.as_deref()
    }
}

/// Destino de una petición: dónde suena y dónde se responde.
///
/// Los IDs son los de Discord, pero el scheduler los trata como opacos.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubmissionContext {
    pub guild_id: u64,
    pub voice_channel_id: u64,
    pub text_channel_id: u64,
    pub requested_by: u64,
}

/// Identificador estable de un trabajo en cola.
///
/// Los eventos de audio llevan el token del trabajo que los originó; un
/// token que ya no es el actual se ignora.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobToken(u64);

impl JobToken {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Una pista ligada a su contexto, esperando promoción.
#[derive(Debug, Clone)]
pub(crate) struct QueuedJob {
    pub token: JobToken,
    pub track: TrackDescriptor,
    pub context: SubmissionContext,
}

//! Cola de reproducción por servidor.
//!
//! Una pista a la vez, orden FIFO, promoción solo por fin de stream o salto.
//! Las esperas que se reportan son estimaciones derivadas de las duraciones.

pub mod clock;
pub mod scheduler;
pub mod track;

pub use clock::PlaybackClock;
pub use scheduler::{
    estimate_waits, EnqueueOutcome, NowPlaying, Placement, PlaybackDone, QueueScheduler,
    QueueSnapshot, SchedulerEvent, SchedulerHandle, SkipOutcome, Upcoming,
};
pub use track::{JobToken, SubmissionContext, TrackDescriptor};

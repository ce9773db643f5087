//! Cola de reproducción por eventos para un bot de música de Discord.
//!
//! El núcleo es [`queue`]: un scheduler por servidor que reproduce una pista
//! a la vez y solo avanza cuando el stream actual termina o se salta.

pub mod audio;
pub mod bot;
pub mod cache;
pub mod config;
pub mod error;
pub mod queue;
pub mod sources;
pub mod transport;

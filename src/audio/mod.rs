//! # Audio Module
//!
//! Boundary between the queue scheduler and the external decode pipeline.
//!
//! - [`fetch`] turns a track locator into decodable input (a media URL for
//!   ffmpeg to open, or bytes downloaded up front and piped through stdin)
//! - [`decoder`] launches ffmpeg with a fixed output contract and wraps its
//!   stdout in a [`FrameSource`]
//! - [`frames`] is the pull-based frame reader handed to the voice transport
//!
//! ## Output Format
//!
//! - **Sample Rate**: 48kHz (Discord standard, configurable)
//! - **Bit Depth**: 16-bit signed little-endian integers
//! - **Channels**: Stereo (2 channels, interleaved)
//! - **Frame**: 20ms, 3840 bytes with the defaults
//!
//! Every [`FrameSource`] owns its decoder process: the process is killed on
//! [`FrameSource::close`], on drop, and reaped at end of stream.

use async_trait::async_trait;

pub mod decoder;
pub mod fetch;
pub mod frames;

pub use decoder::FfmpegSessions;
pub use fetch::{AudioInput, Fetcher, StreamFetcher};
pub use frames::FrameSource;

use crate::{error::AudioError, queue::SubmissionContext};

/// Adaptador de sesiones: inicia la decodificación de un locator.
#[async_trait]
pub trait AudioSessions: Send + Sync {
    async fn start(
        &self,
        locator: &str,
        context: &SubmissionContext,
    ) -> Result<FrameSource, AudioError>;
}

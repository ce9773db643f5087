//! Voice transport collaborator.
//!
//! The scheduler never talks to Discord directly: it hands each decoded
//! [`FrameSource`] to a [`VoiceTransport`] together with a [`PlaybackDone`]
//! notifier, and the transport reports end of stream through it.

use async_trait::async_trait;

use crate::{
    audio::FrameSource,
    error::TransportError,
    queue::{PlaybackDone, SubmissionContext},
};

#[async_trait]
pub trait VoiceTransport: Send + Sync {
    /// Conecta al canal de voz del contexto si aún no lo está.
    async fn connect(&self, context: &SubmissionContext) -> Result<(), TransportError>;

    /// Empieza a enviar `frames`, reemplazando cualquier stream activo.
    ///
    /// Debe volver en cuanto el stream quede entregado; el fin del stream se
    /// reporta después a través de `done`.
    async fn send_frames(
        &self,
        context: &SubmissionContext,
        frames: FrameSource,
        done: PlaybackDone,
    ) -> Result<(), TransportError>;

    async fn pause(&self, context: &SubmissionContext) -> Result<(), TransportError>;

    async fn resume(&self, context: &SubmissionContext) -> Result<(), TransportError>;

    /// Detiene el stream activo y libera su decodificador.
    async fn stop(&self, context: &SubmissionContext) -> Result<(), TransportError>;

    async fn disconnect(&self, context: &SubmissionContext) -> Result<(), TransportError>;
}

use bytes::{Bytes, BytesMut};
use std::process::ExitStatus;
use tokio::{
    io::{AsyncRead, AsyncReadExt},
    process::Child,
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::error::AudioError;

/// Productor pull de frames PCM de tamaño fijo.
///
/// `read_frame` entrega exactamente un frame o `None` al terminar; nunca un
/// frame corto. Si la fuente viene de un proceso decodificador, el proceso
/// muere al llamar a [`FrameSource::close`] o al soltar el valor.
pub struct FrameSource {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    frame_size: usize,
    process: Option<DecodeProcess>,
    frames_read: u64,
    finished: bool,
}

/// El proceso decodificador y las tareas que lo alimentan.
pub(crate) struct DecodeProcess {
    pub child: Child,
    pub path: String,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Drop for DecodeProcess {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        // El Child se creó con kill_on_drop
    }
}

impl FrameSource {
    /// Frames sobre cualquier lector asíncrono, sin proceso asociado.
    pub fn from_reader<R>(reader: R, frame_size: usize) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            reader: Box::new(reader),
            frame_size,
            process: None,
            frames_read: 0,
            finished: false,
        }
    }

    pub(crate) fn from_process<R>(reader: R, frame_size: usize, process: DecodeProcess) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            process: Some(process),
            ..Self::from_reader(reader, frame_size)
        }
    }

    pub fn frame_size(&self) -> usize {
        self.frame_size
    }

    pub fn frames_read(&self) -> u64 {
        self.frames_read
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Lee el siguiente frame completo.
    ///
    /// Un resto final más corto que un frame se descarta y cuenta como fin de
    /// stream. Si el decodificador sale con error sin haber producido ningún
    /// frame se devuelve [`AudioError::DecoderFailed`].
    pub async fn read_frame(&mut self) -> Result<Option<Bytes>, AudioError> {
        if self.finished {
            return Ok(None);
        }

        let mut buf = BytesMut::zeroed(self.frame_size);
        let mut filled = 0;

        while filled < self.frame_size {
            let n = match self.reader.read(&mut buf[filled..]).await {
                Ok(n) => n,
                Err(e) => {
                    self.finished = true;
                    self.release().await;
                    return Err(e.into());
                }
            };
            if n == 0 {
                break;
            }
            filled += n;
        }

        if filled < self.frame_size {
            self.finished = true;
            if filled > 0 {
                debug!("🔚 Descartando frame parcial de {} bytes", filled);
            }
            return self.finish().await;
        }

        self.frames_read += 1;
        Ok(Some(buf.freeze()))
    }

    /// Termina el decodificador y libera sus handles.
    pub async fn close(mut self) -> Result<(), AudioError> {
        self.finished = true;
        self.release().await;
        Ok(())
    }

    async fn finish(&mut self) -> Result<Option<Bytes>, AudioError> {
        let Some(mut process) = self.process.take() else {
            return Ok(None);
        };

        let status: ExitStatus = process.child.wait().await?;
        if status.success() {
            debug!("✅ {} terminó tras {} frames", process.path, self.frames_read);
            return Ok(None);
        }

        if self.frames_read == 0 {
            return Err(AudioError::DecoderFailed { status });
        }

        warn!(
            "⚠️ {} terminó con {} tras {} frames",
            process.path, status, self.frames_read
        );
        Ok(None)
    }

    async fn release(&mut self) {
        if let Some(mut process) = self.process.take() {
            if let Err(e) = process.child.kill().await {
                debug!("No se pudo matar {}: {}", process.path, e);
            }
        }
    }
}

impl std::fmt::Debug for FrameSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSource")
            .field("frame_size", &self.frame_size)
            .field("frames_read", &self.frames_read)
            .field("finished", &self.finished)
            .field("has_process", &self.process.is_some())
            .finish()
    }
}

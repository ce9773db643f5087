use std::{process::ExitStatus, time::Duration};
use thiserror::Error;

/// Errores de la cola de reproducción.
///
/// Todas las variantes excepto [`SchedulerError::Closed`] son errores de
/// entrada del usuario: se reportan sin mutar el estado del scheduler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    #[error("Posición inválida {index}: hay {len} canciones en espera")]
    InvalidIndex { index: usize, len: usize },

    #[error("No hay nada reproduciéndose")]
    NothingPlaying,

    #[error("La cola está llena (máximo {max} canciones)")]
    QueueFull { max: usize },

    #[error("La canción dura {}, el máximo es {}", human(.duration), human(.max))]
    TrackTooLong { duration: Duration, max: Duration },

    #[error("El reproductor de este servidor ya fue cerrado")]
    Closed,
}

impl SchedulerError {
    /// `true` para errores causados por la petición del usuario.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, SchedulerError::Closed)
    }
}

fn human(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

/// Errores del colaborador de resolución (query -> metadata).
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Debes indicar una URL o un término de búsqueda")]
    EmptyQuery,

    #[error("No se encontraron resultados para: {0}")]
    NotFound(String),

    #[error("No se pueden encolar transmisiones en vivo: {0}")]
    LiveStream(String),

    #[error("No existe el resultado {choice}: la búsqueda devolvió {found}")]
    NoSuchResult { choice: usize, found: usize },

    #[error("{tool} falló: {message}")]
    Tool { tool: String, message: String },

    #[error("Respuesta inválida de yt-dlp: {0}")]
    Parse(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errores al iniciar o leer una sesión de audio.
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("{path} no fue encontrado")]
    ExecutableNotFound { path: String },

    #[error("No se pudo lanzar {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("El decodificador terminó con {status} sin producir audio")]
    DecoderFailed { status: ExitStatus },

    #[error("Fuente de audio no soportada: {0}")]
    UnsupportedLocator(String),

    #[error("No se pudo obtener el audio: {0}")]
    Fetch(String),

    #[error("Descarga demasiado grande ({size} bytes, máximo {max})")]
    DownloadTooLarge { size: u64, max: u64 },

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errores del transporte de voz.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("No hay conexión de voz para el servidor {0}")]
    NotConnected(u64),

    #[error("Error al conectar al canal de voz: {0}")]
    Connect(String),

    #[error("Error de reproducción: {0}")]
    Playback(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_closed_is_not_a_user_error() {
        assert!(SchedulerError::NothingPlaying.is_user_error());
        assert!(SchedulerError::InvalidIndex { index: 3, len: 1 }.is_user_error());
        assert!(SchedulerError::QueueFull { max: 10 }.is_user_error());
        assert!(!SchedulerError::Closed.is_user_error());
    }

    #[test]
    fn too_long_message_is_human_readable() {
        let err = SchedulerError::TrackTooLong {
            duration: Duration::from_secs(7260),
            max: Duration::from_secs(7200),
        };
        assert_eq!(err.to_string(), "La canción dura 2h 1m, el máximo es 2h");
    }
}

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::{error::AudioError, sources::ytdlp::is_youtube_url};

/// Entrada del decodificador: una URL que ffmpeg abre por sí mismo o bytes
/// ya descargados que se le pasan por stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioInput {
    Url(String),
    Bytes(Bytes),
}

/// Colaborador que convierte un locator en algo decodificable.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn open(&self, locator: &str) -> Result<AudioInput, AudioError>;
}

/// Fetcher por defecto: yt-dlp para YouTube, descarga HTTP para el resto.
pub struct StreamFetcher {
    ytdlp_path: String,
    http: reqwest::Client,
    max_download_bytes: u64,
}

impl StreamFetcher {
    pub fn new(ytdlp_path: impl Into<String>, max_download_bytes: u64) -> Result<Self, AudioError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent("Mozilla/5.0 (compatible; Discord Music Bot)")
            .build()?;

        Ok(Self {
            ytdlp_path: ytdlp_path.into(),
            http,
            max_download_bytes,
        })
    }

    /// Obtiene la URL de streaming de audio
    async fn stream_url(&self, locator: &str) -> Result<String, AudioError> {
        debug!("🎵 Obteniendo URL de stream para: {}", locator);

        let output = tokio::process::Command::new(&self.ytdlp_path)
            .args([
                "--no-playlist",
                "-f",
                "bestaudio/best",
                "--get-url",
                "--no-warnings",
                locator,
            ])
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => AudioError::ExecutableNotFound {
                    path: self.ytdlp_path.clone(),
                },
                _ => AudioError::Spawn {
                    path: self.ytdlp_path.clone(),
                    source: e,
                },
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(AudioError::Fetch(error.trim().to_string()));
        }

        first_line(&output.stdout)
            .ok_or_else(|| AudioError::Fetch("No se pudo obtener URL de stream".to_string()))
    }

    async fn download(&self, url: &str) -> Result<Bytes, AudioError> {
        let response = self.http.get(url).send().await?.error_for_status()?;

        if let Some(size) = response.content_length() {
            if size > self.max_download_bytes {
                return Err(AudioError::DownloadTooLarge {
                    size,
                    max: self.max_download_bytes,
                });
            }
        }

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_download_bytes {
                return Err(AudioError::DownloadTooLarge {
                    size: body.len() as u64,
                    max: self.max_download_bytes,
                });
            }
        }

        info!("📥 Descargados {} bytes de {}", body.len(), url);
        Ok(Bytes::from(body))
    }
}

#[async_trait]
impl Fetcher for StreamFetcher {
    async fn open(&self, locator: &str) -> Result<AudioInput, AudioError> {
        if is_youtube_url(locator) {
            return Ok(AudioInput::Url(self.stream_url(locator).await?));
        }

        match Url::parse(locator) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                Ok(AudioInput::Bytes(self.download(locator).await?))
            }
            _ => Err(AudioError::UnsupportedLocator(locator.to_string())),
        }
    }
}

fn first_line(stdout: &[u8]) -> Option<String> {
    String::from_utf8_lossy(stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_non_empty_line() {
        assert_eq!(
            first_line(b"\nhttps://cdn.example/a.webm\nhttps://cdn.example/b.webm\n"),
            Some("https://cdn.example/a.webm".to_string())
        );
        assert_eq!(first_line(b"  \n"), None);
    }

    #[tokio::test]
    async fn rejects_non_http_locators() {
        let fetcher = StreamFetcher::new("yt-dlp", 1024).unwrap();
        let err = fetcher.open("file:///etc/passwd").await.unwrap_err();
        assert!(matches!(err, AudioError::UnsupportedLocator(_)));
    }

    #[tokio::test]
    async fn missing_ytdlp_is_reported() {
        let fetcher = StreamFetcher::new("/nonexistent/yt-dlp", 1024).unwrap();
        let err = fetcher
            .open("https://www.youtube.com/watch?v=dQw4w9WgXcQ")
            .await
            .unwrap_err();
        assert!(matches!(err, AudioError::ExecutableNotFound { .. }));
    }
}

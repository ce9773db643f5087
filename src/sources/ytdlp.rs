use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::{process::Command, sync::Semaphore};
use tracing::{debug, info};
use url::Url;

use super::{Query, TrackResolver};
use crate::{error::ResolveError, queue::TrackDescriptor};

const YOUTUBE_HOSTS: [&str; 5] = [
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Verifica si una URL es de YouTube
pub fn is_youtube_url(url: &str) -> bool {
    let parsed = Url::parse(url).or_else(|_| Url::parse(&format!("https://{url}")));
    match parsed {
        Ok(url) => url
            .host_str()
            .is_some_and(|host| YOUTUBE_HOSTS.contains(&host)),
        Err(_) => false,
    }
}

/// Información extraída de yt-dlp
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    id: Option<String>,
    title: String,
    duration: Option<f64>,
    thumbnail: Option<String>,
    #[serde(default)]
    thumbnails: Vec<Thumbnail>,
    webpage_url: Option<String>,
    /// En modo `--flat-playlist` es la URL de la página, no la del stream
    url: Option<String>,
    is_live: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YtDlpInfo {
    fn into_track(self) -> Result<TrackDescriptor, ResolveError> {
        let duration = match self.duration {
            Some(secs) if secs > 0.0 && !self.is_live.unwrap_or(false) => {
                Duration::from_secs_f64(secs)
            }
            _ => return Err(ResolveError::LiveStream(self.title)),
        };

        let locator = self
            .webpage_url
            .or(self.url)
            .or_else(|| {
                self.id
                    .map(|id| format!("https://www.youtube.com/watch?v={id}"))
            })
            .ok_or_else(|| ResolveError::NotFound(self.title.clone()))?;

        let artwork = self
            .thumbnail
            .or_else(|| self.thumbnails.into_iter().last().map(|t| t.url));

        let track = TrackDescriptor::new(self.title, locator, duration);
        Ok(match artwork {
            Some(artwork) => track.with_artwork(artwork),
            None => track,
        })
    }
}

/// Convierte una línea JSON de yt-dlp en un descriptor.
fn parse_info(line: &str) -> Result<TrackDescriptor, ResolveError> {
    serde_json::from_str::<YtDlpInfo>(line)?.into_track()
}

/// Resultados de búsqueda, una línea JSON por resultado.
///
/// Las líneas ilegibles y las transmisiones en vivo se omiten.
fn parse_search(stdout: &str) -> Vec<TrackDescriptor> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match parse_info(line) {
            Ok(track) => Some(track),
            Err(e) => {
                debug!("Resultado omitido: {}", e);
                None
            }
        })
        .collect()
}

/// Resolución de metadata con yt-dlp.
pub struct YtDlpResolver {
    path: String,
    rate_limiter: Semaphore,
}

impl YtDlpResolver {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            // Limitar procesos concurrentes para evitar rate limiting
            rate_limiter: Semaphore::new(3),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<String, ResolveError> {
        let _permit = self.rate_limiter.acquire().await.map_err(|e| ResolveError::Tool {
            tool: self.path.clone(),
            message: e.to_string(),
        })?;

        let output = Command::new(&self.path)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ResolveError::Tool {
                    tool: self.path.clone(),
                    message: "no está instalado".to_string(),
                },
                _ => ResolveError::Io(e),
            })?;

        if !output.status.success() {
            let error = String::from_utf8_lossy(&output.stderr);
            return Err(ResolveError::Tool {
                tool: self.path.clone(),
                message: error.trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolveError> {
        let target = match Query::parse(query)? {
            Query::Url(url) => {
                debug!("📊 Obteniendo info de: {}", url);
                url.to_string()
            }
            Query::Search(terms) => {
                info!("🔍 Buscando: {}", terms);
                format!("ytsearch1:{terms}")
            }
        };

        let stdout = self
            .run(&["--dump-json", "--no-playlist", "--no-warnings", &target])
            .await?;

        let line = stdout
            .lines()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| ResolveError::NotFound(query.trim().to_string()))?;

        parse_info(line)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackDescriptor>, ResolveError> {
        let terms = match Query::parse(query)? {
            Query::Search(terms) => terms,
            Query::Url(url) => return Ok(vec![self.resolve(url.as_str()).await?]),
        };

        info!("🔍 Búsqueda en YouTube: {} (máx {})", terms, limit);
        let target = format!("ytsearch{limit}:{terms}");
        let stdout = self
            .run(&[
                "--dump-json",
                "--flat-playlist",
                "--no-playlist",
                "--no-warnings",
                &target,
            ])
            .await?;

        let results = parse_search(&stdout);
        if results.is_empty() {
            return Err(ResolveError::NotFound(terms));
        }
        Ok(results)
    }
}

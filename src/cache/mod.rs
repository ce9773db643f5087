//! # Cache Module
//!
//! Caché de metadata resuelta. Evita volver a lanzar yt-dlp para consultas
//! repetidas (`/play` de la misma canción, búsquedas populares).
//!
//! Se controla con `CACHE_SIZE` (entradas) y `CACHE_TTL` (segundos).

pub mod lru_cache;

pub use lru_cache::{CacheMetrics, LRUCache};

use tracing::info;

use crate::queue::TrackDescriptor;

/// Caché de descriptores por consulta normalizada.
pub type MusicCache = LRUCache<String, TrackDescriptor>;

/// Caché de resultados de búsqueda por consulta normalizada y límite.
pub type SearchCache = LRUCache<(String, usize), Vec<TrackDescriptor>>;

/// Clave de caché para una consulta de usuario.
///
/// Las URLs se conservan tal cual; los términos de búsqueda ignoran
/// mayúsculas y espacios repetidos.
pub fn cache_key(query: &str) -> String {
    let query = query.trim();
    if query.starts_with("http://") || query.starts_with("https://") {
        return query.to_string();
    }
    query
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

impl MusicCache {
    /// Mantenimiento periódico: elimina entradas expiradas.
    pub fn cleanup_old_entries(&self) {
        let removed = self.cleanup_expired();
        if removed > 0 {
            let metrics = self.metrics();
            info!(
                "🧹 Cache cleanup: {} entradas expiradas eliminadas (hit rate {:.0}%)",
                removed,
                metrics.hit_rate() * 100.0
            );
        }
    }
}

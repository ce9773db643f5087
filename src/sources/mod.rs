//! Resolución de consultas de usuario a [`TrackDescriptor`].

pub mod ytdlp;

pub use ytdlp::{is_youtube_url, YtDlpResolver};

use async_trait::async_trait;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

use crate::{
    cache::{cache_key, MusicCache, SearchCache},
    error::ResolveError,
    queue::TrackDescriptor,
};

/// Lo que el usuario escribió en `/play` o `/search`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Url(Url),
    Search(String),
}

impl Query {
    pub fn parse(input: &str) -> Result<Self, ResolveError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ResolveError::EmptyQuery);
        }

        match Url::parse(input) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(Query::Url(url)),
            _ => Ok(Query::Search(input.to_string())),
        }
    }
}

/// Colaborador que obtiene la metadata de una pista.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    /// Primer resultado para una URL o término de búsqueda.
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolveError>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackDescriptor>, ResolveError>;
}

/// Resuelve el `choice`-ésimo resultado (desde 1) de `search(query, limit)`.
///
/// Con la caché delante, la lista es la misma que el usuario vio en `/search`.
pub async fn pick_result(
    resolver: &dyn TrackResolver,
    query: &str,
    limit: usize,
    choice: usize,
) -> Result<TrackDescriptor, ResolveError> {
    let results = resolver.search(query, limit).await?;
    if results.is_empty() {
        return Err(ResolveError::NotFound(query.trim().to_string()));
    }

    let found = results.len();
    let picked = choice
        .checked_sub(1)
        .and_then(|i| results.into_iter().nth(i))
        .ok_or(ResolveError::NoSuchResult { choice, found })?;

    debug!("🔢 Resultado {} de {}: {}", choice, found, picked.title());
    // Los resultados de búsqueda son planos; la metadata completa sale de resolve
    resolver.resolve(picked.locator()).await
}

/// Resolver con caché TTL delante de otro resolver.
pub struct CachingResolver<R> {
    inner: R,
    tracks: MusicCache,
    searches: SearchCache,
}

impl<R: TrackResolver> CachingResolver<R> {
    pub fn new(inner: R, capacity: usize, ttl: Duration) -> Self {
        Self {
            inner,
            tracks: MusicCache::new(capacity, Some(ttl)),
            searches: SearchCache::new(capacity, Some(ttl)),
        }
    }

    pub fn cache(&self) -> &MusicCache {
        &self.tracks
    }

    /// Limpieza periódica de entradas expiradas.
    pub fn spawn_maintenance(&self, every: Duration) -> JoinHandle<()> {
        let tracks = self.tracks.clone();
        let searches = self.searches.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                tracks.cleanup_old_entries();
                searches.cleanup_expired();
            }
        })
    }
}

#[async_trait]
impl<R: TrackResolver> TrackResolver for CachingResolver<R> {
    async fn resolve(&self, query: &str) -> Result<TrackDescriptor, ResolveError> {
        let key = cache_key(query);
        if let Some(track) = self.tracks.get(&key) {
            debug!("🎯 Cache hit: {}", key);
            return Ok(track);
        }

        let track = self.inner.resolve(query).await?;
        self.tracks.insert(key, track.clone());
        Ok(track)
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<TrackDescriptor>, ResolveError> {
        let key = (cache_key(query), limit);
        if let Some(results) = self.searches.get(&key) {
            debug!("🎯 Cache hit de búsqueda: {}", key.0);
            return Ok(results);
        }

        let results = self.inner.search(query, limit).await?;
        self.searches.insert(key, results.clone());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(title: &str) -> TrackDescriptor {
        TrackDescriptor::new(title, format!("https://example.com/{title}"), Duration::from_secs(60))
    }

    #[test]
    fn parses_queries() {
        assert!(matches!(Query::parse("  "), Err(ResolveError::EmptyQuery)));
        assert!(matches!(
            Query::parse("https://youtu.be/abc"),
            Ok(Query::Url(url)) if url.host_str() == Some("youtu.be")
        ));
        assert_eq!(
            Query::parse("  lofi beats ").unwrap(),
            Query::Search("lofi beats".to_string())
        );
        // Un esquema que no es http no cuenta como URL
        assert_eq!(
            Query::parse("mailto:a@b.c").unwrap(),
            Query::Search("mailto:a@b.c".to_string())
        );
    }

    #[tokio::test]
    async fn repeated_queries_hit_the_cache() {
        let mut inner = MockTrackResolver::new();
        inner
            .expect_resolve()
            .times(1)
            .returning(|_| Ok(track("Uno")));

        let resolver = CachingResolver::new(inner, 10, Duration::from_secs(60));
        assert_eq!(resolver.resolve("Uno").await.unwrap().title(), "Uno");
        // Misma consulta normalizada
        assert_eq!(resolver.resolve("  uno ").await.unwrap().title(), "Uno");
        assert_eq!(resolver.cache().metrics().hits, 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let mut inner = MockTrackResolver::new();
        inner
            .expect_resolve()
            .times(2)
            .returning(|q| Err(ResolveError::NotFound(q.to_string())));

        let resolver = CachingResolver::new(inner, 10, Duration::from_secs(60));
        assert!(resolver.resolve("nada").await.is_err());
        assert!(resolver.resolve("nada").await.is_err());
    }

    #[tokio::test]
    async fn searches_are_cached_per_limit() {
        let mut inner = MockTrackResolver::new();
        inner
            .expect_search()
            .times(2)
            .returning(|_, limit| Ok((0..limit).map(|i| track(&i.to_string())).collect()));

        let resolver = CachingResolver::new(inner, 10, Duration::from_secs(60));
        assert_eq!(resolver.search("rock", 3).await.unwrap().len(), 3);
        assert_eq!(resolver.search("rock", 3).await.unwrap().len(), 3);
        assert_eq!(resolver.search("rock", 5).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn picks_the_chosen_search_result() {
        let mut inner = MockTrackResolver::new();
        inner
            .expect_search()
            .times(1)
            .returning(|_, limit| Ok((1..=limit).map(|i| track(&i.to_string())).collect()));
        inner
            .expect_resolve()
            .withf(|locator| locator == "https://example.com/2")
            .times(1)
            .returning(|_| Ok(track("2").with_artwork("https://img/2.jpg")));

        let resolver = CachingResolver::new(inner, 10, Duration::from_secs(60));
        // Misma búsqueda que mostró /search: sale de la caché
        assert_eq!(resolver.search("rock", 3).await.unwrap().len(), 3);

        let picked = pick_result(&resolver, "rock", 3, 2).await.unwrap();
        assert_eq!(picked.title(), "2");
        assert_eq!(picked.artwork(), Some("https://img/2.jpg"));
    }

    #[tokio::test]
    async fn out_of_range_choice_is_rejected() {
        let mut inner = MockTrackResolver::new();
        inner
            .expect_search()
            .returning(|_, _| Ok(vec![track("a"), track("b")]));
        inner.expect_resolve().never();

        for choice in [0, 3] {
            let err = pick_result(&inner, "rock", 5, choice).await.unwrap_err();
            assert!(matches!(err, ResolveError::NoSuchResult { found: 2, .. }));
        }
    }

    #[tokio::test]
    async fn empty_search_is_not_found() {
        let mut inner = MockTrackResolver::new();
        inner.expect_search().returning(|_, _| Ok(Vec::new()));

        let err = pick_result(&inner, " nada ", 5, 1).await.unwrap_err();
        assert!(matches!(err, ResolveError::NotFound(q) if q == "nada"));
    }
}

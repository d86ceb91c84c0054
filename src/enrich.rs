use crate::cache::{cache_key, ImageCache};
use crate::config::SiteConfig;
use crate::constants::{PLACEHOLDER_BACKDROP, PLACEHOLDER_POSTER, PLACEHOLDER_SOURCE, REFERENCE_SOURCE};
use crate::error::Result;
use crate::extract::SiteExtractor;
use crate::reference::{ReferenceClient, ReferenceData};
use crate::types::EnrichedImages;
use chrono::Datelike;
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Resolves poster/backdrop/metadata for a (title, year) through an
/// ordered fallback chain: cache, reference service, image scrape,
/// placeholder. Never fails; the placeholder tier always produces a
/// usable payload.
///
/// Sole owner of the [`ImageCache`]: successful non-placeholder results
/// are written through, placeholder results never are, so future lookups
/// retry the live sources.
pub struct Enricher {
    cache: ImageCache,
    reference: ReferenceClient,
    extractor: Arc<SiteExtractor>,
    fallback_sites: Vec<SiteConfig>,
    scrape_delay: Duration,
}

impl Enricher {
    pub fn new(
        cache: ImageCache,
        reference: ReferenceClient,
        extractor: Arc<SiteExtractor>,
        fallback_sites: Vec<SiteConfig>,
        scrape_delay: Duration,
    ) -> Self {
        Self {
            cache,
            reference,
            extractor,
            fallback_sites,
            scrape_delay,
        }
    }

    /// Resolve images and metadata for one movie.
    #[instrument(skip(self))]
    pub async fn resolve(&self, title: &str, year: Option<i32>) -> EnrichedImages {
        let year = year.unwrap_or_else(|| chrono::Utc::now().year());
        let key = cache_key(title, year);

        // Tier 1: cache. A hit returns the stored payload verbatim with
        // no network traffic.
        match self.cache.get(&key) {
            Ok(Some(hit)) => {
                counter!("tracker_enrichment_resolved_total", "source" => crate::constants::CACHE_SOURCE)
                    .increment(1);
                return hit;
            }
            Ok(None) => {}
            Err(e) => warn!("Cache lookup failed for {}: {}", key, e),
        }
        counter!("tracker_cache_misses_total").increment(1);

        // Tier 2: structured reference service, preferred for accuracy
        let reference_data = self.reference.lookup(title, Some(year)).await;
        if let Some(data) = &reference_data {
            if let (Some(poster), Some(backdrop)) = (&data.poster_url, &data.backdrop_url) {
                let payload =
                    build_payload(Some(data), poster.clone(), backdrop.clone(), REFERENCE_SOURCE);
                self.store(&key, &payload);
                counter!("tracker_enrichment_resolved_total", "source" => REFERENCE_SOURCE)
                    .increment(1);
                return payload;
            }
            debug!("Reference data for '{}' lacks poster or backdrop", title);
        }

        // Tier 3: best-effort scrape for an image, first confirmed hit
        // wins; partial reference metadata rides along
        for (attempt, site) in self.fallback_sites.iter().enumerate() {
            if attempt > 0 {
                // Deliberate backpressure between attempts, not a retry wait
                tokio::time::sleep(self.scrape_delay).await;
            }
            match self.extractor.find_image(site, title).await {
                Ok(Some(image_url)) => {
                    let backdrop = reference_data
                        .as_ref()
                        .and_then(|d| d.backdrop_url.clone())
                        .unwrap_or_else(|| image_url.clone());
                    let payload =
                        build_payload(reference_data.as_ref(), image_url, backdrop, &site.name);
                    self.store(&key, &payload);
                    counter!("tracker_enrichment_resolved_total", "source" => site.name.clone())
                        .increment(1);
                    return payload;
                }
                Ok(None) => debug!("No image for '{}' on {}", title, site.name),
                Err(e) => warn!("Image scrape on {} failed: {}", site.name, e),
            }
        }

        // Tier 4: placeholder sentinel, carrying any partial metadata.
        // Never cached, so the next lookup retries the live sources.
        counter!("tracker_enrichment_resolved_total", "source" => PLACEHOLDER_SOURCE).increment(1);
        build_payload(
            reference_data.as_ref(),
            PLACEHOLDER_POSTER.to_string(),
            PLACEHOLDER_BACKDROP.to_string(),
            PLACEHOLDER_SOURCE,
        )
    }

    /// Expire cache entries unused for longer than the retention window
    pub fn cleanup_cache(&self, retention_days: i64) -> Result<usize> {
        self.cache.cleanup(retention_days)
    }

    fn store(&self, key: &str, payload: &EnrichedImages) {
        // Only reference/scrape payloads reach this point; the
        // placeholder tier returns without storing
        if let Err(e) = self.cache.put(key, payload) {
            warn!("Failed to cache enrichment for {}: {}", key, e);
        }
    }
}

fn build_payload(
    data: Option<&ReferenceData>,
    poster_url: String,
    backdrop_url: String,
    source: &str,
) -> EnrichedImages {
    EnrichedImages {
        poster_url,
        backdrop_url,
        overview: data.and_then(|d| d.overview.clone()),
        runtime_minutes: data.and_then(|d| d.runtime_minutes),
        genres: data.map(|d| d.genres.clone()).unwrap_or_default(),
        languages: data.map(|d| d.languages.clone()).unwrap_or_default(),
        countries: data.map(|d| d.countries.clone()).unwrap_or_default(),
        director: data.and_then(|d| d.director.clone()),
        cast: data.map(|d| d.cast.clone()).unwrap_or_default(),
        external_ids: data.map(|d| d.external_ids.clone()).unwrap_or_default(),
        vote_average: data.and_then(|d| d.vote_average),
        source: source.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    /// Enricher with no credential, no fallback sites, and an empty
    /// in-memory cache: every live tier is structurally unavailable
    fn offline_enricher() -> Enricher {
        let config = Config::default();
        Enricher::new(
            ImageCache::open_in_memory().unwrap(),
            ReferenceClient::new(config.reference, None),
            Arc::new(SiteExtractor::new(Duration::from_secs(1))),
            Vec::new(),
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn resolve_never_returns_empty_images() {
        let enricher = offline_enricher();
        let payload = enricher.resolve("Some Unknown Movie", Some(2024)).await;
        assert!(!payload.poster_url.is_empty());
        assert!(!payload.backdrop_url.is_empty());
        assert_eq!(payload.source, PLACEHOLDER_SOURCE);
        assert!(payload.is_placeholder());
    }

    #[tokio::test]
    async fn placeholder_results_are_not_cached() {
        let enricher = offline_enricher();
        enricher.resolve("Some Unknown Movie", Some(2024)).await;
        let key = cache_key("Some Unknown Movie", 2024);
        assert!(enricher.cache.get(&key).unwrap().is_none());
    }

    #[tokio::test]
    async fn cache_hit_wins_over_every_live_tier() {
        let enricher = offline_enricher();
        let key = cache_key("Heat", 1995);
        let cached = EnrichedImages {
            poster_url: "https://cdn.example.com/heat.jpg".to_string(),
            backdrop_url: "https://cdn.example.com/heat-b.jpg".to_string(),
            overview: Some("Crime saga.".to_string()),
            runtime_minutes: Some(170),
            genres: vec!["Crime".to_string()],
            languages: vec![],
            countries: vec![],
            director: Some("Michael Mann".to_string()),
            cast: vec![],
            external_ids: Default::default(),
            vote_average: Some(8.3),
            source: REFERENCE_SOURCE.to_string(),
        };
        enricher.cache.put(&key, &cached).unwrap();

        // The cached payload comes back verbatim instead of the
        // placeholder the offline tiers would produce
        let payload = enricher.resolve("Heat", Some(1995)).await;
        assert_eq!(payload.poster_url, cached.poster_url);
        assert_eq!(payload.source, REFERENCE_SOURCE);
        assert_eq!(payload.director.as_deref(), Some("Michael Mann"));
    }
}

use crate::config::ReferenceConfig;
use crate::types::{CastMember, ExternalIds};
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Asset type on the reference image CDN
#[derive(Debug, Clone, Copy)]
pub enum ImageKind {
    Poster,
    Backdrop,
}

/// Resolution tier for a composed image URL
#[derive(Debug, Clone, Copy)]
pub enum ImageTier {
    Standard,
    High,
    Original,
}

/// Canonical metadata for one movie, as returned by the reference service
#[derive(Debug, Clone, Default)]
pub struct ReferenceData {
    pub external_ids: ExternalIds,
    pub title: String,
    pub overview: Option<String>,
    pub poster_url: Option<String>,
    pub backdrop_url: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<String>,
    pub languages: Vec<String>,
    pub countries: Vec<String>,
    pub director: Option<String>,
    pub cast: Vec<CastMember>,
    pub vote_average: Option<f32>,
}

/// Client for the external structured movie database (title+year search,
/// then detail fetch). Never raises toward the pipeline: every failure
/// mode collapses to `None`.
///
/// A missing credential is a valid configuration state; the client then
/// short-circuits for the whole process lifetime. An auth rejection from
/// the service flips the same switch, since retrying a bad key would
/// only produce a request storm.
pub struct ReferenceClient {
    client: reqwest::Client,
    config: ReferenceConfig,
    api_key: String,
    disabled: AtomicBool,
}

impl ReferenceClient {
    pub fn new(config: ReferenceConfig, api_key: Option<String>) -> Self {
        let api_key = api_key.unwrap_or_default();
        let disabled = api_key.trim().is_empty();
        if disabled {
            warn!(
                "No reference service credential configured; set TMDB_API_KEY to enable \
                 metadata enrichment. Continuing without it."
            );
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            config,
            api_key,
            disabled: AtomicBool::new(disabled),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.disabled.load(Ordering::Relaxed)
    }

    /// Search the reference service and fetch detail for the best match.
    /// Returns `None` on zero results and on any transport or auth error.
    #[instrument(skip(self))]
    pub async fn lookup(&self, title: &str, year: Option<i32>) -> Option<ReferenceData> {
        if !self.is_enabled() {
            return None;
        }

        let top_match = self.search(title, year).await?;
        debug!(
            "Reference search matched '{}' (id {})",
            top_match.title.as_deref().unwrap_or("?"),
            top_match.id
        );

        match self.detail(top_match.id).await {
            Some(detail) => Some(self.assemble(detail)),
            None => {
                // Partial enrichment: keep the identifiers from search so
                // the caller can still dedupe by external id
                warn!("Detail fetch failed for reference id {}", top_match.id);
                Some(ReferenceData {
                    external_ids: ExternalIds {
                        reference_id: Some(top_match.id),
                        imdb_id: None,
                    },
                    title: top_match.title.unwrap_or_else(|| title.to_string()),
                    vote_average: top_match.vote_average,
                    ..ReferenceData::default()
                })
            }
        }
    }

    /// Compose a full image URL from a relative CDN path
    pub fn compose_image_url(&self, path: &str, kind: ImageKind, tier: ImageTier) -> String {
        let size = match (kind, tier) {
            (ImageKind::Poster, ImageTier::Standard) => "w500",
            (ImageKind::Poster, ImageTier::High) => "w780",
            (ImageKind::Backdrop, ImageTier::Standard) => "w780",
            (ImageKind::Backdrop, ImageTier::High) => "w1280",
            (_, ImageTier::Original) => "original",
        };
        format!(
            "{}/{}{}",
            self.config.image_base_url.trim_end_matches('/'),
            size,
            path
        )
    }

    async fn search(&self, title: &str, year: Option<i32>) -> Option<SearchItem> {
        let url = format!("{}/search/movie", self.config.base_url.trim_end_matches('/'));
        let mut query: Vec<(&str, String)> = vec![
            ("api_key", self.api_key.clone()),
            ("query", title.to_string()),
            ("language", "en-US".to_string()),
            ("include_adult", "false".to_string()),
        ];
        if let Some(year) = year {
            query.push(("year", year.to_string()));
        }

        let response = match self.client.get(&url).query(&query).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Reference search request failed: {}", e);
                return None;
            }
        };

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            // Configuration fault, not a transient one: disable for the
            // rest of the process so we do not hammer the service
            error!(
                "Reference service rejected the configured credential (401). \
                 Check TMDB_API_KEY; metadata enrichment is disabled until restart."
            );
            self.disabled.store(true, Ordering::Relaxed);
            return None;
        }

        let body: SearchResponse = match response.error_for_status() {
            Ok(response) => match response.json().await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Reference search returned unparseable body: {}", e);
                    return None;
                }
            },
            Err(e) => {
                warn!("Reference search returned error status: {}", e);
                return None;
            }
        };

        if body.results.is_empty() {
            info!("Reference search found no results for '{}'", title);
            return None;
        }
        body.results.into_iter().next()
    }

    async fn detail(&self, reference_id: i64) -> Option<DetailResponse> {
        let url = format!(
            "{}/movie/{}",
            self.config.base_url.trim_end_matches('/'),
            reference_id
        );
        let query = [
            ("api_key", self.api_key.as_str()),
            ("language", "en-US"),
            ("append_to_response", "credits"),
        ];

        match self.client.get(&url).query(&query).send().await {
            Ok(response) => match response.error_for_status() {
                Ok(response) => response.json().await.ok(),
                Err(e) => {
                    warn!("Reference detail returned error status: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!("Reference detail request failed: {}", e);
                None
            }
        }
    }

    fn assemble(&self, detail: DetailResponse) -> ReferenceData {
        let poster_url = detail
            .poster_path
            .as_deref()
            .map(|p| self.compose_image_url(p, ImageKind::Poster, ImageTier::Standard));
        let backdrop_url = detail
            .backdrop_path
            .as_deref()
            .map(|p| self.compose_image_url(p, ImageKind::Backdrop, ImageTier::High));

        let (director, cast) = match detail.credits {
            Some(credits) => {
                let director = credits
                    .crew
                    .into_iter()
                    .find(|member| member.job.as_deref() == Some("Director"))
                    .map(|member| member.name);
                let cast = credits
                    .cast
                    .into_iter()
                    .take(10)
                    .map(|member| CastMember {
                        name: member.name,
                        role: member.character,
                    })
                    .collect();
                (director, cast)
            }
            None => (None, Vec::new()),
        };

        ReferenceData {
            external_ids: ExternalIds {
                reference_id: Some(detail.id),
                imdb_id: detail.imdb_id.filter(|id| !id.is_empty()),
            },
            title: detail.title,
            overview: detail.overview.filter(|o| !o.is_empty()),
            poster_url,
            backdrop_url,
            runtime_minutes: detail.runtime.filter(|r| *r > 0),
            genres: detail.genres.into_iter().map(|g| g.name).collect(),
            languages: detail
                .spoken_languages
                .into_iter()
                .map(|l| l.english_name.unwrap_or(l.name))
                .collect(),
            countries: detail
                .production_countries
                .into_iter()
                .map(|c| c.name)
                .collect(),
            director,
            cast,
            vote_average: detail.vote_average,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: i64,
    title: Option<String>,
    vote_average: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct DetailResponse {
    id: i64,
    imdb_id: Option<String>,
    title: String,
    overview: Option<String>,
    runtime: Option<u32>,
    #[serde(default)]
    genres: Vec<NamedEntry>,
    #[serde(default)]
    spoken_languages: Vec<LanguageEntry>,
    #[serde(default)]
    production_countries: Vec<NamedEntry>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    vote_average: Option<f32>,
    credits: Option<CreditsResponse>,
}

#[derive(Debug, Deserialize)]
struct NamedEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct LanguageEntry {
    name: String,
    english_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreditsResponse {
    #[serde(default)]
    cast: Vec<CastEntry>,
    #[serde(default)]
    crew: Vec<CrewEntry>,
}

#[derive(Debug, Deserialize)]
struct CastEntry {
    name: String,
    character: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrewEntry {
    name: String,
    job: Option<String>,
}

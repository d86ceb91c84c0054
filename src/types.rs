use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Raw movie entry produced by scraping a single listing page.
/// Lives for one tracking cycle only; never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub title: String,
    pub year: i32,
    /// One of the closed quality-tag set, see `constants::quality_from_token`
    pub quality: String,
    pub rating_hint: Option<f32>,
    /// Absolute URL when present
    pub image_url: Option<String>,
    /// Absolute URL when present
    pub detail_url: Option<String>,
    pub source: String,
}

/// Alternate identifiers carried from the reference metadata service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIds {
    pub reference_id: Option<i64>,
    pub imdb_id: Option<String>,
}

impl ExternalIds {
    pub fn is_empty(&self) -> bool {
        self.reference_id.is_none() && self.imdb_id.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CastMember {
    pub name: String,
    pub role: Option<String>,
}

/// Fully enriched movie record, ready for the catalog write path.
///
/// Invariant: `poster_url` and `backdrop_url` are never empty; the
/// enrichment orchestrator substitutes the placeholder sentinels when no
/// live source yields an image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedRecord {
    pub title: String,
    pub year: i32,
    pub description: Option<String>,
    pub poster_url: String,
    pub backdrop_url: String,
    pub duration_minutes: Option<u32>,
    pub genres: BTreeSet<String>,
    pub languages: Vec<String>,
    pub countries: Vec<String>,
    pub director: Option<String>,
    pub cast: Vec<CastMember>,
    pub quality_tags: BTreeSet<String>,
    pub external_ids: ExternalIds,
    pub rating_average: Option<f32>,
    pub rating_source: Option<String>,
}

/// Image/metadata payload produced by the enrichment orchestrator.
/// Poster and backdrop are always usable URLs; the `source` field names
/// the tier that produced them ("cache", "reference", a site name, or
/// "placeholder").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichedImages {
    pub poster_url: String,
    pub backdrop_url: String,
    pub overview: Option<String>,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<String>,
    pub languages: Vec<String>,
    pub countries: Vec<String>,
    pub director: Option<String>,
    pub cast: Vec<CastMember>,
    pub external_ids: ExternalIds,
    pub vote_average: Option<f32>,
    pub source: String,
}

impl EnrichedImages {
    pub fn is_placeholder(&self) -> bool {
        self.source == crate::constants::PLACEHOLDER_SOURCE
    }
}

/// Outcome of one tracking cycle
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CycleSummary {
    pub added: usize,
    pub total_scraped: usize,
}

/// Core trait implemented by every candidate source the tracker scans.
///
/// Listing sites are the production implementation (`extract::ListingSite`);
/// tests provide stub sources with canned candidates.
#[async_trait::async_trait]
pub trait CandidateSource: Send + Sync {
    /// Unique identifier for this source
    fn source_name(&self) -> &str;

    /// Fetch all current candidates from this source
    async fn fetch_candidates(&self) -> Result<Vec<CandidateRecord>>;
}

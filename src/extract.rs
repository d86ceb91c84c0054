use crate::config::SiteConfig;
use crate::constants::{
    quality_from_token, MAX_NODES_PER_PAGE, MIN_TITLE_LEN, QUALITY_DEFAULT, SCRAPE_USER_AGENT,
};
use crate::error::Result;
use crate::matcher;
use crate::types::{CandidateRecord, CandidateSource};
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());
static YEAR_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[\[(](?:19\d{2}|20\d{2})[\])]").unwrap());
static RATING_SLASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2}(?:\.\d+)?)\s*/\s*10\b").unwrap());
static RATING_IMDB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bimdb:?\s*(\d{1,2}(?:\.\d+)?)").unwrap());
static QUALITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(CAMRIP|HDCAM|CAM|HDTS|TELESYNC|TS|WEB-?DL|WEB-?RIP|HD-?RIP|BLU-?RAY|BRRIP|BDRIP|DVDRIP|HDTV|2160P|1080P|720P|4K|UHD)\b",
    )
    .unwrap()
});

/// Container shapes movie listing pages commonly use, tried in order.
/// The first selector that yields any nodes wins; sites change markup
/// without notice, so none of these are load-bearing on their own.
const CANDIDATE_SELECTORS: &[&str] = &[
    "article",
    "div.ml-item",
    "div.movie-item",
    "li.movie-item",
    "div.result-item",
    "div.item",
];

/// Fetches listing pages and extracts raw movie candidates from
/// unstructured markup. All extraction rules are heuristic and fallible;
/// a page that matches nothing produces an empty list, not an error.
pub struct SiteExtractor {
    client: reqwest::Client,
}

impl SiteExtractor {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(SCRAPE_USER_AGENT)
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }

    /// Fetch a site's listing page and extract candidates.
    ///
    /// Network and HTTP failures propagate to the caller, which treats
    /// them as "no data from this source"; they never abort a cycle.
    #[instrument(skip(self), fields(site = %site.name))]
    pub async fn extract(&self, site: &SiteConfig) -> Result<Vec<CandidateRecord>> {
        debug!("Fetching listing page {}", site.url);
        let response = self.client.get(&site.url).send().await?;
        let body = response.error_for_status()?.text().await?;

        let origin = site_origin(&site.url);
        let candidates = parse_listing(&body, &site.name, &origin, current_year());
        info!("Extracted {} candidates from {}", candidates.len(), site.name);
        Ok(candidates)
    }

    /// Image-only mode: return the first Matcher-confirmed candidate's
    /// image URL, if the page has one.
    #[instrument(skip(self), fields(site = %site.name))]
    pub async fn find_image(&self, site: &SiteConfig, title: &str) -> Result<Option<String>> {
        let candidates = self.extract(site).await?;
        let hit = candidates
            .into_iter()
            .find(|c| c.image_url.is_some() && matcher::matches(&c.title, title))
            .and_then(|c| c.image_url);
        if hit.is_some() {
            info!("Found image for '{}' on {}", title, site.name);
        }
        Ok(hit)
    }
}

/// A configured listing page, scanned as one source per tracking cycle
pub struct ListingSite {
    site: SiteConfig,
    extractor: std::sync::Arc<SiteExtractor>,
}

impl ListingSite {
    pub fn new(site: SiteConfig, extractor: std::sync::Arc<SiteExtractor>) -> Self {
        Self { site, extractor }
    }
}

#[async_trait::async_trait]
impl CandidateSource for ListingSite {
    fn source_name(&self) -> &str {
        &self.site.name
    }

    async fn fetch_candidates(&self) -> Result<Vec<CandidateRecord>> {
        self.extractor.extract(&self.site).await
    }
}

/// Scheme + host of a listing URL, used to absolutize relative links
pub fn site_origin(site_url: &str) -> String {
    match Url::parse(site_url) {
        Ok(url) => {
            let mut origin = format!("{}://{}", url.scheme(), url.host_str().unwrap_or_default());
            if let Some(port) = url.port() {
                origin.push_str(&format!(":{}", port));
            }
            origin
        }
        Err(_) => site_url.trim_end_matches('/').to_string(),
    }
}

/// Resolve a scraped URL to absolute form against the site's origin
pub fn resolve_url(origin: &str, raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("//") {
        format!("https:{}", raw)
    } else if raw.starts_with('/') {
        format!("{}{}", origin, raw)
    } else if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("{}/{}", origin, raw)
    }
}

/// Parse a listing page into candidates. Pure so fixture HTML can drive
/// tests directly.
pub fn parse_listing(
    body: &str,
    site_name: &str,
    origin: &str,
    default_year: i32,
) -> Vec<CandidateRecord> {
    let document = Html::parse_document(body);
    let heading_selector = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();
    let img_selector = Selector::parse("img").unwrap();

    let mut nodes = Vec::new();
    for selector_str in CANDIDATE_SELECTORS {
        let selector = Selector::parse(selector_str).unwrap();
        nodes = document.select(&selector).collect::<Vec<_>>();
        if !nodes.is_empty() {
            debug!("Selector '{}' matched {} nodes", selector_str, nodes.len());
            break;
        }
    }

    let mut candidates = Vec::new();
    for node in nodes.into_iter().take(MAX_NODES_PER_PAGE) {
        // Only nodes that look like a movie card: a heading or an image,
        // plus some text to mine
        let has_heading = node.select(&heading_selector).next().is_some();
        let has_image = node.select(&img_selector).next().is_some();
        if !has_heading && !has_image {
            continue;
        }

        let node_text = node.text().collect::<String>();
        if node_text.trim().is_empty() && !has_image {
            continue;
        }

        let Some(title) = candidate_title(&node) else {
            continue;
        };
        if title.len() < MIN_TITLE_LEN {
            debug!("Dropping implausibly short title {:?}", title);
            continue;
        }

        let year = extract_year(&node_text).unwrap_or(default_year);
        let quality = extract_quality(&node_text);
        let rating_hint = extract_rating(&node_text);
        let image_url = first_attr(&node, "img", &["src", "data-src"])
            .map(|raw| resolve_url(origin, &raw));
        let detail_url =
            first_attr(&node, "a", &["href"]).map(|raw| resolve_url(origin, &raw));

        candidates.push(CandidateRecord {
            title,
            year,
            quality,
            rating_hint,
            image_url,
            detail_url,
            source: site_name.to_string(),
        });
    }
    candidates
}

/// Ordered fallible title rules: heading text, then the anchor's title
/// attribute, then the image's alt text. First non-empty hit wins.
fn candidate_title(node: &ElementRef) -> Option<String> {
    let rules: [fn(&ElementRef) -> Option<String>; 3] =
        [title_from_heading, title_from_anchor, title_from_image_alt];
    rules
        .iter()
        .find_map(|rule| rule(node))
        .map(|t| strip_year_markers(&t))
        .filter(|t| !t.is_empty())
}

fn title_from_heading(node: &ElementRef) -> Option<String> {
    let selector = Selector::parse("h1, h2, h3, h4, h5, h6").unwrap();
    let text = node.select(&selector).next()?.text().collect::<String>();
    non_empty(text)
}

fn title_from_anchor(node: &ElementRef) -> Option<String> {
    let selector = Selector::parse("a[title]").unwrap();
    let attr = node.select(&selector).next()?.value().attr("title")?;
    non_empty(attr.to_string())
}

fn title_from_image_alt(node: &ElementRef) -> Option<String> {
    let selector = Selector::parse("img[alt]").unwrap();
    let attr = node.select(&selector).next()?.value().attr("alt")?;
    non_empty(attr.to_string())
}

fn non_empty(text: String) -> Option<String> {
    let trimmed = text.trim().to_string();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed)
    }
}

/// Drop trailing "(2023)" / "[2023]" style markers from a title
fn strip_year_markers(title: &str) -> String {
    YEAR_MARKER_RE.replace_all(title, "").trim().to_string()
}

/// First plausible 4-digit release year (1900-2099) in the node's text
fn extract_year(text: &str) -> Option<i32> {
    YEAR_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Map the first recognized release-quality token; catch-all otherwise
fn extract_quality(text: &str) -> String {
    QUALITY_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| quality_from_token(m.as_str()))
        .unwrap_or(QUALITY_DEFAULT)
        .to_string()
}

/// Rating hint from "7.4/10" or "IMDb: 7.4" style text
fn extract_rating(text: &str) -> Option<f32> {
    let capture = RATING_SLASH_RE
        .captures(text)
        .or_else(|| RATING_IMDB_RE.captures(text))?;
    let rating: f32 = capture.get(1)?.as_str().parse().ok()?;
    (0.0..=10.0).contains(&rating).then_some(rating)
}

/// First of `attrs` present on the first element matching `selector_str`
fn first_attr(node: &ElementRef, selector_str: &str, attrs: &[&str]) -> Option<String> {
    let selector = Selector::parse(selector_str).unwrap();
    let element = node.select(&selector).next()?;
    attrs
        .iter()
        .find_map(|attr| element.value().attr(attr))
        .map(|v| v.to_string())
}

fn current_year() -> i32 {
    chrono::Utc::now().year()
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIXTURE: &str = r#"
        <html><body>
          <article>
            <h2>The Iron Orchard (2018)</h2>
            <a title="The Iron Orchard" href="/movie/iron-orchard"><img src="//cdn.example.com/iron.jpg" alt="The Iron Orchard"></a>
            <span>WEB-DL</span><span>7.1/10</span>
          </article>
          <article>
            <a title="Night Train [2023]" href="movie/night-train"><img data-src="/posters/night-train.jpg" alt="Night Train"></a>
            <span>2023</span><span>IMDb: 6.3</span><span>BluRay</span>
          </article>
          <article>
            <h3>Up</h3>
            <img src="/posters/up.jpg" alt="Up">
          </article>
          <article><p>Newsletter signup</p></article>
        </body></html>
    "#;

    #[test]
    fn extracts_candidates_from_fixture_markup() {
        let candidates = parse_listing(FIXTURE, "fixture", "https://example.com", 2026);
        assert_eq!(candidates.len(), 2);

        let first = &candidates[0];
        assert_eq!(first.title, "The Iron Orchard");
        assert_eq!(first.year, 2018);
        assert_eq!(first.quality, "WEB-DL");
        assert_eq!(first.rating_hint, Some(7.1));
        assert_eq!(
            first.image_url.as_deref(),
            Some("https://cdn.example.com/iron.jpg")
        );
        assert_eq!(
            first.detail_url.as_deref(),
            Some("https://example.com/movie/iron-orchard")
        );
        assert_eq!(first.source, "fixture");

        let second = &candidates[1];
        assert_eq!(second.title, "Night Train");
        assert_eq!(second.year, 2023);
        assert_eq!(second.quality, "BluRay");
        assert_eq!(second.rating_hint, Some(6.3));
        assert_eq!(
            second.image_url.as_deref(),
            Some("https://example.com/posters/night-train.jpg")
        );
    }

    #[test]
    fn short_titles_are_dropped_and_year_defaults_to_current() {
        // "Up" is below the minimum title length, so only two survive,
        // and the signup block has neither heading-with-title nor image
        let candidates = parse_listing(FIXTURE, "fixture", "https://example.com", 2026);
        assert!(candidates.iter().all(|c| c.title.len() >= MIN_TITLE_LEN));
    }

    #[test]
    fn missing_year_falls_back_to_default() {
        let html = r#"<article><h2>Long Winter Coming</h2><img src="/a.jpg"></article>"#;
        let candidates = parse_listing(html, "s", "https://example.com", 2026);
        assert_eq!(candidates[0].year, 2026);
        assert_eq!(candidates[0].quality, QUALITY_DEFAULT);
        assert_eq!(candidates[0].rating_hint, None);
    }

    #[test]
    fn resolves_relative_protocol_and_bare_urls() {
        let origin = site_origin("https://example.com/");
        assert_eq!(origin, "https://example.com");
        assert_eq!(
            resolve_url(&origin, "/img/x.jpg"),
            "https://example.com/img/x.jpg"
        );
        assert_eq!(
            resolve_url(&origin, "//cdn.example.com/x.jpg"),
            "https://cdn.example.com/x.jpg"
        );
        assert_eq!(resolve_url(&origin, "x.jpg"), "https://example.com/x.jpg");
        assert_eq!(
            resolve_url(&origin, "https://other.example.com/x.jpg"),
            "https://other.example.com/x.jpg"
        );
    }

    #[test]
    fn origin_keeps_explicit_port() {
        assert_eq!(
            site_origin("http://127.0.0.1:8085/listing"),
            "http://127.0.0.1:8085"
        );
    }

    #[test]
    fn strips_bracketed_year_markers_from_titles() {
        assert_eq!(strip_year_markers("Heat (1995)"), "Heat");
        assert_eq!(strip_year_markers("Heat [1995] Remastered"), "Heat Remastered");
        assert_eq!(strip_year_markers("Heat"), "Heat");
    }

    #[test]
    fn rating_rejects_out_of_range_values() {
        assert_eq!(extract_rating("rated 11/10 by fans"), None);
        assert_eq!(extract_rating("IMDb: 8.2"), Some(8.2));
        assert_eq!(extract_rating("8/10"), Some(8.0));
        assert_eq!(extract_rating("no rating here"), None);
    }
}

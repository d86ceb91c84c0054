/// Shared constants for the tracking pipeline: source identifiers, the
/// closed quality-tag set, and the placeholder image sentinels.

// Source identifiers used for result tagging and logging
pub const REFERENCE_SOURCE: &str = "reference";
pub const PLACEHOLDER_SOURCE: &str = "placeholder";
pub const CACHE_SOURCE: &str = "cache";

// Placeholder sentinels returned when no live source yields an image.
// These are never written to the cache.
pub const PLACEHOLDER_POSTER: &str = "/images/placeholder-poster.svg";
pub const PLACEHOLDER_BACKDROP: &str = "/images/placeholder-backdrop.svg";

// Browser-like identity for listing-page fetches; several sites return
// stripped-down markup to unknown clients
pub const SCRAPE_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:122.0) Gecko/20100101 Firefox/122.0";

/// Upper bound on candidate nodes examined per listing page
pub const MAX_NODES_PER_PAGE: usize = 40;

/// Minimum plausible extracted title length
pub const MIN_TITLE_LEN: usize = 3;

/// Cache entries unused for this many days are removed by cleanup
pub const CACHE_RETENTION_DAYS: i64 = 30;

/// Catch-all quality tag for tokens not in the lookup table
pub const QUALITY_DEFAULT: &str = "HD";

/// Map a free-text release-quality token to the closed tag set.
/// Unknown tokens fall through to [`QUALITY_DEFAULT`].
pub fn quality_from_token(token: &str) -> &'static str {
    match token.to_uppercase().as_str() {
        "CAM" | "CAMRIP" | "HDCAM" => "CAM",
        "TS" | "HDTS" | "TELESYNC" => "TS",
        "WEB-DL" | "WEBDL" | "WEB" => "WEB-DL",
        "WEBRIP" | "WEB-RIP" => "WEBRip",
        "HDRIP" | "HD-RIP" => "HDRip",
        "BLURAY" | "BLU-RAY" | "BRRIP" | "BDRIP" => "BluRay",
        "DVDRIP" | "DVD" => "DVDRip",
        "HDTV" => "HDTV",
        "720P" => "720p",
        "1080P" => "1080p",
        "2160P" | "4K" | "UHD" => "2160p",
        _ => QUALITY_DEFAULT,
    }
}

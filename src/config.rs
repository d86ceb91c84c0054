use crate::error::{Result, TrackerError};
use serde::Deserialize;
use std::fs;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tracker: TrackerConfig,
    pub reference: ReferenceConfig,
    pub cache: CacheConfig,
    /// Listing pages scanned on every tracking cycle
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
    /// Ordered sites tried by the image-scrape fallback
    #[serde(default)]
    pub fallback_sites: Vec<SiteConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    /// Compact duration expression, e.g. "90s", "30m", "6h"
    pub schedule: String,
    /// Pause between consecutive scrape-fallback attempts
    pub scrape_delay_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReferenceConfig {
    pub base_url: String,
    pub image_base_url: String,
    /// Pause after each non-cached enrichment, to respect service rate limits
    pub request_delay_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub path: String,
    pub retention_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    pub url: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            TrackerError::Config(format!("Failed to read config file '{}': {}", config_path, e))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig {
                schedule: "6h".to_string(),
                scrape_delay_ms: 1500,
                timeout_seconds: 12,
            },
            reference: ReferenceConfig {
                base_url: "https://api.themoviedb.org/3".to_string(),
                image_base_url: "https://image.tmdb.org/t/p".to_string(),
                request_delay_ms: 300,
                timeout_seconds: 10,
            },
            cache: CacheConfig {
                path: "data/image_cache.db".to_string(),
                retention_days: crate::constants::CACHE_RETENTION_DAYS,
            },
            sites: Vec::new(),
            fallback_sites: Vec::new(),
        }
    }
}

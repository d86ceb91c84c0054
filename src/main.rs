use clap::{Parser, Subcommand};
use tracing::{error, info};

mod cache;
mod catalog;
mod config;
mod constants;
mod enrich;
mod error;
mod extract;
mod logging;
mod matcher;
mod reference;
mod tracker;
mod types;

use crate::cache::ImageCache;
use crate::catalog::{Catalog, InMemoryCatalog};
use crate::config::Config;
use crate::enrich::Enricher;
use crate::extract::{ListingSite, SiteExtractor};
use crate::reference::ReferenceClient;
use crate::tracker::{Tracker, TriggerOutcome};
use crate::types::CandidateSource;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "movie_tracker")]
#[command(about = "Movie discovery and enrichment pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single tracking cycle now
    Run {
        /// Specific sites to scan (comma-separated); defaults to all configured
        #[arg(long)]
        sites: Option<String>,
    },
    /// Arm the schedule and keep running until interrupted
    Serve {
        /// Override the configured schedule expression (e.g. 30m, 6h)
        #[arg(long)]
        schedule: Option<String>,
    },
    /// Resolve images/metadata for a single title and print the payload
    Enrich {
        #[arg(long)]
        title: String,
        #[arg(long)]
        year: Option<i32>,
    },
    /// Remove cache entries unused beyond the retention window
    CleanCache,
}

fn build_enricher(config: &Config, cache: ImageCache) -> Arc<Enricher> {
    let api_key = std::env::var("TMDB_API_KEY").ok();
    let reference = ReferenceClient::new(config.reference.clone(), api_key);
    let extractor = Arc::new(SiteExtractor::new(Duration::from_secs(
        config.tracker.timeout_seconds,
    )));
    Arc::new(Enricher::new(
        cache,
        reference,
        extractor,
        config.fallback_sites.clone(),
        Duration::from_millis(config.tracker.scrape_delay_ms),
    ))
}

async fn build_tracker(
    config: &Config,
    site_filter: Option<&str>,
    catalog: Arc<dyn Catalog>,
) -> error::Result<Arc<Tracker>> {
    let cache = ImageCache::open(&config.cache.path)?;
    let enricher = build_enricher(config, cache);

    let extractor = Arc::new(SiteExtractor::new(Duration::from_secs(
        config.tracker.timeout_seconds,
    )));
    let selected: Vec<_> = match site_filter {
        Some(filter) => {
            let names: Vec<&str> = filter.split(',').map(|s| s.trim()).collect();
            config
                .sites
                .iter()
                .filter(|site| names.contains(&site.name.as_str()))
                .cloned()
                .collect()
        }
        None => config.sites.clone(),
    };
    let sources: Vec<Arc<dyn CandidateSource>> = selected
        .into_iter()
        .map(|site| {
            Arc::new(ListingSite::new(site, Arc::clone(&extractor))) as Arc<dyn CandidateSource>
        })
        .collect();

    Tracker::new(
        sources,
        enricher,
        catalog,
        Duration::from_millis(config.reference.request_delay_ms),
    )
    .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load().unwrap_or_else(|e| {
        info!("No usable config.toml ({}); using built-in defaults", e);
        Config::default()
    });

    match cli.command {
        Commands::Run { sites } => {
            println!("🎬 Running tracking cycle...");
            let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
            let tracker = build_tracker(&config, sites.as_deref(), catalog).await?;
            match tracker.run_cycle().await {
                Ok(TriggerOutcome::Completed(summary)) => {
                    println!("\n📊 Cycle results:");
                    println!("   Scraped: {}", summary.total_scraped);
                    println!("   Added:   {}", summary.added);
                }
                Ok(TriggerOutcome::Refused) => {
                    println!("⚠️  A cycle is already running");
                }
                Err(e) => {
                    error!("Cycle failed: {}", e);
                    println!("❌ Cycle failed: {}", e);
                }
            }
        }
        Commands::Serve { schedule } => {
            let expression = schedule.unwrap_or_else(|| config.tracker.schedule.clone());
            println!("🎬 Tracking on schedule: every {}", expression);
            let catalog: Arc<dyn Catalog> = Arc::new(InMemoryCatalog::new());
            let tracker = build_tracker(&config, None, catalog).await?;
            tracker.clone().start(&expression)?;

            tokio::signal::ctrl_c().await?;
            info!("Interrupt received; disarming schedule");
            tracker.stop();
            let status = tracker.status();
            println!(
                "\n👋 Stopped. Known titles: {}, last check: {}",
                status.known_titles,
                status
                    .last_check_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "never".to_string())
            );
        }
        Commands::Enrich { title, year } => {
            println!("🖼  Enriching '{}'...", title);
            let cache = ImageCache::open(&config.cache.path)?;
            let enricher = build_enricher(&config, cache);
            let payload = enricher.resolve(&title, year).await;
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Commands::CleanCache => {
            let cache = ImageCache::open(&config.cache.path)?;
            let removed = cache.cleanup(config.cache.retention_days)?;
            println!("🧹 Removed {} stale cache entries", removed);
        }
    }
    Ok(())
}

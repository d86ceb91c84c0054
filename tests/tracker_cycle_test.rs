use anyhow::Result;
use async_trait::async_trait;
use movie_tracker::cache::ImageCache;
use movie_tracker::catalog::{Catalog, InMemoryCatalog};
use movie_tracker::config::Config;
use movie_tracker::enrich::Enricher;
use movie_tracker::extract::SiteExtractor;
use movie_tracker::reference::ReferenceClient;
use movie_tracker::tracker::{Tracker, TriggerOutcome};
use movie_tracker::types::{
    CandidateRecord, CandidateSource, CastMember, EnrichedRecord, ExternalIds,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

fn candidate(title: &str, year: i32, source: &str) -> CandidateRecord {
    CandidateRecord {
        title: title.to_string(),
        year,
        quality: "WEB-DL".to_string(),
        rating_hint: Some(7.0),
        image_url: None,
        detail_url: None,
        source: source.to_string(),
    }
}

fn record(title: &str, year: i32) -> EnrichedRecord {
    EnrichedRecord {
        title: title.to_string(),
        year,
        description: None,
        poster_url: "/images/placeholder-poster.svg".to_string(),
        backdrop_url: "/images/placeholder-backdrop.svg".to_string(),
        duration_minutes: None,
        genres: Default::default(),
        languages: Vec::new(),
        countries: Vec::new(),
        director: None,
        cast: Vec::<CastMember>::new(),
        quality_tags: Default::default(),
        external_ids: ExternalIds::default(),
        rating_average: None,
        rating_source: None,
    }
}

/// Canned source returning the same candidates on every cycle
struct StubSource {
    name: String,
    candidates: Vec<CandidateRecord>,
}

#[async_trait]
impl CandidateSource for StubSource {
    fn source_name(&self) -> &str {
        &self.name
    }

    async fn fetch_candidates(&self) -> movie_tracker::error::Result<Vec<CandidateRecord>> {
        Ok(self.candidates.clone())
    }
}

/// Source that blocks until released, to hold a cycle open
struct BlockingSource {
    release: Arc<Notify>,
}

#[async_trait]
impl CandidateSource for BlockingSource {
    fn source_name(&self) -> &str {
        "blocking"
    }

    async fn fetch_candidates(&self) -> movie_tracker::error::Result<Vec<CandidateRecord>> {
        self.release.notified().await;
        Ok(vec![candidate("Slow Movie", 2024, "blocking")])
    }
}

/// Source that always fails, to prove per-source containment
struct FailingSource;

#[async_trait]
impl CandidateSource for FailingSource {
    fn source_name(&self) -> &str {
        "failing"
    }

    async fn fetch_candidates(&self) -> movie_tracker::error::Result<Vec<CandidateRecord>> {
        Err(movie_tracker::error::TrackerError::Api {
            message: "listing page unreachable".to_string(),
        })
    }
}

/// Enricher with no credential, no fallback sites, and an in-memory
/// cache: resolves everything to placeholders without network traffic
fn offline_enricher() -> Arc<Enricher> {
    let config = Config::default();
    Arc::new(Enricher::new(
        ImageCache::open_in_memory().unwrap(),
        ReferenceClient::new(config.reference, None),
        Arc::new(SiteExtractor::new(Duration::from_secs(1))),
        Vec::new(),
        Duration::from_millis(1),
    ))
}

async fn tracker_with(
    sources: Vec<Arc<dyn CandidateSource>>,
    catalog: Arc<InMemoryCatalog>,
) -> Arc<Tracker> {
    Tracker::new(
        sources,
        offline_enricher(),
        catalog,
        Duration::from_millis(1),
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn second_cycle_with_identical_input_adds_nothing() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let source: Arc<dyn CandidateSource> = Arc::new(StubSource {
        name: "site_a".to_string(),
        candidates: vec![
            candidate("The Iron Orchard", 2018, "site_a"),
            candidate("Night Train", 2023, "site_a"),
        ],
    });
    let tracker = tracker_with(vec![source], Arc::clone(&catalog)).await;

    let first = tracker.run_cycle().await?;
    let TriggerOutcome::Completed(summary) = first else {
        panic!("first cycle was refused");
    };
    assert_eq!(summary.added, 2);
    assert_eq!(summary.total_scraped, 2);
    assert_eq!(catalog.len(), 2);

    let second = tracker.run_cycle().await?;
    let TriggerOutcome::Completed(summary) = second else {
        panic!("second cycle was refused");
    };
    assert_eq!(summary.added, 0);
    assert_eq!(summary.total_scraped, 2);
    assert_eq!(catalog.len(), 2);
    Ok(())
}

#[tokio::test]
async fn duplicate_candidates_across_sources_insert_once() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let site_a: Arc<dyn CandidateSource> = Arc::new(StubSource {
        name: "site_a".to_string(),
        candidates: vec![candidate("Night Train", 2023, "site_a")],
    });
    let site_b: Arc<dyn CandidateSource> = Arc::new(StubSource {
        name: "site_b".to_string(),
        candidates: vec![candidate("NIGHT TRAIN", 2023, "site_b")],
    });
    let tracker = tracker_with(vec![site_a, site_b], Arc::clone(&catalog)).await;

    let TriggerOutcome::Completed(summary) = tracker.run_cycle().await? else {
        panic!("cycle was refused");
    };
    assert_eq!(summary.total_scraped, 2);
    assert_eq!(summary.added, 1);
    assert_eq!(catalog.len(), 1);
    Ok(())
}

#[tokio::test]
async fn known_titles_are_seeded_from_the_catalog() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    catalog.insert(&record("Night Train", 2023)).await?;

    let source: Arc<dyn CandidateSource> = Arc::new(StubSource {
        name: "site_a".to_string(),
        candidates: vec![candidate("night train", 2023, "site_a")],
    });
    let tracker = tracker_with(vec![source], Arc::clone(&catalog)).await;
    assert_eq!(tracker.status().known_titles, 1);

    let TriggerOutcome::Completed(summary) = tracker.run_cycle().await? else {
        panic!("cycle was refused");
    };
    assert_eq!(summary.added, 0);
    assert_eq!(catalog.len(), 1);
    Ok(())
}

#[tokio::test]
async fn failing_source_does_not_abort_the_cycle() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let good: Arc<dyn CandidateSource> = Arc::new(StubSource {
        name: "site_a".to_string(),
        candidates: vec![candidate("Night Train", 2023, "site_a")],
    });
    let bad: Arc<dyn CandidateSource> = Arc::new(FailingSource);
    let tracker = tracker_with(vec![good, bad], Arc::clone(&catalog)).await;

    let TriggerOutcome::Completed(summary) = tracker.run_cycle().await? else {
        panic!("cycle was refused");
    };
    assert_eq!(summary.total_scraped, 1);
    assert_eq!(summary.added, 1);
    Ok(())
}

#[tokio::test]
async fn manual_trigger_is_refused_while_a_cycle_is_running() -> Result<()> {
    let release = Arc::new(Notify::new());
    let catalog = Arc::new(InMemoryCatalog::new());
    let source: Arc<dyn CandidateSource> = Arc::new(BlockingSource {
        release: Arc::clone(&release),
    });
    let tracker = tracker_with(vec![source], Arc::clone(&catalog)).await;

    let running = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move { tracker.run_cycle().await })
    };

    // Wait for the spawned cycle to take the guard
    for _ in 0..100 {
        if tracker.status().is_running {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(tracker.status().is_running);

    let outcome = tracker.trigger_manual().await?;
    assert!(matches!(outcome, TriggerOutcome::Refused));

    // Release the blocked source; the original cycle completes normally
    release.notify_one();
    let finished = running.await??;
    assert!(matches!(
        finished,
        TriggerOutcome::Completed(summary) if summary.added == 1
    ));
    assert!(!tracker.status().is_running);
    Ok(())
}

#[tokio::test]
async fn start_is_idempotent_and_stop_disarms() -> Result<()> {
    let catalog = Arc::new(InMemoryCatalog::new());
    let tracker = tracker_with(Vec::new(), catalog).await;

    let status = tracker.status();
    assert!(!status.is_scheduled);
    assert!(status.last_check_at.is_none());

    tracker.clone().start("30m")?;
    assert!(tracker.status().is_scheduled);
    // Second start with the timer armed is a no-op, not an error
    tracker.clone().start("30m")?;
    assert!(tracker.status().is_scheduled);

    tracker.stop();
    assert!(!tracker.status().is_scheduled);

    // Bad expressions are configuration errors
    assert!(tracker.clone().start("soon").is_err());
    Ok(())
}

use crate::catalog::Catalog;
use crate::enrich::Enricher;
use crate::error::{Result, TrackerError};
use crate::matcher;
use crate::types::{CandidateRecord, CandidateSource, CycleSummary, EnrichedRecord};
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

/// Snapshot of the tracker's operational state, exposed to the API layer
#[derive(Debug, Clone, Serialize)]
pub struct TrackerStatus {
    pub is_running: bool,
    pub is_scheduled: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    pub known_titles: usize,
}

/// Result of a cycle request: either a completed cycle's summary, or a
/// refusal because another cycle was already in flight
#[derive(Debug, Clone, Copy)]
pub enum TriggerOutcome {
    Completed(CycleSummary),
    Refused,
}

/// Top-level scheduler: scrapes all configured sources, dedupes against
/// the catalog, and persists genuinely new records, each enriched
/// through the [`Enricher`].
///
/// One instance owns all run state; the `is_running` flag serializes
/// cycles regardless of whether the timer or a manual trigger started
/// them. The guard is advisory and in-process only; a single tracker
/// instance per deployment is assumed.
pub struct Tracker {
    sources: Vec<Arc<dyn CandidateSource>>,
    enricher: Arc<Enricher>,
    catalog: Arc<dyn Catalog>,
    /// Pause after each non-cached enrichment, keeps the reference
    /// service within its rate limits
    request_delay: Duration,
    is_running: AtomicBool,
    is_scheduled: AtomicBool,
    last_check_at: Mutex<Option<DateTime<Utc>>>,
    known_titles: Mutex<HashSet<String>>,
    schedule_task: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// Clears the running flag on every exit path, so a panicking or
/// error-returning cycle can never deadlock the next one
struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Tracker {
    /// Build a tracker and seed its known-title set from the catalog.
    pub async fn new(
        sources: Vec<Arc<dyn CandidateSource>>,
        enricher: Arc<Enricher>,
        catalog: Arc<dyn Catalog>,
        request_delay: Duration,
    ) -> Result<Arc<Self>> {
        let titles = catalog.list_all_titles().await?;
        let known_titles: HashSet<String> =
            titles.iter().map(|t| matcher::normalize_title(t)).collect();
        info!("Seeded tracker with {} known titles", known_titles.len());

        Ok(Arc::new(Self {
            sources,
            enricher,
            catalog,
            request_delay,
            is_running: AtomicBool::new(false),
            is_scheduled: AtomicBool::new(false),
            last_check_at: Mutex::new(None),
            known_titles: Mutex::new(known_titles),
            schedule_task: Mutex::new(None),
        }))
    }

    pub fn status(&self) -> TrackerStatus {
        TrackerStatus {
            is_running: self.is_running.load(Ordering::SeqCst),
            is_scheduled: self.is_scheduled.load(Ordering::SeqCst),
            last_check_at: *self.last_check_at.lock().unwrap(),
            known_titles: self.known_titles.lock().unwrap().len(),
        }
    }

    /// Arm the periodic timer. No-op if already armed.
    pub fn start(self: Arc<Self>, schedule: &str) -> Result<()> {
        let period = parse_schedule(schedule)?;
        let mut task = self.schedule_task.lock().unwrap();
        if task.is_some() {
            info!("Tracker already scheduled; start() is a no-op");
            return Ok(());
        }

        info!("Arming tracker schedule: every {}", schedule);
        let tracker = Arc::clone(&self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // interval's first tick is immediate; cycles begin one full
            // period after start()
            ticker.tick().await;
            loop {
                ticker.tick().await;
                // Timer and manual triggers share run_cycle; running the
                // cycle in its own task means stop() only ever cancels
                // the timer, never an in-flight cycle
                let cycle_tracker = Arc::clone(&tracker);
                tokio::spawn(async move {
                    if let Err(e) = cycle_tracker.run_cycle().await {
                        warn!("Scheduled cycle failed: {}", e);
                    }
                });
            }
        });
        *task = Some(handle);
        drop(task);
        self.is_scheduled.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Disarm the timer. An in-flight cycle runs to completion.
    pub fn stop(&self) {
        let mut task = self.schedule_task.lock().unwrap();
        if let Some(handle) = task.take() {
            handle.abort();
            info!("Tracker schedule disarmed");
        }
        self.is_scheduled.store(false, Ordering::SeqCst);
    }

    /// Run a cycle now, unless one is already in flight.
    pub async fn trigger_manual(&self) -> Result<TriggerOutcome> {
        self.run_cycle().await
    }

    /// One full tracking cycle: scrape all sources concurrently, merge
    /// and dedupe, enrich and persist genuinely new records.
    #[instrument(skip(self))]
    pub async fn run_cycle(&self) -> Result<TriggerOutcome> {
        if self
            .is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("Cycle refused: another cycle is still running");
            return Ok(TriggerOutcome::Refused);
        }
        let _guard = RunGuard(&self.is_running);
        *self.last_check_at.lock().unwrap() = Some(Utc::now());
        counter!("tracker_cycles_total").increment(1);
        let t_cycle = std::time::Instant::now();

        let candidates = self.scrape_all_sources().await;
        let total_scraped = candidates.len();
        let deduped = dedupe_candidates(candidates);
        debug!(
            "{} candidates after in-cycle dedup ({} scraped)",
            deduped.len(),
            total_scraped
        );

        let mut added = 0;
        for candidate in deduped {
            if self.process_candidate(&candidate).await {
                added += 1;
            }
        }

        histogram!("tracker_cycle_duration_seconds").record(t_cycle.elapsed().as_secs_f64());
        counter!("tracker_records_added_total").increment(added as u64);
        info!("Cycle complete: {} added of {} scraped", added, total_scraped);
        Ok(TriggerOutcome::Completed(CycleSummary {
            added,
            total_scraped,
        }))
    }

    /// Scrape every source concurrently; a failing source contributes an
    /// empty list and a log line, never an aborted cycle.
    async fn scrape_all_sources(&self) -> Vec<CandidateRecord> {
        let mut join_set = JoinSet::new();
        for source in &self.sources {
            let source = Arc::clone(source);
            join_set.spawn(async move {
                let name = source.source_name().to_string();
                (name, source.fetch_candidates().await)
            });
        }

        let mut candidates = Vec::new();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((name, Ok(list))) => {
                    counter!("tracker_candidates_scraped_total", "source" => name.clone())
                        .increment(list.len() as u64);
                    debug!("{} candidates from {}", list.len(), name);
                    candidates.extend(list);
                }
                Ok((name, Err(e))) => {
                    counter!("tracker_scrape_failures_total", "source" => name.clone())
                        .increment(1);
                    warn!("Scrape of {} failed: {}", name, e);
                }
                Err(e) => warn!("Scrape task panicked: {}", e),
            }
        }
        candidates
    }

    /// Enrich and persist one candidate if it is genuinely new.
    /// Returns true when a record was inserted.
    async fn process_candidate(&self, candidate: &CandidateRecord) -> bool {
        let normalized = matcher::normalize_title(&candidate.title);
        if self.known_titles.lock().unwrap().contains(&normalized) {
            debug!("Skipping known title '{}'", candidate.title);
            return false;
        }

        let images = self
            .enricher
            .resolve(&candidate.title, Some(candidate.year))
            .await;

        // Authoritative existence check after enrichment, when external
        // ids are available, to close the race with out-of-band inserts
        match self
            .catalog
            .exists_by_title_or_external_id(&candidate.title, &images.external_ids)
            .await
        {
            Ok(true) => {
                debug!("'{}' already in catalog", candidate.title);
                self.known_titles.lock().unwrap().insert(normalized);
                return false;
            }
            Ok(false) => {}
            Err(e) => {
                // Uncertain catalog state: skip rather than risk a
                // duplicate write; the next cycle retries
                warn!("Existence check for '{}' failed: {}", candidate.title, e);
                return false;
            }
        }

        let record = build_record(candidate, images);
        match self.catalog.insert(&record).await {
            Ok(id) => {
                info!("Added '{}' ({}) as {}", record.title, record.year, id);
                self.known_titles.lock().unwrap().insert(normalized);
                tokio::time::sleep(self.request_delay).await;
                true
            }
            Err(e) => {
                warn!("Insert of '{}' failed: {}", candidate.title, e);
                false
            }
        }
    }
}

/// Merge per-site results, keeping the first record seen for each
/// lowercase (title, year) pair
fn dedupe_candidates(candidates: Vec<CandidateRecord>) -> Vec<CandidateRecord> {
    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|c| seen.insert((c.title.to_lowercase(), c.year)))
        .collect()
}

/// Assemble the catalog record from the scraped candidate and the
/// enrichment payload
fn build_record(candidate: &CandidateRecord, images: crate::types::EnrichedImages) -> EnrichedRecord {
    let rating_average = images.vote_average.or(candidate.rating_hint);
    let rating_source = rating_average.map(|_| {
        if images.vote_average.is_some() {
            crate::constants::REFERENCE_SOURCE.to_string()
        } else {
            candidate.source.clone()
        }
    });

    EnrichedRecord {
        title: candidate.title.clone(),
        year: candidate.year,
        description: images.overview,
        poster_url: images.poster_url,
        backdrop_url: images.backdrop_url,
        duration_minutes: images.runtime_minutes,
        genres: images.genres.into_iter().collect(),
        languages: images.languages,
        countries: images.countries,
        director: images.director,
        cast: images.cast,
        quality_tags: std::iter::once(candidate.quality.clone()).collect(),
        external_ids: images.external_ids,
        rating_average,
        rating_source,
    }
}

/// Parse a compact schedule expression ("90s", "30m", "6h") into a period
fn parse_schedule(expression: &str) -> Result<Duration> {
    let expression = expression.trim();
    let Some(unit) = expression.chars().last() else {
        return Err(TrackerError::Config(
            "Empty schedule expression".to_string(),
        ));
    };
    let value = &expression[..expression.len() - unit.len_utf8()];
    let magnitude: u64 = value.parse().map_err(|_| {
        TrackerError::Config(format!("Invalid schedule expression '{}'", expression))
    })?;
    if magnitude == 0 {
        return Err(TrackerError::Config(format!(
            "Schedule period must be non-zero, got '{}'",
            expression
        )));
    }
    let seconds = match unit {
        's' => magnitude,
        'm' => magnitude * 60,
        'h' => magnitude * 60 * 60,
        _ => {
            return Err(TrackerError::Config(format!(
                "Unknown schedule unit in '{}', expected s/m/h",
                expression
            )))
        }
    };
    Ok(Duration::from_secs(seconds))
}

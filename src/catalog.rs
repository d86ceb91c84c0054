use crate::error::Result;
use crate::matcher;
use crate::types::{EnrichedRecord, ExternalIds};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

/// Read/write boundary to the authoritative catalog store. The real
/// implementation lives with the API layer; the tracker only consumes
/// this trait.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Uniform dedup predicate: normalized-title equality, or an
    /// external-id match when the caller has one
    async fn exists_by_title_or_external_id(
        &self,
        title: &str,
        external_ids: &ExternalIds,
    ) -> Result<bool>;

    async fn insert(&self, record: &EnrichedRecord) -> Result<Uuid>;

    /// Every stored title; consulted once at start-up to seed the
    /// tracker's known-title set
    async fn list_all_titles(&self) -> Result<Vec<String>>;
}

/// In-memory catalog implementation for development/testing
pub struct InMemoryCatalog {
    movies: Arc<Mutex<HashMap<Uuid, EnrichedRecord>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            movies: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.movies.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn exists_by_title_or_external_id(
        &self,
        title: &str,
        external_ids: &ExternalIds,
    ) -> Result<bool> {
        let normalized = matcher::normalize_title(title);
        let movies = self.movies.lock().unwrap();
        let exists = movies.values().any(|movie| {
            if matcher::normalize_title(&movie.title) == normalized {
                return true;
            }
            if external_ids.is_empty() || movie.external_ids.is_empty() {
                return false;
            }
            let reference_match = movie.external_ids.reference_id.is_some()
                && movie.external_ids.reference_id == external_ids.reference_id;
            let imdb_match = movie.external_ids.imdb_id.is_some()
                && movie.external_ids.imdb_id == external_ids.imdb_id;
            reference_match || imdb_match
        });
        Ok(exists)
    }

    async fn insert(&self, record: &EnrichedRecord) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let mut movies = self.movies.lock().unwrap();
        movies.insert(id, record.clone());
        debug!("Inserted movie: {} ({}) with id {}", record.title, record.year, id);
        Ok(id)
    }

    async fn list_all_titles(&self) -> Result<Vec<String>> {
        let movies = self.movies.lock().unwrap();
        Ok(movies.values().map(|m| m.title.clone()).collect())
    }
}

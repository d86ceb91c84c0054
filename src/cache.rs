use crate::error::Result;
use crate::matcher;
use crate::types::EnrichedImages;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// Deterministic slug identifying one (title, year) pair.
/// Case- and punctuation-insensitive so re-listings of the same movie
/// hit the same entry.
pub fn cache_key(title: &str, year: i32) -> String {
    format!("{}-{}", matcher::normalize_title(title).replace(' ', "-"), year)
}

/// Durable image/metadata cache keyed by the (title, year) slug.
///
/// Owned and mutated exclusively by the enrichment orchestrator. Entries
/// record when they were last served; cleanup removes entries unused for
/// longer than the retention window.
pub struct ImageCache {
    conn: Mutex<Connection>,
}

impl ImageCache {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// In-memory database for tests and the one-shot enrich CLI path
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS image_cache (
                cache_key     TEXT PRIMARY KEY,
                payload       TEXT NOT NULL,
                cached_at     INTEGER NOT NULL,
                last_used_at  INTEGER NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Point lookup. A hit refreshes `last_used_at`.
    pub fn get(&self, key: &str) -> Result<Option<EnrichedImages>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT payload FROM image_cache WHERE cache_key = ?1")?;
        let mut rows = stmt.query(params![key])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let payload_json: String = row.get(0)?;
        drop(rows);
        drop(stmt);

        conn.execute(
            "UPDATE image_cache SET last_used_at = ?1 WHERE cache_key = ?2",
            params![Utc::now().timestamp(), key],
        )?;

        let payload: EnrichedImages = serde_json::from_str(&payload_json)?;
        debug!("Cache hit for {}", key);
        Ok(Some(payload))
    }

    /// Point upsert
    pub fn put(&self, key: &str, payload: &EnrichedImages) -> Result<()> {
        let payload_json = serde_json::to_string(payload)?;
        let now = Utc::now().timestamp();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO image_cache (cache_key, payload, cached_at, last_used_at)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET payload=excluded.payload, last_used_at=excluded.last_used_at",
            params![key, payload_json, now],
        )?;
        debug!("Cached enrichment for {}", key);
        Ok(())
    }

    /// Remove entries not served within the retention window.
    /// Returns the number of entries removed.
    pub fn cleanup(&self, retention_days: i64) -> Result<usize> {
        let cutoff = Utc::now().timestamp() - retention_days * 24 * 60 * 60;
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(
            "DELETE FROM image_cache WHERE last_used_at < ?1",
            params![cutoff],
        )?;
        if removed > 0 {
            info!("Cache cleanup removed {} stale entries", removed);
        }
        Ok(removed)
    }

    #[cfg(test)]
    fn backdate(&self, key: &str, last_used_at: i64) {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE image_cache SET last_used_at = ?1 WHERE cache_key = ?2",
            params![last_used_at, key],
        )
        .unwrap();
    }
}

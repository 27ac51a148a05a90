mod schema;
pub mod cache;
pub mod entities;
pub mod faces;
pub mod purge;

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

pub use cache::{EntityCache, EntityCaches};
pub use entities::{NewPhoto, Table, UNKNOWN_COUNTRY, UNKNOWN_SLUG};
pub use faces::{BoundingBox, Face, Marker, NewMarker, Source, Subject};
pub use schema::SCHEMA;

/// How long a statement waits for another connection's write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Handle to the index database.
///
/// Not `Sync`: every thread that needs the store opens its own handle on
/// the same file.
pub struct Database {
    pub(crate) conn: Connection,
    cache: EntityCaches,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self {
            conn,
            cache: EntityCaches::new(),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn,
            cache: EntityCaches::new(),
        })
    }

    /// Create tables and seed the "unknown" sentinel rows. Safe to repeat.
    pub fn initialize(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA)
            .context("Failed to initialize schema")?;
        Ok(())
    }

    pub fn cache(&self) -> &EntityCaches {
        &self.cache
    }

    pub fn count_rows(&self, table: Table) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table.as_str());
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Lowercase, hyphen-separated form of a display name.
pub fn slugify(s: &str) -> String {
    s.to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

pub(crate) fn now_timestamp() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string()
}

//! In-memory lookup caches for photo dimensions (countries, cameras, lenses).
//!
//! Readers resolve slugs to row ids without a query. A purge must flush the
//! matching cache before deleting rows so no reader is handed an id that is
//! about to disappear.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Slug-keyed cache for one entity type.
#[derive(Debug)]
pub struct EntityCache<V> {
    name: &'static str,
    entries: Mutex<HashMap<String, V>>,
}

impl<V: Clone> EntityCache<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, V>> {
        // A panicking writer cannot leave a half-inserted entry behind.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, slug: &str) -> Option<V> {
        self.entries().get(slug).cloned()
    }

    pub fn insert(&self, slug: impl Into<String>, value: V) {
        self.entries().insert(slug.into(), value);
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn flush(&self) {
        let mut entries = self.entries();
        let flushed = entries.len();
        entries.clear();
        tracing::debug!(cache = self.name, flushed, "cache flushed");
    }
}

/// Caches owned by one [`Database`](super::Database).
#[derive(Debug)]
pub struct EntityCaches {
    /// Country slug to country code.
    pub countries: EntityCache<String>,
    /// Camera slug to camera id.
    pub cameras: EntityCache<i64>,
    /// Lens slug to lens id.
    pub lenses: EntityCache<i64>,
}

impl EntityCaches {
    pub fn new() -> Self {
        Self {
            countries: EntityCache::new("countries"),
            cameras: EntityCache::new("cameras"),
            lenses: EntityCache::new("lenses"),
        }
    }
}

impl Default for EntityCaches {
    fn default() -> Self {
        Self::new()
    }
}

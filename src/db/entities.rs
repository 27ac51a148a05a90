//! Photos, files, duplicates and the photo dimensions (country, camera, lens).
//!
//! These are written by the indexer; this crate only needs enough of them to
//! decide which rows have become unreachable.

use anyhow::Result;
use rusqlite::{params, OptionalExtension};

use super::{now_timestamp, slugify, Database};

/// Slug of the sentinel "unknown" country, camera and lens rows.
pub const UNKNOWN_SLUG: &str = "zz";

/// Country code of the sentinel "unknown" country.
pub const UNKNOWN_COUNTRY: &str = "zz";

/// Id of the sentinel "unknown" camera and lens rows.
pub const UNKNOWN_ID: i64 = 1;

/// Tables that can be counted with [`Database::count_rows`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    Photos,
    Files,
    Duplicates,
    Countries,
    Cameras,
    Lenses,
    Subjects,
    Faces,
    Markers,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Photos => "photos",
            Table::Files => "files",
            Table::Duplicates => "duplicates",
            Table::Countries => "countries",
            Table::Cameras => "cameras",
            Table::Lenses => "lenses",
            Table::Subjects => "subjects",
            Table::Faces => "faces",
            Table::Markers => "markers",
        }
    }
}

/// Values for a new photo row.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub title: String,
    pub camera_id: i64,
    pub lens_id: i64,
    pub country: String,
}

impl Default for NewPhoto {
    fn default() -> Self {
        Self {
            title: String::new(),
            camera_id: UNKNOWN_ID,
            lens_id: UNKNOWN_ID,
            country: UNKNOWN_COUNTRY.to_string(),
        }
    }
}

impl Database {
    // ========================================================================
    // Photos
    // ========================================================================

    pub fn create_photo(&self, photo: &NewPhoto) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO photos (title, camera_id, lens_id, photo_country) VALUES (?, ?, ?, ?)",
            params![photo.title, photo.camera_id, photo.lens_id, photo.country],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Remove a photo row. Its files are left behind for the purge to collect.
    pub fn delete_photo(&self, photo_id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM photos WHERE id = ?", params![photo_id])?;
        Ok(())
    }

    // ========================================================================
    // Files
    // ========================================================================

    pub fn add_file(&self, photo_id: Option<i64>, file_name: &str, file_hash: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO files (photo_id, file_name, file_hash) VALUES (?, ?, ?)",
            params![photo_id, file_name, file_hash],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn set_file_missing(&self, file_id: i64, missing: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE files SET file_missing = ? WHERE id = ?",
            params![missing, file_id],
        )?;
        Ok(())
    }

    /// Flag a file as deleted without removing the row.
    pub fn soft_delete_file(&self, file_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE files SET deleted_at = ? WHERE id = ?",
            params![now_timestamp(), file_id],
        )?;
        Ok(())
    }

    pub fn file_exists(&self, file_id: i64) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM files WHERE id = ?", params![file_id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn add_duplicate(&self, file_name: &str, file_hash: &str, file_size: i64) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO duplicates (file_name, file_hash, file_size) VALUES (?, ?, ?)",
            params![file_name, file_hash, file_size],
        )?;
        Ok(())
    }

    pub fn duplicate_exists(&self, file_name: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM duplicates WHERE file_name = ?",
                params![file_name],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    // ========================================================================
    // Dimensions
    // ========================================================================

    /// Resolve a country code, creating the row if needed.
    pub fn find_or_create_country(&self, code: &str, name: &str) -> Result<String> {
        let slug = slugify(code);
        if slug.is_empty() || slug == UNKNOWN_SLUG {
            return Ok(UNKNOWN_COUNTRY.to_string());
        }

        if let Some(id) = self.cache().countries.get(&slug) {
            return Ok(id);
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO countries (id, country_slug, country_name) VALUES (?, ?, ?)",
            params![slug, slug, name],
        )?;
        let id: String = self.conn.query_row(
            "SELECT id FROM countries WHERE country_slug = ?",
            params![slug],
            |row| row.get(0),
        )?;

        self.cache().countries.insert(slug, id.clone());
        Ok(id)
    }

    /// Resolve a camera by make and model, creating the row if needed.
    pub fn find_or_create_camera(&self, make: &str, model: &str) -> Result<i64> {
        let slug = slugify(&format!("{} {}", make, model));
        if slug.is_empty() {
            return Ok(UNKNOWN_ID);
        }

        if let Some(id) = self.cache().cameras.get(&slug) {
            return Ok(id);
        }

        self.conn.execute(
            r#"
            INSERT OR IGNORE INTO cameras (camera_slug, camera_make, camera_model)
            VALUES (?, ?, ?)
            "#,
            params![slug, make, model],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM cameras WHERE camera_slug = ?",
            params![slug],
            |row| row.get(0),
        )?;

        self.cache().cameras.insert(slug, id);
        Ok(id)
    }

    /// Resolve a lens by make and model, creating the row if needed.
    pub fn find_or_create_lens(&self, make: &str, model: &str) -> Result<i64> {
        let slug = slugify(&format!("{} {}", make, model));
        if slug.is_empty() {
            return Ok(UNKNOWN_ID);
        }

        if let Some(id) = self.cache().lenses.get(&slug) {
            return Ok(id);
        }

        self.conn.execute(
            "INSERT OR IGNORE INTO lenses (lens_slug, lens_make, lens_model) VALUES (?, ?, ?)",
            params![slug, make, model],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM lenses WHERE lens_slug = ?",
            params![slug],
            |row| row.get(0),
        )?;

        self.cache().lenses.insert(slug, id);
        Ok(id)
    }

    pub fn country_exists(&self, code: &str) -> Result<bool> {
        self.exists("SELECT 1 FROM countries WHERE id = ?", code)
    }

    pub fn camera_exists(&self, slug: &str) -> Result<bool> {
        self.exists("SELECT 1 FROM cameras WHERE camera_slug = ?", slug)
    }

    pub fn lens_exists(&self, slug: &str) -> Result<bool> {
        self.exists("SELECT 1 FROM lenses WHERE lens_slug = ?", slug)
    }

    fn exists(&self, sql: &str, key: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row(sql, params![key], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

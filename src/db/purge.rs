//! Deletes for rows nothing reaches anymore.
//!
//! Every query re-evaluates its condition against current state, so each
//! function can be repeated or interleaved with indexer writes.

use anyhow::Result;
use rusqlite::params;

use super::{Database, UNKNOWN_COUNTRY, UNKNOWN_SLUG};

impl Database {
    /// Ids of files without a live photo.
    pub fn get_orphan_files(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id FROM files
            WHERE photo_id IS NULL OR photo_id NOT IN (SELECT id FROM photos)
            ORDER BY id
            "#,
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Delete a file row and the markers derived from it.
    pub fn delete_file_permanently(&self, file_id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM markers WHERE file_id = ?", params![file_id])?;
        tx.execute("DELETE FROM files WHERE id = ?", params![file_id])?;
        tx.commit()?;
        Ok(())
    }

    /// Permanently delete every file without a live photo.
    pub fn purge_orphan_files(&self) -> Result<usize> {
        let ids = self.get_orphan_files()?;
        for id in &ids {
            self.delete_file_permanently(*id)?;
        }
        Ok(ids.len())
    }

    /// Delete duplicates whose hash no present, undeleted file carries.
    pub fn purge_orphan_duplicates(&self) -> Result<usize> {
        let deleted = self.conn.execute(
            r#"
            DELETE FROM duplicates WHERE file_hash NOT IN (
                SELECT file_hash FROM files WHERE file_missing = 0 AND deleted_at IS NULL
            )
            "#,
            [],
        )?;
        Ok(deleted)
    }

    pub fn purge_orphan_countries(&self) -> Result<usize> {
        self.cache().countries.flush();
        let deleted = self.conn.execute(
            r#"
            DELETE FROM countries
            WHERE id <> ? AND country_slug <> ?
              AND id NOT IN (SELECT photo_country FROM photos WHERE photo_country IS NOT NULL)
            "#,
            params![UNKNOWN_COUNTRY, UNKNOWN_SLUG],
        )?;
        Ok(deleted)
    }

    pub fn purge_orphan_cameras(&self) -> Result<usize> {
        self.cache().cameras.flush();
        let deleted = self.conn.execute(
            r#"
            DELETE FROM cameras
            WHERE camera_slug <> ?
              AND id NOT IN (SELECT camera_id FROM photos WHERE camera_id IS NOT NULL)
            "#,
            params![UNKNOWN_SLUG],
        )?;
        Ok(deleted)
    }

    pub fn purge_orphan_lenses(&self) -> Result<usize> {
        self.cache().lenses.flush();
        let deleted = self.conn.execute(
            r#"
            DELETE FROM lenses
            WHERE lens_slug <> ?
              AND id NOT IN (SELECT lens_id FROM photos WHERE lens_id IS NOT NULL)
            "#,
            params![UNKNOWN_SLUG],
        )?;
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, NewMarker, NewPhoto, Table, UNKNOWN_COUNTRY};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn test_orphan_files_take_their_markers() {
        let db = test_db();
        let photo_id = db.create_photo(&NewPhoto::default()).unwrap();
        let kept = db.add_file(Some(photo_id), "a.jpg", "h1").unwrap();
        let detached = db.add_file(None, "b.jpg", "h2").unwrap();
        let gone_photo = db.create_photo(&NewPhoto::default()).unwrap();
        let dangling = db.add_file(Some(gone_photo), "c.jpg", "h3").unwrap();
        db.delete_photo(gone_photo).unwrap();

        db.add_marker(&NewMarker { file_id: kept, ..Default::default() }).unwrap();
        db.add_marker(&NewMarker { file_id: dangling, ..Default::default() }).unwrap();

        assert_eq!(db.get_orphan_files().unwrap(), vec![detached, dangling]);
        assert_eq!(db.purge_orphan_files().unwrap(), 2);
        assert_eq!(db.purge_orphan_files().unwrap(), 0);

        assert!(db.file_exists(kept).unwrap());
        assert_eq!(db.count_rows(Table::Files).unwrap(), 1);
        assert_eq!(db.count_rows(Table::Markers).unwrap(), 1);
    }

    #[test]
    fn test_duplicate_survives_while_hash_is_present() {
        let db = test_db();
        let photo_id = db.create_photo(&NewPhoto::default()).unwrap();
        let file_id = db.add_file(Some(photo_id), "a.jpg", "abc").unwrap();
        db.add_duplicate("copy/a.jpg", "abc", 100).unwrap();

        assert_eq!(db.purge_orphan_duplicates().unwrap(), 0);
        assert!(db.duplicate_exists("copy/a.jpg").unwrap());

        db.set_file_missing(file_id, true).unwrap();
        assert_eq!(db.purge_orphan_duplicates().unwrap(), 1);
        assert!(!db.duplicate_exists("copy/a.jpg").unwrap());
    }

    #[test]
    fn test_duplicate_with_unknown_hash_is_the_only_one_removed() {
        let db = test_db();
        let photo_id = db.create_photo(&NewPhoto::default()).unwrap();
        db.add_file(Some(photo_id), "b.jpg", "def").unwrap();
        let missing = db.add_file(Some(photo_id), "c.jpg", "abc").unwrap();
        db.set_file_missing(missing, true).unwrap();
        db.add_duplicate("copy/a.jpg", "abc", 10).unwrap();
        db.add_duplicate("copy/b.jpg", "def", 10).unwrap();

        assert_eq!(db.purge_orphan_duplicates().unwrap(), 1);
        assert!(!db.duplicate_exists("copy/a.jpg").unwrap());
        assert!(db.duplicate_exists("copy/b.jpg").unwrap());
        assert_eq!(db.count_rows(Table::Duplicates).unwrap(), 1);
    }

    #[test]
    fn test_dimension_purges_keep_sentinels_and_referenced_rows() {
        let db = test_db();
        let used_camera = db.find_or_create_camera("Canon", "EOS 5D").unwrap();
        db.find_or_create_camera("Nikon", "D750").unwrap();
        let used_lens = db.find_or_create_lens("Canon", "50mm").unwrap();
        db.find_or_create_lens("Nikon", "35mm").unwrap();
        let used_country = db.find_or_create_country("de", "Germany").unwrap();
        db.find_or_create_country("fr", "France").unwrap();

        db.create_photo(&NewPhoto {
            camera_id: used_camera,
            lens_id: used_lens,
            country: used_country,
            ..Default::default()
        })
        .unwrap();

        assert_eq!(db.purge_orphan_cameras().unwrap(), 1);
        assert_eq!(db.purge_orphan_lenses().unwrap(), 1);
        assert_eq!(db.purge_orphan_countries().unwrap(), 1);
        assert!(db.cache().cameras.is_empty());
        assert!(db.cache().lenses.is_empty());
        assert!(db.cache().countries.is_empty());

        assert!(db.camera_exists("canon-eos-5d").unwrap());
        assert!(!db.camera_exists("nikon-d750").unwrap());
        assert!(db.camera_exists("zz").unwrap());
        assert!(db.lens_exists("zz").unwrap());
        assert!(db.country_exists(UNKNOWN_COUNTRY).unwrap());
        assert!(!db.country_exists("fr").unwrap());
    }
}

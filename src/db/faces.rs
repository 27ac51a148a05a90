//! Database functions for markers, faces and subjects.

use anyhow::{bail, Result};
use rusqlite::{params, OptionalExtension, Row};

use super::{now_timestamp, slugify, Database};

/// Who set a subject or face reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Labelled by a user.
    Manual,
    /// Created from a marker name.
    Marker,
    /// Assigned by clustering or matching.
    Auto,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Manual => "manual",
            Source::Marker => "marker",
            Source::Auto => "auto",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "manual" => Some(Source::Manual),
            "marker" => Some(Source::Marker),
            "auto" => Some(Source::Auto),
            _ => None,
        }
    }
}

/// Face region relative to image size (0..1).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

/// A detected face region.
#[derive(Debug, Clone)]
pub struct Marker {
    pub id: i64,
    pub file_id: i64,
    pub name: String,
    pub subject_id: Option<i64>,
    pub subj_src: Option<Source>,
    pub face_id: Option<i64>,
    pub face_dist: f64,
    pub embedding: Option<Vec<f32>>,
    pub bbox: BoundingBox,
    pub score: i64,
    pub invalid: bool,
    pub clustered_at: Option<String>,
    pub matched_at: Option<String>,
}

/// Values for a new marker row.
#[derive(Debug, Clone, Default)]
pub struct NewMarker<'a> {
    pub file_id: i64,
    pub name: &'a str,
    pub bbox: BoundingBox,
    pub embedding: Option<&'a [f32]>,
    pub score: i64,
}

/// An embedding cluster representing one visual identity.
#[derive(Debug, Clone)]
pub struct Face {
    pub id: i64,
    pub src: Source,
    pub subject_id: Option<i64>,
    pub embedding: Vec<f32>,
    pub samples: i64,
    pub collisions: i64,
}

/// A named person.
#[derive(Debug, Clone)]
pub struct Subject {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub src: Source,
    pub marker_count: i64,
}

const MARKER_COLUMNS: &str = "id, file_id, marker_name, subject_id, subj_src, face_id, face_dist, \
     embedding, x, y, w, h, score, marker_invalid, clustered_at, matched_at";

fn row_to_marker(row: &Row) -> rusqlite::Result<Marker> {
    let subj_src: String = row.get(4)?;
    let embedding: Option<Vec<u8>> = row.get(7)?;
    Ok(Marker {
        id: row.get(0)?,
        file_id: row.get(1)?,
        name: row.get(2)?,
        subject_id: row.get(3)?,
        subj_src: Source::from_str(&subj_src),
        face_id: row.get(5)?,
        face_dist: row.get(6)?,
        embedding: embedding.map(|b| bytes_to_embedding(&b)),
        bbox: BoundingBox {
            x: row.get(8)?,
            y: row.get(9)?,
            w: row.get(10)?,
            h: row.get(11)?,
        },
        score: row.get(12)?,
        invalid: row.get(13)?,
        clustered_at: row.get(14)?,
        matched_at: row.get(15)?,
    })
}

const FACE_COLUMNS: &str = "id, face_src, subject_id, embedding, samples, collisions";

fn row_to_face(row: &Row) -> rusqlite::Result<Face> {
    let src: String = row.get(1)?;
    let embedding: Vec<u8> = row.get(3)?;
    Ok(Face {
        id: row.get(0)?,
        src: Source::from_str(&src).unwrap_or(Source::Auto),
        subject_id: row.get(2)?,
        embedding: bytes_to_embedding(&embedding),
        samples: row.get(4)?,
        collisions: row.get(5)?,
    })
}

fn row_to_subject(row: &Row) -> rusqlite::Result<Subject> {
    let src: String = row.get(3)?;
    Ok(Subject {
        id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        src: Source::from_str(&src).unwrap_or(Source::Manual),
        marker_count: row.get(4)?,
    })
}

const SUBJECT_QUERY: &str = r#"
    SELECT s.id, s.subj_slug, s.subj_name, s.subj_src, COUNT(m.id) AS marker_count
    FROM subjects s
    LEFT JOIN markers m ON m.subject_id = s.id
"#;

impl Database {
    // ========================================================================
    // Subjects
    // ========================================================================

    pub fn create_subject(&self, name: &str, src: Source) -> Result<i64> {
        let slug = slugify(name);
        if slug.is_empty() {
            bail!("invalid subject name {:?}", name);
        }

        self.conn.execute(
            "INSERT INTO subjects (subj_slug, subj_name, subj_src) VALUES (?, ?, ?)",
            params![slug, name.trim(), src.as_str()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn find_subject_by_slug(&self, slug: &str) -> Result<Option<Subject>> {
        let sql = format!("{} WHERE s.subj_slug = ? GROUP BY s.id", SUBJECT_QUERY);
        let subject = self
            .conn
            .query_row(&sql, params![slug], row_to_subject)
            .optional()?;
        Ok(subject)
    }

    /// Find a subject by the slug of `name`, or create it.
    pub fn find_or_create_subject(&self, name: &str, src: Source) -> Result<i64> {
        if let Some(subject) = self.find_subject_by_slug(&slugify(name))? {
            Ok(subject.id)
        } else {
            self.create_subject(name, src)
        }
    }

    pub fn get_subject(&self, subject_id: i64) -> Result<Option<Subject>> {
        let sql = format!("{} WHERE s.id = ? GROUP BY s.id", SUBJECT_QUERY);
        let subject = self
            .conn
            .query_row(&sql, params![subject_id], row_to_subject)
            .optional()?;
        Ok(subject)
    }

    /// Delete subjects no marker refers to, unlinking faces that still
    /// point at them.
    pub fn delete_orphan_subjects(&self) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            UPDATE faces SET subject_id = NULL
            WHERE subject_id IN (
                SELECT id FROM subjects
                WHERE id NOT IN (SELECT subject_id FROM markers WHERE subject_id IS NOT NULL)
            )
            "#,
            [],
        )?;
        let deleted = tx.execute(
            r#"
            DELETE FROM subjects
            WHERE id NOT IN (SELECT subject_id FROM markers WHERE subject_id IS NOT NULL)
            "#,
            [],
        )?;
        tx.commit()?;
        Ok(deleted)
    }

    // ========================================================================
    // Markers
    // ========================================================================

    pub fn add_marker(&self, marker: &NewMarker) -> Result<i64> {
        let embedding_bytes = marker.embedding.map(embedding_to_bytes);
        let embedding_dim = marker.embedding.map(|e| e.len() as i64);

        self.conn.execute(
            r#"
            INSERT INTO markers (file_id, marker_name, embedding, embedding_dim, x, y, w, h, score)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                marker.file_id,
                marker.name,
                embedding_bytes,
                embedding_dim,
                marker.bbox.x,
                marker.bbox.y,
                marker.bbox.w,
                marker.bbox.h,
                marker.score,
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    pub fn get_marker(&self, marker_id: i64) -> Result<Option<Marker>> {
        let sql = format!("SELECT {} FROM markers WHERE id = ?", MARKER_COLUMNS);
        let marker = self
            .conn
            .query_row(&sql, params![marker_id], row_to_marker)
            .optional()?;
        Ok(marker)
    }

    pub fn get_markers_for_face(&self, face_id: i64) -> Result<Vec<Marker>> {
        let sql = format!("SELECT {} FROM markers WHERE face_id = ? ORDER BY id", MARKER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let markers = stmt
            .query_map(params![face_id], row_to_marker)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(markers)
    }

    /// Record a user label on a marker.
    pub fn label_marker(&self, marker_id: i64, subject_id: i64) -> Result<()> {
        self.assign_marker_subject(marker_id, subject_id, Source::Manual)
    }

    pub fn assign_marker_subject(
        &self,
        marker_id: i64,
        subject_id: i64,
        src: Source,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE markers SET subject_id = ?, subj_src = ? WHERE id = ?",
            params![subject_id, src.as_str(), marker_id],
        )?;
        Ok(())
    }

    pub fn set_marker_face(
        &self,
        marker_id: i64,
        face_id: Option<i64>,
        face_dist: f64,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE markers SET face_id = ?, face_dist = ? WHERE id = ?",
            params![face_id, face_dist, marker_id],
        )?;
        Ok(())
    }

    pub fn set_marker_invalid(&self, marker_id: i64, invalid: bool) -> Result<()> {
        self.conn.execute(
            "UPDATE markers SET marker_invalid = ? WHERE id = ?",
            params![invalid, marker_id],
        )?;
        Ok(())
    }

    /// Delete markers whose file is gone or flagged deleted.
    pub fn remove_orphan_markers(&self) -> Result<usize> {
        let removed = self.conn.execute(
            r#"
            DELETE FROM markers
            WHERE file_id NOT IN (SELECT id FROM files WHERE deleted_at IS NULL)
            "#,
            [],
        )?;
        Ok(removed)
    }

    /// Clear dangling face and subject references on markers and faces.
    ///
    /// Markers are kept; only the broken reference is reset.
    pub fn fix_marker_references(&self) -> Result<usize> {
        let mut fixed = self.conn.execute(
            r#"
            UPDATE markers SET face_id = NULL, face_dist = -1
            WHERE face_id IS NOT NULL AND face_id NOT IN (SELECT id FROM faces)
            "#,
            [],
        )?;
        fixed += self.conn.execute(
            r#"
            UPDATE markers SET subject_id = NULL, subj_src = ''
            WHERE subject_id IS NOT NULL AND subject_id NOT IN (SELECT id FROM subjects)
            "#,
            [],
        )?;
        fixed += self.conn.execute(
            r#"
            UPDATE faces SET subject_id = NULL
            WHERE subject_id IS NOT NULL AND subject_id NOT IN (SELECT id FROM subjects)
            "#,
            [],
        )?;
        Ok(fixed)
    }

    /// Count marker references that do not resolve.
    pub fn count_dangling_marker_references(&self) -> Result<i64> {
        let count: i64 = self.conn.query_row(
            r#"
            SELECT COUNT(*) FROM markers
            WHERE (face_id IS NOT NULL AND face_id NOT IN (SELECT id FROM faces))
               OR (subject_id IS NOT NULL AND subject_id NOT IN (SELECT id FROM subjects))
            "#,
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Valid named markers that have no subject yet.
    pub fn get_named_markers_without_subject(&self) -> Result<Vec<(i64, String)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, marker_name FROM markers
            WHERE marker_name <> '' AND subject_id IS NULL AND marker_invalid = 0
            ORDER BY id
            "#,
        )?;
        let markers = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(markers)
    }

    /// Valid, faceless markers with an embedding; unless `force`, only
    /// those never considered for clustering.
    pub fn get_cluster_candidates(&self, force: bool) -> Result<Vec<(i64, Vec<f32>)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, embedding FROM markers
            WHERE marker_invalid = 0 AND embedding IS NOT NULL AND face_id IS NULL
              AND (? OR clustered_at IS NULL)
            ORDER BY id
            "#,
        )?;
        let candidates = stmt
            .query_map(params![force], |row| {
                let bytes: Vec<u8> = row.get(1)?;
                Ok((row.get(0)?, bytes_to_embedding(&bytes)))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(candidates)
    }

    pub fn mark_markers_clustered(&self, marker_ids: &[i64]) -> Result<()> {
        let now = now_timestamp();
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE markers SET clustered_at = ? WHERE id = ?")?;
            for id in marker_ids {
                stmt.execute(params![now, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Valid markers with an embedding that still need matching; with
    /// `force`, all of them.
    pub fn get_match_candidates(&self, force: bool) -> Result<Vec<Marker>> {
        let sql = format!(
            r#"
            SELECT {} FROM markers
            WHERE marker_invalid = 0 AND embedding IS NOT NULL
              AND (? OR matched_at IS NULL OR face_id IS NULL)
            ORDER BY id
            "#,
            MARKER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let markers = stmt
            .query_map(params![force], row_to_marker)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(markers)
    }

    pub fn mark_marker_matched(&self, marker_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE markers SET matched_at = ? WHERE id = ?",
            params![now_timestamp(), marker_id],
        )?;
        Ok(())
    }

    /// Remove a marker from its face so the next clustering run reconsiders it.
    pub fn detach_marker(&self, marker_id: i64) -> Result<()> {
        self.conn.execute(
            r#"
            UPDATE markers
            SET face_id = NULL, face_dist = -1, clustered_at = NULL, matched_at = NULL
            WHERE id = ?
            "#,
            params![marker_id],
        )?;
        Ok(())
    }

    /// `(marker_id, subject_id)` for user-labelled markers on a face.
    pub fn get_manual_labels_for_face(&self, face_id: i64) -> Result<Vec<(i64, i64)>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, subject_id FROM markers
            WHERE face_id = ? AND subj_src = 'manual' AND subject_id IS NOT NULL
            ORDER BY id
            "#,
        )?;
        let labels = stmt
            .query_map(params![face_id], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(labels)
    }

    // ========================================================================
    // Faces
    // ========================================================================

    pub fn create_face(
        &self,
        src: Source,
        subject_id: Option<i64>,
        embedding: &[f32],
        samples: i64,
    ) -> Result<i64> {
        self.conn.execute(
            r#"
            INSERT INTO faces (face_src, subject_id, embedding, embedding_dim, samples)
            VALUES (?, ?, ?, ?, ?)
            "#,
            params![
                src.as_str(),
                subject_id,
                embedding_to_bytes(embedding),
                embedding.len() as i64,
                samples,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Create an automatic face and attach its member markers
    /// (`(marker_id, face_dist)`) in one transaction.
    pub fn create_cluster_face(&self, embedding: &[f32], members: &[(i64, f64)]) -> Result<Face> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            r#"
            INSERT INTO faces (face_src, embedding, embedding_dim, samples)
            VALUES (?, ?, ?, ?)
            "#,
            params![
                Source::Auto.as_str(),
                embedding_to_bytes(embedding),
                embedding.len() as i64,
                members.len() as i64,
            ],
        )?;
        let face_id = tx.last_insert_rowid();
        {
            let mut stmt =
                tx.prepare("UPDATE markers SET face_id = ?, face_dist = ? WHERE id = ?")?;
            for (marker_id, dist) in members {
                stmt.execute(params![face_id, dist, marker_id])?;
            }
        }
        tx.commit()?;

        Ok(Face {
            id: face_id,
            src: Source::Auto,
            subject_id: None,
            embedding: embedding.to_vec(),
            samples: members.len() as i64,
            collisions: 0,
        })
    }

    pub fn get_face(&self, face_id: i64) -> Result<Option<Face>> {
        let sql = format!("SELECT {} FROM faces WHERE id = ?", FACE_COLUMNS);
        let face = self
            .conn
            .query_row(&sql, params![face_id], row_to_face)
            .optional()?;
        Ok(face)
    }

    pub fn get_all_faces(&self) -> Result<Vec<Face>> {
        let sql = format!("SELECT {} FROM faces ORDER BY id", FACE_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let faces = stmt
            .query_map([], row_to_face)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(faces)
    }

    pub fn set_face_subject(&self, face_id: i64, subject_id: Option<i64>) -> Result<()> {
        self.conn.execute(
            "UPDATE faces SET subject_id = ? WHERE id = ?",
            params![subject_id, face_id],
        )?;
        Ok(())
    }

    pub fn add_face_collisions(&self, face_id: i64, collisions: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE faces SET collisions = collisions + ? WHERE id = ?",
            params![collisions, face_id],
        )?;
        Ok(())
    }

    /// Fold `merged` into `kept`: store the combined embedding and sample
    /// count, move the markers, delete `merged`.
    pub fn merge_faces(&self, kept: &Face, merged: &Face, embedding: &[f32]) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE faces SET embedding = ?, embedding_dim = ?, samples = ? WHERE id = ?",
            params![
                embedding_to_bytes(embedding),
                embedding.len() as i64,
                kept.samples + merged.samples,
                kept.id,
            ],
        )?;
        tx.execute(
            "UPDATE markers SET face_id = ? WHERE face_id = ?",
            params![kept.id, merged.id],
        )?;
        tx.execute("DELETE FROM faces WHERE id = ?", params![merged.id])?;
        tx.commit()?;
        Ok(())
    }

    /// Delete faces no marker refers to.
    pub fn delete_orphan_faces(&self) -> Result<usize> {
        let deleted = self.conn.execute(
            r#"
            DELETE FROM faces
            WHERE id NOT IN (SELECT face_id FROM markers WHERE face_id IS NOT NULL)
            "#,
            [],
        )?;
        Ok(deleted)
    }
}

// ============================================================================
// Helper functions
// ============================================================================

/// Convert f32 slice to bytes for storage
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        bytes.extend_from_slice(&val.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to f32 vector
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewPhoto, Table};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn add_file(db: &Database) -> i64 {
        let photo_id = db.create_photo(&NewPhoto::default()).unwrap();
        db.add_file(Some(photo_id), "IMG_0001.jpg", "hash-1").unwrap()
    }

    #[test]
    fn test_embedding_conversion() {
        let original = vec![1.5, -2.3, 0.0, 100.0];
        let bytes = embedding_to_bytes(&original);
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes_to_embedding(&bytes), original);
    }

    #[test]
    fn test_subject_slug_lookup() {
        let db = test_db();
        let id = db.create_subject("Jane Doe", Source::Manual).unwrap();
        assert_eq!(db.find_or_create_subject("jane  DOE", Source::Marker).unwrap(), id);

        let subject = db.get_subject(id).unwrap().unwrap();
        assert_eq!(subject.slug, "jane-doe");
        assert_eq!(subject.name, "Jane Doe");
        assert_eq!(subject.src, Source::Manual);
        assert_eq!(subject.marker_count, 0);

        assert!(db.create_subject("  ", Source::Manual).is_err());
    }

    #[test]
    fn test_remove_orphan_markers() {
        let db = test_db();
        let live = add_file(&db);
        let deleted = add_file(&db);
        db.soft_delete_file(deleted).unwrap();

        db.add_marker(&NewMarker { file_id: live, ..Default::default() }).unwrap();
        db.add_marker(&NewMarker { file_id: deleted, ..Default::default() }).unwrap();
        db.add_marker(&NewMarker { file_id: 999, ..Default::default() }).unwrap();

        assert_eq!(db.remove_orphan_markers().unwrap(), 2);
        assert_eq!(db.remove_orphan_markers().unwrap(), 0);
        assert_eq!(db.count_rows(Table::Markers).unwrap(), 1);
    }

    #[test]
    fn test_fix_marker_references_keeps_markers() {
        let db = test_db();
        let file_id = add_file(&db);
        let subject_id = db.create_subject("Jane", Source::Manual).unwrap();
        let face_id = db.create_face(Source::Auto, Some(subject_id), &[1.0, 0.0], 1).unwrap();

        let marker_id = db.add_marker(&NewMarker { file_id, ..Default::default() }).unwrap();
        db.set_marker_face(marker_id, Some(face_id), 0.1).unwrap();
        db.label_marker(marker_id, subject_id).unwrap();

        // Nothing dangling yet
        assert_eq!(db.fix_marker_references().unwrap(), 0);

        db.conn.execute("DELETE FROM faces", []).unwrap();
        db.conn.execute("DELETE FROM subjects", []).unwrap();
        assert_eq!(db.count_dangling_marker_references().unwrap(), 1);

        assert_eq!(db.fix_marker_references().unwrap(), 2);
        assert_eq!(db.count_dangling_marker_references().unwrap(), 0);

        let marker = db.get_marker(marker_id).unwrap().unwrap();
        assert_eq!(marker.face_id, None);
        assert_eq!(marker.face_dist, -1.0);
        assert_eq!(marker.subject_id, None);
        assert_eq!(marker.subj_src, None);
    }

    #[test]
    fn test_create_cluster_face_assigns_members() {
        let db = test_db();
        let file_id = add_file(&db);
        let a = db
            .add_marker(&NewMarker {
                file_id,
                embedding: Some(&[1.0, 0.0][..]),
                ..Default::default()
            })
            .unwrap();
        let b = db
            .add_marker(&NewMarker {
                file_id,
                embedding: Some(&[0.9, 0.1][..]),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(db.get_cluster_candidates(false).unwrap().len(), 2);

        let face = db.create_cluster_face(&[0.95, 0.05], &[(a, 0.0), (b, 0.01)]).unwrap();
        assert_eq!(face.samples, 2);
        assert_eq!(db.get_markers_for_face(face.id).unwrap().len(), 2);
        assert!(db.get_cluster_candidates(true).unwrap().is_empty());
    }

    #[test]
    fn test_cluster_candidates_respect_force() {
        let db = test_db();
        let file_id = add_file(&db);
        let id = db
            .add_marker(&NewMarker { file_id, embedding: Some(&[1.0][..]), ..Default::default() })
            .unwrap();
        db.add_marker(&NewMarker { file_id, ..Default::default() }).unwrap();

        db.mark_markers_clustered(&[id]).unwrap();
        assert!(db.get_cluster_candidates(false).unwrap().is_empty());
        assert_eq!(db.get_cluster_candidates(true).unwrap().len(), 1);
    }

    #[test]
    fn test_merge_faces_moves_markers() {
        let db = test_db();
        let file_id = add_file(&db);
        let kept_id = db.create_face(Source::Auto, None, &[1.0, 0.0], 2).unwrap();
        let merged_id = db.create_face(Source::Auto, None, &[0.9, 0.1], 1).unwrap();
        let marker_id = db.add_marker(&NewMarker { file_id, ..Default::default() }).unwrap();
        db.set_marker_face(marker_id, Some(merged_id), 0.2).unwrap();

        let kept = db.get_face(kept_id).unwrap().unwrap();
        let merged = db.get_face(merged_id).unwrap().unwrap();
        db.merge_faces(&kept, &merged, &[0.96, 0.03]).unwrap();

        assert!(db.get_face(merged_id).unwrap().is_none());
        let kept = db.get_face(kept_id).unwrap().unwrap();
        assert_eq!(kept.samples, 3);
        assert_eq!(kept.embedding, vec![0.96, 0.03]);
        assert_eq!(db.get_marker(marker_id).unwrap().unwrap().face_id, Some(kept_id));
    }

    #[test]
    fn test_delete_orphan_subjects_unlinks_faces() {
        let db = test_db();
        let file_id = add_file(&db);
        let used = db.create_subject("Used", Source::Manual).unwrap();
        let unused = db.create_subject("Unused", Source::Manual).unwrap();
        let face_id = db.create_face(Source::Auto, Some(unused), &[1.0], 1).unwrap();
        let marker_id = db.add_marker(&NewMarker { file_id, ..Default::default() }).unwrap();
        db.label_marker(marker_id, used).unwrap();

        assert_eq!(db.delete_orphan_subjects().unwrap(), 1);
        assert!(db.get_subject(used).unwrap().is_some());
        assert!(db.get_subject(unused).unwrap().is_none());
        assert_eq!(db.get_face(face_id).unwrap().unwrap().subject_id, None);
        assert_eq!(db.delete_orphan_subjects().unwrap(), 0);
    }

    #[test]
    fn test_delete_orphan_faces() {
        let db = test_db();
        let file_id = add_file(&db);
        let used = db.create_face(Source::Auto, None, &[1.0], 1).unwrap();
        let unused = db.create_face(Source::Auto, None, &[0.0], 1).unwrap();
        let marker_id = db.add_marker(&NewMarker { file_id, ..Default::default() }).unwrap();
        db.set_marker_face(marker_id, Some(used), 0.0).unwrap();

        assert_eq!(db.delete_orphan_faces().unwrap(), 1);
        assert!(db.get_face(used).unwrap().is_some());
        assert!(db.get_face(unused).unwrap().is_none());
    }
}

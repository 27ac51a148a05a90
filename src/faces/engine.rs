//! SQLite-backed implementation of the faces pipeline operations.

use anyhow::Result;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::clustering::{cosine_similarity, distance, greedy_clusters, weighted_mean};
use super::ops::{FaceOps, FacesOptions, MatchFailure, MatchResult, OptimizeResult};
use crate::config::FacesConfig;
use crate::db::{slugify, Database, Face, Marker, Source};

pub struct FaceEngine<'a> {
    db: &'a Database,
    config: &'a FacesConfig,
}

impl<'a> FaceEngine<'a> {
    pub fn new(db: &'a Database, config: &'a FacesConfig) -> Self {
        Self { db, config }
    }

    /// Give faces without a subject the one subject their manually
    /// labelled markers agree on.
    fn adopt_face_subjects(&self) -> Result<usize> {
        let mut adopted = 0;
        for face in self.db.get_all_faces()? {
            if face.subject_id.is_some() {
                continue;
            }

            let subjects: HashSet<i64> = self
                .db
                .get_manual_labels_for_face(face.id)?
                .into_iter()
                .map(|(_, subject_id)| subject_id)
                .collect();

            if subjects.len() == 1 {
                let subject_id = subjects.into_iter().next();
                self.db.set_face_subject(face.id, subject_id)?;
                adopted += 1;
            }
        }
        Ok(adopted)
    }

    /// Closest face at or above the match threshold.
    fn best_face<'f>(&self, faces: &'f [Face], embedding: &[f32]) -> Option<(&'f Face, f64)> {
        let mut best: Option<(&Face, f32)> = None;
        for face in faces {
            let similarity = cosine_similarity(&face.embedding, embedding);
            if similarity < self.config.match_similarity {
                continue;
            }
            if best.map_or(true, |(_, s)| similarity > s) {
                best = Some((face, similarity));
            }
        }
        best.map(|(face, similarity)| (face, distance(similarity)))
    }

    fn match_marker(
        &self,
        marker: &Marker,
        faces: &[Face],
        opts: &FacesOptions,
        result: &mut MatchResult,
    ) -> Result<()> {
        let Some(embedding) = marker.embedding.as_deref() else {
            return Ok(());
        };

        let current = marker
            .face_id
            .and_then(|id| faces.iter().find(|f| f.id == id));
        let best = if opts.force || current.is_none() {
            self.best_face(faces, embedding)
        } else {
            None
        };
        let assigned = best.or_else(|| current.map(|face| (face, marker.face_dist)));

        let mut changed = false;
        let mut subject_id = marker.subject_id;

        if let Some((face, dist)) = assigned {
            if marker.face_id != Some(face.id) {
                self.db.set_marker_face(marker.id, Some(face.id), dist)?;
                changed = true;
            }

            // Only fill in or replace subjects nobody set by hand.
            let replaceable = subject_id.is_none() || marker.subj_src == Some(Source::Auto);
            if let Some(face_subject) = face.subject_id {
                if replaceable && subject_id != Some(face_subject) {
                    self.db
                        .assign_marker_subject(marker.id, face_subject, Source::Auto)?;
                    subject_id = Some(face_subject);
                    changed = true;
                }
            }
        }

        self.db.mark_marker_matched(marker.id)?;

        if changed {
            result.updated += 1;
        }
        if subject_id.is_some() {
            result.recognized += 1;
        } else {
            result.unknown += 1;
        }
        Ok(())
    }
}

/// Subject named by more than half of the labels.
fn strict_majority(labels: &[(i64, i64)]) -> Option<i64> {
    let mut counts: HashMap<i64, usize> = HashMap::new();
    for (_, subject_id) in labels {
        *counts.entry(*subject_id).or_default() += 1;
    }
    counts
        .into_iter()
        .find(|(_, n)| n * 2 > labels.len())
        .map(|(subject_id, _)| subject_id)
}

impl FaceOps for FaceEngine<'_> {
    fn remove_orphan_markers(&self) -> Result<usize> {
        self.db.remove_orphan_markers()
    }

    fn fix_marker_references(&self) -> Result<usize> {
        self.db.fix_marker_references()
    }

    fn create_marker_subjects(&self) -> Result<usize> {
        let mut created = 0;
        for (marker_id, name) in self.db.get_named_markers_without_subject()? {
            if slugify(&name).is_empty() {
                tracing::debug!(marker_id, name = %name, "marker name has no usable slug");
                continue;
            }

            let subject_id = self.db.find_or_create_subject(&name, Source::Marker)?;
            self.db
                .assign_marker_subject(marker_id, subject_id, Source::Marker)?;
            created += 1;
        }
        Ok(created)
    }

    fn resolve_face_collisions(&self) -> Result<(usize, usize)> {
        let mut examined = 0;
        let mut resolved = 0;

        for face in self.db.get_all_faces()? {
            let labels = self.db.get_manual_labels_for_face(face.id)?;
            if labels.is_empty() {
                continue;
            }

            let collision = match face.subject_id {
                Some(subject_id) => labels.iter().any(|(_, s)| *s != subject_id),
                None => labels.iter().map(|(_, s)| s).collect::<HashSet<_>>().len() > 1,
            };
            if !collision {
                continue;
            }
            examined += 1;

            let Some(target) = face.subject_id.or_else(|| strict_majority(&labels)) else {
                tracing::debug!(
                    face_id = face.id,
                    labels = labels.len(),
                    "collision without majority"
                );
                continue;
            };

            let disagreeing: Vec<i64> = labels
                .iter()
                .filter(|(_, s)| *s != target)
                .map(|(marker_id, _)| *marker_id)
                .collect();
            for marker_id in &disagreeing {
                self.db.detach_marker(*marker_id)?;
            }
            if face.subject_id.is_none() {
                self.db.set_face_subject(face.id, Some(target))?;
            }
            self.db
                .add_face_collisions(face.id, disagreeing.len() as i64)?;

            tracing::debug!(face_id = face.id, detached = disagreeing.len(), "collision resolved");
            resolved += 1;
        }

        Ok((examined, resolved))
    }

    fn optimize_clusters(&self, _opts: &FacesOptions) -> Result<OptimizeResult> {
        let mut by_subject: BTreeMap<i64, Vec<Face>> = BTreeMap::new();
        for face in self.db.get_all_faces()? {
            if let Some(subject_id) = face.subject_id {
                by_subject.entry(subject_id).or_default().push(face);
            }
        }

        let mut merged = 0;
        for (_, mut faces) in by_subject {
            if faces.len() < 2 {
                continue;
            }
            // Larger faces absorb smaller ones.
            faces.sort_by(|a, b| b.samples.cmp(&a.samples).then(a.id.cmp(&b.id)));

            let mut kept: Vec<Face> = Vec::new();
            for face in faces {
                let target = kept.iter_mut().find(|k| {
                    cosine_similarity(&k.embedding, &face.embedding) >= self.config.merge_similarity
                });

                match target {
                    Some(k) => {
                        let embedding =
                            weighted_mean(&k.embedding, k.samples, &face.embedding, face.samples);
                        self.db.merge_faces(k, &face, &embedding)?;
                        k.embedding = embedding;
                        k.samples += face.samples;
                        merged += 1;
                    }
                    None => kept.push(face),
                }
            }
        }

        Ok(OptimizeResult { merged })
    }

    fn build_clusters(&self, opts: &FacesOptions) -> Result<Vec<Face>> {
        let candidates = self.db.get_cluster_candidates(opts.force)?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let clusters = greedy_clusters(
            &candidates,
            self.config.cluster_similarity,
            self.config.cluster_min_size,
        );

        let mut faces = Vec::with_capacity(clusters.len());
        for cluster in &clusters {
            faces.push(
                self.db
                    .create_cluster_face(&cluster.embedding, &cluster.members)?,
            );
        }

        let ids: Vec<i64> = candidates.iter().map(|(id, _)| *id).collect();
        self.db.mark_markers_clustered(&ids)?;

        tracing::debug!(candidates = ids.len(), clusters = faces.len(), "clustering done");
        Ok(faces)
    }

    fn match_markers(&self, opts: &FacesOptions) -> Result<MatchResult, MatchFailure> {
        let mut result = MatchResult::default();

        let adopted = self
            .adopt_face_subjects()
            .map_err(|e| MatchFailure::new(result, e))?;
        if adopted > 0 {
            tracing::debug!(adopted, "faces adopted subjects from manual labels");
        }

        let faces = self
            .db
            .get_all_faces()
            .map_err(|e| MatchFailure::new(result, e))?;
        let markers = self
            .db
            .get_match_candidates(opts.force)
            .map_err(|e| MatchFailure::new(result, e))?;

        for marker in &markers {
            self.match_marker(marker, &faces, opts, &mut result)
                .map_err(|e| MatchFailure::new(result, e))?;
        }

        Ok(result)
    }

    fn delete_orphan_people(&self) -> Result<usize> {
        self.db.delete_orphan_subjects()
    }

    fn delete_orphan_faces(&self) -> Result<usize> {
        self.db.delete_orphan_faces()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{NewMarker, NewPhoto, Table};

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    fn add_file(db: &Database) -> i64 {
        let photo_id = db.create_photo(&NewPhoto::default()).unwrap();
        db.add_file(Some(photo_id), "IMG_0001.jpg", "hash").unwrap()
    }

    fn add_marker(db: &Database, file_id: i64, embedding: &[f32]) -> i64 {
        db.add_marker(&NewMarker {
            file_id,
            embedding: Some(embedding),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_new_markers_form_one_cluster_next_to_existing_face() {
        let db = test_db();
        let config = FacesConfig::default();
        let engine = FaceEngine::new(&db, &config);
        let file_id = add_file(&db);

        let f1 = db.create_face(Source::Auto, None, &[1.0, 0.0, 0.0], 2).unwrap();
        for embedding in [[1.0f32, 0.0, 0.0], [0.98, 0.02, 0.0]] {
            let id = add_marker(&db, file_id, &embedding);
            db.set_marker_face(id, Some(f1), 0.0).unwrap();
        }
        let new_ids: Vec<i64> = [[0.0f32, 1.0, 0.0], [0.0, 0.97, 0.1], [0.05, 0.95, 0.0]]
            .iter()
            .map(|e| add_marker(&db, file_id, e))
            .collect();

        let faces = engine.build_clusters(&FacesOptions::default()).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].samples, 3);
        assert_eq!(faces[0].src, Source::Auto);

        let members: Vec<i64> = db
            .get_markers_for_face(faces[0].id)
            .unwrap()
            .iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(members, new_ids);

        assert_eq!(engine.delete_orphan_faces().unwrap(), 0);
        assert!(db.get_face(f1).unwrap().is_some());
        assert_eq!(db.count_rows(Table::Faces).unwrap(), 2);

        // Already considered
        assert!(engine.build_clusters(&FacesOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn test_create_marker_subjects_reuses_slug() {
        let db = test_db();
        let config = FacesConfig::default();
        let engine = FaceEngine::new(&db, &config);
        let file_id = add_file(&db);

        let existing = db.create_subject("Jane Doe", Source::Manual).unwrap();
        let named = |name| NewMarker { file_id, name, ..Default::default() };
        let a = db.add_marker(&named("jane doe")).unwrap();
        let b = db.add_marker(&named("John")).unwrap();
        db.add_marker(&named("???")).unwrap();
        let invalid = db.add_marker(&named("Ghost")).unwrap();
        db.set_marker_invalid(invalid, true).unwrap();

        assert_eq!(engine.create_marker_subjects().unwrap(), 2);
        assert_eq!(engine.create_marker_subjects().unwrap(), 0);

        let a = db.get_marker(a).unwrap().unwrap();
        assert_eq!(a.subject_id, Some(existing));
        assert_eq!(a.subj_src, Some(Source::Marker));

        let b = db.get_marker(b).unwrap().unwrap();
        let john = db.get_subject(b.subject_id.unwrap()).unwrap().unwrap();
        assert_eq!(john.slug, "john");
        assert_eq!(john.src, Source::Marker);
        assert!(db.find_subject_by_slug("ghost").unwrap().is_none());
    }

    #[test]
    fn test_collision_detaches_minority_labels() {
        let db = test_db();
        let config = FacesConfig::default();
        let engine = FaceEngine::new(&db, &config);
        let file_id = add_file(&db);

        let jane = db.create_subject("Jane", Source::Manual).unwrap();
        let john = db.create_subject("John", Source::Manual).unwrap();
        let face = db.create_face(Source::Auto, None, &[1.0, 0.0], 3).unwrap();

        let mut ids = Vec::new();
        for subject in [jane, jane, john] {
            let id = add_marker(&db, file_id, &[1.0, 0.0]);
            db.set_marker_face(id, Some(face), 0.0).unwrap();
            db.label_marker(id, subject).unwrap();
            ids.push(id);
        }
        db.mark_markers_clustered(&ids).unwrap();

        assert_eq!(engine.resolve_face_collisions().unwrap(), (1, 1));

        let face = db.get_face(face).unwrap().unwrap();
        assert_eq!(face.subject_id, Some(jane));
        assert_eq!(face.collisions, 1);

        let detached = db.get_marker(ids[2]).unwrap().unwrap();
        assert_eq!(detached.face_id, None);
        assert_eq!(detached.face_dist, -1.0);
        assert_eq!(detached.clustered_at, None);
        assert_eq!(detached.subject_id, Some(john));

        assert_eq!(engine.resolve_face_collisions().unwrap(), (0, 0));
    }

    #[test]
    fn test_collision_without_majority_stays_unresolved() {
        let db = test_db();
        let config = FacesConfig::default();
        let engine = FaceEngine::new(&db, &config);
        let file_id = add_file(&db);

        let jane = db.create_subject("Jane", Source::Manual).unwrap();
        let john = db.create_subject("John", Source::Manual).unwrap();
        let face = db.create_face(Source::Auto, None, &[1.0, 0.0], 2).unwrap();
        for subject in [jane, john] {
            let id = add_marker(&db, file_id, &[1.0, 0.0]);
            db.set_marker_face(id, Some(face), 0.0).unwrap();
            db.label_marker(id, subject).unwrap();
        }

        assert_eq!(engine.resolve_face_collisions().unwrap(), (1, 0));
        assert_eq!(db.get_markers_for_face(face).unwrap().len(), 2);
    }

    #[test]
    fn test_optimize_merges_similar_faces_of_one_subject() {
        let db = test_db();
        let config = FacesConfig::default();
        let engine = FaceEngine::new(&db, &config);
        let file_id = add_file(&db);

        let jane = db.create_subject("Jane", Source::Manual).unwrap();
        let big = db.create_face(Source::Auto, Some(jane), &[1.0, 0.0], 2).unwrap();
        let small = db.create_face(Source::Auto, Some(jane), &[0.99, 0.1], 1).unwrap();
        let other = db.create_face(Source::Auto, Some(jane), &[0.0, 1.0], 1).unwrap();
        let unlabelled = db.create_face(Source::Auto, None, &[1.0, 0.0], 1).unwrap();
        let marker = add_marker(&db, file_id, &[0.99, 0.1]);
        db.set_marker_face(marker, Some(small), 0.0).unwrap();

        let result = engine.optimize_clusters(&FacesOptions::default()).unwrap();
        assert_eq!(result.merged, 1);

        assert!(db.get_face(small).unwrap().is_none());
        assert!(db.get_face(other).unwrap().is_some());
        assert!(db.get_face(unlabelled).unwrap().is_some());
        assert_eq!(db.get_face(big).unwrap().unwrap().samples, 3);
        assert_eq!(db.get_marker(marker).unwrap().unwrap().face_id, Some(big));

        assert_eq!(engine.optimize_clusters(&FacesOptions::default()).unwrap().merged, 0);
    }

    #[test]
    fn test_match_assigns_faces_and_subjects() {
        let db = test_db();
        let config = FacesConfig::default();
        let engine = FaceEngine::new(&db, &config);
        let file_id = add_file(&db);

        let jane = db.create_subject("Jane", Source::Manual).unwrap();
        let face = db.create_face(Source::Auto, Some(jane), &[1.0, 0.0], 1).unwrap();
        let known = add_marker(&db, file_id, &[0.9, 0.1]);
        let stranger = add_marker(&db, file_id, &[0.0, 1.0]);

        let result = engine.match_markers(&FacesOptions::default()).unwrap();
        assert_eq!(
            result,
            MatchResult {
                updated: 1,
                recognized: 1,
                unknown: 1
            }
        );

        let known = db.get_marker(known).unwrap().unwrap();
        assert_eq!(known.face_id, Some(face));
        assert_eq!(known.subject_id, Some(jane));
        assert_eq!(known.subj_src, Some(Source::Auto));
        assert!(known.matched_at.is_some());
        assert!(known.face_dist >= 0.0 && known.face_dist < 0.1);

        // Only the faceless marker is reconsidered
        let result = engine.match_markers(&FacesOptions::default()).unwrap();
        assert_eq!(
            result,
            MatchResult {
                updated: 0,
                recognized: 0,
                unknown: 1
            }
        );
        assert_eq!(db.get_marker(stranger).unwrap().unwrap().face_id, None);

        let result = engine.match_markers(&FacesOptions { force: true }).unwrap();
        assert_eq!(result.recognized, 1);
        assert_eq!(result.unknown, 1);
        assert_eq!(result.updated, 0);
    }

    #[test]
    fn test_match_keeps_manual_subjects() {
        let db = test_db();
        let config = FacesConfig::default();
        let engine = FaceEngine::new(&db, &config);
        let file_id = add_file(&db);

        let jane = db.create_subject("Jane", Source::Manual).unwrap();
        let john = db.create_subject("John", Source::Manual).unwrap();
        db.create_face(Source::Auto, Some(jane), &[1.0, 0.0], 1).unwrap();
        let marker = add_marker(&db, file_id, &[1.0, 0.0]);
        db.label_marker(marker, john).unwrap();

        let result = engine.match_markers(&FacesOptions::default()).unwrap();
        assert_eq!(result.recognized, 1);
        assert_eq!(result.updated, 1);
        assert_eq!(db.get_marker(marker).unwrap().unwrap().subject_id, Some(john));
    }

    #[test]
    fn test_match_adopts_unanimous_manual_subject() {
        let db = test_db();
        let config = FacesConfig::default();
        let engine = FaceEngine::new(&db, &config);
        let file_id = add_file(&db);

        let jane = db.create_subject("Jane", Source::Manual).unwrap();
        let face = db.create_face(Source::Auto, None, &[1.0, 0.0], 2).unwrap();
        let labelled = add_marker(&db, file_id, &[1.0, 0.0]);
        db.set_marker_face(labelled, Some(face), 0.0).unwrap();
        db.label_marker(labelled, jane).unwrap();
        let unlabelled = add_marker(&db, file_id, &[0.95, 0.05]);
        db.set_marker_face(unlabelled, Some(face), 0.01).unwrap();

        let result = engine.match_markers(&FacesOptions::default()).unwrap();
        assert_eq!(result.recognized, 2);
        assert_eq!(result.unknown, 0);

        assert_eq!(db.get_face(face).unwrap().unwrap().subject_id, Some(jane));
        assert_eq!(db.get_marker(unlabelled).unwrap().unwrap().subject_id, Some(jane));
    }

    #[test]
    fn test_delete_orphan_people() {
        let db = test_db();
        let config = FacesConfig::default();
        let engine = FaceEngine::new(&db, &config);

        db.create_subject("Nobody", Source::Manual).unwrap();
        assert_eq!(engine.delete_orphan_people().unwrap(), 1);
        assert_eq!(engine.delete_orphan_people().unwrap(), 0);
    }
}

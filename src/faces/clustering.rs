//! Embedding math shared by clustering, matching and cluster merging.

/// A group of markers found by [`greedy_clusters`].
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Marker id and its distance to the cluster seed.
    pub members: Vec<(i64, f64)>,
    pub embedding: Vec<f32>,
}

/// Group embeddings around seeds.
///
/// The clustering algorithm uses a simple greedy approach:
/// 1. Pick the first unclustered marker as a new cluster seed
/// 2. Add every later unclustered marker within the similarity threshold
/// 3. Repeat until all markers are processed
///
/// Clusters smaller than `min_size` are dropped; their markers stay
/// unassigned.
pub fn greedy_clusters(
    candidates: &[(i64, Vec<f32>)],
    similarity_threshold: f32,
    min_size: usize,
) -> Vec<Cluster> {
    let mut clustered: Vec<bool> = vec![false; candidates.len()];
    let mut clusters = Vec::new();

    for i in 0..candidates.len() {
        if clustered[i] {
            continue;
        }

        let (seed_id, ref seed) = candidates[i];
        clustered[i] = true;
        let mut member_idx = vec![i];
        let mut members = vec![(seed_id, 0.0)];

        for j in (i + 1)..candidates.len() {
            if clustered[j] {
                continue;
            }

            let (other_id, ref other) = candidates[j];
            let similarity = cosine_similarity(seed, other);

            if similarity >= similarity_threshold {
                clustered[j] = true;
                member_idx.push(j);
                members.push((other_id, distance(similarity)));
            }
        }

        if members.len() < min_size.max(1) {
            continue;
        }

        let embeddings: Vec<&[f32]> = member_idx
            .iter()
            .map(|&k| candidates[k].1.as_slice())
            .collect();
        clusters.push(Cluster {
            members,
            embedding: mean_embedding(&embeddings),
        });
    }

    clusters
}

/// Calculate cosine similarity between two vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Marker-to-face distance stored in `face_dist`.
pub fn distance(similarity: f32) -> f64 {
    (1.0 - similarity as f64).max(0.0)
}

/// Component-wise mean. Embeddings of a different length than the first
/// are ignored.
pub fn mean_embedding(embeddings: &[&[f32]]) -> Vec<f32> {
    let Some(first) = embeddings.first() else {
        return Vec::new();
    };

    let mut sum = vec![0.0f32; first.len()];
    let mut count = 0usize;
    for embedding in embeddings.iter().filter(|e| e.len() == first.len()) {
        for (s, v) in sum.iter_mut().zip(embedding.iter()) {
            *s += v;
        }
        count += 1;
    }

    sum.iter().map(|s| s / count as f32).collect()
}

/// Sample-weighted mean of two face embeddings.
pub fn weighted_mean(a: &[f32], a_samples: i64, b: &[f32], b_samples: i64) -> Vec<f32> {
    let wa = a_samples.max(1) as f32;
    let wb = b_samples.max(1) as f32;
    if a.len() != b.len() {
        return a.to_vec();
    }

    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x * wa + y * wb) / (wa + wb))
        .collect()
}

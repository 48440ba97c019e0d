use std::collections::HashMap;

use chrono::Utc;

use crate::models::{ItemVector, Neighbor, NeighborhoodDoc};

/// Parameters of one similarity computation
#[derive(Debug, Clone)]
pub struct SimilarityParams {
    /// Neighborhood size after truncation
    pub k: usize,
    /// Item pairs with fewer co-rating users are discarded
    pub min_common_users: usize,
    /// Shrink term: raw similarity is scaled by n / (n + shrink),
    /// where n is the co-rating user count
    pub shrink: f64,
}

/// Top-k most similar items to `target` by shrunk cosine similarity
/// over co-rating users. Ties break on ascending neighbor movie id so
/// repeated rebuilds emit identical neighborhoods.
pub fn top_k_neighbors(
    target: &ItemVector,
    candidates: &[ItemVector],
    params: &SimilarityParams,
) -> Vec<Neighbor> {
    let target_map: HashMap<i64, f64> = target.ratings.iter().copied().collect();
    let target_norm = norm(&target.ratings);
    if target_norm == 0.0 {
        return Vec::new();
    }

    let mut scored: Vec<Neighbor> = Vec::new();

    for cand in candidates {
        if cand.i_idx == target.i_idx {
            continue;
        }

        let mut dot = 0.0;
        let mut common = 0usize;
        for (user_id, value) in &cand.ratings {
            if let Some(target_value) = target_map.get(user_id) {
                dot += target_value * value;
                common += 1;
            }
        }

        if common < params.min_common_users {
            continue;
        }

        let cand_norm = norm(&cand.ratings);
        if cand_norm == 0.0 {
            continue;
        }

        let shrink_factor = common as f64 / (common as f64 + params.shrink);
        let sim = (dot / (target_norm * cand_norm)) * shrink_factor;
        if !sim.is_finite() || sim == 0.0 {
            continue;
        }

        scored.push(Neighbor {
            movie_id: cand.movie_id,
            i_idx: cand.i_idx,
            sim,
        });
    }

    scored.sort_by(|a, b| {
        b.sim
            .partial_cmp(&a.sim)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.movie_id.cmp(&b.movie_id))
    });
    scored.truncate(params.k);
    scored
}

/// Builds replacement neighborhood entries for a batch of target
/// indices against the full set of indexed item vectors. Targets with
/// no vector (no ratings yet) are skipped.
pub fn build_neighborhoods(
    batch: &[i64],
    vectors: &[ItemVector],
    metric: &str,
    params: &SimilarityParams,
) -> Vec<NeighborhoodDoc> {
    let by_idx: HashMap<i64, &ItemVector> = vectors.iter().map(|v| (v.i_idx, v)).collect();
    let now = Utc::now();

    batch
        .iter()
        .filter_map(|i_idx| by_idx.get(i_idx))
        .map(|target| NeighborhoodDoc {
            i_idx: target.i_idx,
            movie_id: target.movie_id,
            metric: metric.to_string(),
            k: params.k,
            neighbors: top_k_neighbors(target, vectors, params),
            updated_at: now,
        })
        .collect()
}

fn norm(ratings: &[(i64, f64)]) -> f64 {
    ratings.iter().map(|(_, v)| v * v).sum::<f64>().sqrt()
}

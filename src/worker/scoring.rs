use std::collections::HashMap;

use crate::cluster::messages::{PartialScore, RecTask};
use crate::error::AppResult;
use crate::store::NeighborStore;

/// Per-item neighbor fetch ceiling. Distinct from the task's `k`, which
/// only truncates the final ranking on the coordinator.
pub const NEIGHBOR_FETCH_LIMIT: usize = 100;

/// Computes this shard's partial numerator/denominator contributions.
///
/// The shard owns the rated items at positions `idx` with
/// `idx % shards == shard_id`, in the order the coordinator sent them.
/// Contributions from disjoint rated items are additive in both
/// accumulators, so any ordering yields the same partials.
pub async fn compute_shard_partials(
    task: &RecTask,
    neighbors: &dyn NeighborStore,
) -> AppResult<Vec<PartialScore>> {
    let rated: HashMap<i64, f64> = task
        .ratings
        .iter()
        .map(|r| (r.movie_id, r.rating))
        .collect();

    let mut scores: HashMap<i64, f64> = HashMap::new();
    let mut weights: HashMap<i64, f64> = HashMap::new();

    for (idx, r) in task.ratings.iter().enumerate() {
        if task.shards > 0 && idx % task.shards != task.shard_id {
            continue;
        }

        // A lookup failure aborts the whole task; the coordinator
        // treats the silent close as a worker error.
        let neighs = neighbors
            .get_neighbors(r.movie_id, NEIGHBOR_FETCH_LIMIT)
            .await?;

        for n in neighs {
            if rated.contains_key(&n.movie_id) {
                continue;
            }
            if n.sim <= 0.0 {
                continue;
            }

            *scores.entry(n.movie_id).or_default() += n.sim * r.rating;
            *weights.entry(n.movie_id).or_default() += n.sim;
        }
    }

    let mut partials: Vec<PartialScore> = scores
        .into_iter()
        .filter_map(|(movie_id, num)| {
            let den = weights[&movie_id];
            (den > 0.0).then_some(PartialScore { movie_id, num, den })
        })
        .collect();

    partials.sort_by_key(|p| p.movie_id);
    Ok(partials)
}

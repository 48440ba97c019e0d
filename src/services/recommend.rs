use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};

use crate::cache::{CacheKey, RecCache, REC_CACHE_TTL};
use crate::cluster::{self, RecResponse, RecTask};
use crate::error::{AppError, AppResult};
use crate::models::{Explanation, NeighborContribution, RecItem, Recommendation};
use crate::store::{HistoryStore, NeighborStore, RatingStore};
use crate::worker::scoring::NEIGHBOR_FETCH_LIMIT;

pub const DEFAULT_K: usize = 20;
/// Upper bound on requested list length
pub const MAX_K: usize = 50;

/// Hard deadline over the entire worker fan-out, not per worker
const FANOUT_TIMEOUT: Duration = Duration::from_secs(10);

/// A recommendation request: only the parameters that vary at runtime
#[derive(Debug, Clone)]
pub struct RecRequest {
    pub user_id: i64,
    /// 0 means "use the default"
    pub k: usize,
    /// Bypasses the cache read; the result is still written back
    pub refresh: bool,
}

/// A request to explain one recommended movie's score
#[derive(Debug, Clone)]
pub struct ExplainRequest {
    pub user_id: i64,
    pub movie_id: i64,
}

/// Clamps a requested k into [1, MAX_K], defaulting when unset
pub fn clamp_k(k: usize) -> usize {
    if k == 0 {
        DEFAULT_K
    } else {
        k.min(MAX_K)
    }
}

/// Sums partial scores across shards and finalizes the ranking.
///
/// Numerators and denominators are added independently, so the result
/// equals the centralized weighted average regardless of how rated
/// items were partitioned. Ties break on ascending movie id to keep
/// the output deterministic.
pub fn merge_partials(responses: &[RecResponse], k: usize) -> Vec<RecItem> {
    let mut scores: HashMap<i64, f64> = HashMap::new();
    let mut weights: HashMap<i64, f64> = HashMap::new();

    for resp in responses {
        for p in &resp.partials {
            *scores.entry(p.movie_id).or_default() += p.num;
            *weights.entry(p.movie_id).or_default() += p.den;
        }
    }

    let mut items: Vec<RecItem> = scores
        .into_iter()
        .filter_map(|(movie_id, num)| {
            let den = weights[&movie_id];
            (den > 0.0).then_some(RecItem {
                movie_id,
                score: num / den,
            })
        })
        .collect();

    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.movie_id.cmp(&b.movie_id))
    });
    items.truncate(k);
    items
}

/// Coordinates the worker cluster for one user's recommendations
pub struct RecommendService {
    ratings: Arc<dyn RatingStore>,
    history: Arc<dyn HistoryStore>,
    neighbors: Arc<dyn NeighborStore>,
    cache: Arc<dyn RecCache>,
    /// Ordered worker addresses; list position is the shard id
    worker_addrs: Vec<String>,
    fanout_timeout: Duration,
}

impl RecommendService {
    pub fn new(
        ratings: Arc<dyn RatingStore>,
        history: Arc<dyn HistoryStore>,
        neighbors: Arc<dyn NeighborStore>,
        cache: Arc<dyn RecCache>,
        worker_addrs: Vec<String>,
    ) -> Self {
        Self {
            ratings,
            history,
            neighbors,
            cache,
            worker_addrs,
            fanout_timeout: FANOUT_TIMEOUT,
        }
    }

    /// Overrides the fan-out deadline (tests shorten it)
    pub fn with_fanout_timeout(mut self, timeout: Duration) -> Self {
        self.fanout_timeout = timeout;
        self
    }

    /// Scatter-gathers the user's rating list over the worker cluster
    /// and returns at most k ranked items.
    pub async fn recommend(&self, req: RecRequest) -> AppResult<Vec<RecItem>> {
        let k = clamp_k(req.k);
        let key = CacheKey::Recommendations {
            user_id: req.user_id,
            k,
        };

        // 1) Cache read, unless the caller asked for a refresh. Any
        // cache failure, including an undecodable value, is a miss.
        if !req.refresh {
            match self.cache.get(&key).await {
                Ok(Some(cached)) => match serde_json::from_str::<Vec<RecItem>>(&cached) {
                    Ok(items) => {
                        tracing::debug!(user_id = req.user_id, k, "Cache hit");
                        return Ok(items);
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "Undecodable cache value, treating as miss");
                    }
                },
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                }
            }
        }

        // 2) The user's full rating list
        let ratings = self.ratings.get_all_by_user(req.user_id).await?;
        if ratings.is_empty() {
            return Ok(Vec::new());
        }

        if self.worker_addrs.is_empty() {
            return Err(AppError::NoWorkersConfigured);
        }
        let shards = self.worker_addrs.len();

        // 3) Fan out one shard per worker. Every worker gets the
        // complete rating list; the shard id selects its slice.
        let deadline = Instant::now() + self.fanout_timeout;
        let (tx, mut rx) = mpsc::channel(shards);

        for (shard_id, addr) in self.worker_addrs.iter().enumerate() {
            let task = RecTask {
                user_id: req.user_id,
                k,
                shard_id,
                shards,
                ratings: ratings.clone(),
            };
            let addr = addr.clone();
            let tx = tx.clone();

            tokio::spawn(async move {
                let result = match timeout_at(deadline, cluster::send_task(&addr, &task)).await {
                    Ok(result) => result,
                    Err(_) => Err(AppError::Deadline),
                };
                let _ = tx.send(result).await;
            });
        }
        drop(tx);

        // 4) Collect everything that arrives before the deadline.
        // Partial failures are tolerated; all-failure surfaces the
        // first error.
        let mut responses: Vec<RecResponse> = Vec::with_capacity(shards);
        let mut first_err: Option<AppError> = None;

        while let Some(result) = rx.recv().await {
            match result {
                Ok(resp) => responses.push(resp),
                Err(e) => {
                    tracing::warn!(user_id = req.user_id, error = %e, "Worker shard failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        if responses.is_empty() {
            return Err(first_err.unwrap_or(AppError::Deadline));
        }

        // 5) Merge and rank
        let items = merge_partials(&responses, k);

        // 6) History, best-effort
        let mut params = serde_json::Map::new();
        params.insert("k".to_string(), json!(k));
        params.insert("shards".to_string(), json!(shards));
        params.insert("refresh".to_string(), json!(req.refresh));

        let record = Recommendation {
            user_id: req.user_id,
            algo: "item-knn".to_string(),
            similarity_metric: "cosine".to_string(),
            params,
            items: items.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = self.history.insert(&record).await {
            tracing::error!(user_id = req.user_id, error = %e, "Failed to persist recommendation history");
        }

        // 7) Cache write, best-effort
        match serde_json::to_string(&items) {
            Ok(payload) => {
                if let Err(e) = self.cache.set(&key, payload, REC_CACHE_TTL).await {
                    tracing::error!(key = %key, error = %e, "Failed to cache recommendations");
                }
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "Failed to encode recommendations for cache");
            }
        }

        Ok(items)
    }

    /// Reconstructs one movie's score from its precomputed neighbors
    /// and the user's ratings, without touching the workers.
    ///
    /// Unlike the hot path, the denominator uses |sim| so the effect
    /// of negative similarities stays inspectable.
    pub async fn explain(&self, req: ExplainRequest) -> AppResult<Explanation> {
        let ratings = self.ratings.get_all_by_user(req.user_id).await?;
        if ratings.is_empty() {
            return Err(AppError::NoRatings(req.user_id));
        }

        let rating_map: HashMap<i64, f64> =
            ratings.iter().map(|r| (r.movie_id, r.rating)).collect();

        let neighbors = self
            .neighbors
            .get_neighbors(req.movie_id, NEIGHBOR_FETCH_LIMIT)
            .await?;
        if neighbors.is_empty() {
            return Err(AppError::NoNeighbors(req.movie_id));
        }

        let mut num = 0.0;
        let mut den = 0.0;
        let mut contribs: Vec<NeighborContribution> = Vec::new();

        for n in &neighbors {
            let Some(&user_rating) = rating_map.get(&n.movie_id) else {
                continue;
            };
            if n.sim <= 0.0 {
                continue;
            }

            let partial = n.sim * user_rating;
            num += partial;
            den += n.sim.abs();

            contribs.push(NeighborContribution {
                neighbor_movie_id: n.movie_id,
                sim: n.sim,
                user_rating,
                contribution: partial,
            });
        }

        if den == 0.0 {
            return Err(AppError::NoNeighbors(req.movie_id));
        }

        let score = num / den;

        // Contributions become fractions of the numerator
        if num != 0.0 {
            for c in &mut contribs {
                c.contribution /= num;
            }
        }

        Ok(Explanation {
            movie_id: req.movie_id,
            score,
            neighbors: contribs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::messages::PartialScore;

    fn response(shard_id: usize, partials: Vec<(i64, f64, f64)>) -> RecResponse {
        RecResponse {
            shard_id,
            partials: partials
                .into_iter()
                .map(|(movie_id, num, den)| PartialScore { movie_id, num, den })
                .collect(),
        }
    }

    #[test]
    fn test_clamp_k_defaults_and_bounds() {
        assert_eq!(clamp_k(0), DEFAULT_K);
        assert_eq!(clamp_k(1), 1);
        assert_eq!(clamp_k(50), 50);
        assert_eq!(clamp_k(1000), MAX_K);
    }

    #[test]
    fn test_merge_reconstructs_centralized_scores() {
        // Scenario: two workers, ratings {10: 5.0, 20: 3.0},
        // neighborhoods 10 -> [(100, .8), (200, .4)], 20 -> [(100, .5), (300, .9)]
        let responses = vec![
            response(0, vec![(100, 4.0, 0.8), (200, 2.0, 0.4)]),
            response(1, vec![(100, 1.5, 0.5), (300, 2.7, 0.9)]),
        ];

        let items = merge_partials(&responses, 3);
        assert_eq!(items.len(), 3);

        // 200: 2.0/0.4 = 5.0 outranks 100: 5.5/1.3
        assert_eq!(items[0].movie_id, 200);
        assert!((items[0].score - 5.0).abs() < 1e-9);
        assert_eq!(items[1].movie_id, 100);
        assert!((items[1].score - 5.5 / 1.3).abs() < 1e-9);
        assert_eq!(items[2].movie_id, 300);
        assert!((items[2].score - 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_merge_equals_single_shard_run() {
        // Summing shard partials then dividing must equal the
        // undivided single-worker computation
        let sharded = vec![
            response(0, vec![(100, 4.0, 0.8)]),
            response(1, vec![(100, 1.5, 0.5)]),
        ];
        let central = vec![response(0, vec![(100, 5.5, 1.3)])];

        let a = merge_partials(&sharded, 10);
        let b = merge_partials(&central, 10);
        assert_eq!(a.len(), 1);
        assert!((a[0].score - b[0].score).abs() < 1e-9);
    }

    #[test]
    fn test_merge_ties_break_on_ascending_movie_id() {
        let responses = vec![response(0, vec![(30, 8.0, 2.0), (10, 4.0, 1.0), (20, 12.0, 3.0)])];

        let items = merge_partials(&responses, 10);
        let ids: Vec<i64> = items.iter().map(|i| i.movie_id).collect();
        assert_eq!(ids, vec![10, 20, 30]);
    }

    #[test]
    fn test_merge_is_order_insensitive() {
        let forward = vec![
            response(0, vec![(100, 4.0, 0.8)]),
            response(1, vec![(100, 1.5, 0.5), (300, 2.7, 0.9)]),
        ];
        let backward: Vec<RecResponse> = forward.iter().rev().cloned().collect();

        assert_eq!(merge_partials(&forward, 10), merge_partials(&backward, 10));
    }

    #[test]
    fn test_merge_truncates_to_k() {
        let responses = vec![response(
            0,
            vec![(1, 5.0, 1.0), (2, 4.0, 1.0), (3, 3.0, 1.0), (4, 2.0, 1.0)],
        )];

        assert_eq!(merge_partials(&responses, 2).len(), 2);
        // Fewer candidates than k: output is the candidate count
        assert_eq!(merge_partials(&responses, 50).len(), 4);
    }

    #[test]
    fn test_merge_drops_zero_weight_candidates() {
        let responses = vec![response(0, vec![(1, 5.0, 0.0), (2, 4.0, 1.0)])];

        let items = merge_partials(&responses, 10);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].movie_id, 2);
    }

    #[test]
    fn test_merge_of_surviving_shards_only() {
        // Dropping one worker's response equals a run where only the
        // surviving shards contribute
        let all = vec![
            response(0, vec![(100, 4.0, 0.8), (200, 2.0, 0.4)]),
            response(1, vec![(100, 1.5, 0.5), (300, 2.7, 0.9)]),
            response(2, vec![(100, 2.0, 0.4)]),
        ];
        let survivors = vec![all[0].clone(), all[2].clone()];

        let degraded = merge_partials(&survivors, 10);
        let expected = merge_partials(&[all[0].clone(), all[2].clone()], 10);
        assert_eq!(degraded, expected);
        assert!(degraded.iter().all(|i| i.movie_id != 300));
    }
}

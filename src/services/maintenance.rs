use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::cluster::{self, RebuildTask};
use crate::error::{AppError, AppResult};
use crate::models::{PendingSimilarities, RebuildRequest, RebuildResult, RemapMissingResult, SimilaritySummary};
use crate::store::{CatalogStore, NeighborStore};

/// Metric and neighborhood size the pipeline maintains
pub const DEFAULT_METRIC: &str = "cosine";
pub const DEFAULT_NEIGHBORHOOD_K: usize = 20;

const DEFAULT_REMAP_LIMIT: i64 = 1000;
const DEFAULT_BATCH_SIZE: usize = 50;
const DEFAULT_PARALLELISM: usize = 4;

/// Per-batch rebuild deadline. Far above the coordinator's fan-out
/// timeout; a batch recomputes whole neighborhoods, not one request.
const BATCH_TIMEOUT: Duration = Duration::from_secs(120);

/// Splits the pending index list into dispatch batches of at most
/// `batch_size`, preserving order. Batch `i` goes to worker `i % S`.
pub fn partition_batches(indices: &[i64], batch_size: usize) -> Vec<Vec<i64>> {
    indices.chunks(batch_size).map(|c| c.to_vec()).collect()
}

/// Reconciles the catalog with the neighborhood store: index
/// assignment, pending inspection, and dispatching neighborhood
/// recomputation to the worker cluster.
pub struct MaintenanceService {
    catalog: Arc<dyn CatalogStore>,
    neighbors: Arc<dyn NeighborStore>,
    worker_addrs: Vec<String>,
    batch_timeout: Duration,
}

impl MaintenanceService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        neighbors: Arc<dyn NeighborStore>,
        worker_addrs: Vec<String>,
    ) -> Self {
        Self {
            catalog,
            neighbors,
            worker_addrs,
            batch_timeout: BATCH_TIMEOUT,
        }
    }

    /// Overrides the per-batch deadline (tests shorten it)
    pub fn with_batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout = timeout;
        self
    }

    /// Counts eligible movies split by index assignment and
    /// neighborhood coverage
    pub async fn summary(&self, min_ratings: i64) -> AppResult<SimilaritySummary> {
        let total_movies = self.catalog.count_eligible(min_ratings).await?;
        let movies_with_idx = self.catalog.count_indexed(min_ratings).await?;
        let movies_without_idx = (total_movies - movies_with_idx).max(0);

        let movies_with_similarities = self
            .neighbors
            .count_entries(DEFAULT_METRIC, DEFAULT_NEIGHBORHOOD_K)
            .await?;
        let movies_without_similarities = (movies_with_idx - movies_with_similarities).max(0);

        Ok(SimilaritySummary {
            total_movies,
            movies_with_idx,
            movies_without_idx,
            movies_with_similarities,
            movies_without_similarities,
            min_ratings,
        })
    }

    /// Lists movies still waiting for an index or a neighborhood
    pub async fn pending(
        &self,
        min_ratings: i64,
        limit_without_idx: i64,
        limit_without_sims: i64,
    ) -> AppResult<PendingSimilarities> {
        let without_idx = self
            .catalog
            .find_missing_index(min_ratings, limit_without_idx)
            .await?;
        let without_similarities = self
            .catalog
            .find_unbuilt(min_ratings, limit_without_sims)
            .await?;

        Ok(PendingSimilarities {
            min_ratings,
            without_idx,
            without_similarities,
        })
    }

    /// Assigns dense indices to up to `limit` unmapped movies, most
    /// rated first. New indices continue strictly past the current
    /// maximum; an index is never reused.
    pub async fn remap_missing(&self, min_ratings: i64, limit: i64) -> AppResult<RemapMissingResult> {
        let limit = if limit <= 0 { DEFAULT_REMAP_LIMIT } else { limit };

        let max_idx = self.catalog.max_item_index().await?.unwrap_or(-1);
        let pending = self.catalog.find_missing_index(min_ratings, limit).await?;

        let mut mapped_count: i64 = 0;
        let mut from_idx: i64 = 0;
        let mut to_idx: i64 = 0;
        let mut next_idx = max_idx + 1;

        for movie in &pending {
            self.catalog.assign_index(movie.movie_id, next_idx).await?;

            if mapped_count == 0 {
                from_idx = next_idx;
            }
            to_idx = next_idx;
            next_idx += 1;
            mapped_count += 1;
        }

        tracing::info!(mapped_count, from_idx, to_idx, "Assigned dense indices");

        Ok(RemapMissingResult {
            mapped_count,
            from_idx,
            to_idx,
        })
    }

    /// Recomputes neighborhoods for every indexed movie lacking one.
    ///
    /// Batches are dispatched round-robin over the workers under a
    /// parallelism bound. The run is not atomic: a failed batch leaves
    /// its neighborhoods absent, which readers tolerate. The first
    /// error surfaces; sibling batches drain and their errors are
    /// discarded.
    pub async fn rebuild(&self, req: RebuildRequest) -> AppResult<RebuildResult> {
        let batch_size = if req.batch_size == 0 { DEFAULT_BATCH_SIZE } else { req.batch_size };
        let parallelism = if req.parallelism == 0 { DEFAULT_PARALLELISM } else { req.parallelism };
        let k = if req.k == 0 { DEFAULT_NEIGHBORHOOD_K } else { req.k };

        if self.worker_addrs.is_empty() {
            return Err(AppError::NoWorkersConfigured);
        }
        let workers = self.worker_addrs.len();

        let pending = self.catalog.unbuilt_indices(req.min_ratings).await?;
        if pending.is_empty() {
            return Ok(RebuildResult {
                processed_movies: 0,
                batches: 0,
                k,
                min_common_users: req.min_common_users,
                shrink: req.shrink,
            });
        }

        let batches = partition_batches(&pending, batch_size);
        tracing::info!(
            pending = pending.len(),
            batches = batches.len(),
            batch_size,
            parallelism,
            "Dispatching rebuild"
        );

        let sem = Arc::new(Semaphore::new(parallelism));
        let mut join_set: JoinSet<AppResult<()>> = JoinSet::new();

        for (batch_num, batch) in batches.iter().enumerate() {
            let sem = sem.clone();
            let addr = self.worker_addrs[batch_num % workers].clone();
            let timeout = self.batch_timeout;
            let task = RebuildTask {
                i_idxs: batch.clone(),
                metric: DEFAULT_METRIC.to_string(),
                k,
                min_common_users: req.min_common_users,
                shrink: req.shrink,
            };

            join_set.spawn(async move {
                let _permit = sem
                    .acquire_owned()
                    .await
                    .map_err(|_| AppError::Internal("rebuild semaphore closed".to_string()))?;

                match tokio::time::timeout(timeout, cluster::send_rebuild(&addr, &task)).await {
                    Ok(Ok(ack)) => {
                        tracing::debug!(batch = batch_num, worker = %addr, processed = ack.processed, "Batch done");
                        Ok(())
                    }
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(AppError::Worker(format!(
                        "rebuild batch {} timed out on {}",
                        batch_num, addr
                    ))),
                }
            });
        }

        let mut first_err: Option<AppError> = None;
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "Rebuild batch failed");
                    first_err.get_or_insert(e);
                }
                Err(e) => {
                    first_err.get_or_insert(AppError::Internal(format!("rebuild task join: {}", e)));
                }
            }
        }

        if let Some(e) = first_err {
            return Err(e);
        }

        Ok(RebuildResult {
            processed_movies: pending.len(),
            batches: batches.len(),
            k,
            min_common_users: req.min_common_users,
            shrink: req.shrink,
        })
    }
}

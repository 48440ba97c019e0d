use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

/// One user's rating of one movie. At most one per (user, movie);
/// later writes overwrite value and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingDoc {
    pub user_id: i64,
    pub movie_id: i64,
    pub rating: f64,
    /// Epoch seconds
    pub timestamp: i64,
}

/// One entry of a ranked recommendation list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecItem {
    pub movie_id: i64,
    pub score: f64,
}

/// One neighbor of an item in the precomputed similarity space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Neighbor {
    pub movie_id: i64,
    pub i_idx: i64,
    pub sim: f64,
}

/// Precomputed neighborhood of one indexed item, replaced atomically
/// on rebuild. Neighbors are sorted by descending similarity and
/// truncated to `k`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NeighborhoodDoc {
    pub i_idx: i64,
    pub movie_id: i64,
    pub metric: String,
    pub k: usize,
    pub neighbors: Vec<Neighbor>,
    pub updated_at: DateTime<Utc>,
}

impl NeighborhoodDoc {
    /// Rejects neighborhoods carrying NaN or infinite similarities.
    /// Stores must call this before persisting.
    pub fn validate(&self) -> AppResult<()> {
        for n in &self.neighbors {
            if !n.sim.is_finite() {
                return Err(AppError::InvalidNeighborhood(format!(
                    "non-finite similarity {} for neighbor {} of item {}",
                    n.sim, n.movie_id, self.movie_id
                )));
            }
        }
        Ok(())
    }
}

/// Append-only record of one served recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub user_id: i64,
    pub algo: String,
    pub similarity_metric: String,
    /// Opaque parameter bag; schema depends on the algorithm tag
    pub params: serde_json::Map<String, serde_json::Value>,
    pub items: Vec<RecItem>,
    pub created_at: DateTime<Utc>,
}

/// How much one rated neighbor contributed to a recommended item's score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NeighborContribution {
    pub neighbor_movie_id: i64,
    pub sim: f64,
    pub user_rating: f64,
    /// Fraction of the score numerator (normalized after accumulation)
    pub contribution: f64,
}

/// Score breakdown for one recommended movie
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Explanation {
    pub movie_id: i64,
    pub score: f64,
    pub neighbors: Vec<NeighborContribution>,
}

/// Rolling rating statistics kept on each catalog item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingStats {
    pub average: f64,
    pub count: i64,
    pub last_rated_at: Option<DateTime<Utc>>,
}

/// Catalog item, reduced to the fields the engine reads. The catalog
/// layer owns the full record; `i_idx` is assigned once by maintenance
/// and never reused.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDoc {
    pub movie_id: i64,
    pub i_idx: Option<i64>,
    pub title: String,
    pub rating_stats: RatingStats,
}

/// All of one indexed item's ratings, keyed by user. Input to the
/// similarity kernel during a rebuild.
#[derive(Debug, Clone)]
pub struct ItemVector {
    pub movie_id: i64,
    pub i_idx: i64,
    /// (user_id, rating) pairs
    pub ratings: Vec<(i64, f64)>,
}

// ----- Admin maintenance -----

/// Global summary of index assignment and neighborhood coverage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimilaritySummary {
    pub total_movies: i64,
    pub movies_with_idx: i64,
    pub movies_without_idx: i64,
    pub movies_with_similarities: i64,
    pub movies_without_similarities: i64,
    pub min_ratings: i64,
}

/// Movie with enough ratings but no dense index yet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMovieWithoutIdx {
    pub movie_id: i64,
    pub title: String,
    pub ratings_count: i64,
}

/// Indexed movie with no neighborhood entry yet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingMovieWithoutSims {
    pub movie_id: i64,
    pub i_idx: i64,
    pub title: String,
    pub ratings_count: i64,
}

/// Both pending lists, as returned by the pending operation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSimilarities {
    pub min_ratings: i64,
    pub without_idx: Vec<PendingMovieWithoutIdx>,
    pub without_similarities: Vec<PendingMovieWithoutSims>,
}

/// Result of assigning dense indices to unmapped movies
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemapMissingResult {
    pub mapped_count: i64,
    pub from_idx: i64,
    pub to_idx: i64,
}

/// Parameters for a neighborhood rebuild run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildRequest {
    pub min_ratings: i64,
    #[serde(default)]
    pub batch_size: usize,
    #[serde(default)]
    pub parallelism: usize,
    #[serde(default)]
    pub k: usize,
    #[serde(default)]
    pub min_common_users: usize,
    #[serde(default)]
    pub shrink: f64,
}

/// Result of a neighborhood rebuild run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildResult {
    pub processed_movies: usize,
    pub batches: usize,
    pub k: usize,
    pub min_common_users: usize,
    pub shrink: f64,
}

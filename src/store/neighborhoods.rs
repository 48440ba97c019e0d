use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::error::AppResult;
use crate::models::{Neighbor, NeighborhoodDoc};

/// Precomputed item neighborhoods. Read-heavy on the request path;
/// written only by the maintenance pipeline. A replace is entry-atomic:
/// readers never observe a partially written neighbor list.
#[async_trait::async_trait]
pub trait NeighborStore: Send + Sync {
    /// Up to `limit` neighbors of a movie, best first. A movie with no
    /// entry yields an empty list, not an error.
    async fn get_neighbors(&self, movie_id: i64, limit: usize) -> AppResult<Vec<Neighbor>>;

    /// Replaces the item's entry. Rejects NaN/infinite similarities
    /// with `InvalidNeighborhood`.
    async fn put_neighborhood(&self, doc: &NeighborhoodDoc) -> AppResult<()>;

    async fn has_neighborhood(&self, i_idx: i64) -> AppResult<bool>;

    /// Entries present under one (metric, k); used by the maintenance
    /// summary
    async fn count_entries(&self, metric: &str, k: usize) -> AppResult<i64>;
}

/// Postgres-backed neighborhood store. One row per indexed item; the
/// JSONB neighbor list is swapped in a single statement.
#[derive(Clone)]
pub struct PgNeighborStore {
    pool: PgPool,
}

impl PgNeighborStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl NeighborStore for PgNeighborStore {
    async fn get_neighbors(&self, movie_id: i64, limit: usize) -> AppResult<Vec<Neighbor>> {
        let row = sqlx::query(
            r#"
            SELECT neighbors
            FROM neighborhoods
            WHERE movie_id = $1
            "#,
        )
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(Vec::new());
        };

        let Json(mut neighbors): Json<Vec<Neighbor>> = row.get("neighbors");
        neighbors.truncate(limit);
        Ok(neighbors)
    }

    async fn put_neighborhood(&self, doc: &NeighborhoodDoc) -> AppResult<()> {
        doc.validate()?;

        sqlx::query(
            r#"
            INSERT INTO neighborhoods (i_idx, movie_id, metric, k, neighbors, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (i_idx)
            DO UPDATE SET movie_id = EXCLUDED.movie_id,
                          metric = EXCLUDED.metric,
                          k = EXCLUDED.k,
                          neighbors = EXCLUDED.neighbors,
                          updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(doc.i_idx)
        .bind(doc.movie_id)
        .bind(&doc.metric)
        .bind(doc.k as i32)
        .bind(Json(&doc.neighbors))
        .bind(doc.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn has_neighborhood(&self, i_idx: i64) -> AppResult<bool> {
        let row = sqlx::query(
            r#"
            SELECT 1 AS one FROM neighborhoods WHERE i_idx = $1
            "#,
        )
        .bind(i_idx)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.is_some())
    }

    async fn count_entries(&self, metric: &str, k: usize) -> AppResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM neighborhoods WHERE metric = $1 AND k = $2
            "#,
        )
        .bind(metric)
        .bind(k as i32)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("n"))
    }
}

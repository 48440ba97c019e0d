use sqlx::{PgPool, Row};

use crate::error::AppResult;
use crate::models::{
    MovieDoc, PendingMovieWithoutIdx, PendingMovieWithoutSims, RatingStats,
};

/// Read side of the externally-owned movie catalog, plus the two
/// columns the engine writes back: the dense index and the rolling
/// rating stats.
#[async_trait::async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get(&self, movie_id: i64) -> AppResult<Option<MovieDoc>>;

    async fn update_rating_stats(&self, movie_id: i64, stats: &RatingStats) -> AppResult<()>;

    /// Movies with at least `min_ratings` ratings
    async fn count_eligible(&self, min_ratings: i64) -> AppResult<i64>;

    /// Eligible movies that already hold a dense index
    async fn count_indexed(&self, min_ratings: i64) -> AppResult<i64>;

    /// Eligible movies lacking an index, most-rated first
    async fn find_missing_index(
        &self,
        min_ratings: i64,
        limit: i64,
    ) -> AppResult<Vec<PendingMovieWithoutIdx>>;

    /// Indexed movies lacking a neighborhood entry, most-rated first
    async fn find_unbuilt(
        &self,
        min_ratings: i64,
        limit: i64,
    ) -> AppResult<Vec<PendingMovieWithoutSims>>;

    /// Dense indices of every indexed movie lacking a neighborhood
    /// entry; the rebuild work list
    async fn unbuilt_indices(&self, min_ratings: i64) -> AppResult<Vec<i64>>;

    /// Highest dense index currently assigned, if any
    async fn max_item_index(&self) -> AppResult<Option<i64>>;

    /// Assigns a dense index to one movie. Indices are append-only:
    /// callers hand out strictly increasing values and never reuse one.
    async fn assign_index(&self, movie_id: i64, i_idx: i64) -> AppResult<()>;
}

/// Postgres-backed catalog store
#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CatalogStore for PgCatalogStore {
    async fn get(&self, movie_id: i64) -> AppResult<Option<MovieDoc>> {
        let row = sqlx::query(
            r#"
            SELECT movie_id, i_idx, title, rating_avg, rating_count, last_rated_at
            FROM movies
            WHERE movie_id = $1
            "#,
        )
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| MovieDoc {
            movie_id: row.get("movie_id"),
            i_idx: row.get("i_idx"),
            title: row.get("title"),
            rating_stats: RatingStats {
                average: row.get("rating_avg"),
                count: row.get("rating_count"),
                last_rated_at: row.get("last_rated_at"),
            },
        }))
    }

    async fn update_rating_stats(&self, movie_id: i64, stats: &RatingStats) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE movies
            SET rating_avg = $2, rating_count = $3, last_rated_at = $4
            WHERE movie_id = $1
            "#,
        )
        .bind(movie_id)
        .bind(stats.average)
        .bind(stats.count)
        .bind(stats.last_rated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn count_eligible(&self, min_ratings: i64) -> AppResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n FROM movies WHERE rating_count >= $1
            "#,
        )
        .bind(min_ratings)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("n"))
    }

    async fn count_indexed(&self, min_ratings: i64) -> AppResult<i64> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS n
            FROM movies
            WHERE rating_count >= $1 AND i_idx IS NOT NULL
            "#,
        )
        .bind(min_ratings)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("n"))
    }

    async fn find_missing_index(
        &self,
        min_ratings: i64,
        limit: i64,
    ) -> AppResult<Vec<PendingMovieWithoutIdx>> {
        let rows = sqlx::query(
            r#"
            SELECT movie_id, title, rating_count
            FROM movies
            WHERE i_idx IS NULL AND rating_count >= $1
            ORDER BY rating_count DESC
            LIMIT $2
            "#,
        )
        .bind(min_ratings)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PendingMovieWithoutIdx {
                movie_id: row.get("movie_id"),
                title: row.get("title"),
                ratings_count: row.get("rating_count"),
            })
            .collect())
    }

    async fn find_unbuilt(
        &self,
        min_ratings: i64,
        limit: i64,
    ) -> AppResult<Vec<PendingMovieWithoutSims>> {
        let rows = sqlx::query(
            r#"
            SELECT m.movie_id, m.i_idx, m.title, m.rating_count
            FROM movies m
            LEFT JOIN neighborhoods n ON n.i_idx = m.i_idx
            WHERE m.i_idx IS NOT NULL AND m.rating_count >= $1 AND n.i_idx IS NULL
            ORDER BY m.rating_count DESC
            LIMIT $2
            "#,
        )
        .bind(min_ratings)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PendingMovieWithoutSims {
                movie_id: row.get("movie_id"),
                i_idx: row.get("i_idx"),
                title: row.get("title"),
                ratings_count: row.get("rating_count"),
            })
            .collect())
    }

    async fn unbuilt_indices(&self, min_ratings: i64) -> AppResult<Vec<i64>> {
        let rows = sqlx::query(
            r#"
            SELECT m.i_idx
            FROM movies m
            LEFT JOIN neighborhoods n ON n.i_idx = m.i_idx
            WHERE m.i_idx IS NOT NULL AND m.rating_count >= $1 AND n.i_idx IS NULL
            ORDER BY m.i_idx
            "#,
        )
        .bind(min_ratings)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|row| row.get("i_idx")).collect())
    }

    async fn max_item_index(&self) -> AppResult<Option<i64>> {
        let row = sqlx::query(
            r#"
            SELECT MAX(i_idx) AS max_idx FROM movies
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("max_idx"))
    }

    async fn assign_index(&self, movie_id: i64, i_idx: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE movies SET i_idx = $2 WHERE movie_id = $1 AND i_idx IS NULL
            "#,
        )
        .bind(movie_id)
        .bind(i_idx)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

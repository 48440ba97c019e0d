use chrono::Utc;
use sqlx::{PgPool, Row};

use crate::error::AppResult;
use crate::models::{ItemVector, RatingDoc};

/// Hard ceiling on ratings returned per user, protecting the
/// coordinator from pathological profiles
pub const MAX_USER_RATINGS: i64 = 10_000;

/// Per-user rating lookups and writes
#[async_trait::async_trait]
pub trait RatingStore: Send + Sync {
    /// All of one user's ratings, capped at `MAX_USER_RATINGS`
    async fn get_all_by_user(&self, user_id: i64) -> AppResult<Vec<RatingDoc>>;

    /// One rating, if present. Used by the rolling rating-stats side
    /// effect, not by the recommendation hot path.
    async fn get_one(&self, user_id: i64, movie_id: i64) -> AppResult<Option<RatingDoc>>;

    /// Inserts or overwrites a rating with a fresh epoch timestamp
    async fn upsert(&self, user_id: i64, movie_id: i64, rating: f64) -> AppResult<()>;

    /// Rating vectors of every item holding a dense index, for the
    /// similarity kernel
    async fn indexed_item_vectors(&self) -> AppResult<Vec<ItemVector>>;
}

/// Postgres-backed rating store
#[derive(Clone)]
pub struct PgRatingStore {
    pool: PgPool,
}

impl PgRatingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn rating_from_row(row: &sqlx::postgres::PgRow) -> RatingDoc {
    RatingDoc {
        user_id: row.get("user_id"),
        movie_id: row.get("movie_id"),
        rating: row.get("rating"),
        timestamp: row.get("timestamp"),
    }
}

#[async_trait::async_trait]
impl RatingStore for PgRatingStore {
    async fn get_all_by_user(&self, user_id: i64) -> AppResult<Vec<RatingDoc>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, movie_id, rating, timestamp
            FROM ratings
            WHERE user_id = $1
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(MAX_USER_RATINGS)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(rating_from_row).collect())
    }

    async fn get_one(&self, user_id: i64, movie_id: i64) -> AppResult<Option<RatingDoc>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, movie_id, rating, timestamp
            FROM ratings
            WHERE user_id = $1 AND movie_id = $2
            "#,
        )
        .bind(user_id)
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(rating_from_row))
    }

    async fn upsert(&self, user_id: i64, movie_id: i64, rating: f64) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ratings (user_id, movie_id, rating, timestamp)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, movie_id)
            DO UPDATE SET rating = EXCLUDED.rating, timestamp = EXCLUDED.timestamp
            "#,
        )
        .bind(user_id)
        .bind(movie_id)
        .bind(rating)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn indexed_item_vectors(&self) -> AppResult<Vec<ItemVector>> {
        let rows = sqlx::query(
            r#"
            SELECT m.movie_id, m.i_idx, r.user_id, r.rating
            FROM ratings r
            JOIN movies m ON m.movie_id = r.movie_id
            WHERE m.i_idx IS NOT NULL
            ORDER BY m.i_idx
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut vectors: Vec<ItemVector> = Vec::new();
        for row in rows {
            let movie_id: i64 = row.get("movie_id");
            let i_idx: i64 = row.get("i_idx");
            let pair = (row.get::<i64, _>("user_id"), row.get::<f64, _>("rating"));

            match vectors.last_mut() {
                Some(v) if v.i_idx == i_idx => v.ratings.push(pair),
                _ => vectors.push(ItemVector {
                    movie_id,
                    i_idx,
                    ratings: vec![pair],
                }),
            }
        }
        Ok(vectors)
    }
}

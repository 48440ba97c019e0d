use sqlx::types::Json;
use sqlx::{PgPool, Row};

use crate::error::AppResult;
use crate::models::{RecItem, Recommendation};

/// Append-only recommendation history
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert(&self, rec: &Recommendation) -> AppResult<()>;

    /// Most recent records for one user
    async fn find_by_user(&self, user_id: i64, limit: i64) -> AppResult<Vec<Recommendation>>;
}

/// Postgres-backed history store
#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HistoryStore for PgHistoryStore {
    async fn insert(&self, rec: &Recommendation) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO recommendations (user_id, algo, similarity_metric, params, items, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(rec.user_id)
        .bind(&rec.algo)
        .bind(&rec.similarity_metric)
        .bind(Json(&rec.params))
        .bind(Json(&rec.items))
        .bind(rec.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_user(&self, user_id: i64, limit: i64) -> AppResult<Vec<Recommendation>> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, algo, similarity_metric, params, items, created_at
            FROM recommendations
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let Json(params): Json<serde_json::Map<String, serde_json::Value>> =
                    row.get("params");
                let Json(items): Json<Vec<RecItem>> = row.get("items");
                Recommendation {
                    user_id: row.get("user_id"),
                    algo: row.get("algo"),
                    similarity_metric: row.get("similarity_metric"),
                    params,
                    items,
                    created_at: row.get("created_at"),
                }
            })
            .collect())
    }
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Application-level errors
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("No worker nodes configured (WORKER_ADDRS empty)")]
    NoWorkersConfigured,

    #[error("Worker error: {0}")]
    Worker(String),

    #[error("Worker deadline elapsed before any response")]
    Deadline,

    #[error("User {0} has no ratings")]
    NoRatings(i64),

    #[error("No precomputed neighbors for movie {0}")]
    NoNeighbors(i64),

    #[error("Invalid neighborhood: {0}")]
    InvalidNeighborhood(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InvalidInput(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NoRatings(_) | AppError::NoNeighbors(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            AppError::NoWorkersConfigured => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            AppError::Worker(_) | AppError::Deadline => (StatusCode::BAD_GATEWAY, self.to_string()),
            AppError::InvalidNeighborhood(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::Database(_) | AppError::Cache(_) | AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::routes::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingRequest {
    pub user_id: i64,
    pub movie_id: i64,
    pub rating: f64,
}

/// Handler for rating upserts
pub async fn upsert(
    State(state): State<AppState>,
    Json(request): Json<RatingRequest>,
) -> AppResult<StatusCode> {
    state
        .ratings
        .add_or_update(request.user_id, request.movie_id, request.rating)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

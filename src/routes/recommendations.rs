use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::{Explanation, RecItem};
use crate::routes::AppState;
use crate::services::{ExplainRequest, RecRequest};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendationRequest {
    pub user_id: i64,
    /// Omitted or 0 selects the default
    #[serde(default)]
    pub k: usize,
    /// Bypasses the cache read, never the cache write
    #[serde(default)]
    pub refresh: bool,
}

/// Handler for the recommendations endpoint
pub async fn recommend(
    State(state): State<AppState>,
    Json(request): Json<RecommendationRequest>,
) -> AppResult<Json<Vec<RecItem>>> {
    let items = state
        .recommend
        .recommend(RecRequest {
            user_id: request.user_id,
            k: request.k,
            refresh: request.refresh,
        })
        .await?;
    Ok(Json(items))
}

#[derive(Debug, Deserialize)]
pub struct ExplainParams {
    pub user_id: i64,
    pub movie_id: i64,
}

/// Handler for the score-explanation endpoint
pub async fn explain(
    State(state): State<AppState>,
    Query(params): Query<ExplainParams>,
) -> AppResult<Json<Explanation>> {
    let explanation = state
        .recommend
        .explain(ExplainRequest {
            user_id: params.user_id,
            movie_id: params.movie_id,
        })
        .await?;
    Ok(Json(explanation))
}

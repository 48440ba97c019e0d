use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppResult;
use crate::models::{
    PendingSimilarities, RebuildRequest, RebuildResult, RemapMissingResult, SimilaritySummary,
};
use crate::routes::AppState;

/// Items need this many ratings before they enter the similarity space
fn default_min_ratings() -> i64 {
    5
}

fn default_pending_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct SummaryParams {
    #[serde(default = "default_min_ratings")]
    pub min_ratings: i64,
}

/// Handler for the index/neighborhood coverage summary
pub async fn summary(
    State(state): State<AppState>,
    Query(params): Query<SummaryParams>,
) -> AppResult<Json<SimilaritySummary>> {
    let summary = state.maintenance.summary(params.min_ratings).await?;
    Ok(Json(summary))
}

#[derive(Debug, Deserialize)]
pub struct PendingParams {
    #[serde(default = "default_min_ratings")]
    pub min_ratings: i64,
    #[serde(default = "default_pending_limit")]
    pub limit_without_idx: i64,
    #[serde(default = "default_pending_limit")]
    pub limit_without_sims: i64,
}

/// Handler listing items pending an index or a neighborhood
pub async fn pending(
    State(state): State<AppState>,
    Query(params): Query<PendingParams>,
) -> AppResult<Json<PendingSimilarities>> {
    let pending = state
        .maintenance
        .pending(
            params.min_ratings,
            params.limit_without_idx,
            params.limit_without_sims,
        )
        .await?;
    Ok(Json(pending))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemapMissingBody {
    #[serde(default = "default_min_ratings")]
    pub min_ratings: i64,
    #[serde(default)]
    pub limit: i64,
}

/// Handler assigning dense indices to unmapped items
pub async fn remap_missing(
    State(state): State<AppState>,
    Json(body): Json<RemapMissingBody>,
) -> AppResult<Json<RemapMissingResult>> {
    let result = state
        .maintenance
        .remap_missing(body.min_ratings, body.limit)
        .await?;
    Ok(Json(result))
}

/// Handler dispatching a neighborhood rebuild over the worker cluster
pub async fn rebuild(
    State(state): State<AppState>,
    Json(body): Json<RebuildRequest>,
) -> AppResult<Json<RebuildResult>> {
    let result = state.maintenance.rebuild(body).await?;
    Ok(Json(result))
}

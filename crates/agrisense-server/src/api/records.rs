//! Recent prediction history endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;
use agrisense_core::PredictionRecord;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct RecentResponse {
    pub success: bool,
    pub predictions: Vec<PredictionRecord>,
}

/// List recently persisted crop predictions, newest first.
pub async fn recent_predictions(
    State(state): State<AppState>,
    Query(query): Query<RecentQuery>,
) -> Result<Json<RecentResponse>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    let predictions = state.orchestrator.recent_predictions(limit).await?;
    Ok(Json(RecentResponse {
        success: true,
        predictions,
    }))
}

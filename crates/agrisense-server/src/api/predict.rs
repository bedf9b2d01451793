//! Crop recommendation endpoint

use axum::{
    extract::{Request, State},
    Json, RequestExt,
};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;
use agrisense_core::{CropFeatures, InferenceRequest, InferenceResult};

/// Crop recommendation response
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub predicted_crop: String,
}

/// Recommend a crop for a set of soil/climate measurements.
pub async fn recommend_crop(
    State(state): State<AppState>,
    req: Request,
) -> Result<Json<PredictResponse>, ApiError> {
    let features = parse_predict_request(req).await?;

    info!(ph = features.ph, rainfall = features.rainfall, "crop recommendation request");

    // Acquire permit for concurrency limiting (backpressure)
    let _permit = state.acquire_permit().await;

    let timeout = Duration::from_secs(state.request_timeout_secs);
    let result = tokio::time::timeout(
        timeout,
        state
            .orchestrator
            .handle(InferenceRequest::CropFeatures(features)),
    )
    .await
    .map_err(|_| ApiError::internal("Request timeout"))??;

    match result {
        InferenceResult::Crop { crop } => Ok(Json(PredictResponse {
            success: true,
            predicted_crop: crop,
        })),
        InferenceResult::Pest { .. } => {
            Err(ApiError::internal("Unexpected result kind for crop request"))
        }
    }
}

/// Parse and validate the numeric request body.
///
/// The body is decoded by hand so malformed JSON gets the same failure
/// envelope as every other error instead of a framework-shaped rejection.
async fn parse_predict_request(req: Request) -> Result<CropFeatures, ApiError> {
    let Json(body) = req
        .extract::<Json<Value>, _>()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid or missing JSON body: {e}")))?;

    Ok(CropFeatures::from_json(&body)?)
}

//! HTTP transport: forwards requests to the remote inference service.
//!
//! Numeric features go out as a JSON body to `/predict`; images go out as a
//! multipart upload to `/predict-pest`. One outbound call per invocation, no
//! retry, no outbound body-size cap.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{multipart, StatusCode};
use serde::Deserialize;
use std::time::Instant;
use tracing::warn;

use super::{BackendKind, Disposition, Invocation, TransportAdapter};
use crate::config::ServiceConfig;
use crate::error::{Error, HttpError};
use crate::request::{CropFeatures, ImagePayload, InferenceRequest, InferenceResult};

/// Reply from the remote numeric endpoint.
#[derive(Debug, Deserialize)]
struct CropApiResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    recommended_crop: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Reply from the remote pest-detection endpoint.
#[derive(Debug, Deserialize)]
struct PestApiResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    pest: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

/// Client for the remote inference service.
pub struct HttpAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpAdapter {
    pub fn new(config: &ServiceConfig) -> Self {
        Self::with_base_url(&config.inference_api_url)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// `POST /predict` with the numeric features as a JSON body.
    async fn recommend_crop(&self, features: &CropFeatures) -> Result<InferenceResult, Error> {
        let payload = serde_json::to_vec(features).map_err(HttpError::Encode)?;
        let bytes_sent = payload.len();

        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint("predict"))
            .header(CONTENT_TYPE, "application/json")
            .body(payload)
            .send()
            .await
            .map_err(HttpError::Unreachable)?;

        let status = response.status();
        let body = response.bytes().await.map_err(HttpError::Unreachable)?;
        Invocation {
            backend: BackendKind::Http,
            bytes_sent,
            bytes_received: body.len(),
            disposition: Disposition::HttpStatus(status.as_u16()),
            elapsed: started.elapsed(),
        }
        .log();

        if !status.is_success() {
            return Err(reject(status, &body).into());
        }
        parse_crop_body(&body)
    }

    /// `POST /predict-pest` with the uploaded image as one multipart file part.
    async fn detect_pest(&self, image: &ImagePayload) -> Result<InferenceResult, Error> {
        let bytes = tokio::fs::read(image.path()).await?;
        let bytes_sent = bytes.len();

        let file_name = image.file_name().unwrap_or("upload.jpg").to_string();
        let part = multipart::Part::bytes(bytes).file_name(file_name);
        let form = multipart::Form::new().part("file", part);

        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint("predict-pest"))
            .multipart(form)
            .send()
            .await
            .map_err(HttpError::Unreachable)?;

        let status = response.status();
        let body = response.bytes().await.map_err(HttpError::Unreachable)?;
        Invocation {
            backend: BackendKind::Http,
            bytes_sent,
            bytes_received: body.len(),
            disposition: Disposition::HttpStatus(status.as_u16()),
            elapsed: started.elapsed(),
        }
        .log();

        if !status.is_success() {
            return Err(reject(status, &body).into());
        }
        parse_pest_body(&body)
    }
}

#[async_trait]
impl TransportAdapter for HttpAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Http
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<InferenceResult, Error> {
        match request {
            InferenceRequest::CropFeatures(features) => self.recommend_crop(features).await,
            InferenceRequest::PestImage(image) => self.detect_pest(image).await,
        }
    }
}

/// Translate a 2xx numeric reply. A well-formed body carrying an `error`
/// field is the service's own failure and keeps its message.
fn parse_crop_body(body: &[u8]) -> Result<InferenceResult, Error> {
    let parsed: CropApiResponse = serde_json::from_slice(body)
        .map_err(|e| HttpError::InvalidOutput(format!("undecodable crop reply: {e}")))?;

    if let Some(message) = parsed.error {
        return Err(Error::Backend(message));
    }
    if parsed.success == Some(false) {
        return Err(Error::Backend(
            "inference service reported failure".to_string(),
        ));
    }
    match parsed.recommended_crop {
        Some(crop) => Ok(InferenceResult::Crop { crop }),
        None => Err(HttpError::InvalidOutput("reply missing recommended_crop".to_string()).into()),
    }
}

/// Translate a 2xx pest reply. Confidence is a percentage; values outside
/// 0..=100 mean the service and this process disagree about the scale, so
/// the reply is rejected rather than clamped into fake certainty.
fn parse_pest_body(body: &[u8]) -> Result<InferenceResult, Error> {
    let parsed: PestApiResponse = serde_json::from_slice(body)
        .map_err(|e| HttpError::InvalidOutput(format!("undecodable pest reply: {e}")))?;

    if !parsed.success {
        let message = parsed
            .error
            .unwrap_or_else(|| "inference service reported failure".to_string());
        return Err(Error::Backend(message));
    }

    let pest = parsed
        .pest
        .ok_or_else(|| HttpError::InvalidOutput("reply missing pest label".to_string()))?;
    let confidence = parsed
        .confidence
        .ok_or_else(|| HttpError::InvalidOutput("reply missing confidence".to_string()))?;

    if !confidence.is_finite() || !(0.0..=100.0).contains(&confidence) {
        return Err(HttpError::InvalidOutput(format!(
            "confidence {confidence} outside the 0..=100 percent scale"
        ))
        .into());
    }

    Ok(InferenceResult::Pest { pest, confidence })
}

fn reject(status: StatusCode, body: &[u8]) -> HttpError {
    let body = String::from_utf8_lossy(body).into_owned();
    warn!(
        status = %status,
        body = %truncated(&body),
        "inference service rejected request"
    );
    HttpError::BackendRejected { status, body }
}

/// Cap logged bodies so a huge error page does not flood the log.
fn truncated(body: &str) -> String {
    const LIMIT: usize = 2048;
    if body.len() <= LIMIT {
        return body.to_string();
    }
    let mut cut = LIMIT;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}... ({} bytes)", &body[..cut], body.len())
}

//! Request orchestration: validate, route, dispatch, persist, respond.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::adapters::{
    BackendKind, BackendRouter, HttpAdapter, ProcessAdapter, TransportAdapter,
};
use crate::config::{CropTransport, ServiceConfig};
use crate::error::{Error, Result};
use crate::request::{InferenceRequest, InferenceResult};
use crate::store::{PredictionRecord, RecordStore, SledRecordStore};

/// Owns the end-to-end lifecycle of an inference request.
///
/// Exactly one backend dispatch per request, no retry. Persistence happens
/// only for successful numeric predictions and is best-effort: a store
/// failure is logged and the inference result is returned anyway.
pub struct Orchestrator {
    process: Arc<dyn TransportAdapter>,
    http: Arc<dyn TransportAdapter>,
    store: Arc<dyn RecordStore>,
    router: BackendRouter,
}

impl Orchestrator {
    /// Production wiring from configuration.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        let store = SledRecordStore::open(&config.data_dir)?;
        Ok(Self::with_parts(
            Arc::new(ProcessAdapter::new(config)),
            Arc::new(HttpAdapter::new(config)),
            Arc::new(store),
            config.crop_transport,
        ))
    }

    /// Explicit wiring; alternative adapters and stores plug in here.
    pub fn with_parts(
        process: Arc<dyn TransportAdapter>,
        http: Arc<dyn TransportAdapter>,
        store: Arc<dyn RecordStore>,
        crop_transport: CropTransport,
    ) -> Self {
        Self {
            process,
            http,
            store,
            router: BackendRouter::new(crop_transport),
        }
    }

    fn adapter(&self, backend: BackendKind) -> &dyn TransportAdapter {
        match backend {
            BackendKind::Process => self.process.as_ref(),
            BackendKind::Http => self.http.as_ref(),
        }
    }

    /// Handle one request end to end.
    pub async fn handle(&self, request: InferenceRequest) -> Result<InferenceResult> {
        request.validate()?;

        let kind = request.kind();
        let plan = self.router.select(kind);
        debug!(
            kind = %kind,
            backend = %plan.backend,
            reason = %plan.reason,
            "dispatching inference request"
        );

        let result = self.adapter(plan.backend).invoke(&request).await?;

        if result.kind() != kind {
            warn!(
                requested = %kind,
                returned = %result.kind(),
                "backend returned a result of the wrong kind"
            );
            return Err(Error::Backend(format!(
                "backend returned a {} result for a {} request",
                result.kind(),
                kind
            )));
        }

        if let (InferenceRequest::CropFeatures(features), InferenceResult::Crop { crop }) =
            (&request, &result)
        {
            let record = PredictionRecord::new(features, crop.clone());
            match self.store.save(&record).await {
                Ok(()) => debug!(id = %record.id, crop = %crop, "prediction persisted"),
                Err(err) => warn!(
                    error = %err,
                    "failed to persist prediction; returning result anyway"
                ),
            }
        }

        Ok(result)
    }

    /// Newest persisted predictions.
    pub async fn recent_predictions(&self, limit: usize) -> Result<Vec<PredictionRecord>> {
        Ok(self.store.recent(limit).await?)
    }
}

//! Agrisense Core - Inference Orchestration over Heterogeneous Backends
//!
//! A normalized request (soil/climate measurements or a pest photograph) is
//! validated, routed to exactly one backend transport (a short-lived local
//! worker process or a remote HTTP inference service), translated into a
//! uniform result, and, for numeric predictions, persisted to the record
//! store. The HTTP layer in `agrisense-server` sits on top of this crate.

pub mod adapters;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod request;
pub mod store;

pub use adapters::{
    BackendKind, BackendPlan, BackendRouter, HttpAdapter, ProcessAdapter, TransportAdapter,
};
pub use config::{CropTransport, ServiceConfig};
pub use error::{Error, HttpError, PersistError, ProcessError, Result, ValidationError};
pub use orchestrator::Orchestrator;
pub use request::{
    CropFeatures, ImagePayload, InferenceRequest, InferenceResult, RequestKind,
};
pub use store::{PredictionRecord, RecordStore, SledRecordStore};

//! Backend transport adapters.
//!
//! Each adapter speaks one backend protocol (a short-lived local worker
//! process, or the remote HTTP inference service) and translates between the
//! normalized request/result types and that protocol. The orchestrator stays
//! transport-agnostic behind [`TransportAdapter`].

mod http;
mod process;

pub use http::HttpAdapter;
pub use process::ProcessAdapter;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::debug;

use crate::config::CropTransport;
use crate::error::Error;
use crate::request::{InferenceRequest, InferenceResult, RequestKind};

/// Backend family handling one dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Process,
    Http,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Process => write!(f, "process"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Routing decision for one request.
#[derive(Debug, Clone)]
pub struct BackendPlan {
    pub backend: BackendKind,
    pub reason: String,
}

/// Maps request kinds to backends.
///
/// Image requests always go to the remote service; numeric requests follow
/// the configured transport. Selection is pure: no request content, no
/// backend health, no fallback.
#[derive(Debug, Clone, Copy)]
pub struct BackendRouter {
    crop_transport: CropTransport,
}

impl Default for BackendRouter {
    fn default() -> Self {
        Self {
            crop_transport: CropTransport::Process,
        }
    }
}

impl BackendRouter {
    pub fn new(crop_transport: CropTransport) -> Self {
        Self { crop_transport }
    }

    pub fn select(&self, kind: RequestKind) -> BackendPlan {
        match (kind, self.crop_transport) {
            (RequestKind::Image, _) => BackendPlan {
                backend: BackendKind::Http,
                reason: "image requests run on the remote inference service".to_string(),
            },
            (RequestKind::NumericFeatures, CropTransport::Process) => BackendPlan {
                backend: BackendKind::Process,
                reason: "numeric requests use the local worker process".to_string(),
            },
            (RequestKind::NumericFeatures, CropTransport::Http) => BackendPlan {
                backend: BackendKind::Http,
                reason: "numeric requests routed to the remote service by configuration"
                    .to_string(),
            },
        }
    }
}

/// How a backend signalled completion of one exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Worker exit code, `None` when killed by a signal
    ProcessExit(Option<i32>),
    /// HTTP status from the remote service
    HttpStatus(u16),
}

/// One completed dispatch attempt. Logged for diagnostics, never persisted.
#[derive(Debug)]
pub struct Invocation {
    pub backend: BackendKind,
    pub bytes_sent: usize,
    pub bytes_received: usize,
    pub disposition: Disposition,
    pub elapsed: Duration,
}

impl Invocation {
    pub fn log(&self) {
        debug!(
            backend = %self.backend,
            bytes_sent = self.bytes_sent,
            bytes_received = self.bytes_received,
            disposition = ?self.disposition,
            elapsed_ms = self.elapsed.as_millis() as u64,
            "backend exchange completed"
        );
    }
}

/// A transport that can carry one request to its backend and back.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn backend(&self) -> BackendKind;

    /// Dispatch one request and translate the backend's raw output into a
    /// normalized result or an error from the transport's failure taxonomy.
    async fn invoke(&self, request: &InferenceRequest) -> Result<InferenceResult, Error>;
}

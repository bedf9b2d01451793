//! Application state management

use agrisense_core::Orchestrator;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Shared application state with request backpressure.
#[derive(Clone)]
pub struct AppState {
    /// Orchestrator reference - using Arc for cheap clones
    pub orchestrator: Arc<Orchestrator>,
    /// Concurrency limiter to prevent resource exhaustion
    pub request_semaphore: Arc<Semaphore>,
    /// Request timeout configuration (seconds)
    pub request_timeout_secs: u64,
}

impl AppState {
    pub fn new(orchestrator: Orchestrator) -> Self {
        // Every in-flight request can hold a worker process or an outbound
        // connection, so the limit also caps child processes.
        let max_concurrent = std::env::var("MAX_CONCURRENT_REQUESTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100);

        let timeout = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(300);

        Self {
            orchestrator: Arc::new(orchestrator),
            request_semaphore: Arc::new(Semaphore::new(max_concurrent)),
            request_timeout_secs: timeout,
        }
    }

    /// Acquire a permit for concurrent request processing
    pub async fn acquire_permit(&self) -> tokio::sync::SemaphorePermit<'_> {
        self.request_semaphore
            .acquire()
            .await
            .expect("Semaphore should never be closed")
    }
}

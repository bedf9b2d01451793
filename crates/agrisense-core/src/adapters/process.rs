//! Process transport: one short-lived inference worker per request.
//!
//! The worker reads a single JSON object on stdin, prints a single JSON
//! object on stdout and exits. Nothing is shared between invocations, so
//! concurrent requests each get their own child process.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::process::{Output, Stdio};
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::warn;

use super::{BackendKind, Disposition, Invocation, TransportAdapter};
use crate::config::ServiceConfig;
use crate::error::{Error, ProcessError};
use crate::request::{InferenceRequest, InferenceResult};

/// Reply printed by the worker: exactly one JSON object on stdout.
#[derive(Debug, Deserialize)]
struct WorkerReply {
    #[serde(default)]
    predicted_crop: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Spawns the crop inference worker and speaks its stdin/stdout protocol.
pub struct ProcessAdapter {
    program: String,
    args: Vec<String>,
}

impl ProcessAdapter {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            program: config.worker_command.clone(),
            args: vec![path_arg(&config.worker_script)],
        }
    }

    /// Build from an explicit argv, e.g. for stub workers.
    pub fn from_argv(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Raw exchange: feed `request_json` to a fresh worker, collect stdout
    /// and stderr until it exits. The child is killed if the exchange future
    /// is dropped, so abandoned requests do not leak processes.
    async fn exchange(&self, request_json: &[u8]) -> Result<Output, ProcessError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ProcessError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(request_json).await?;
            stdin.shutdown().await?;
        }
        // stdin is dropped here; the worker sees end-of-input

        Ok(child.wait_with_output().await?)
    }
}

#[async_trait]
impl TransportAdapter for ProcessAdapter {
    fn backend(&self) -> BackendKind {
        BackendKind::Process
    }

    async fn invoke(&self, request: &InferenceRequest) -> Result<InferenceResult, Error> {
        let features = match request {
            InferenceRequest::CropFeatures(features) => features,
            InferenceRequest::PestImage(_) => {
                return Err(Error::Backend(
                    "worker process only handles numeric features".to_string(),
                ))
            }
        };

        let request_json = serde_json::to_vec(features).map_err(ProcessError::Encode)?;

        let started = Instant::now();
        let output = self.exchange(&request_json).await?;
        Invocation {
            backend: BackendKind::Process,
            bytes_sent: request_json.len(),
            bytes_received: output.stdout.len(),
            disposition: Disposition::ProcessExit(output.status.code()),
            elapsed: started.elapsed(),
        }
        .log();

        if !output.stderr.is_empty() {
            warn!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "inference worker wrote to stderr"
            );
        }

        let reply = parse_reply(&output)?;

        if let Some(message) = reply.error {
            return Err(Error::Backend(message));
        }

        match reply.predicted_crop {
            Some(crop) => Ok(InferenceResult::Crop { crop }),
            None => Err(invalid_output(&output).into()),
        }
    }
}

/// Parse the accumulated stdout as the worker's single-shot reply.
///
/// A worker that died without printing anything is a process failure; a
/// worker that exited (cleanly or not) with unparseable stdout is an
/// invalid-output failure. Exit status alone never decides the outcome, so
/// a worker that prints `{"error": ...}` and exits non-zero still surfaces
/// its own message.
fn parse_reply(output: &Output) -> Result<WorkerReply, ProcessError> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let trimmed = stdout.trim();

    if trimmed.is_empty() {
        if output.status.success() {
            return Err(invalid_output(output));
        }
        return Err(ProcessError::Failed {
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    serde_json::from_str(trimmed).map_err(|_| invalid_output(output))
}

fn invalid_output(output: &Output) -> ProcessError {
    ProcessError::InvalidOutput {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::CropFeatures;

    fn sample_features() -> CropFeatures {
        CropFeatures {
            n: 90.0,
            p: 42.0,
            k: 43.0,
            temperature: 20.88,
            humidity: 82.0,
            ph: 6.5,
            rainfall: 202.94,
        }
    }

    fn stub_worker(script: &str) -> ProcessAdapter {
        ProcessAdapter::from_argv("/bin/sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_worker_reply_becomes_crop_result() {
        let adapter =
            stub_worker(r#"cat >/dev/null; printf '%s' '{"predicted_crop":"rice"}'"#);
        let request = InferenceRequest::CropFeatures(sample_features());
        let result = adapter.invoke(&request).await.unwrap();
        assert_eq!(
            result,
            InferenceResult::Crop {
                crop: "rice".into()
            }
        );
    }

    #[tokio::test]
    async fn test_worker_error_field_surfaces_as_backend_error() {
        let adapter = stub_worker(
            r#"cat >/dev/null; printf '%s' '{"error":"Prediction failed: model not fitted"}'; exit 1"#,
        );
        let request = InferenceRequest::CropFeatures(sample_features());
        let err = adapter.invoke(&request).await.unwrap_err();
        match err {
            Error::Backend(message) => {
                assert_eq!(message, "Prediction failed: model not fitted")
            }
            other => panic!("expected backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_stdout_with_clean_exit_is_invalid_output() {
        let adapter = stub_worker("cat >/dev/null");
        let request = InferenceRequest::CropFeatures(sample_features());
        let err = adapter.invoke(&request).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Process(ProcessError::InvalidOutput { .. })
        ));
    }

    #[tokio::test]
    async fn test_garbage_stdout_is_invalid_output() {
        let adapter = stub_worker(r#"cat >/dev/null; printf '%s' 'Traceback (most recent call last):'"#);
        let request = InferenceRequest::CropFeatures(sample_features());
        let err = adapter.invoke(&request).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Process(ProcessError::InvalidOutput { .. })
        ));
    }

    #[tokio::test]
    async fn test_silent_death_is_process_failure() {
        let adapter = stub_worker("cat >/dev/null; echo boom >&2; exit 3");
        let request = InferenceRequest::CropFeatures(sample_features());
        let err = adapter.invoke(&request).await.unwrap_err();
        match err {
            Error::Process(ProcessError::Failed { status, stderr }) => {
                assert_eq!(status.code(), Some(3));
                assert!(stderr.contains("boom"));
            }
            other => panic!("expected process failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stderr_noise_does_not_break_a_valid_reply() {
        let adapter = stub_worker(
            r#"cat >/dev/null; echo 'UserWarning: X does not have valid feature names' >&2; printf '%s' '{"predicted_crop":"maize"}'"#,
        );
        let request = InferenceRequest::CropFeatures(sample_features());
        let result = adapter.invoke(&request).await.unwrap();
        assert_eq!(
            result,
            InferenceResult::Crop {
                crop: "maize".into()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_worker_binary_is_spawn_error() {
        let adapter = ProcessAdapter::from_argv("/nonexistent/agrisense-worker", vec![]);
        let request = InferenceRequest::CropFeatures(sample_features());
        let err = adapter.invoke(&request).await.unwrap_err();
        assert!(matches!(err, Error::Process(ProcessError::Spawn(_))));
    }

    #[tokio::test]
    async fn test_image_request_is_refused() {
        let adapter = stub_worker("cat >/dev/null");
        let image = crate::request::ImagePayload::from_bytes(b"jpeg", None).unwrap();
        let err = adapter
            .invoke(&InferenceRequest::PestImage(image))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_concurrent_workers_do_not_cross_requests() {
        // The stub echoes the N measurement back inside the crop label, so
        // any cross-request mixup would show up as a mismatched reply.
        let script = r#"sed -e 's/.*"N":\([0-9.]*\),.*/{"predicted_crop":"crop-\1"}/'"#;
        let adapter = std::sync::Arc::new(stub_worker(script));

        let mut handles = Vec::new();
        for i in 0..16u32 {
            let adapter = adapter.clone();
            handles.push(tokio::spawn(async move {
                let mut features = sample_features();
                features.n = f64::from(i);
                let expected = format!("crop-{}", serde_json::json!(features.n));
                let result = adapter
                    .invoke(&InferenceRequest::CropFeatures(features))
                    .await
                    .unwrap();
                assert_eq!(result, InferenceResult::Crop { crop: expected });
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }
}

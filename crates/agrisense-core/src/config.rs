//! Configuration types for the Agrisense inference service

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which transport carries numeric crop requests.
///
/// Image requests always go over HTTP; numeric requests default to the local
/// worker process but can be pointed at the remote service instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CropTransport {
    #[default]
    Process,
    Http,
}

impl CropTransport {
    /// Parse a configured transport name, tolerating common aliases.
    pub fn from_name(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "process" | "worker" | "local" => Some(Self::Process),
            "http" | "remote" | "api" => Some(Self::Http),
            _ => None,
        }
    }
}

/// Main service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Directory holding the prediction record store
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Interpreter used to launch the crop inference worker
    #[serde(default = "default_worker_command")]
    pub worker_command: String,

    /// Path to the crop inference worker script
    #[serde(default = "default_worker_script")]
    pub worker_script: PathBuf,

    /// Base URL of the remote inference service
    #[serde(default = "default_inference_api_url")]
    pub inference_api_url: String,

    /// Transport for numeric crop requests
    #[serde(default = "default_crop_transport")]
    pub crop_transport: CropTransport,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            worker_command: default_worker_command(),
            worker_script: default_worker_script(),
            inference_api_url: default_inference_api_url(),
            crop_transport: default_crop_transport(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    if let Ok(from_env) = std::env::var("AGRISENSE_DATA_DIR") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("agrisense")
        .join("predictions")
}

fn default_worker_command() -> String {
    if let Ok(from_env) = std::env::var("AGRISENSE_WORKER_CMD") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    "python3".to_string()
}

fn default_worker_script() -> PathBuf {
    if let Ok(from_env) = std::env::var("AGRISENSE_WORKER_SCRIPT") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return PathBuf::from(trimmed);
        }
    }

    PathBuf::from("scripts").join("predict_crop.py")
}

fn default_inference_api_url() -> String {
    if let Ok(from_env) = std::env::var("AGRISENSE_INFERENCE_API_URL") {
        let trimmed = from_env.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    "http://127.0.0.1:5001".to_string()
}

fn default_crop_transport() -> CropTransport {
    std::env::var("AGRISENSE_CROP_TRANSPORT")
        .ok()
        .and_then(|raw| CropTransport::from_name(&raw))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_names_parse_with_aliases() {
        assert_eq!(
            CropTransport::from_name("process"),
            Some(CropTransport::Process)
        );
        assert_eq!(
            CropTransport::from_name(" Worker "),
            Some(CropTransport::Process)
        );
        assert_eq!(CropTransport::from_name("HTTP"), Some(CropTransport::Http));
        assert_eq!(CropTransport::from_name("remote"), Some(CropTransport::Http));
        assert_eq!(CropTransport::from_name("carrier-pigeon"), None);
    }

    #[test]
    fn test_transport_defaults_to_process() {
        assert_eq!(CropTransport::default(), CropTransport::Process);
    }

    #[test]
    fn test_config_deserializes_from_partial_json() {
        let config: ServiceConfig =
            serde_json::from_str(r#"{"crop_transport": "http"}"#).unwrap();
        assert_eq!(config.crop_transport, CropTransport::Http);
        assert_eq!(config.worker_command, default_worker_command());
    }
}

//! Request and result types for the inference pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

use crate::error::ValidationError;

/// Which backend family a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RequestKind {
    /// Soil and climate measurements for crop recommendation
    NumericFeatures,
    /// Photograph for pest detection
    Image,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NumericFeatures => write!(f, "numeric-features"),
            Self::Image => write!(f, "image"),
        }
    }
}

/// The seven soil/climate measurements the crop model consumes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropFeatures {
    /// Nitrogen content in soil
    #[serde(rename = "N")]
    pub n: f64,
    /// Phosphorus content in soil
    #[serde(rename = "P")]
    pub p: f64,
    /// Potassium content in soil
    #[serde(rename = "K")]
    pub k: f64,
    /// Temperature in degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: f64,
    /// Soil pH value
    pub ph: f64,
    /// Rainfall in millimetres
    pub rainfall: f64,
}

impl CropFeatures {
    /// Wire names of the required fields, in report order.
    pub const FIELDS: [&'static str; 7] = [
        "N",
        "P",
        "K",
        "temperature",
        "humidity",
        "ph",
        "rainfall",
    ];

    /// Parse measurements out of a JSON object.
    ///
    /// Every absent field is reported in one [`ValidationError::MissingFields`]
    /// rather than failing on the first. Values may be JSON numbers or numeric
    /// strings; anything else (and non-finite values) is rejected per field.
    pub fn from_json(body: &Value) -> Result<Self, ValidationError> {
        let missing: Vec<String> = Self::FIELDS
            .iter()
            .filter(|field| body.get(**field).is_none())
            .map(|field| field.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ValidationError::MissingFields(missing));
        }

        let mut values = [0f64; 7];
        for (slot, field) in values.iter_mut().zip(Self::FIELDS) {
            *slot = numeric_field(body, field)?;
        }
        let [n, p, k, temperature, humidity, ph, rainfall] = values;
        Ok(Self {
            n,
            p,
            k,
            temperature,
            humidity,
            ph,
            rainfall,
        })
    }

    fn ordered(&self) -> [(&'static str, f64); 7] {
        [
            ("N", self.n),
            ("P", self.p),
            ("K", self.k),
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("ph", self.ph),
            ("rainfall", self.rainfall),
        ]
    }

    /// Reject non-finite measurements that bypassed [`Self::from_json`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, value) in self.ordered() {
            if !value.is_finite() {
                return Err(ValidationError::InvalidNumber {
                    field: field.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn numeric_field(body: &Value, field: &str) -> Result<f64, ValidationError> {
    let parsed = match &body[field] {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed
        .filter(|value| value.is_finite())
        .ok_or_else(|| ValidationError::InvalidNumber {
            field: field.to_string(),
        })
}

/// An uploaded image spooled to a scoped temporary file.
///
/// The backing file is removed when the payload is dropped, so every exit
/// path of the request lifecycle cleans up after itself.
#[derive(Debug)]
pub struct ImagePayload {
    file: NamedTempFile,
    len: u64,
    file_name: Option<String>,
}

impl ImagePayload {
    /// Spool raw upload bytes into a fresh temporary file.
    pub fn from_bytes(bytes: &[u8], file_name: Option<String>) -> std::io::Result<Self> {
        let mut file = NamedTempFile::new()?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self {
            file,
            len: bytes.len() as u64,
            file_name,
        })
    }

    /// Path of the spooled file, valid for the payload's lifetime.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Size of the upload in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Original client-supplied file name, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }
}

/// A normalized inference request. Exactly one payload shape per kind.
#[derive(Debug)]
pub enum InferenceRequest {
    /// Crop recommendation from soil/climate measurements
    CropFeatures(CropFeatures),
    /// Pest detection from an uploaded photograph
    PestImage(ImagePayload),
}

impl InferenceRequest {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::CropFeatures(_) => RequestKind::NumericFeatures,
            Self::PestImage(_) => RequestKind::Image,
        }
    }

    /// Check the request before any backend is contacted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            Self::CropFeatures(features) => features.validate(),
            Self::PestImage(image) => {
                if image.is_empty() {
                    Err(ValidationError::ImageMissing)
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A successful inference outcome. The kind always matches the request kind.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceResult {
    /// Recommended crop label
    Crop { crop: String },
    /// Detected pest with model confidence in percent (0..=100)
    Pest { pest: String, confidence: f64 },
}

impl InferenceResult {
    pub fn kind(&self) -> RequestKind {
        match self {
            Self::Crop { .. } => RequestKind::NumericFeatures,
            Self::Pest { .. } => RequestKind::Image,
        }
    }
}

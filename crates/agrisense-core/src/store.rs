//! Durable store for successful crop predictions.
//!
//! Records are append-only: one write per successful numeric prediction,
//! no update, no delete. Keys sort by creation time so a reverse scan
//! yields newest-first without a secondary index.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::error::PersistError;
use crate::request::CropFeatures;

/// A completed numeric prediction: the inputs, the label, and when it ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Uuid,
    #[serde(rename = "N")]
    pub n: f64,
    #[serde(rename = "P")]
    pub p: f64,
    #[serde(rename = "K")]
    pub k: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub ph: f64,
    pub rainfall: f64,
    pub predicted_crop: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

impl PredictionRecord {
    pub fn new(features: &CropFeatures, predicted_crop: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            n: features.n,
            p: features.p,
            k: features.k,
            temperature: features.temperature,
            humidity: features.humidity,
            ph: features.ph,
            rainfall: features.rainfall,
            predicted_crop: predicted_crop.into(),
            created_at: Utc::now(),
        }
    }
}

/// Write-once sink for prediction records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist one record. An occupied key is never overwritten.
    async fn save(&self, record: &PredictionRecord) -> Result<(), PersistError>;

    /// Newest records first, up to `limit`.
    async fn recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, PersistError>;
}

/// sled-backed record store.
pub struct SledRecordStore {
    db: sled::Db,
}

impl SledRecordStore {
    /// Open (or create) the store under `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistError> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// In-memory store for tests and ephemeral runs.
    pub fn temporary() -> Result<Self, PersistError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Key layout: zero-padded creation micros, then the record id. The
    /// timestamp keeps keys chronologically ordered; the id keeps them
    /// unique when two predictions land in the same microsecond.
    fn key_for(record: &PredictionRecord) -> String {
        format!(
            "{:020}:{}",
            record.created_at.timestamp_micros(),
            record.id
        )
    }
}

#[async_trait]
impl RecordStore for SledRecordStore {
    async fn save(&self, record: &PredictionRecord) -> Result<(), PersistError> {
        let key = Self::key_for(record);
        let value = serde_json::to_vec(record)?;

        let swap = self
            .db
            .compare_and_swap(key.as_bytes(), None::<&[u8]>, Some(value))?;
        if swap.is_err() {
            return Err(PersistError::KeyExists(key));
        }

        self.db.flush_async().await?;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<PredictionRecord>, PersistError> {
        let mut records = Vec::with_capacity(limit.min(64));
        for entry in self.db.iter().rev().take(limit) {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record_at(second: u32, crop: &str) -> PredictionRecord {
        PredictionRecord {
            id: Uuid::new_v4(),
            n: 90.0,
            p: 42.0,
            k: 43.0,
            temperature: 20.88,
            humidity: 82.0,
            ph: 6.5,
            rainfall: 202.94,
            predicted_crop: crop.to_string(),
            created_at: Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, second).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_save_and_read_back_newest_first() {
        let store = SledRecordStore::temporary().unwrap();
        store.save(&record_at(1, "rice")).await.unwrap();
        store.save(&record_at(3, "maize")).await.unwrap();
        store.save(&record_at(2, "cotton")).await.unwrap();

        let records = store.recent(10).await.unwrap();
        let crops: Vec<&str> = records.iter().map(|r| r.predicted_crop.as_str()).collect();
        assert_eq!(crops, ["maize", "cotton", "rice"]);
    }

    #[tokio::test]
    async fn test_recent_honors_limit() {
        let store = SledRecordStore::temporary().unwrap();
        for second in 0..5 {
            store.save(&record_at(second, "rice")).await.unwrap();
        }
        assert_eq!(store.recent(2).await.unwrap().len(), 2);
        assert_eq!(store.recent(0).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_recent_on_empty_store_is_empty() {
        let store = SledRecordStore::temporary().unwrap();
        assert!(store.recent(20).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_records_are_write_once() {
        let store = SledRecordStore::temporary().unwrap();
        let record = record_at(1, "rice");
        store.save(&record).await.unwrap();

        let err = store.save(&record).await.unwrap_err();
        assert!(matches!(err, PersistError::KeyExists(_)));

        // the stored value is untouched
        let records = store.recent(10).await.unwrap();
        assert_eq!(records, vec![record]);
    }

    #[tokio::test]
    async fn test_open_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = SledRecordStore::open(dir.path()).unwrap();
            store.save(&record_at(1, "jute")).await.unwrap();
        }
        let store = SledRecordStore::open(dir.path()).unwrap();
        let records = store.recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].predicted_crop, "jute");
    }

    #[test]
    fn test_keys_order_chronologically() {
        let early = SledRecordStore::key_for(&record_at(1, "rice"));
        let late = SledRecordStore::key_for(&record_at(2, "rice"));
        assert!(early < late);
    }

    #[test]
    fn test_record_serializes_with_original_wire_names() {
        let record = record_at(1, "rice");
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("N").is_some());
        assert!(value.get("createdAt").is_some());
        assert!(value.get("predicted_crop").is_some());
        assert!(value.get("created_at").is_none());
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

use crate::processor::dimensions::DimensionUpsert;
use crate::processor::facts::{LoadFailure, LoadMetrics};
use crate::storage::{MANIFESTS_PREFIX, ObjectStorage, StorageManager};

/// The audit record of one pipeline run. Skipped rows have no separate
/// error log channel; the manifest is the observability surface the
/// reporting layer exposes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub staging_path: String,
    /// SHA-256 of the staging file content; informational, a repeated file
    /// is reconciled as no-ops rather than rejected.
    pub staging_fingerprint: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub staging_rows: u64,
    /// Measures nulled by best-effort validation.
    pub sanitized_measures: u64,
    pub dimensions: BTreeMap<String, DimensionUpsert>,
    pub facts: LoadMetrics,
    pub failures: Vec<LoadFailure>,
}

impl RunManifest {
    pub fn fingerprint(content: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content);
        format!("{:x}", hasher.finalize())
    }

    /// Per-field counts over the recorded failures, for the missing-keys
    /// diagnostic.
    pub fn missing_field_counts(&self) -> BTreeMap<String, u64> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            for field in &failure.missing_fields {
                *counts.entry(field.clone()).or_insert(0) += 1;
            }
        }
        counts
    }
}

#[async_trait]
pub trait ManifestRegistry: Send + Sync {
    async fn store_manifest(&self, manifest: &RunManifest) -> Result<String>;
    async fn latest_manifest(&self) -> Result<Option<RunManifest>>;
    async fn list_manifests(&self) -> Result<Vec<String>>;
}

pub struct StorageManifestRegistry {
    storage: Arc<dyn ObjectStorage>,
}

impl StorageManifestRegistry {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ManifestRegistry for StorageManifestRegistry {
    async fn store_manifest(&self, manifest: &RunManifest) -> Result<String> {
        let key = StorageManager::manifest_key(&manifest.run_id);
        let content = serde_json::to_vec_pretty(manifest)?;
        self.storage.put_object(&key, &content).await?;
        Ok(key)
    }

    async fn latest_manifest(&self) -> Result<Option<RunManifest>> {
        // Keys are timestamp-prefixed, so the lexicographic maximum is the
        // most recent run.
        let Some(key) = self.list_manifests().await?.into_iter().max() else {
            return Ok(None);
        };

        let content = self.storage.get_object(&key).await?;
        match serde_json::from_slice(&content) {
            Ok(manifest) => Ok(Some(manifest)),
            Err(e) => {
                warn!(%key, error = %e, "Failed to decode run manifest");
                Ok(None)
            }
        }
    }

    async fn list_manifests(&self) -> Result<Vec<String>> {
        let keys = self.storage.list_objects(MANIFESTS_PREFIX).await?;
        Ok(keys.into_iter().filter(|k| k.ends_with(".json")).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;

    fn manifest(run_id: &str, unresolved: u64) -> RunManifest {
        RunManifest {
            run_id: run_id.to_string(),
            staging_path: "staging/bookings.parquet".to_string(),
            staging_fingerprint: RunManifest::fingerprint(b"content"),
            started_at: Utc::now(),
            completed_at: Utc::now(),
            staging_rows: 3,
            sanitized_measures: 0,
            dimensions: BTreeMap::new(),
            facts: LoadMetrics {
                staging_rows: 3,
                inserted: 3 - unresolved,
                unresolved,
                ..Default::default()
            },
            failures: vec![LoadFailure {
                booking_id: Some("CNR003".to_string()),
                missing_fields: vec![
                    "pickup_location".to_string(),
                    "payment_method".to_string(),
                ],
            }],
        }
    }

    #[test]
    fn missing_field_counts_aggregate_failures() {
        let mut m = manifest("r1", 1);
        m.failures.push(LoadFailure {
            booking_id: Some("CNR004".to_string()),
            missing_fields: vec!["pickup_location".to_string()],
        });

        let counts = m.missing_field_counts();
        assert_eq!(counts.get("pickup_location"), Some(&2));
        assert_eq!(counts.get("payment_method"), Some(&1));
    }

    #[tokio::test]
    async fn latest_manifest_wins_by_key_order() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(dir.path()).unwrap());
        let registry = StorageManifestRegistry::new(storage);

        assert!(registry.latest_manifest().await.unwrap().is_none());

        // store under explicitly ordered keys to avoid same-second collisions
        let first = manifest("run-a", 0);
        let second = manifest("run-b", 1);
        registry
            .storage
            .put_object(
                "manifests/run-20240101000000-a.json",
                &serde_json::to_vec(&first).unwrap(),
            )
            .await
            .unwrap();
        registry
            .storage
            .put_object(
                "manifests/run-20240102000000-b.json",
                &serde_json::to_vec(&second).unwrap(),
            )
            .await
            .unwrap();

        let latest = registry.latest_manifest().await.unwrap().unwrap();
        assert_eq!(latest.run_id, "run-b");
        assert_eq!(latest.facts.unresolved, 1);
    }
}

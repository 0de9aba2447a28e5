use chrono::Utc;
use common::Result;
use common::config::Settings;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::models::staging::StagingBooking;
use crate::processor::{
    DimensionBuilder, DimensionKind, FactLoader, KeyResolver, RunManifest, WarehouseProcessor,
};
use crate::storage::StorageManager;
use crate::utils::arrow::read_parquet_batches_sized;

/// Orchestrates one batch reconciliation: decode staging, build dimensions,
/// resolve keys, load facts, record the manifest. Per-row problems are
/// recovered locally; only storage and schema failures abort the run.
pub struct WarehouseService {
    processor: Arc<WarehouseProcessor>,
    settings: Settings,
}

impl WarehouseService {
    pub async fn new(settings: &Settings) -> Result<Self> {
        let storage = StorageManager::new(&settings.storage.root)?;
        let processor = WarehouseProcessor::new(storage);

        Ok(Self {
            processor: Arc::new(processor),
            settings: settings.clone(),
        })
    }

    pub fn processor(&self) -> Arc<WarehouseProcessor> {
        self.processor.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub async fn run_pipeline(&self, staging_path: &str) -> Result<RunManifest> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4().to_string();
        info!(%run_id, staging = staging_path, "Starting warehouse pipeline run");

        let content = std::fs::read(staging_path)?;
        let staging_fingerprint = RunManifest::fingerprint(&content);
        let batches = read_parquet_batches_sized(content, self.settings.pipeline.batch_size)?;

        let mut rows = StagingBooking::from_batches(&batches)?;
        let mut sanitized_measures = 0u64;
        for row in &mut rows {
            sanitized_measures += u64::from(row.sanitize_measures());
        }
        info!(
            rows = rows.len(),
            sanitized = sanitized_measures,
            "Decoded staging rows"
        );

        // The four dimensions are independent and build concurrently;
        // try_join! is the barrier the fact load waits behind, so every
        // natural key is resolvable before the first insert.
        let builder = DimensionBuilder::new(self.processor.storage().storage());
        let (customers, vehicles, locations, payment_methods) = tokio::try_join!(
            builder.build(DimensionKind::Customer, &rows),
            builder.build(DimensionKind::Vehicle, &rows),
            builder.build(DimensionKind::Location, &rows),
            builder.build(DimensionKind::PaymentMethod, &rows),
        )?;

        let mut dimensions = BTreeMap::new();
        dimensions.insert(
            DimensionKind::Customer.table_name().to_string(),
            customers.1,
        );
        dimensions.insert(DimensionKind::Vehicle.table_name().to_string(), vehicles.1);
        dimensions.insert(
            DimensionKind::Location.table_name().to_string(),
            locations.1,
        );
        dimensions.insert(
            DimensionKind::PaymentMethod.table_name().to_string(),
            payment_methods.1,
        );

        let resolver = KeyResolver::new(
            &customers.0,
            &vehicles.0,
            &locations.0,
            &payment_methods.0,
        );
        let resolved: Vec<_> = rows.into_iter().map(|row| resolver.resolve(row)).collect();

        let loader = FactLoader::new(self.processor.storage()).await?;
        let outcome = loader.load(resolved).await?;

        let manifest = RunManifest {
            run_id,
            staging_path: staging_path.to_string(),
            staging_fingerprint,
            started_at,
            completed_at: Utc::now(),
            staging_rows: outcome.metrics.staging_rows,
            sanitized_measures,
            dimensions,
            facts: outcome.metrics,
            failures: outcome.failures,
        };

        let key = self
            .processor
            .manifest_registry()
            .store_manifest(&manifest)
            .await?;
        info!(
            manifest = %key,
            inserted = manifest.facts.inserted,
            already_present = manifest.facts.already_present,
            unresolved = manifest.facts.unresolved,
            "Pipeline run complete"
        );

        Ok(manifest)
    }
}

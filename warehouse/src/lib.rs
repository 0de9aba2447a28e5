pub mod models;
pub mod processor;
pub mod services;
pub mod storage;
pub mod utils;

use common::Result;
use common::config::Settings;

use processor::RunManifest;
use services::warehouse::WarehouseService;

/// Runs one complete warehouse reconciliation: dimension builds, key
/// resolution, fact load, run manifest.
pub async fn run_warehouse_pipeline(config_path: &str, staging_path: &str) -> Result<RunManifest> {
    // Load configuration
    let config = Settings::new(config_path)?;

    // Initialize warehouse service
    let service = WarehouseService::new(&config).await?;

    service.run_pipeline(staging_path).await
}

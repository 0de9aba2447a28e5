pub mod dimensions;
pub mod facts;
pub mod manifest;
pub mod resolve;

pub use dimensions::{DimensionBuilder, DimensionKind, DimensionTable, DimensionUpsert};
pub use facts::{FactLoader, LoadFailure, LoadMetrics, LoadOutcome};
pub use manifest::{ManifestRegistry, RunManifest, StorageManifestRegistry};
pub use resolve::{KeyField, KeyResolver, ResolvedBooking, ResolvedKeys};

use arrow::datatypes::Schema;
use common::Result;
use datafusion::dataframe::DataFrame;
use datafusion::execution::context::SessionContext;
use datafusion::prelude::ParquetReadOptions;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::models::schema::{
    WarehouseSchema, dimension_schema, fact_bookings_schema, get_warehouse_schema,
};
use crate::storage::StorageManager;

pub const FACT_TABLE: &str = "fact_bookings";

/// Main processor interface: owns the DataFusion session the reporting
/// layer queries through, the storage layout, and the manifest registry.
pub struct WarehouseProcessor {
    pub ctx: SessionContext,
    schema_cache: RwLock<HashMap<&'static str, Arc<Schema>>>,
    storage: StorageManager,
    manifest_registry: Arc<dyn ManifestRegistry>,
}

impl WarehouseProcessor {
    pub fn new(storage: StorageManager) -> Self {
        // Initialize schema cache
        let mut schema_cache = HashMap::new();
        schema_cache.insert(
            "dimension",
            Arc::new(get_warehouse_schema(WarehouseSchema::Dimension).clone()),
        );
        schema_cache.insert(
            FACT_TABLE,
            Arc::new(get_warehouse_schema(WarehouseSchema::Fact).clone()),
        );

        let manifest_registry: Arc<dyn ManifestRegistry> =
            Arc::new(StorageManifestRegistry::new(storage.storage()));

        Self {
            ctx: SessionContext::new(),
            schema_cache: RwLock::new(schema_cache),
            storage,
            manifest_registry,
        }
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn manifest_registry(&self) -> Arc<dyn ManifestRegistry> {
        self.manifest_registry.clone()
    }

    pub fn session_context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn get_cached_schema(&self, schema_name: &str) -> Option<Arc<Schema>> {
        self.schema_cache.read().unwrap().get(schema_name).cloned()
    }

    pub fn cache_schema(&self, name: &'static str, schema: Schema) {
        self.schema_cache
            .write()
            .unwrap()
            .insert(name, Arc::new(schema));
    }

    /// Registers the four dimension tables and the fact table against their
    /// parquet locations, with explicit schemas so no file inference runs.
    pub async fn register_warehouse_tables(&self) -> Result<()> {
        let dim_schema = self
            .get_cached_schema("dimension")
            .unwrap_or_else(|| Arc::new(dimension_schema()));
        for kind in DimensionKind::ALL {
            let key = StorageManager::dimension_key(kind.table_name());
            let path = self.storage.table_uri(&key);
            self.register_parquet_with_schema(kind.table_name(), &path, &dim_schema)
                .await?;
        }

        let fact_schema = self
            .get_cached_schema(FACT_TABLE)
            .unwrap_or_else(|| Arc::new(fact_bookings_schema()));
        let fact_path = self.storage.fact_table_uri();
        self.register_parquet_with_schema(FACT_TABLE, &fact_path, &fact_schema)
            .await?;

        Ok(())
    }

    /// Register a parquet table with an explicit schema
    pub async fn register_parquet_with_schema(
        &self,
        table_name: &str,
        file_path: &str,
        schema: &Schema,
    ) -> Result<()> {
        // Clean up existing registration if present
        let _ = self.ctx.deregister_table(table_name);

        let read_options = ParquetReadOptions::default()
            .schema(schema)
            .table_partition_cols(vec![]);

        self.ctx
            .register_parquet(table_name, file_path, read_options)
            .await
            .map_err(|e| {
                common::Error::Other(format!(
                    "Failed to register {} at {}: {}",
                    table_name, file_path, e
                ))
            })
    }

    // Deregister a table
    pub async fn deregister_table(&self, table_name: &str) -> Result<()> {
        self.ctx.deregister_table(table_name)?;
        Ok(())
    }

    // Execute SQL query
    pub async fn execute_sql(&self, sql: &str) -> Result<DataFrame> {
        self.ctx.sql(sql).await.map_err(|e| e.into())
    }
}

pub mod local;

pub use local::{LocalStorage, ObjectStorage};

use chrono::Utc;
use common::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

pub const DIMENSIONS_PREFIX: &str = "dimensions";
pub const FACTS_PREFIX: &str = "fact_bookings";
pub const MANIFESTS_PREFIX: &str = "manifests";

/// Owns the on-disk layout of the warehouse: one parquet file per dimension,
/// append-only parquet parts for the fact table, JSON run manifests.
#[derive(Clone)]
pub struct StorageManager {
    root: PathBuf,
    storage: Arc<dyn ObjectStorage>,
}

impl StorageManager {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(&root)?);

        // Lay the directories out up front so table registration has a
        // target even before the first load writes anything.
        std::fs::create_dir_all(root.join(DIMENSIONS_PREFIX))?;
        std::fs::create_dir_all(root.join(FACTS_PREFIX))?;
        std::fs::create_dir_all(root.join(MANIFESTS_PREFIX))?;

        Ok(Self { root, storage })
    }

    pub fn storage(&self) -> Arc<dyn ObjectStorage> {
        self.storage.clone()
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn dimension_key(table_name: &str) -> String {
        format!("{}/{}.parquet", DIMENSIONS_PREFIX, table_name)
    }

    /// A fresh fact part key; the timestamp prefix keeps listings in load
    /// order, the uuid keeps parallel runs from colliding.
    pub fn fact_part_key() -> String {
        format!(
            "{}/part-{}-{}.parquet",
            FACTS_PREFIX,
            Utc::now().format("%Y%m%d%H%M%S"),
            Uuid::new_v4()
        )
    }

    pub fn manifest_key(run_id: &str) -> String {
        format!(
            "{}/run-{}-{}.json",
            MANIFESTS_PREFIX,
            Utc::now().format("%Y%m%d%H%M%S"),
            run_id
        )
    }

    /// Absolute path of a stored object, for DataFusion registration.
    pub fn table_uri(&self, key: &str) -> String {
        self.root.join(key).to_string_lossy().into_owned()
    }

    /// Absolute path of the fact part directory, for DataFusion listing.
    pub fn fact_table_uri(&self) -> String {
        format!("{}/", self.root.join(FACTS_PREFIX).display())
    }

    pub async fn list_fact_parts(&self) -> Result<Vec<String>> {
        let keys = self.storage.list_objects(FACTS_PREFIX).await?;
        Ok(keys
            .into_iter()
            .filter(|k| k.ends_with(".parquet"))
            .collect())
    }
}

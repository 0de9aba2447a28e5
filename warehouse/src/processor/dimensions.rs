use arrow::array::{Array, Int64Array, StringArray, TimestampMillisecondArray};
use arrow::record_batch::RecordBatch;
use chrono::Utc;
use common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::models::schema::dimension_schema;
use crate::models::staging::StagingBooking;
use crate::storage::{ObjectStorage, StorageManager};
use crate::utils::arrow::{read_parquet_batches, write_parquet_bytes};

/// The four dimensions of the booking star schema. Locations is a single
/// shared namespace fed by both the pickup and drop columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DimensionKind {
    Customer,
    Vehicle,
    Location,
    PaymentMethod,
}

impl DimensionKind {
    pub const ALL: [DimensionKind; 4] = [
        DimensionKind::Customer,
        DimensionKind::Vehicle,
        DimensionKind::Location,
        DimensionKind::PaymentMethod,
    ];

    pub fn table_name(&self) -> &'static str {
        match self {
            DimensionKind::Customer => "customers",
            DimensionKind::Vehicle => "vehicles",
            DimensionKind::Location => "locations",
            DimensionKind::PaymentMethod => "payment_methods",
        }
    }

    /// The staging values feeding this dimension, up to two per row.
    fn natural_values<'a>(&self, row: &'a StagingBooking) -> [Option<&'a str>; 2] {
        match self {
            DimensionKind::Customer => [row.customer_id.as_deref(), None],
            DimensionKind::Vehicle => [row.vehicle_type.as_deref(), None],
            DimensionKind::Location => {
                [row.pickup_location.as_deref(), row.drop_location.as_deref()]
            }
            DimensionKind::PaymentMethod => [row.payment_method.as_deref(), None],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct DimensionEntry {
    surrogate_key: i64,
    created_at_ms: i64,
}

/// One dimension's natural-key to surrogate-key mapping. Append-only:
/// existing entries are never reassigned, surrogate keys are never reused.
#[derive(Debug, Clone)]
pub struct DimensionTable {
    kind: DimensionKind,
    entries: BTreeMap<String, DimensionEntry>,
    next_key: i64,
}

/// Per-build upsert accounting, carried into the run manifest.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DimensionUpsert {
    pub distinct_values: u64,
    pub inserted: u64,
    pub existing: u64,
}

impl DimensionTable {
    pub fn empty(kind: DimensionKind) -> Self {
        Self {
            kind,
            entries: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub fn from_batches(kind: DimensionKind, batches: &[RecordBatch]) -> Result<Self> {
        let mut table = Self::empty(kind);

        for batch in batches {
            let surrogate = batch
                .column_by_name("surrogate_key")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| {
                    Error::SchemaMismatch(format!(
                        "dimension {} is missing an Int64 surrogate_key column",
                        kind.table_name()
                    ))
                })?;
            let natural = batch
                .column_by_name("natural_key")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| {
                    Error::SchemaMismatch(format!(
                        "dimension {} is missing a Utf8 natural_key column",
                        kind.table_name()
                    ))
                })?;
            let created = batch
                .column_by_name("created_at")
                .and_then(|c| c.as_any().downcast_ref::<TimestampMillisecondArray>())
                .ok_or_else(|| {
                    Error::SchemaMismatch(format!(
                        "dimension {} is missing a timestamp created_at column",
                        kind.table_name()
                    ))
                })?;

            for i in 0..batch.num_rows() {
                let key = surrogate.value(i);
                table.entries.insert(
                    natural.value(i).to_string(),
                    DimensionEntry {
                        surrogate_key: key,
                        created_at_ms: created.value(i),
                    },
                );
                if key >= table.next_key {
                    table.next_key = key + 1;
                }
            }
        }

        Ok(table)
    }

    pub fn kind(&self) -> DimensionKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, natural_key: &str) -> Option<i64> {
        self.entries.get(natural_key).map(|e| e.surrogate_key)
    }

    /// Insert-if-absent for every value; existing mappings are left
    /// untouched. New keys are assigned in sorted natural-key order so a
    /// given input always produces the same table.
    pub fn upsert(&mut self, values: &BTreeSet<String>) -> DimensionUpsert {
        let mut metrics = DimensionUpsert {
            distinct_values: values.len() as u64,
            ..Default::default()
        };
        let now_ms = Utc::now().timestamp_millis();

        for value in values {
            if self.entries.contains_key(value) {
                metrics.existing += 1;
                continue;
            }

            self.entries.insert(
                value.clone(),
                DimensionEntry {
                    surrogate_key: self.next_key,
                    created_at_ms: now_ms,
                },
            );
            self.next_key += 1;
            metrics.inserted += 1;
        }

        metrics
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut rows: Vec<(&str, &DimensionEntry)> = self
            .entries
            .iter()
            .map(|(k, e)| (k.as_str(), e))
            .collect();
        rows.sort_by_key(|(_, e)| e.surrogate_key);

        let surrogate = Int64Array::from_iter_values(rows.iter().map(|(_, e)| e.surrogate_key));
        let natural: StringArray = rows.iter().map(|(k, _)| Some(*k)).collect();
        let created = TimestampMillisecondArray::from_iter_values(
            rows.iter().map(|(_, e)| e.created_at_ms),
        );

        let batch = RecordBatch::try_new(
            Arc::new(dimension_schema()),
            vec![Arc::new(surrogate), Arc::new(natural), Arc::new(created)],
        )?;

        Ok(batch)
    }

    /// Snapshot of the natural-key to surrogate-key dictionary, consumed by
    /// the key resolver.
    pub fn lookup_map(&self) -> std::collections::HashMap<String, i64> {
        self.entries
            .iter()
            .map(|(k, e)| (k.clone(), e.surrogate_key))
            .collect()
    }
}

pub struct DimensionBuilder {
    storage: Arc<dyn ObjectStorage>,
}

impl DimensionBuilder {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    /// Upserts the distinct natural keys seen in the staging rows into the
    /// stored dimension table and persists it. Safe to re-run: the second
    /// pass with the same input inserts nothing.
    pub async fn build(
        &self,
        kind: DimensionKind,
        rows: &[StagingBooking],
    ) -> Result<(DimensionTable, DimensionUpsert)> {
        let values = Self::distinct_values(kind, rows);

        let mut table = self.load(kind).await?;
        let metrics = table.upsert(&values);
        self.persist(&table).await?;

        info!(
            dimension = kind.table_name(),
            distinct = metrics.distinct_values,
            inserted = metrics.inserted,
            existing = metrics.existing,
            "Dimension build complete"
        );

        Ok((table, metrics))
    }

    /// Distinct non-null, non-empty natural keys across the staging rows.
    /// Null/empty values are left for the resolver to report; they never
    /// enter a dimension.
    pub fn distinct_values(kind: DimensionKind, rows: &[StagingBooking]) -> BTreeSet<String> {
        let mut values = BTreeSet::new();

        for row in rows {
            for value in kind.natural_values(row).into_iter().flatten() {
                if !value.is_empty() {
                    values.insert(value.to_string());
                }
            }
        }

        values
    }

    pub async fn load(&self, kind: DimensionKind) -> Result<DimensionTable> {
        let key = StorageManager::dimension_key(kind.table_name());

        if !self.storage.check_file_exists(&key).await? {
            return Ok(DimensionTable::empty(kind));
        }

        let data = self.storage.get_object(&key).await?;
        let batches = read_parquet_batches(data)?;
        DimensionTable::from_batches(kind, &batches)
    }

    async fn persist(&self, table: &DimensionTable) -> Result<()> {
        let batch = table.to_record_batch()?;
        let data = write_parquet_bytes(&batch)?;
        let key = StorageManager::dimension_key(table.kind().table_name());
        self.storage.put_object(&key, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalStorage;

    fn row(
        customer: Option<&str>,
        vehicle: Option<&str>,
        pickup: Option<&str>,
        drop: Option<&str>,
    ) -> StagingBooking {
        StagingBooking {
            customer_id: customer.map(String::from),
            vehicle_type: vehicle.map(String::from),
            pickup_location: pickup.map(String::from),
            drop_location: drop.map(String::from),
            payment_method: Some("Cash".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn distinct_values_skip_null_and_empty() {
        let rows = vec![
            row(Some("C1"), Some("Sedan"), Some("Airport"), Some("Docks")),
            row(Some(""), None, Some("Airport"), None),
            row(Some("C2"), Some("Sedan"), None, Some("Uptown")),
        ];

        let customers = DimensionBuilder::distinct_values(DimensionKind::Customer, &rows);
        assert_eq!(customers.len(), 2);
        assert!(customers.contains("C1") && customers.contains("C2"));

        // drop-only locations still land in the shared namespace
        let locations = DimensionBuilder::distinct_values(DimensionKind::Location, &rows);
        assert_eq!(locations.len(), 3);
        assert!(locations.contains("Uptown"));
    }

    #[test]
    fn upsert_assigns_stable_keys_and_skips_existing() {
        let mut table = DimensionTable::empty(DimensionKind::Location);

        let first: BTreeSet<String> = ["Airport", "Docks"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let metrics = table.upsert(&first);
        assert_eq!(metrics.inserted, 2);
        assert_eq!(table.get("Airport"), Some(1));
        assert_eq!(table.get("Docks"), Some(2));

        // re-upserting with one new value touches nothing existing
        let second: BTreeSet<String> = ["Docks", "Uptown"].iter().map(|s| s.to_string()).collect();
        let metrics = table.upsert(&second);
        assert_eq!(metrics.inserted, 1);
        assert_eq!(metrics.existing, 1);
        assert_eq!(table.get("Docks"), Some(2));
        assert_eq!(table.get("Uptown"), Some(3));
    }

    #[test]
    fn natural_keys_are_case_sensitive() {
        let mut table = DimensionTable::empty(DimensionKind::Customer);
        let values: BTreeSet<String> = ["c1", "C1"].iter().map(|s| s.to_string()).collect();

        let metrics = table.upsert(&values);
        assert_eq!(metrics.inserted, 2);
        assert_ne!(table.get("c1"), table.get("C1"));
    }

    #[tokio::test]
    async fn build_is_idempotent_across_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn ObjectStorage> = Arc::new(LocalStorage::new(dir.path()).unwrap());
        let builder = DimensionBuilder::new(storage);

        let rows = vec![
            row(Some("C1"), Some("Sedan"), Some("Airport"), Some("Docks")),
            row(Some("C2"), Some("Bike"), Some("Docks"), Some("Airport")),
        ];

        let (table, metrics) = builder.build(DimensionKind::Location, &rows).await.unwrap();
        assert_eq!(metrics.inserted, 2);
        let airport_key = table.get("Airport").unwrap();

        // second build over the same input: everything already present,
        // keys unchanged after the reload from parquet
        let (table, metrics) = builder.build(DimensionKind::Location, &rows).await.unwrap();
        assert_eq!(metrics.inserted, 0);
        assert_eq!(metrics.existing, 2);
        assert_eq!(table.get("Airport"), Some(airport_key));
    }
}

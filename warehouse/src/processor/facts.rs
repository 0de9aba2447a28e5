use arrow::array::{
    Array, BooleanArray, Date32Array, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMillisecondArray,
};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, NaiveDate, Timelike, Utc};
use common::{Error, Result};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::schema::fact_bookings_schema;
use crate::processor::resolve::ResolvedBooking;
use crate::storage::{ObjectStorage, StorageManager};
use crate::utils::arrow::{read_parquet_batches, write_parquet_bytes};

/// Fact-load accounting for one pipeline run.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LoadMetrics {
    pub staging_rows: u64,
    pub inserted: u64,
    /// Idempotent no-ops: the booking id was already in the fact table.
    pub already_present: u64,
    pub unresolved: u64,
    pub missing_booking_id: u64,
    pub missing_datetime: u64,
}

/// One skipped staging row: which identity was affected and which fields
/// failed. Surfaced through the run manifest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadFailure {
    pub booking_id: Option<String>,
    pub missing_fields: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub metrics: LoadMetrics,
    pub failures: Vec<LoadFailure>,
}

struct FactRow {
    booking_id: String,
    booking_status: Option<String>,
    booking_datetime: DateTime<Utc>,
    customer_key: i64,
    vehicle_key: i64,
    pickup_location_key: i64,
    drop_location_key: i64,
    payment_method_key: i64,
    booking_value: Option<f64>,
    ride_distance: Option<f64>,
    driver_rating: Option<f64>,
    customer_rating: Option<f64>,
    is_cancelled: bool,
}

/// Appends resolved staging rows to the fact table, one row per unique
/// booking id. The ledger is seeded from the existing parts so re-runs are
/// no-ops, and claiming an id is a single atomic insert-if-absent so
/// parallel loading cannot double-insert.
pub struct FactLoader {
    storage: Arc<dyn ObjectStorage>,
    ledger: DashSet<String>,
}

impl FactLoader {
    pub async fn new(manager: &StorageManager) -> Result<Self> {
        let storage = manager.storage();
        let ledger = DashSet::new();

        for part in manager.list_fact_parts().await? {
            let data = storage.get_object(&part).await?;
            for batch in read_parquet_batches(data)? {
                let ids = batch
                    .column_by_name("booking_id")
                    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                    .ok_or_else(|| {
                        Error::SchemaMismatch(format!(
                            "fact part {} is missing a Utf8 booking_id column",
                            part
                        ))
                    })?;

                for i in 0..ids.len() {
                    if !ids.is_null(i) {
                        ledger.insert(ids.value(i).to_string());
                    }
                }
            }
        }

        info!(known = ledger.len(), "Seeded fact booking-id ledger");

        Ok(Self { storage, ledger })
    }

    pub fn known_bookings(&self) -> usize {
        self.ledger.len()
    }

    /// Atomic insert-if-absent on the booking-id ledger. Returns false when
    /// the id was already claimed.
    fn try_claim(&self, booking_id: &str) -> bool {
        self.ledger.insert(booking_id.to_string())
    }

    pub async fn load(&self, resolved: Vec<ResolvedBooking>) -> Result<LoadOutcome> {
        let mut outcome = LoadOutcome::default();
        outcome.metrics.staging_rows = resolved.len() as u64;
        let mut fresh = Vec::new();

        for item in resolved {
            let ResolvedBooking { row, keys } = item;

            let booking_id = match row.booking_id.as_deref() {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => {
                    outcome.metrics.missing_booking_id += 1;
                    outcome.failures.push(LoadFailure {
                        booking_id: None,
                        missing_fields: vec!["booking_id".to_string()],
                    });
                    continue;
                }
            };

            // Strict policy: a row enters the fact table only with every
            // surrogate key present.
            let missing = keys.missing_fields();
            if !missing.is_empty() {
                outcome.metrics.unresolved += 1;
                outcome.failures.push(LoadFailure {
                    booking_id: Some(booking_id),
                    missing_fields: missing.iter().map(|f| f.as_str().to_string()).collect(),
                });
                continue;
            }

            let booking_datetime = match row.booking_datetime {
                Some(dt) => dt,
                None => {
                    outcome.metrics.missing_datetime += 1;
                    outcome.failures.push(LoadFailure {
                        booking_id: Some(booking_id),
                        missing_fields: vec!["booking_datetime".to_string()],
                    });
                    continue;
                }
            };

            if !self.try_claim(&booking_id) {
                outcome.metrics.already_present += 1;
                continue;
            }

            fresh.push(FactRow {
                booking_id,
                booking_status: row.booking_status,
                booking_datetime,
                customer_key: keys.customer_key.unwrap_or_default(),
                vehicle_key: keys.vehicle_key.unwrap_or_default(),
                pickup_location_key: keys.pickup_location_key.unwrap_or_default(),
                drop_location_key: keys.drop_location_key.unwrap_or_default(),
                payment_method_key: keys.payment_method_key.unwrap_or_default(),
                booking_value: row.booking_value,
                ride_distance: row.ride_distance,
                driver_rating: row.driver_rating,
                customer_rating: row.customer_rating,
                is_cancelled: row.is_cancelled.unwrap_or(false),
            });
        }

        outcome.metrics.inserted = fresh.len() as u64;

        if outcome.metrics.unresolved > 0 {
            warn!(
                unresolved = outcome.metrics.unresolved,
                "Staging rows excluded by the all-keys-present policy"
            );
        }

        if fresh.is_empty() {
            info!("No new fact rows to write");
            return Ok(outcome);
        }

        let batch = build_fact_batch(&fresh)?;
        let data = write_parquet_bytes(&batch)?;
        let key = StorageManager::fact_part_key();
        self.storage.put_object(&key, &data).await?;

        info!(
            part = %key,
            inserted = outcome.metrics.inserted,
            already_present = outcome.metrics.already_present,
            "Fact part written"
        );

        Ok(outcome)
    }
}

fn build_fact_batch(rows: &[FactRow]) -> Result<RecordBatch> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .ok_or_else(|| Error::Other("Invalid epoch date".to_string()))?;
    let now_ms = Utc::now().timestamp_millis();

    let booking_ids: StringArray = rows.iter().map(|r| Some(r.booking_id.as_str())).collect();
    let statuses: StringArray = rows.iter().map(|r| r.booking_status.as_deref()).collect();
    let datetimes = TimestampMillisecondArray::from_iter_values(
        rows.iter().map(|r| r.booking_datetime.timestamp_millis()),
    );
    let dates = Date32Array::from_iter_values(rows.iter().map(|r| {
        r.booking_datetime
            .date_naive()
            .signed_duration_since(epoch)
            .num_days() as i32
    }));
    let hours =
        Int32Array::from_iter_values(rows.iter().map(|r| r.booking_datetime.hour() as i32));

    let customer_keys = Int64Array::from_iter_values(rows.iter().map(|r| r.customer_key));
    let vehicle_keys = Int64Array::from_iter_values(rows.iter().map(|r| r.vehicle_key));
    let pickup_keys = Int64Array::from_iter_values(rows.iter().map(|r| r.pickup_location_key));
    let drop_keys = Int64Array::from_iter_values(rows.iter().map(|r| r.drop_location_key));
    let payment_keys = Int64Array::from_iter_values(rows.iter().map(|r| r.payment_method_key));

    let booking_values: Float64Array = rows.iter().map(|r| r.booking_value).collect();
    let ride_distances: Float64Array = rows.iter().map(|r| r.ride_distance).collect();
    let driver_ratings: Float64Array = rows.iter().map(|r| r.driver_rating).collect();
    let customer_ratings: Float64Array = rows.iter().map(|r| r.customer_rating).collect();
    let cancelled: BooleanArray = rows.iter().map(|r| Some(r.is_cancelled)).collect();

    let created = TimestampMillisecondArray::from_iter_values(rows.iter().map(|_| now_ms));
    let updated = TimestampMillisecondArray::from_iter_values(rows.iter().map(|_| now_ms));

    let batch = RecordBatch::try_new(
        Arc::new(fact_bookings_schema()),
        vec![
            Arc::new(booking_ids),
            Arc::new(statuses),
            Arc::new(datetimes),
            Arc::new(dates),
            Arc::new(hours),
            Arc::new(customer_keys),
            Arc::new(vehicle_keys),
            Arc::new(pickup_keys),
            Arc::new(drop_keys),
            Arc::new(payment_keys),
            Arc::new(booking_values),
            Arc::new(ride_distances),
            Arc::new(driver_ratings),
            Arc::new(customer_ratings),
            Arc::new(cancelled),
            Arc::new(created),
            Arc::new(updated),
        ],
    )?;

    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::staging::StagingBooking;
    use crate::processor::resolve::ResolvedKeys;

    fn resolved(booking_id: Option<&str>, complete: bool) -> ResolvedBooking {
        let keys = if complete {
            ResolvedKeys {
                customer_key: Some(1),
                vehicle_key: Some(1),
                pickup_location_key: Some(1),
                drop_location_key: Some(2),
                payment_method_key: Some(1),
            }
        } else {
            ResolvedKeys {
                customer_key: Some(1),
                vehicle_key: Some(1),
                pickup_location_key: None,
                drop_location_key: Some(2),
                payment_method_key: Some(1),
            }
        };

        ResolvedBooking {
            row: StagingBooking {
                booking_id: booking_id.map(String::from),
                booking_datetime: DateTime::from_timestamp_millis(1_700_000_000_000),
                booking_status: Some("Success".to_string()),
                booking_value: Some(250.0),
                ride_distance: Some(10.0),
                is_cancelled: None,
                ..Default::default()
            },
            keys,
        }
    }

    async fn loader() -> (tempfile::TempDir, FactLoader) {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::new(dir.path()).unwrap();
        let loader = FactLoader::new(&manager).await.unwrap();
        (dir, loader)
    }

    #[tokio::test]
    async fn strict_policy_excludes_incomplete_rows() {
        let (_dir, loader) = loader().await;

        let outcome = loader
            .load(vec![
                resolved(Some("CNR001"), true),
                resolved(Some("CNR002"), false),
                resolved(None, true),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.metrics.staging_rows, 3);
        assert_eq!(outcome.metrics.inserted, 1);
        assert_eq!(outcome.metrics.unresolved, 1);
        assert_eq!(outcome.metrics.missing_booking_id, 1);

        let unresolved = outcome
            .failures
            .iter()
            .find(|f| f.booking_id.as_deref() == Some("CNR002"))
            .unwrap();
        assert_eq!(unresolved.missing_fields, vec!["pickup_location"]);
    }

    #[tokio::test]
    async fn reload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = StorageManager::new(dir.path()).unwrap();

        let loader = FactLoader::new(&manager).await.unwrap();
        let first = loader.load(vec![resolved(Some("CNR001"), true)]).await.unwrap();
        assert_eq!(first.metrics.inserted, 1);

        // fresh loader, ledger seeded from the part written above
        let loader = FactLoader::new(&manager).await.unwrap();
        assert_eq!(loader.known_bookings(), 1);

        let second = loader.load(vec![resolved(Some("CNR001"), true)]).await.unwrap();
        assert_eq!(second.metrics.inserted, 0);
        assert_eq!(second.metrics.already_present, 1);

        // no second part was written
        assert_eq!(manager.list_fact_parts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn duplicate_within_one_batch_is_claimed_once() {
        let (_dir, loader) = loader().await;

        let outcome = loader
            .load(vec![
                resolved(Some("CNR001"), true),
                resolved(Some("CNR001"), true),
            ])
            .await
            .unwrap();

        assert_eq!(outcome.metrics.inserted, 1);
        assert_eq!(outcome.metrics.already_present, 1);
    }

    #[test]
    fn cancellation_flag_coalesces_to_false() {
        let item = resolved(Some("CNR001"), true);
        assert_eq!(item.row.is_cancelled, None);

        let rows = vec![FactRow {
            booking_id: "CNR001".to_string(),
            booking_status: None,
            booking_datetime: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            customer_key: 1,
            vehicle_key: 1,
            pickup_location_key: 1,
            drop_location_key: 1,
            payment_method_key: 1,
            booking_value: None,
            ride_distance: None,
            driver_rating: None,
            customer_rating: None,
            is_cancelled: item.row.is_cancelled.unwrap_or(false),
        }];

        let batch = build_fact_batch(&rows).unwrap();
        let flags = batch
            .column_by_name("is_cancelled")
            .unwrap()
            .as_any()
            .downcast_ref::<BooleanArray>()
            .unwrap();
        assert!(!flags.value(0));
    }
}

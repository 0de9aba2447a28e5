use arrow::array::{
    Array, Date32Array, Float64Array, Int32Array, Int64Array, LargeStringArray, StringArray,
    StringViewArray,
};
use arrow::datatypes::DataType;
use arrow::record_batch::RecordBatch;
use chrono::{Duration, NaiveDate};
use common::{Error, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::models::reports::{
    BookingTotals, CancellationSummary, CustomerSpend, DailyTrend, HourlyTrend, LocationRides,
    OrphanSummary, PaymentRevenue, VehicleRevenue, round2,
};
use crate::processor::{LoadFailure, WarehouseProcessor};

/// The latest run's skipped-row report; the manifest doubles as the error
/// channel for the dashboard layer.
#[derive(Debug, Clone, Serialize)]
pub struct LoadFailureReport {
    pub run_id: String,
    pub missing_field_counts: BTreeMap<String, u64>,
    pub failures: Vec<LoadFailure>,
}

/// The fixed catalog of read-only aggregate queries. Every call runs
/// against the committed parquet files registered at construction time and
/// has no side effects, so reports may run concurrently with each other and
/// with further loads.
pub struct ReportingEngine {
    processor: Arc<WarehouseProcessor>,
}

impl ReportingEngine {
    pub async fn new(processor: Arc<WarehouseProcessor>) -> Result<Self> {
        processor.register_warehouse_tables().await?;
        Ok(Self { processor })
    }

    async fn collect(&self, sql: &str) -> Result<Vec<RecordBatch>> {
        let df = self.processor.execute_sql(sql).await?;
        df.collect().await.map_err(|e| e.into())
    }

    pub async fn booking_totals(&self) -> Result<BookingTotals> {
        let batches = self
            .collect(
                "SELECT COUNT(*) AS total_rides, \
                        SUM(booking_value) AS total_revenue, \
                        AVG(booking_value) AS average_fare, \
                        AVG(ride_distance) AS average_distance \
                 FROM fact_bookings",
            )
            .await?;
        let batch = single_row(&batches)?;

        Ok(BookingTotals {
            total_rides: i64_value(batch, 0, 0)?,
            total_revenue: round2(f64_value(batch, 1, 0)?),
            average_fare: round2(f64_value(batch, 2, 0)?),
            average_distance: round2(f64_value(batch, 3, 0)?),
        })
    }

    pub async fn cancellation_summary(&self) -> Result<CancellationSummary> {
        let batches = self
            .collect(
                "SELECT COUNT(*) AS total_rides, \
                        SUM(CASE WHEN is_cancelled THEN 1 ELSE 0 END) AS cancelled_rides \
                 FROM fact_bookings",
            )
            .await?;
        let batch = single_row(&batches)?;

        let total_rides = i64_value(batch, 0, 0)?;
        let cancelled_rides = i64_value(batch, 1, 0)?;
        let cancellation_rate = if total_rides > 0 {
            round2(cancelled_rides as f64 * 100.0 / total_rides as f64)
        } else {
            0.0
        };

        Ok(CancellationSummary {
            total_rides,
            cancelled_rides,
            cancellation_rate,
        })
    }

    /// Top-N pickup locations by ride count. Tie-break: descending count,
    /// then ascending location name, so a given fact table always ranks the
    /// same way.
    pub async fn top_pickup_locations(&self, n: usize) -> Result<Vec<LocationRides>> {
        let sql = format!(
            "SELECT l.natural_key AS location, COUNT(*) AS rides \
             FROM fact_bookings f \
             JOIN locations l ON f.pickup_location_key = l.surrogate_key \
             GROUP BY l.natural_key \
             ORDER BY rides DESC, location ASC \
             LIMIT {}",
            n
        );
        let batches = self.collect(&sql).await?;

        each_row(&batches, |batch, row| {
            Ok(LocationRides {
                location: string_value(batch, 0, row)?,
                rides: i64_value(batch, 1, row)?,
            })
        })
    }

    pub async fn revenue_by_vehicle(&self) -> Result<Vec<VehicleRevenue>> {
        let batches = self
            .collect(
                "SELECT v.natural_key AS vehicle_type, \
                        SUM(f.booking_value) AS revenue, \
                        AVG(f.booking_value) AS average_fare, \
                        COUNT(*) AS rides \
                 FROM fact_bookings f \
                 JOIN vehicles v ON f.vehicle_key = v.surrogate_key \
                 GROUP BY v.natural_key \
                 ORDER BY revenue DESC, vehicle_type ASC",
            )
            .await?;

        each_row(&batches, |batch, row| {
            Ok(VehicleRevenue {
                vehicle_type: string_value(batch, 0, row)?,
                revenue: round2(f64_value(batch, 1, row)?),
                average_fare: round2(f64_value(batch, 2, row)?),
                rides: i64_value(batch, 3, row)?,
            })
        })
    }

    pub async fn top_customers(&self, n: usize) -> Result<Vec<CustomerSpend>> {
        let sql = format!(
            "SELECT c.natural_key AS customer, \
                    SUM(f.booking_value) AS total_spend, \
                    COUNT(*) AS rides \
             FROM fact_bookings f \
             JOIN customers c ON f.customer_key = c.surrogate_key \
             GROUP BY c.natural_key \
             ORDER BY total_spend DESC, customer ASC \
             LIMIT {}",
            n
        );
        let batches = self.collect(&sql).await?;

        each_row(&batches, |batch, row| {
            Ok(CustomerSpend {
                customer: string_value(batch, 0, row)?,
                total_spend: round2(f64_value(batch, 1, row)?),
                rides: i64_value(batch, 2, row)?,
            })
        })
    }

    pub async fn daily_trend(&self) -> Result<Vec<DailyTrend>> {
        let batches = self
            .collect(
                "SELECT booking_date, COUNT(*) AS rides, SUM(booking_value) AS revenue \
                 FROM fact_bookings \
                 GROUP BY booking_date \
                 ORDER BY booking_date ASC",
            )
            .await?;

        each_row(&batches, |batch, row| {
            Ok(DailyTrend {
                date: date_value(batch, 0, row)?,
                rides: i64_value(batch, 1, row)?,
                revenue: round2(f64_value(batch, 2, row)?),
            })
        })
    }

    pub async fn hourly_trend(&self) -> Result<Vec<HourlyTrend>> {
        let batches = self
            .collect(
                "SELECT booking_hour, COUNT(*) AS rides, SUM(booking_value) AS revenue \
                 FROM fact_bookings \
                 GROUP BY booking_hour \
                 ORDER BY booking_hour ASC",
            )
            .await?;

        each_row(&batches, |batch, row| {
            Ok(HourlyTrend {
                hour: i32_value(batch, 0, row)?,
                rides: i64_value(batch, 1, row)?,
                revenue: round2(f64_value(batch, 2, row)?),
            })
        })
    }

    pub async fn revenue_by_payment_method(&self) -> Result<Vec<PaymentRevenue>> {
        let batches = self
            .collect(
                "SELECT pm.natural_key AS payment_method, \
                        SUM(f.booking_value) AS revenue, \
                        COUNT(*) AS rides \
                 FROM fact_bookings f \
                 JOIN payment_methods pm ON f.payment_method_key = pm.surrogate_key \
                 GROUP BY pm.natural_key \
                 ORDER BY revenue DESC, payment_method ASC",
            )
            .await?;

        each_row(&batches, |batch, row| {
            Ok(PaymentRevenue {
                payment_method: string_value(batch, 0, row)?,
                revenue: round2(f64_value(batch, 1, row)?),
                rides: i64_value(batch, 2, row)?,
            })
        })
    }

    /// Referential-integrity diagnostic: fact rows whose surrogate keys
    /// have no dimension row. Every count should be zero after a load.
    pub async fn orphan_foreign_keys(&self) -> Result<OrphanSummary> {
        let batches = self
            .collect(
                "SELECT \
                    SUM(CASE WHEN c.surrogate_key IS NULL THEN 1 ELSE 0 END) AS customer_orphans, \
                    SUM(CASE WHEN v.surrogate_key IS NULL THEN 1 ELSE 0 END) AS vehicle_orphans, \
                    SUM(CASE WHEN pl.surrogate_key IS NULL THEN 1 ELSE 0 END) AS pickup_location_orphans, \
                    SUM(CASE WHEN dl.surrogate_key IS NULL THEN 1 ELSE 0 END) AS drop_location_orphans, \
                    SUM(CASE WHEN pm.surrogate_key IS NULL THEN 1 ELSE 0 END) AS payment_method_orphans \
                 FROM fact_bookings f \
                 LEFT JOIN customers c ON f.customer_key = c.surrogate_key \
                 LEFT JOIN vehicles v ON f.vehicle_key = v.surrogate_key \
                 LEFT JOIN locations pl ON f.pickup_location_key = pl.surrogate_key \
                 LEFT JOIN locations dl ON f.drop_location_key = dl.surrogate_key \
                 LEFT JOIN payment_methods pm ON f.payment_method_key = pm.surrogate_key",
            )
            .await?;
        let batch = single_row(&batches)?;

        Ok(OrphanSummary {
            customer_orphans: i64_value(batch, 0, 0)?,
            vehicle_orphans: i64_value(batch, 1, 0)?,
            pickup_location_orphans: i64_value(batch, 2, 0)?,
            drop_location_orphans: i64_value(batch, 3, 0)?,
            payment_method_orphans: i64_value(batch, 4, 0)?,
        })
    }

    /// The latest run's skipped rows, straight from the manifest registry.
    pub async fn load_failures(&self) -> Result<Option<LoadFailureReport>> {
        let Some(manifest) = self
            .processor
            .manifest_registry()
            .latest_manifest()
            .await?
        else {
            return Ok(None);
        };

        Ok(Some(LoadFailureReport {
            run_id: manifest.run_id.clone(),
            missing_field_counts: manifest.missing_field_counts(),
            failures: manifest.failures,
        }))
    }
}

fn single_row(batches: &[RecordBatch]) -> Result<&RecordBatch> {
    batches
        .iter()
        .find(|b| b.num_rows() > 0)
        .ok_or_else(|| Error::Other("Aggregate query returned no rows".to_string()))
}

fn each_row<T>(
    batches: &[RecordBatch],
    mut f: impl FnMut(&RecordBatch, usize) -> Result<T>,
) -> Result<Vec<T>> {
    let mut rows = Vec::new();
    for batch in batches {
        for row in 0..batch.num_rows() {
            rows.push(f(batch, row)?);
        }
    }
    Ok(rows)
}

/// Null-safe Int64 extraction; aggregate nulls (empty input) read as 0.
fn i64_value(batch: &RecordBatch, col: usize, row: usize) -> Result<i64> {
    let array = batch
        .column(col)
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| Error::Other(format!("Column {} is not Int64", col)))?;

    if array.is_null(row) {
        return Ok(0);
    }
    Ok(array.value(row))
}

fn i32_value(batch: &RecordBatch, col: usize, row: usize) -> Result<i32> {
    let array = batch
        .column(col)
        .as_any()
        .downcast_ref::<Int32Array>()
        .ok_or_else(|| Error::Other(format!("Column {} is not Int32", col)))?;

    if array.is_null(row) {
        return Ok(0);
    }
    Ok(array.value(row))
}

/// Null-safe Float64 extraction; SUM/AVG over empty input read as 0.0.
fn f64_value(batch: &RecordBatch, col: usize, row: usize) -> Result<f64> {
    let array = batch
        .column(col)
        .as_any()
        .downcast_ref::<Float64Array>()
        .ok_or_else(|| Error::Other(format!("Column {} is not Float64", col)))?;

    if array.is_null(row) {
        return Ok(0.0);
    }
    Ok(array.value(row))
}

fn string_value(batch: &RecordBatch, col: usize, row: usize) -> Result<String> {
    let array = batch.column(col);
    match array.data_type() {
        DataType::Utf8 => {
            let arr = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::Other("Failed to downcast to StringArray".to_string()))?;
            Ok(arr.value(row).to_string())
        }
        DataType::LargeUtf8 => {
            let arr = array
                .as_any()
                .downcast_ref::<LargeStringArray>()
                .ok_or_else(|| {
                    Error::Other("Failed to downcast to LargeStringArray".to_string())
                })?;
            Ok(arr.value(row).to_string())
        }
        DataType::Utf8View => {
            let arr = array
                .as_any()
                .downcast_ref::<StringViewArray>()
                .ok_or_else(|| {
                    Error::Other("Failed to downcast to StringViewArray".to_string())
                })?;
            Ok(arr.value(row).to_string())
        }
        other => Err(Error::SchemaMismatch(format!(
            "Unsupported string column type: {:?}",
            other
        ))),
    }
}

fn date_value(batch: &RecordBatch, col: usize, row: usize) -> Result<String> {
    let array = batch
        .column(col)
        .as_any()
        .downcast_ref::<Date32Array>()
        .ok_or_else(|| Error::Other(format!("Column {} is not Date32", col)))?;

    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
        .ok_or_else(|| Error::Other("Invalid epoch date".to_string()))?;
    let date = epoch + Duration::days(i64::from(array.value(row)));

    Ok(date.format("%Y-%m-%d").to_string())
}

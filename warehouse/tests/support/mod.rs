use arrow::array::{BooleanArray, Float64Array, StringArray, TimestampMillisecondArray};
use arrow::record_batch::RecordBatch;
use chrono::{TimeZone, Utc};
use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use std::path::Path;
use std::sync::Arc;

use common::config::{PipelineConfig, Settings, StorageSettings};
use warehouse::models::schema::staging_bookings_schema;

/// One staging row for test fixtures; `None` encodes a null cell.
#[derive(Debug, Clone)]
pub struct Booking {
    pub booking_id: Option<String>,
    pub status: Option<String>,
    pub datetime_ms: Option<i64>,
    pub customer: Option<String>,
    pub vehicle: Option<String>,
    pub pickup: Option<String>,
    pub drop: Option<String>,
    pub payment: Option<String>,
    pub value: Option<f64>,
    pub distance: Option<f64>,
    pub driver_rating: Option<f64>,
    pub customer_rating: Option<f64>,
    pub cancelled: Option<bool>,
}

impl Booking {
    pub fn new(id: &str) -> Self {
        Self {
            booking_id: Some(id.to_string()),
            status: Some("Success".to_string()),
            datetime_ms: Some(ms(2024, 1, 15, 9)),
            customer: Some("C1".to_string()),
            vehicle: Some("Sedan".to_string()),
            pickup: Some("Airport".to_string()),
            drop: Some("Docks".to_string()),
            payment: Some("Cash".to_string()),
            value: Some(100.0),
            distance: Some(10.0),
            driver_rating: Some(4.5),
            customer_rating: Some(4.0),
            cancelled: Some(false),
        }
    }

    pub fn pickup(mut self, location: &str) -> Self {
        self.pickup = Some(location.to_string());
        self
    }

    pub fn cancelled(mut self, flag: bool) -> Self {
        self.cancelled = Some(flag);
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn at(mut self, year: i32, month: u32, day: u32, hour: u32) -> Self {
        self.datetime_ms = Some(ms(year, month, day, hour));
        self
    }
}

pub fn ms(year: i32, month: u32, day: u32, hour: u32) -> i64 {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .unwrap()
        .timestamp_millis()
}

pub fn write_staging_file(path: &Path, rows: &[Booking]) {
    let schema = Arc::new(staging_bookings_schema());

    let batch = RecordBatch::try_new(
        schema.clone(),
        vec![
            Arc::new(
                rows.iter()
                    .map(|r| r.booking_id.as_deref())
                    .collect::<StringArray>(),
            ),
            Arc::new(
                rows.iter()
                    .map(|r| r.status.as_deref())
                    .collect::<StringArray>(),
            ),
            Arc::new(
                rows.iter()
                    .map(|r| r.datetime_ms)
                    .collect::<TimestampMillisecondArray>(),
            ),
            Arc::new(
                rows.iter()
                    .map(|r| r.customer.as_deref())
                    .collect::<StringArray>(),
            ),
            Arc::new(
                rows.iter()
                    .map(|r| r.vehicle.as_deref())
                    .collect::<StringArray>(),
            ),
            Arc::new(
                rows.iter()
                    .map(|r| r.pickup.as_deref())
                    .collect::<StringArray>(),
            ),
            Arc::new(
                rows.iter()
                    .map(|r| r.drop.as_deref())
                    .collect::<StringArray>(),
            ),
            Arc::new(
                rows.iter()
                    .map(|r| r.payment.as_deref())
                    .collect::<StringArray>(),
            ),
            Arc::new(rows.iter().map(|r| r.value).collect::<Float64Array>()),
            Arc::new(rows.iter().map(|r| r.distance).collect::<Float64Array>()),
            Arc::new(
                rows.iter()
                    .map(|r| r.driver_rating)
                    .collect::<Float64Array>(),
            ),
            Arc::new(
                rows.iter()
                    .map(|r| r.customer_rating)
                    .collect::<Float64Array>(),
            ),
            Arc::new(rows.iter().map(|r| r.cancelled).collect::<BooleanArray>()),
        ],
    )
    .unwrap();

    let file = std::fs::File::create(path).unwrap();
    let props = WriterProperties::builder().build();
    let mut writer = ArrowWriter::try_new(file, schema, Some(props)).unwrap();
    writer.write(&batch).unwrap();
    writer.close().unwrap();
}

pub fn settings(root: &Path) -> Settings {
    Settings {
        storage: StorageSettings {
            root: root.display().to_string(),
        },
        pipeline: PipelineConfig {
            batch_size: 1024,
            top_n: 10,
        },
    }
}

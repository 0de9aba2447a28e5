use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int64Array, LargeStringArray,
    StringArray, StringViewArray, TimestampMicrosecondArray, TimestampMillisecondArray,
    TimestampSecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use common::{Error, Result};

/// One denormalized staging row, decoded out of the Arrow representation.
/// Everything is optional here; the dimension builder and fact loader apply
/// the actual presence rules.
#[derive(Debug, Clone, Default)]
pub struct StagingBooking {
    pub booking_id: Option<String>,
    pub booking_status: Option<String>,
    pub booking_datetime: Option<DateTime<Utc>>,
    pub customer_id: Option<String>,
    pub vehicle_type: Option<String>,
    pub pickup_location: Option<String>,
    pub drop_location: Option<String>,
    pub payment_method: Option<String>,
    pub booking_value: Option<f64>,
    pub ride_distance: Option<f64>,
    pub driver_rating: Option<f64>,
    pub customer_rating: Option<f64>,
    pub is_cancelled: Option<bool>,
}

impl StagingBooking {
    pub fn from_batches(batches: &[RecordBatch]) -> Result<Vec<StagingBooking>> {
        let mut rows = Vec::new();

        for batch in batches {
            let booking_id = column(batch, "booking_id")?;
            let booking_status = column(batch, "booking_status")?;
            let booking_datetime = column(batch, "booking_datetime")?;
            let customer_id = column(batch, "customer_id")?;
            let vehicle_type = column(batch, "vehicle_type")?;
            let pickup_location = column(batch, "pickup_location")?;
            let drop_location = column(batch, "drop_location")?;
            let payment_method = column(batch, "payment_method")?;
            let booking_value = column(batch, "booking_value")?;
            let ride_distance = column(batch, "ride_distance")?;
            let driver_ratings = column(batch, "driver_ratings")?;
            let customer_rating = column(batch, "customer_rating")?;
            let is_cancelled = column(batch, "is_cancelled")?;

            for i in 0..batch.num_rows() {
                rows.push(StagingBooking {
                    booking_id: string_at(booking_id, i)?,
                    booking_status: string_at(booking_status, i)?,
                    booking_datetime: timestamp_at(booking_datetime, i)?,
                    customer_id: string_at(customer_id, i)?,
                    vehicle_type: string_at(vehicle_type, i)?,
                    pickup_location: string_at(pickup_location, i)?,
                    drop_location: string_at(drop_location, i)?,
                    payment_method: string_at(payment_method, i)?,
                    booking_value: f64_at(booking_value, i)?,
                    ride_distance: f64_at(ride_distance, i)?,
                    driver_rating: f64_at(driver_ratings, i)?,
                    customer_rating: f64_at(customer_rating, i)?,
                    is_cancelled: bool_at(is_cancelled, i)?,
                });
            }
        }

        Ok(rows)
    }

    /// Best-effort measure validation: a malformed measure never rejects a
    /// row, it is nulled and counted so the manifest can report how much was
    /// dropped. Ratings are bounded to the 0..=5 scale.
    pub fn sanitize_measures(&mut self) -> u32 {
        let mut nulled = 0;

        if let Some(v) = self.booking_value {
            if !v.is_finite() || v < 0.0 {
                self.booking_value = None;
                nulled += 1;
            }
        }
        if let Some(v) = self.ride_distance {
            if !v.is_finite() || v < 0.0 {
                self.ride_distance = None;
                nulled += 1;
            }
        }
        if let Some(v) = self.driver_rating {
            if !v.is_finite() || !(0.0..=5.0).contains(&v) {
                self.driver_rating = None;
                nulled += 1;
            }
        }
        if let Some(v) = self.customer_rating {
            if !v.is_finite() || !(0.0..=5.0).contains(&v) {
                self.customer_rating = None;
                nulled += 1;
            }
        }

        nulled
    }
}

fn column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a ArrayRef> {
    batch
        .column_by_name(name)
        .ok_or_else(|| Error::MissingColumn(format!("staging column '{}' not found", name)))
}

fn string_at(array: &ArrayRef, row: usize) -> Result<Option<String>> {
    if array.is_null(row) {
        return Ok(None);
    }

    match array.data_type() {
        DataType::Utf8 => {
            let arr = array
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or_else(|| Error::Other("Failed to downcast to StringArray".to_string()))?;
            Ok(Some(arr.value(row).to_string()))
        }
        DataType::LargeUtf8 => {
            let arr = array
                .as_any()
                .downcast_ref::<LargeStringArray>()
                .ok_or_else(|| {
                    Error::Other("Failed to downcast to LargeStringArray".to_string())
                })?;
            Ok(Some(arr.value(row).to_string()))
        }
        DataType::Utf8View => {
            let arr = array
                .as_any()
                .downcast_ref::<StringViewArray>()
                .ok_or_else(|| {
                    Error::Other("Failed to downcast to StringViewArray".to_string())
                })?;
            Ok(Some(arr.value(row).to_string()))
        }
        other => Err(Error::SchemaMismatch(format!(
            "Unsupported string column type: {:?}",
            other
        ))),
    }
}

fn f64_at(array: &ArrayRef, row: usize) -> Result<Option<f64>> {
    if array.is_null(row) {
        return Ok(None);
    }

    match array.data_type() {
        DataType::Float64 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| Error::Other("Failed to downcast to Float64Array".to_string()))?;
            Ok(Some(arr.value(row)))
        }
        DataType::Float32 => {
            let arr = array
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or_else(|| Error::Other("Failed to downcast to Float32Array".to_string()))?;
            Ok(Some(arr.value(row) as f64))
        }
        DataType::Int64 => {
            let arr = array
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| Error::Other("Failed to downcast to Int64Array".to_string()))?;
            Ok(Some(arr.value(row) as f64))
        }
        other => Err(Error::SchemaMismatch(format!(
            "Unsupported numeric column type: {:?}",
            other
        ))),
    }
}

fn timestamp_at(array: &ArrayRef, row: usize) -> Result<Option<DateTime<Utc>>> {
    if array.is_null(row) {
        return Ok(None);
    }

    let millis = match array.data_type() {
        DataType::Timestamp(TimeUnit::Millisecond, _) => {
            let arr = array
                .as_any()
                .downcast_ref::<TimestampMillisecondArray>()
                .ok_or_else(|| {
                    Error::Other("Failed to downcast to TimestampMillisecondArray".to_string())
                })?;
            arr.value(row)
        }
        DataType::Timestamp(TimeUnit::Microsecond, _) => {
            let arr = array
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .ok_or_else(|| {
                    Error::Other("Failed to downcast to TimestampMicrosecondArray".to_string())
                })?;
            arr.value(row) / 1_000
        }
        DataType::Timestamp(TimeUnit::Second, _) => {
            let arr = array
                .as_any()
                .downcast_ref::<TimestampSecondArray>()
                .ok_or_else(|| {
                    Error::Other("Failed to downcast to TimestampSecondArray".to_string())
                })?;
            arr.value(row) * 1_000
        }
        other => {
            return Err(Error::SchemaMismatch(format!(
                "Unsupported timestamp column type: {:?}",
                other
            )));
        }
    };

    Ok(DateTime::from_timestamp_millis(millis))
}

fn bool_at(array: &ArrayRef, row: usize) -> Result<Option<bool>> {
    if array.is_null(row) {
        return Ok(None);
    }

    match array.data_type() {
        DataType::Boolean => {
            let arr = array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or_else(|| Error::Other("Failed to downcast to BooleanArray".to_string()))?;
            Ok(Some(arr.value(row)))
        }
        other => Err(Error::SchemaMismatch(format!(
            "Unsupported boolean column type: {:?}",
            other
        ))),
    }
}

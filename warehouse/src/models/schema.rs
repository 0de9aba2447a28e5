use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use lazy_static::lazy_static;

lazy_static! {
    static ref STAGING_BOOKINGS_SCHEMA: Schema = staging_bookings_schema();
    static ref DIMENSION_SCHEMA: Schema = dimension_schema();
    static ref FACT_BOOKINGS_SCHEMA: Schema = fact_bookings_schema();
}

/// Schema of the denormalized staging table produced by the upstream
/// cleaning step. Every column is nullable at this layer; the loaders
/// decide what a missing value means.
pub fn staging_bookings_schema() -> Schema {
    Schema::new(vec![
        Field::new("booking_id", DataType::Utf8, true),
        Field::new("booking_status", DataType::Utf8, true),
        Field::new(
            "booking_datetime",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            true,
        ),
        Field::new("customer_id", DataType::Utf8, true),
        Field::new("vehicle_type", DataType::Utf8, true),
        Field::new("pickup_location", DataType::Utf8, true),
        Field::new("drop_location", DataType::Utf8, true),
        Field::new("payment_method", DataType::Utf8, true),
        Field::new("booking_value", DataType::Float64, true),
        Field::new("ride_distance", DataType::Float64, true),
        Field::new("driver_ratings", DataType::Float64, true),
        Field::new("customer_rating", DataType::Float64, true),
        Field::new("is_cancelled", DataType::Boolean, true),
    ])
}

/// Shared layout of all four dimension tables. Natural keys are unique
/// within a dimension; surrogate keys are never reassigned.
pub fn dimension_schema() -> Schema {
    Schema::new(vec![
        Field::new("surrogate_key", DataType::Int64, false),
        Field::new("natural_key", DataType::Utf8, false),
        Field::new(
            "created_at",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
    ])
}

/// The central fact table. `booking_date` and `booking_hour` are
/// materialized from `booking_datetime` at load time so the trend queries
/// stay plain GROUP BYs.
pub fn fact_bookings_schema() -> Schema {
    Schema::new(vec![
        Field::new("booking_id", DataType::Utf8, false),
        Field::new("booking_status", DataType::Utf8, true),
        Field::new(
            "booking_datetime",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new("booking_date", DataType::Date32, false),
        Field::new("booking_hour", DataType::Int32, false),
        Field::new("customer_key", DataType::Int64, false),
        Field::new("vehicle_key", DataType::Int64, false),
        Field::new("pickup_location_key", DataType::Int64, false),
        Field::new("drop_location_key", DataType::Int64, false),
        Field::new("payment_method_key", DataType::Int64, false),
        Field::new("booking_value", DataType::Float64, true),
        Field::new("ride_distance", DataType::Float64, true),
        Field::new("driver_rating", DataType::Float64, true),
        Field::new("customer_rating", DataType::Float64, true),
        Field::new("is_cancelled", DataType::Boolean, false),
        Field::new(
            "created_at",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
        Field::new(
            "updated_at",
            DataType::Timestamp(TimeUnit::Millisecond, None),
            false,
        ),
    ])
}

pub enum WarehouseSchema {
    Staging,
    Dimension,
    Fact,
}

pub fn get_warehouse_schema(version: WarehouseSchema) -> &'static Schema {
    match version {
        WarehouseSchema::Staging => &STAGING_BOOKINGS_SCHEMA,
        WarehouseSchema::Dimension => &DIMENSION_SCHEMA,
        WarehouseSchema::Fact => &FACT_BOOKINGS_SCHEMA,
    }
}

use serde::Serialize;

// Result rows for the fixed reporting catalog. These are the shapes the
// external dashboard layer consumes; monetary and ratio values are already
// rounded to 2 decimal places.

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BookingTotals {
    pub total_rides: i64,
    pub total_revenue: f64,
    pub average_fare: f64,
    pub average_distance: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CancellationSummary {
    pub total_rides: i64,
    pub cancelled_rides: i64,
    /// Percentage in 0..=100.
    pub cancellation_rate: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocationRides {
    pub location: String,
    pub rides: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VehicleRevenue {
    pub vehicle_type: String,
    pub revenue: f64,
    pub average_fare: f64,
    pub rides: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CustomerSpend {
    pub customer: String,
    pub total_spend: f64,
    pub rides: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DailyTrend {
    /// Calendar date formatted as YYYY-MM-DD.
    pub date: String,
    pub rides: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HourlyTrend {
    /// Hour of day, 0..=23.
    pub hour: i32,
    pub rides: i64,
    pub revenue: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct PaymentRevenue {
    pub payment_method: String,
    pub revenue: f64,
    pub rides: i64,
}

/// Join-based referential-integrity check; every count should be zero.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
pub struct OrphanSummary {
    pub customer_orphans: i64,
    pub vehicle_orphans: i64,
    pub pickup_location_orphans: i64,
    pub drop_location_orphans: i64,
    pub payment_method_orphans: i64,
}

impl OrphanSummary {
    pub fn is_clean(&self) -> bool {
        self.customer_orphans == 0
            && self.vehicle_orphans == 0
            && self.pickup_location_orphans == 0
            && self.drop_location_orphans == 0
            && self.payment_method_orphans == 0
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub mod reports;
pub mod warehouse;

pub use reports::{LoadFailureReport, ReportingEngine};
pub use warehouse::WarehouseService;

pub mod reports;
pub mod schema;
pub mod staging;

//! Retail Module
//!
//! Per-shop stock levels and the sales that draw them down.
//!
//! A stock row is unique per (shop, book). Selling takes copies out of that
//! row and records a sale in the same transaction; a sale larger than the
//! stock on hand is rejected without touching either table.

mod handler;
mod lib;
mod routes;

pub use lib::*;

pub use routes::routes;

pub fn migrations() -> &'static [(&'static str, &'static str)] {
    &[("retail_001_schema.sql", include_str!("migrations/001_schema.sql"))]
}

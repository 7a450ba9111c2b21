//! Spreadsheet ingestion of real-estate deal KPIs.
//!
//! Rows from a [`source::SpreadsheetSource`] are normalized against a
//! connection's column mapping into monthly KPI data points and upserted
//! per deal. Entry points live in [`import`]; the SQLite store in
//! [`repo::sqlite`].

pub mod cell;
pub mod coerce;
pub mod connection;
pub mod db;
pub mod import;
pub mod kpi;
pub mod kpi_catalog;
pub mod mapping;
pub mod models;
pub mod normalize;
pub mod repo;
pub mod sample;
pub mod schema;
pub mod source;
pub mod tz;

//! Helpers shared by the workspace binaries: environment lookups and the
//! settings file that backs the `kpi-ingest` CLI.

pub mod config;
pub mod env;

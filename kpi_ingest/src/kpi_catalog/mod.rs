//! KPI catalog subsystem.
//!
//! The catalog is a TOML file describing the KPI definitions the platform
//! knows about (code, display name, category, format). See
//! [`crate::kpi_catalog::config`] for the model and loaders, and
//! [`crate::kpi_catalog::sync`] for writing it into `kpi_definitions`.

pub mod config;
pub mod sync;

pub use config::{KpiCatalog, default_catalog, load_catalog_path, load_catalog_str};
pub use sync::{CatalogDiff, SyncOptions, sync_catalog};

//! Catalog configuration: parsing, normalization, and loading.
//!
//! ```toml
//! [kpis.total_revenue]
//! name = "Total Revenue"
//! category = "income"
//! format = "currency"
//! ```
//!
//! Normalization lowercases and trims codes, turns spaces and hyphens into
//! underscores, trims names, and lowercases categories (empty → `general`).
//! Codes that collide after normalization are an error.

use anyhow::{Context, bail};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use toml::from_str;

use crate::kpi::{KpiFormat, NewKpiDefinition};

const DEFAULT_CATALOG: &str = include_str!("../../catalog/default_kpis.toml");
const DEFAULT_CATEGORY: &str = "general";

/// Top-level catalog mapping KPI codes to their configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KpiCatalog {
    /// Map of KPI code -> configuration, in file order.
    #[serde(default)]
    pub kpis: IndexMap<String, KpiCfg>,
}

/// Configuration of one KPI.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KpiCfg {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub format: KpiFormat,
}

impl KpiCatalog {
    /// Definitions in catalog order, ready for upsert.
    pub fn definitions(&self) -> Vec<NewKpiDefinition> {
        self.kpis
            .iter()
            .map(|(code, cfg)| NewKpiDefinition {
                code: code.clone(),
                name: cfg.name.clone(),
                category: cfg.category.clone(),
                format: cfg.format,
            })
            .collect()
    }
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Codes that changed when lowercasing/trimming.
    pub codes_renamed: usize,
    /// Entries whose empty category became `general`.
    pub categories_defaulted: usize,
}

fn normalize_code(raw: &str) -> String {
    raw.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// Normalize a catalog in place.
///
/// Errors:
/// - empty code or name after trimming
/// - code with characters outside `[a-z0-9_]`
/// - duplicate code after normalization
pub fn normalize_catalog(cat: &mut KpiCatalog) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();
    let mut rebuilt: IndexMap<String, KpiCfg> = IndexMap::new();

    for (raw_code, mut cfg) in std::mem::take(&mut cat.kpis) {
        let code = normalize_code(&raw_code);
        if code.is_empty() {
            bail!("kpi code cannot be empty after trimming");
        }
        if !code.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            bail!("invalid kpi code: {raw_code:?}");
        }
        if code != raw_code {
            report.codes_renamed += 1;
        }
        if rebuilt.contains_key(&code) {
            bail!("duplicate kpi code after normalization: {code}");
        }

        cfg.name = cfg.name.trim().to_string();
        if cfg.name.is_empty() {
            bail!("kpi {code}: name cannot be empty");
        }
        cfg.category = cfg.category.trim().to_lowercase();
        if cfg.category.is_empty() {
            cfg.category = DEFAULT_CATEGORY.to_string();
            report.categories_defaulted += 1;
        }
        rebuilt.insert(code, cfg);
    }

    cat.kpis = rebuilt;
    Ok(report)
}

/// Parse and normalize a catalog from a TOML string.
pub fn load_catalog_str(toml_str: &str) -> anyhow::Result<KpiCatalog> {
    let mut cat: KpiCatalog = from_str(toml_str).context("failed to parse catalog TOML")?;
    let report = normalize_catalog(&mut cat).context("normalize_catalog failed")?;
    tracing::debug!(?report, kpis = cat.kpis.len(), "catalog loaded");
    Ok(cat)
}

/// Read a catalog TOML file from disk, parse, and normalize it.
pub fn load_catalog_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<KpiCatalog> {
    let text = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("read catalog file {}", path.as_ref().display()))?;
    load_catalog_str(&text)
}

/// The catalog bundled with the crate (covers every code the sample data maps to).
pub fn default_catalog() -> anyhow::Result<KpiCatalog> {
    load_catalog_str(DEFAULT_CATALOG)
}

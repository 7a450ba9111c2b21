//! KPI vocabulary: definitions, planning dimensions, periods and data points.

use std::{collections::HashMap, fmt, str::FromStr};

use anyhow::bail;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Planning dimension of a value, orthogonal to the KPI itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Realized figures.
    Actual,
    /// Re-estimated expectation.
    Forecast,
    /// Plan set at the start of the period.
    Budget,
}

impl DataType {
    /// All dimensions in canonical order.
    pub const ALL: [DataType; 3] = [DataType::Actual, DataType::Forecast, DataType::Budget];

    /// Database / wire code.
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Actual => "actual",
            DataType::Forecast => "forecast",
            DataType::Budget => "budget",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "actual" => Ok(DataType::Actual),
            "forecast" => Ok(DataType::Forecast),
            "budget" => Ok(DataType::Budget),
            _ => bail!("unknown data_type: {s}"),
        }
    }
}

/// Period granularity of a stored value. The ingestion pipeline only emits
/// [`PeriodType::Monthly`]; the others exist for rows written by other tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    /// Calendar month, keyed by its first day.
    Monthly,
    /// Calendar quarter.
    Quarterly,
    /// Calendar year.
    Annual,
}

impl PeriodType {
    /// Database / wire code.
    pub const fn as_str(self) -> &'static str {
        match self {
            PeriodType::Monthly => "monthly",
            PeriodType::Quarterly => "quarterly",
            PeriodType::Annual => "annual",
        }
    }
}

impl FromStr for PeriodType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monthly" => Ok(PeriodType::Monthly),
            "quarterly" => Ok(PeriodType::Quarterly),
            "annual" => Ok(PeriodType::Annual),
            _ => bail!("unknown period_type: {s}"),
        }
    }
}

/// Display format hint of a KPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KpiFormat {
    /// Money amount.
    Currency,
    /// Percentage points (94.5 means 94.5%).
    Percentage,
    /// Plain number.
    #[default]
    Number,
    /// Dimensionless ratio (e.g. DSCR 1.35x).
    Ratio,
}

impl KpiFormat {
    /// Database / wire code.
    pub const fn as_str(self) -> &'static str {
        match self {
            KpiFormat::Currency => "currency",
            KpiFormat::Percentage => "percentage",
            KpiFormat::Number => "number",
            KpiFormat::Ratio => "ratio",
        }
    }
}

impl FromStr for KpiFormat {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "currency" => Ok(KpiFormat::Currency),
            "percentage" => Ok(KpiFormat::Percentage),
            "number" => Ok(KpiFormat::Number),
            "ratio" => Ok(KpiFormat::Ratio),
            _ => bail!("unknown kpi format: {s}"),
        }
    }
}

/// A KPI known to the platform. Read-only from the pipeline's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiDefinition {
    /// Row id referenced by stored data points.
    pub id: i32,
    /// Stable lowercase code, e.g. `total_revenue`.
    pub code: String,
    /// Display label, e.g. `Total Revenue`.
    pub name: String,
    /// Grouping such as `income` or `debt`.
    pub category: String,
    /// Display format hint.
    pub format: KpiFormat,
}

/// A definition to create or refresh, keyed by `code`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKpiDefinition {
    pub code: String,
    pub name: String,
    pub category: String,
    pub format: KpiFormat,
}

/// A candidate value produced by normalization, not yet persisted.
///
/// Persistence upserts on `(deal_id, kpi_id, period_type, period_date, data_type)`;
/// `source_ref` is provenance only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KpiDataPoint {
    pub kpi_id: i32,
    pub period_type: PeriodType,
    pub period_date: NaiveDate,
    pub data_type: DataType,
    pub value: f64,
    pub source: String,
    pub source_ref: String,
    pub created_by: Option<String>,
}

/// A persisted value joined with its KPI code, as read back from storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKpiValue {
    pub deal_id: String,
    pub kpi_code: String,
    pub period_type: PeriodType,
    pub period_date: NaiveDate,
    pub data_type: DataType,
    pub value: f64,
    pub source: String,
    pub source_ref: Option<String>,
    pub created_by: Option<String>,
}

/// Code → definition table built once per import.
#[derive(Debug, Clone, Default)]
pub struct KpiLookup {
    by_code: HashMap<String, KpiDefinition>,
}

impl KpiLookup {
    /// Index every definition by code.
    pub fn new(definitions: &[KpiDefinition]) -> Self {
        Self::restricted(definitions, |_| true)
    }

    /// Index only the definitions whose code is in `codes`.
    pub fn for_codes<'a, I>(definitions: &[KpiDefinition], codes: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let wanted: std::collections::HashSet<&str> = codes.into_iter().collect();
        Self::restricted(definitions, |d| wanted.contains(d.code.as_str()))
    }

    fn restricted(definitions: &[KpiDefinition], keep: impl Fn(&KpiDefinition) -> bool) -> Self {
        let by_code = definitions
            .iter()
            .filter(|d| keep(d))
            .map(|d| (d.code.clone(), d.clone()))
            .collect();
        Self { by_code }
    }

    pub fn id_for(&self, code: &str) -> Option<i32> {
        self.by_code.get(code).map(|d| d.id)
    }

    pub fn get(&self, code: &str) -> Option<&KpiDefinition> {
        self.by_code.get(code)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

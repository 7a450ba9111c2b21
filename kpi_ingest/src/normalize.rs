//! Row normalization: raw rows + mapping → candidate data points and issues.
//!
//! A row without a usable period is dropped with one `error`. Inside a dated
//! row, each mapped column fails on its own with a `warning` and the other
//! columns still produce points.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    cell::{CellValue, Row},
    coerce::{month_key, parse_date_value, parse_numeric_value},
    kpi::{KpiDataPoint, KpiLookup, PeriodType},
    mapping::ColumnMapping,
};

/// Column headers probed for the period, highest priority first.
pub const PERIOD_KEYS: [&str; 4] = ["Date", "date", "Period", "period"];

/// Column reported on a row-fatal date issue, whatever key was probed.
pub const PERIOD_COLUMN: &str = "Date";

pub const MSG_INVALID_DATE: &str = "Invalid or missing date";
pub const MSG_INVALID_NUMBER: &str = "Invalid numeric value";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// The whole row was skipped.
    Error,
    /// One cell was skipped; the rest of the row went through.
    Warning,
}

/// One problem found during an import.
///
/// `row` is the 1-based data row. `row` and `column` are both `None` for an
/// operation-level failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportIssue {
    pub row: Option<usize>,
    pub column: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl ImportIssue {
    pub fn row_error(row: usize, column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row: Some(row),
            column: Some(column.into()),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn cell_warning(row: usize, column: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            row: Some(row),
            column: Some(column.into()),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn operation(message: impl Into<String>) -> Self {
        Self {
            row: None,
            column: None,
            message: message.into(),
            severity: Severity::Error,
        }
    }
}

impl fmt::Display for ImportIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sev = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        match (self.row, self.column.as_deref()) {
            (Some(r), Some(c)) => write!(f, "{sev}: row {r}, {c}: {}", self.message),
            (Some(r), None) => write!(f, "{sev}: row {r}: {}", self.message),
            _ => write!(f, "{sev}: {}", self.message),
        }
    }
}

/// Caller-supplied provenance stamped on every candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    /// e.g. `excel_import`, `google_sheets`.
    pub source: String,
    /// `source_ref` becomes `"{prefix}:row{N}"`.
    pub source_ref_prefix: String,
    pub created_by: Option<String>,
}

impl Provenance {
    pub fn new(source: impl Into<String>, source_ref_prefix: impl Into<String>, created_by: Option<String>) -> Self {
        Self {
            source: source.into(),
            source_ref_prefix: source_ref_prefix.into(),
            created_by,
        }
    }

    fn source_ref(&self, row: usize) -> String {
        format!("{}:row{row}", self.source_ref_prefix)
    }
}

/// Result of normalizing one row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowOutcome {
    pub points: Vec<KpiDataPoint>,
    pub issues: Vec<ImportIssue>,
    /// Row-fatal: no period could be resolved.
    pub skipped: bool,
}

/// First non-blank cell among [`PERIOD_KEYS`], parsed as a date.
///
/// A later key is never consulted once an earlier one holds a value, even if
/// that value fails to parse.
pub fn resolve_period(row: &Row) -> Option<chrono::NaiveDate> {
    period_cell(row).and_then(parse_date_value)
}

pub(crate) fn period_cell(row: &Row) -> Option<&CellValue> {
    PERIOD_KEYS
        .iter()
        .filter_map(|k| row.get(*k))
        .find(|v| !v.is_blank())
}

/// Normalize one row. `row_index` is 1-based.
pub fn normalize_row(
    row: &Row,
    row_index: usize,
    mapping: &[ColumnMapping],
    kpis: &KpiLookup,
    provenance: &Provenance,
) -> RowOutcome {
    let Some(date) = resolve_period(row) else {
        return RowOutcome {
            points: Vec::new(),
            issues: vec![ImportIssue::row_error(row_index, PERIOD_COLUMN, MSG_INVALID_DATE)],
            skipped: true,
        };
    };
    let period_date = month_key(date);

    let mut out = RowOutcome::default();
    for m in mapping {
        let Some(raw) = row.get(&m.column_name).filter(|v| !v.is_blank()) else {
            continue;
        };
        let Some(kpi_id) = kpis.id_for(&m.kpi_code) else {
            out.issues.push(ImportIssue::cell_warning(
                row_index,
                &m.column_name,
                format!("Unknown KPI code: {}", m.kpi_code),
            ));
            continue;
        };
        let Some(value) = parse_numeric_value(raw) else {
            out.issues
                .push(ImportIssue::cell_warning(row_index, &m.column_name, MSG_INVALID_NUMBER));
            continue;
        };
        out.points.push(KpiDataPoint {
            kpi_id,
            period_type: PeriodType::Monthly,
            period_date,
            data_type: m.data_type,
            value,
            source: provenance.source.clone(),
            source_ref: provenance.source_ref(row_index),
            created_by: provenance.created_by.clone(),
        });
    }
    out
}

/// Every candidate and issue of a dataset, in input order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NormalizedBatch {
    pub points: Vec<KpiDataPoint>,
    pub issues: Vec<ImportIssue>,
    pub rows_skipped: usize,
}

/// Normalize `rows` in order; issues come out row-major, then in mapping order.
pub fn normalize_rows(
    rows: &[Row],
    mapping: &[ColumnMapping],
    kpis: &KpiLookup,
    provenance: &Provenance,
) -> NormalizedBatch {
    let mut batch = NormalizedBatch::default();
    for (i, row) in rows.iter().enumerate() {
        let outcome = normalize_row(row, i + 1, mapping, kpis, provenance);
        if outcome.skipped {
            batch.rows_skipped += 1;
        }
        batch.points.extend(outcome.points);
        batch.issues.extend(outcome.issues);
    }
    batch
}

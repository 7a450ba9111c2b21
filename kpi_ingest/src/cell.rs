//! Raw spreadsheet cells and rows.
//!
//! A [`Row`] is an ordered map from column header to [`CellValue`]. A key that
//! is absent from the map is the "undefined" cell; [`CellValue::Empty`] is an
//! explicit null/blank coming from the source.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One row of tabular input, keyed by column header in source order.
pub type Row = IndexMap<String, CellValue>;

/// A heterogeneous cell value as delivered by a spreadsheet source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Explicit null / blank cell.
    Empty,
    /// Boolean cell.
    Bool(bool),
    /// Numeric cell (spreadsheet dates arrive here as serial numbers).
    Number(f64),
    /// Text cell, kept verbatim (no trimming).
    Text(String),
    /// Anything else a loosely-typed source may hand over (objects, arrays).
    Other(serde_json::Value),
}

impl CellValue {
    /// `true` for cells that count as "nothing entered": missing-equivalent
    /// null and the exact empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.is_empty(),
            CellValue::Bool(_) | CellValue::Number(_) | CellValue::Other(_) => false,
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Bool(b)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(CellValue::Empty, Into::into)
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Bool(b) => write!(f, "{b}"),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
            CellValue::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Build a [`Row`] from `(header, value)` pairs, preserving order.
///
/// ```
/// use kpi_ingest::cell::{row, CellValue};
///
/// let r = row([("Date", CellValue::from("2024-01-01")), ("Total Revenue", 485_000.0.into())]);
/// assert_eq!(r.len(), 2);
/// ```
pub fn row<K, I>(cells: I) -> Row
where
    K: Into<String>,
    I: IntoIterator<Item = (K, CellValue)>,
{
    cells.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

/// Ordered list of every column header seen across `rows` (first-seen order).
pub fn collect_columns<'a, I>(rows: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a Row>,
{
    let mut seen: IndexMap<&str, ()> = IndexMap::new();
    for r in rows {
        for k in r.keys() {
            seen.entry(k.as_str()).or_insert(());
        }
    }
    seen.into_keys().map(str::to_string).collect()
}

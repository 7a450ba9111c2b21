//! Read-only preview of how sample rows would map through a connection.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::Serialize;

use crate::{
    cell::{CellValue, Row, collect_columns},
    coerce::{month_key, parse_numeric_value},
    connection::ConnectionId,
    import::IngestError,
    kpi::{DataType, KpiLookup},
    mapping::{MatchReason, SuggestedMapping, suggest_mappings},
    normalize::{PERIOD_KEYS, resolve_period},
    repo::Store,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewData {
    /// Every column seen across the sample, first-seen order.
    pub columns: Vec<String>,
    pub mapped_data: Vec<PreviewRow>,
    pub unmapped_columns: Vec<UnmappedColumn>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    /// 1-based, as in import issues.
    pub row: usize,
    /// Month key of the resolved period, `None` when the row would be skipped.
    pub period: Option<NaiveDate>,
    pub values: Vec<PreviewCell>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewCell {
    pub column_name: String,
    pub raw: CellValue,
    pub value: Option<f64>,
    pub kpi_code: String,
    /// `None` when the code is unknown.
    pub kpi_name: Option<String>,
    pub data_type: DataType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmappedColumn {
    pub column_name: String,
    pub suggestion: Option<SuggestedMapping>,
}

/// Show what an import of `sample_rows` would produce. Never writes.
pub fn preview_mapped_data(
    store: &mut dyn Store,
    connection_id: ConnectionId,
    sample_rows: &[Row],
) -> Result<PreviewData, IngestError> {
    let repo = |source| IngestError::Repository {
        context: "Failed to load preview data",
        source,
    };
    let conn = store
        .get_connection(connection_id)
        .map_err(repo)?
        .ok_or(IngestError::ConnectionNotFound(connection_id))?;
    let definitions = store.get_all_definitions().map_err(repo)?;
    let kpis = KpiLookup::new(&definitions);

    let columns = collect_columns(sample_rows);

    let mapped_data = sample_rows
        .iter()
        .enumerate()
        .map(|(i, row)| PreviewRow {
            row: i + 1,
            period: resolve_period(row).map(month_key),
            values: conn
                .column_mapping
                .iter()
                .filter_map(|m| {
                    let raw = row.get(&m.column_name)?;
                    Some(PreviewCell {
                        column_name: m.column_name.clone(),
                        raw: raw.clone(),
                        value: parse_numeric_value(raw),
                        kpi_code: m.kpi_code.clone(),
                        kpi_name: kpis.get(&m.kpi_code).map(|d| d.name.clone()),
                        data_type: m.data_type,
                    })
                })
                .collect(),
        })
        .collect();

    let unmapped: Vec<String> = columns
        .iter()
        .filter(|c| !PERIOD_KEYS.contains(&c.as_str()))
        .filter(|c| !conn.column_mapping.iter().any(|m| &m.column_name == *c))
        .cloned()
        .collect();

    let mut samples: IndexMap<String, Vec<CellValue>> = IndexMap::new();
    for c in &unmapped {
        let values = sample_rows.iter().filter_map(|r| r.get(c).cloned()).collect();
        samples.insert(c.clone(), values);
    }

    let unmapped_columns = suggest_mappings(&unmapped, &definitions, Some(&samples))
        .into_iter()
        .filter(|s| s.reason != MatchReason::PeriodColumn)
        .map(|s| UnmappedColumn {
            column_name: s.column_name.clone(),
            suggestion: s.kpi_code.is_some().then_some(s),
        })
        .collect();

    Ok(PreviewData {
        columns,
        mapped_data,
        unmapped_columns,
    })
}

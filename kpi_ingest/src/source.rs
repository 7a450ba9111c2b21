//! Spreadsheet sources: where rows come from.
//!
//! The pipeline only depends on [`SpreadsheetSource`]. Remote sources (Google
//! Sheets with OAuth) live outside this crate; what ships here are an
//! in-memory source and a local file source for CSV and Excel workbooks.

use std::{
    mem,
    path::{Path, PathBuf},
};

use calamine::{Data, Reader, open_workbook_auto};
use tracing::debug;

use crate::{
    cell::{CellValue, Row},
    connection::DataConnection,
};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("invalid CSV in {}: {source}", path.display())]
    Csv { path: PathBuf, source: csv::Error },
    #[error("cannot read workbook {}: {source}", path.display())]
    Workbook {
        path: PathBuf,
        source: calamine::Error,
    },
    #[error("sheet {sheet:?} not found in {}", path.display())]
    SheetNotFound { path: PathBuf, sheet: String },
    #[error("unsupported file type: {}", path.display())]
    Unsupported { path: PathBuf },
    /// Failure reported by a remote source.
    #[error("{0}")]
    Upstream(String),
}

/// Reads every data row for a connection, header row excluded.
pub trait SpreadsheetSource {
    fn read_rows(&mut self, connection: &DataConnection) -> Result<Vec<Row>, SourceError>;
}

/// Rows already in memory; handed out once, then empty.
#[derive(Debug, Clone, Default)]
pub struct StaticRows(pub Vec<Row>);

impl SpreadsheetSource for StaticRows {
    fn read_rows(&mut self, _connection: &DataConnection) -> Result<Vec<Row>, SourceError> {
        Ok(mem::take(&mut self.0))
    }
}

/// A local `.csv` or Excel/ODS workbook.
///
/// The sheet is `sheet`, else the connection's `sheet_name`, else the first sheet.
#[derive(Debug, Clone)]
pub struct FileSource {
    pub path: PathBuf,
    pub sheet: Option<String>,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheet: None,
        }
    }

    pub fn with_sheet(mut self, sheet: Option<String>) -> Self {
        self.sheet = sheet;
        self
    }

    /// Read without a connection (preview, suggest).
    pub fn read(&self, fallback_sheet: Option<&str>) -> Result<Vec<Row>, SourceError> {
        let ext = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let rows = match ext.as_str() {
            "csv" => read_csv(&self.path)?,
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => {
                read_workbook(&self.path, self.sheet.as_deref().or(fallback_sheet))?
            }
            _ => {
                return Err(SourceError::Unsupported {
                    path: self.path.clone(),
                });
            }
        };
        debug!(path = %self.path.display(), rows = rows.len(), "read spreadsheet file");
        Ok(rows)
    }
}

impl SpreadsheetSource for FileSource {
    fn read_rows(&mut self, connection: &DataConnection) -> Result<Vec<Row>, SourceError> {
        self.read(connection.sheet_name.as_deref())
    }
}

/// Every field is kept as text; blank lines are skipped.
pub fn read_csv(path: &Path) -> Result<Vec<Row>, SourceError> {
    let err = |source| SourceError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(err)?;
    let headers: Vec<String> = rdr
        .headers()
        .map_err(err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(err)?;
        if record.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        let row: Row = headers
            .iter()
            .zip(record.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, f)| (h.clone(), CellValue::from(f)))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// First row is the header; date cells become spreadsheet serial numbers.
pub fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<Vec<Row>, SourceError> {
    let wb_err = |source| SourceError::Workbook {
        path: path.to_path_buf(),
        source,
    };
    let mut workbook = open_workbook_auto(path).map_err(wb_err)?;
    let sheet_name = match sheet {
        Some(s) => s.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| SourceError::SheetNotFound {
                path: path.to_path_buf(),
                sheet: "<first>".into(),
            })?,
    };
    if !workbook.sheet_names().contains(&sheet_name) {
        return Err(SourceError::SheetNotFound {
            path: path.to_path_buf(),
            sheet: sheet_name,
        });
    }
    let range = workbook.worksheet_range(&sheet_name).map_err(wb_err)?;

    let mut iter = range.rows();
    let Some(header_row) = iter.next() else {
        return Ok(Vec::new());
    };
    let headers: Vec<String> = header_row.iter().map(header_text).collect();

    let mut rows = Vec::new();
    for cells in iter {
        let row: Row = headers
            .iter()
            .zip(cells.iter())
            .filter(|(h, _)| !h.is_empty())
            .map(|(h, c)| (h.clone(), cell_value(c)))
            .collect();
        if row.values().all(CellValue::is_blank) {
            continue;
        }
        rows.push(row);
    }
    Ok(rows)
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_owned(),
        Data::Empty | Data::Error(_) => String::new(),
        other => other.to_string().trim().to_owned(),
    }
}

/// Converts a `calamine::Data` cell to a [`CellValue`].
pub fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(_) | Data::Empty => CellValue::Empty,
    }
}

//! Import orchestration.
//!
//! All entry points run through [`run_import`], parameterized by a
//! [`ConnectionMappingProvider`] (new connection vs stored connection) and a
//! [`SpreadsheetSource`]:
//!
//! 1. resolve the connection and its mapping;
//! 2. mark the connection `syncing`;
//! 3. read the rows and load KPI definitions once;
//! 4. normalize every row, collecting points and issues;
//! 5. bulk upsert the points (skipped when there are none);
//! 6. mark `success`, or `error` with the message when a step failed.
//!
//! Once the upsert has committed the import counts as done: a failure to
//! record the `success` status is logged and the result stays successful.
//!
//! Per-row and per-cell problems never abort an import; they come back in
//! [`ImportResult::errors`]. Only an [`IngestError`] flips `success` to
//! `false`, and then `errors` holds exactly that one operation-level entry.

pub mod preview;
mod provider;

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

pub use preview::{PreviewCell, PreviewData, PreviewRow, UnmappedColumn, preview_mapped_data};
pub use provider::{ConnectionMappingProvider, NewConnectionImport, StoredConnection};

use crate::{
    cell::Row,
    connection::{ConnectionId, ConnectionPatch, DataConnection, NewConnection},
    kpi::KpiLookup,
    mapping::{ColumnMapping, MappingSelection},
    normalize::{ImportIssue, Provenance, normalize_rows},
    repo::Store,
    source::{SourceError, SpreadsheetSource, StaticRows},
    tz,
};

/// Operation-level failure of an import.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Connection not found")]
    ConnectionNotFound(ConnectionId),
    /// `None` when the mapping came from selections that were all toggled off.
    #[error("Column mapping not configured")]
    MappingNotConfigured(Option<ConnectionId>),
    #[error("Failed to read spreadsheet: {0}")]
    Source(#[from] SourceError),
    #[error("{context}: {source:#}")]
    Repository {
        context: &'static str,
        source: anyhow::Error,
    },
}

fn repo_err(context: &'static str) -> impl FnOnce(anyhow::Error) -> IngestError {
    move |source| IngestError::Repository { context, source }
}

/// Outcome of one import call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    /// Data points handed to the bulk upsert.
    pub rows_imported: usize,
    /// Rows dropped for lack of a usable period.
    pub rows_skipped: usize,
    /// Mapping entries applied.
    pub columns_mapped: usize,
    pub errors: Vec<ImportIssue>,
    pub connection_id: Option<ConnectionId>,
    pub imported_at: DateTime<Utc>,
}

/// The short form returned by the existing-connection entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub success: bool,
    pub rows_imported: usize,
    pub errors: Vec<ImportIssue>,
}

impl ImportResult {
    fn failed(err: &IngestError, connection_id: Option<ConnectionId>, columns_mapped: usize) -> Self {
        Self {
            success: false,
            rows_imported: 0,
            rows_skipped: 0,
            columns_mapped,
            errors: vec![ImportIssue::operation(err.to_string())],
            connection_id,
            imported_at: tz::now_millis(),
        }
    }

    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            success: self.success,
            rows_imported: self.rows_imported,
            errors: self.errors.clone(),
        }
    }
}

/// Input of [`create_connection_and_import`].
#[derive(Debug, Clone)]
pub struct CreateConnectionImport {
    pub connection: NewConnection,
    pub deal_id: String,
    pub mappings: Vec<MappingSelection>,
    pub rows: Vec<Row>,
    pub user_id: Option<String>,
}

/// Run one import end to end. Never returns an error: operation-level
/// failures come back as `success: false`.
pub fn run_import(
    store: &mut dyn Store,
    provider: &mut dyn ConnectionMappingProvider,
    source: &mut dyn SpreadsheetSource,
    deal_id: &str,
    user_id: Option<&str>,
) -> ImportResult {
    let started = Instant::now();

    let (conn, mapping) = match provider.resolve(store) {
        Ok(resolved) => resolved,
        Err(err) => {
            warn!(deal_id, error = %err, "import aborted before start");
            return ImportResult::failed(&err, None, 0);
        }
    };

    let span = info_span!("import", connection_id = conn.id, deal_id);
    let _enter = span.enter();
    info!(provider = %conn.provider, columns = mapping.len(), "import started");

    let result = match import_rows(store, &conn, &mapping, source, deal_id, user_id) {
        Ok(result) => result,
        Err(err) => {
            if let Err(e) = store.update_connection(conn.id, &ConnectionPatch::failed(err.to_string())) {
                warn!(error = %format!("{e:#}"), "could not record failed sync status");
            }
            warn!(error = %err, "import failed");
            ImportResult::failed(&err, Some(conn.id), mapping.len())
        }
    };

    info!(
        success = result.success,
        rows_imported = result.rows_imported,
        rows_skipped = result.rows_skipped,
        issues = result.errors.len(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "import finished"
    );
    result
}

fn import_rows(
    store: &mut dyn Store,
    conn: &DataConnection,
    mapping: &[ColumnMapping],
    source: &mut dyn SpreadsheetSource,
    deal_id: &str,
    user_id: Option<&str>,
) -> Result<ImportResult, IngestError> {
    store
        .update_connection(conn.id, &ConnectionPatch::syncing())
        .map_err(repo_err("Failed to update sync status"))?;

    let rows = source.read_rows(conn)?;

    let definitions = store
        .get_all_definitions()
        .map_err(repo_err("Failed to load KPI definitions"))?;
    let kpis = KpiLookup::for_codes(&definitions, mapping.iter().map(|m| m.kpi_code.as_str()));

    let provenance = Provenance::new(
        conn.provider.as_str(),
        conn.name.clone(),
        user_id.map(str::to_string),
    );
    let batch = normalize_rows(&rows, mapping, &kpis, &provenance);

    if !batch.points.is_empty() {
        store
            .bulk_upsert_kpi_data(deal_id, &batch.points)
            .map_err(repo_err("Failed to save KPI data"))?;
    }

    // The points are committed; a failed status write no longer changes the outcome.
    let imported_at = tz::now_millis();
    if let Err(e) = store.update_connection(conn.id, &ConnectionPatch::succeeded(imported_at)) {
        warn!(
            connection_id = conn.id,
            error = %format!("{e:#}"),
            "could not record successful sync status"
        );
    }

    Ok(ImportResult {
        success: true,
        rows_imported: batch.points.len(),
        rows_skipped: batch.rows_skipped,
        columns_mapped: mapping.len(),
        errors: batch.issues,
        connection_id: Some(conn.id),
        imported_at,
    })
}

/// Create a connection from the wizard's selections and import `rows` into it.
pub fn create_connection_and_import(
    store: &mut dyn Store,
    input: &CreateConnectionImport,
) -> ImportResult {
    let mut provider = NewConnectionImport {
        connection: &input.connection,
        selections: &input.mappings,
    };
    let mut source = StaticRows(input.rows.clone());
    run_import(
        store,
        &mut provider,
        &mut source,
        &input.deal_id,
        input.user_id.as_deref(),
    )
}

/// Import uploaded rows through an existing connection's stored mapping.
pub fn import_excel(
    store: &mut dyn Store,
    deal_id: &str,
    connection_id: ConnectionId,
    rows: Vec<Row>,
    user_id: Option<&str>,
) -> ImportResult {
    run_import(
        store,
        &mut StoredConnection(connection_id),
        &mut StaticRows(rows),
        deal_id,
        user_id,
    )
}

/// Pull rows from `source` for an existing connection and import them.
pub fn sync_google_sheets(
    store: &mut dyn Store,
    connection_id: ConnectionId,
    deal_id: &str,
    user_id: Option<&str>,
    source: &mut dyn SpreadsheetSource,
) -> ImportResult {
    run_import(
        store,
        &mut StoredConnection(connection_id),
        source,
        deal_id,
        user_id,
    )
}

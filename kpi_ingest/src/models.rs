//! Diesel row types for the tables in [`crate::schema`].
//!
//! Enums travel as their text codes (`DataType::as_str`, `SyncStatus::as_str`, ...)
//! and timestamps as RFC 3339 UTC strings; conversion to domain types happens
//! in [`crate::repo::sqlite`].

use chrono::NaiveDate;
use diesel::prelude::*;

use crate::schema::*;

/// A row in [`crate::schema::kpi_definitions`].
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = kpi_definitions, check_for_backend(diesel::sqlite::Sqlite))]
pub struct KpiDefinitionRow {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub category: String,
    /// One of `currency`, `percentage`, `number`, `ratio`.
    pub format: String,
}

/// Insertable form of [`KpiDefinitionRow`].
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = kpi_definitions)]
pub struct NewKpiDefinitionRow<'a> {
    pub code: &'a str,
    pub name: &'a str,
    pub category: &'a str,
    pub format: &'a str,
}

/// A row in [`crate::schema::data_connections`] (timestamps omitted).
#[derive(Debug, Clone, Queryable, Selectable, Identifiable)]
#[diesel(table_name = data_connections, check_for_backend(diesel::sqlite::Sqlite))]
pub struct ConnectionRow {
    pub id: i32,
    pub fund_id: String,
    pub deal_id: Option<String>,
    pub provider: String,
    pub name: String,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: Option<String>,
    pub credentials: Option<Vec<u8>>,
    pub sync_status: String,
    pub last_error: Option<String>,
    /// RFC 3339 UTC.
    pub last_synced_at: Option<String>,
    pub sync_frequency: Option<String>,
    pub sync_enabled: bool,
}

/// Insertable form of [`ConnectionRow`]; `sync_status` defaults to `pending`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = data_connections)]
pub struct NewConnectionRow<'a> {
    pub fund_id: &'a str,
    pub deal_id: Option<&'a str>,
    pub provider: &'a str,
    pub name: &'a str,
    pub spreadsheet_id: Option<&'a str>,
    pub sheet_name: Option<&'a str>,
    pub credentials: Option<&'a [u8]>,
    pub sync_frequency: Option<&'a str>,
    pub sync_enabled: bool,
}

/// Partial update of a connection. `None` skips the column; `Some(None)` writes NULL.
#[derive(Debug, Clone, Default, AsChangeset)]
#[diesel(table_name = data_connections)]
pub struct ConnectionChangeset<'a> {
    pub name: Option<&'a str>,
    pub deal_id: Option<Option<&'a str>>,
    pub spreadsheet_id: Option<Option<&'a str>>,
    pub sheet_name: Option<Option<&'a str>>,
    pub sync_status: Option<&'a str>,
    pub last_error: Option<Option<&'a str>>,
    pub last_synced_at: Option<Option<String>>,
    pub sync_frequency: Option<Option<&'a str>>,
    pub sync_enabled: Option<bool>,
}

impl ConnectionChangeset<'_> {
    /// Diesel rejects an UPDATE with an empty SET clause.
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.deal_id.is_none()
            && self.spreadsheet_id.is_none()
            && self.sheet_name.is_none()
            && self.sync_status.is_none()
            && self.last_error.is_none()
            && self.last_synced_at.is_none()
            && self.sync_frequency.is_none()
            && self.sync_enabled.is_none()
    }
}

/// A row in [`crate::schema::connection_column_mappings`].
///
/// Cleaned up via FK `ON DELETE CASCADE` when the connection goes.
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Associations)]
#[diesel(table_name = connection_column_mappings, check_for_backend(diesel::sqlite::Sqlite))]
#[diesel(belongs_to(ConnectionRow, foreign_key = connection_id))]
pub struct MappingRow {
    pub id: i32,
    pub connection_id: i32,
    pub position: i32,
    pub column_name: String,
    pub kpi_code: String,
    pub data_type: String,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = connection_column_mappings)]
pub struct NewMappingRow<'a> {
    pub connection_id: i32,
    pub position: i32,
    pub column_name: &'a str,
    pub kpi_code: &'a str,
    pub data_type: &'a str,
}

/// Insertable / upsert form of a [`crate::schema::kpi_data`] row.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = kpi_data)]
pub struct NewKpiDataRow<'a> {
    pub deal_id: &'a str,
    pub kpi_id: i32,
    pub period_type: &'a str,
    pub period_date: NaiveDate,
    pub data_type: &'a str,
    pub value: f64,
    pub source: &'a str,
    pub source_ref: Option<&'a str>,
    pub created_by: Option<&'a str>,
}

/// A stored value joined with its definition code.
#[derive(Debug, Clone, Queryable)]
pub struct StoredKpiRow {
    pub deal_id: String,
    pub kpi_code: String,
    pub period_type: String,
    pub period_date: NaiveDate,
    pub data_type: String,
    pub value: f64,
    pub source: String,
    pub source_ref: Option<String>,
    pub created_by: Option<String>,
}

//! Data connections: a named binding from a tabular source to a fund/deal.

use std::{fmt, str::FromStr};

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mapping::ColumnMapping;

/// Row id of a [`DataConnection`].
pub type ConnectionId = i32;

/// Which upstream a connection reads from (serde snake_case).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceProvider {
    /// Google Sheets spreadsheet.
    GoogleSheets,
    /// Uploaded Excel / CSV workbook.
    Excel,
}

impl SourceProvider {
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceProvider::GoogleSheets => "google_sheets",
            SourceProvider::Excel => "excel",
        }
    }
}

impl fmt::Display for SourceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceProvider {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_sheets" => Ok(SourceProvider::GoogleSheets),
            "excel" => Ok(SourceProvider::Excel),
            _ => bail!("unknown provider: {s}"),
        }
    }
}

/// Sync status of a connection.
///
/// ```text
/// pending ──► syncing ──► success
///                │  ▲        │
///                ▼  └────────┤
///              error ────────┘ (next attempt re-enters syncing)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    Syncing,
    Success,
    Error,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        }
    }

    /// Whether the orchestrator may move a connection from `self` to `next`.
    ///
    /// There is no terminal state; `syncing` is always re-enterable. A
    /// `syncing → syncing` edge is allowed because an abandoned import leaves
    /// the connection in `syncing` and the next attempt must be able to start.
    pub const fn can_transition_to(self, next: SyncStatus) -> bool {
        matches!(
            (self, next),
            (_, SyncStatus::Syncing)
                | (SyncStatus::Syncing, SyncStatus::Success)
                | (SyncStatus::Syncing, SyncStatus::Error)
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SyncStatus::Pending),
            "syncing" => Ok(SyncStatus::Syncing),
            "success" => Ok(SyncStatus::Success),
            "error" => Ok(SyncStatus::Error),
            _ => bail!("unknown sync_status: {s}"),
        }
    }
}

/// A configured connection, mapping included.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConnection {
    pub id: ConnectionId,
    pub fund_id: String,
    pub deal_id: Option<String>,
    pub provider: SourceProvider,
    pub name: String,
    pub spreadsheet_id: Option<String>,
    pub sheet_name: Option<String>,
    /// Encrypted credential blob; never interpreted here.
    #[serde(skip)]
    pub credentials: Option<Vec<u8>>,
    pub column_mapping: Vec<ColumnMapping>,
    pub sync_status: SyncStatus,
    pub last_error: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub sync_frequency: Option<String>,
    pub sync_enabled: bool,
}

/// Fields needed to create a connection (status starts at `pending`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewConnection {
    pub fund_id: String,
    pub deal_id: Option<String>,
    pub provider: SourceProvider,
    pub name: String,
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub sheet_name: Option<String>,
    #[serde(skip)]
    pub credentials: Option<Vec<u8>>,
    #[serde(default)]
    pub sync_frequency: Option<String>,
    #[serde(default)]
    pub sync_enabled: bool,
}

/// Partial update. `None` leaves a field untouched; `Some(None)` clears a
/// nullable field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionPatch {
    pub name: Option<String>,
    pub deal_id: Option<Option<String>>,
    pub spreadsheet_id: Option<Option<String>>,
    pub sheet_name: Option<Option<String>>,
    pub sync_status: Option<SyncStatus>,
    pub last_error: Option<Option<String>>,
    pub last_synced_at: Option<Option<DateTime<Utc>>>,
    pub sync_frequency: Option<Option<String>>,
    pub sync_enabled: Option<bool>,
    /// Replaces the whole mapping (duplicates collapse, last write wins).
    pub column_mapping: Option<Vec<ColumnMapping>>,
}

impl ConnectionPatch {
    /// Import started.
    pub fn syncing() -> Self {
        Self {
            sync_status: Some(SyncStatus::Syncing),
            ..Self::default()
        }
    }

    /// Import finished; clears any previous error.
    pub fn succeeded(at: DateTime<Utc>) -> Self {
        Self {
            sync_status: Some(SyncStatus::Success),
            last_error: Some(None),
            last_synced_at: Some(Some(at)),
            ..Self::default()
        }
    }

    /// Import aborted with an operation-level failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            sync_status: Some(SyncStatus::Error),
            last_error: Some(Some(message.into())),
            ..Self::default()
        }
    }

    /// Settings step: store a curated mapping.
    pub fn mapping(mapping: Vec<ColumnMapping>) -> Self {
        Self {
            column_mapping: Some(mapping),
            ..Self::default()
        }
    }
}

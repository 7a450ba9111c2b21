//! Persistence collaborators of the import pipeline.
//!
//! The pipeline only talks to the two traits below. [`sqlite::SqliteStore`]
//! is the Diesel-backed implementation. With the `test-util` feature (and in
//! this crate's own tests) `memory::MemoryStore` keeps everything in process
//! and can be told to fail.

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod sqlite;

use crate::{
    connection::{ConnectionId, ConnectionPatch, DataConnection, NewConnection},
    kpi::{KpiDataPoint, KpiDefinition, NewKpiDefinition, StoredKpiValue},
    mapping::ColumnMapping,
};

#[derive(thiserror::Error, Debug)]
/// Errors raised by repositories beyond plain storage failures.
pub enum RepoError {
    #[error("connection {id} not found")]
    /// The connection id does not exist.
    ConnectionMissing {
        /// The id that was looked up.
        id: ConnectionId,
    },
}

/// Result type used throughout the repositories.
pub type RepoResult<T> = anyhow::Result<T>;

/// Storage of data connections and their column mapping.
pub trait ConnectionRepository {
    /// Create a connection in `pending` status together with its mapping, atomically.
    fn create_connection(
        &mut self,
        new: &NewConnection,
        mapping: &[ColumnMapping],
    ) -> RepoResult<DataConnection>;

    /// `Ok(None)` when the id is unknown.
    fn get_connection(&mut self, id: ConnectionId) -> RepoResult<Option<DataConnection>>;

    /// Apply a partial update and return the updated connection.
    ///
    /// Errors with [`RepoError::ConnectionMissing`] for an unknown id.
    fn update_connection(
        &mut self,
        id: ConnectionId,
        patch: &ConnectionPatch,
    ) -> RepoResult<DataConnection>;

    /// Remove the connection and its mapping. Ingested KPI data is kept.
    /// Returns whether a row was deleted.
    fn delete_connection(&mut self, id: ConnectionId) -> RepoResult<bool>;

    /// All connections, optionally restricted to one fund, in id order.
    fn list_connections(&mut self, fund_id: Option<&str>) -> RepoResult<Vec<DataConnection>>;
}

/// Storage of KPI definitions and ingested values.
pub trait KpiRepository {
    /// Every known definition, in id order.
    fn get_all_definitions(&mut self) -> RepoResult<Vec<KpiDefinition>>;

    /// Insert or refresh definitions by code. Returns how many were written.
    fn upsert_definitions(&mut self, definitions: &[NewKpiDefinition]) -> RepoResult<usize>;

    /// Upsert points for `deal_id` on the natural key
    /// `(deal_id, kpi_id, period_type, period_date, data_type)`, all or nothing.
    /// Returns how many points were written.
    fn bulk_upsert_kpi_data(&mut self, deal_id: &str, points: &[KpiDataPoint]) -> RepoResult<usize>;

    /// Stored values of a deal ordered by period, KPI code, then dimension.
    fn list_kpi_data(&mut self, deal_id: &str) -> RepoResult<Vec<StoredKpiValue>>;
}

/// Everything the import pipeline needs from storage.
pub trait Store: ConnectionRepository + KpiRepository {}

impl<T: ConnectionRepository + KpiRepository + ?Sized> Store for T {}

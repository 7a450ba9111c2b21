use crate::{
    connection::{ConnectionId, DataConnection, NewConnection},
    import::IngestError,
    mapping::{ColumnMapping, MappingSelection, selected_mappings},
    repo::Store,
};

/// Where an import gets its connection and mapping from.
pub trait ConnectionMappingProvider {
    /// Connection to import into and the mapping to apply, in order.
    fn resolve(
        &mut self,
        store: &mut dyn Store,
    ) -> Result<(DataConnection, Vec<ColumnMapping>), IngestError>;
}

/// Create a connection from wizard selections; only `include`d entries are kept.
///
/// Nothing is created when no selection is toggled on.
#[derive(Debug, Clone)]
pub struct NewConnectionImport<'a> {
    pub connection: &'a NewConnection,
    pub selections: &'a [MappingSelection],
}

impl ConnectionMappingProvider for NewConnectionImport<'_> {
    fn resolve(
        &mut self,
        store: &mut dyn Store,
    ) -> Result<(DataConnection, Vec<ColumnMapping>), IngestError> {
        let mapping = selected_mappings(self.selections);
        if mapping.is_empty() {
            return Err(IngestError::MappingNotConfigured(None));
        }
        let conn = store
            .create_connection(self.connection, &mapping)
            .map_err(|source| IngestError::Repository {
                context: "Failed to create connection",
                source,
            })?;
        Ok((conn, mapping))
    }
}

/// Use an existing connection's curated mapping as stored.
#[derive(Debug, Clone, Copy)]
pub struct StoredConnection(pub ConnectionId);

impl ConnectionMappingProvider for StoredConnection {
    fn resolve(
        &mut self,
        store: &mut dyn Store,
    ) -> Result<(DataConnection, Vec<ColumnMapping>), IngestError> {
        let id = self.0;
        let conn = store
            .get_connection(id)
            .map_err(|source| IngestError::Repository {
                context: "Failed to load connection",
                source,
            })?
            .ok_or(IngestError::ConnectionNotFound(id))?;
        if conn.column_mapping.is_empty() {
            return Err(IngestError::MappingNotConfigured(Some(id)));
        }
        let mapping = conn.column_mapping.clone();
        Ok((conn, mapping))
    }
}

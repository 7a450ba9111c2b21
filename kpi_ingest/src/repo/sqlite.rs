//! Diesel/SQLite implementation of the repository traits.
//!
//! Multi-statement writes run inside `immediate_transaction` (`BEGIN
//! IMMEDIATE`) so a failed bulk upsert leaves no partial rows behind.

use anyhow::Context;
use diesel::{SqliteConnection, insert_into, prelude::*};
use tracing::{debug, warn};

use crate::{
    connection::{ConnectionId, ConnectionPatch, DataConnection, NewConnection},
    db::{connection::connect_sqlite, migrate},
    kpi::{KpiDataPoint, KpiDefinition, NewKpiDefinition, StoredKpiValue},
    mapping::{ColumnMapping, dedupe_mappings},
    models::{
        ConnectionChangeset, ConnectionRow, KpiDefinitionRow, MappingRow, NewConnectionRow,
        NewKpiDataRow, NewKpiDefinitionRow, NewMappingRow, StoredKpiRow,
    },
    repo::{ConnectionRepository, KpiRepository, RepoError, RepoResult},
    schema::{
        connection_column_mappings as ccm, data_connections as dc, kpi_data as kv,
        kpi_definitions as kd,
    },
    tz,
};

/// A store owning one SQLite connection.
pub struct SqliteStore {
    conn: SqliteConnection,
}

impl SqliteStore {
    /// Open (or create) the database at `database_url` and apply pending migrations.
    ///
    /// Migrations run on the same connection, so `:memory:` works too.
    pub fn open(database_url: &str) -> anyhow::Result<Self> {
        let mut conn = connect_sqlite(database_url)?;
        migrate::run_pending(&mut conn).context("apply migrations")?;
        Ok(Self { conn })
    }

    /// Wrap an already-migrated connection.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    /// Borrow the underlying connection (catalog sync, ad-hoc queries).
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    pub fn into_inner(self) -> SqliteConnection {
        self.conn
    }
}

/// Insert a connection row and its mapping; returns the new id.
pub fn insert_connection(
    conn: &mut SqliteConnection,
    new: &NewConnection,
    mapping: &[ColumnMapping],
) -> anyhow::Result<ConnectionId> {
    let row = NewConnectionRow {
        fund_id: &new.fund_id,
        deal_id: new.deal_id.as_deref(),
        provider: new.provider.as_str(),
        name: &new.name,
        spreadsheet_id: new.spreadsheet_id.as_deref(),
        sheet_name: new.sheet_name.as_deref(),
        credentials: new.credentials.as_deref(),
        sync_frequency: new.sync_frequency.as_deref(),
        sync_enabled: new.sync_enabled,
    };
    let id: i32 = insert_into(dc::table)
        .values(&row)
        .returning(dc::id)
        .get_result(conn)?;
    replace_mappings(conn, id, mapping)?;
    Ok(id)
}

/// Replace the whole mapping of a connection, collapsing duplicate columns.
pub fn replace_mappings(
    conn: &mut SqliteConnection,
    connection_id: ConnectionId,
    mapping: &[ColumnMapping],
) -> anyhow::Result<usize> {
    diesel::delete(ccm::table.filter(ccm::connection_id.eq(connection_id))).execute(conn)?;

    let unique = dedupe_mappings(mapping.iter().cloned());
    let rows: Vec<NewMappingRow<'_>> = unique
        .iter()
        .zip(0..)
        .map(|(m, position)| NewMappingRow {
            connection_id,
            position,
            column_name: &m.column_name,
            kpi_code: &m.kpi_code,
            data_type: m.data_type.as_str(),
        })
        .collect();
    let mut n = 0;
    for r in &rows {
        n += insert_into(ccm::table).values(r).execute(conn)?;
    }
    Ok(n)
}

fn mapping_from_rows(rows: Vec<MappingRow>) -> anyhow::Result<Vec<ColumnMapping>> {
    rows.into_iter()
        .map(|r| {
            Ok(ColumnMapping {
                data_type: r.data_type.parse()?,
                column_name: r.column_name,
                kpi_code: r.kpi_code,
            })
        })
        .collect()
}

fn connection_from_row(row: ConnectionRow, mapping: Vec<MappingRow>) -> anyhow::Result<DataConnection> {
    Ok(DataConnection {
        id: row.id,
        provider: row.provider.parse()?,
        sync_status: row.sync_status.parse()?,
        last_synced_at: row
            .last_synced_at
            .as_deref()
            .map(tz::parse_ts_to_utc)
            .transpose()?,
        column_mapping: mapping_from_rows(mapping)?,
        fund_id: row.fund_id,
        deal_id: row.deal_id,
        name: row.name,
        spreadsheet_id: row.spreadsheet_id,
        sheet_name: row.sheet_name,
        credentials: row.credentials,
        last_error: row.last_error,
        sync_frequency: row.sync_frequency,
        sync_enabled: row.sync_enabled,
    })
}

/// Load one connection with its mapping in position order.
pub fn load_connection(
    conn: &mut SqliteConnection,
    id: ConnectionId,
) -> anyhow::Result<Option<DataConnection>> {
    let Some(row) = dc::table
        .find(id)
        .select(ConnectionRow::as_select())
        .first(conn)
        .optional()?
    else {
        return Ok(None);
    };
    let mapping = MappingRow::belonging_to(&row)
        .select(MappingRow::as_select())
        .order(ccm::position)
        .load(conn)?;
    connection_from_row(row, mapping).map(Some)
}

/// Insert a definition, or refresh name/category/format when the code exists.
pub fn upsert_kpi_definition(
    conn: &mut SqliteConnection,
    def: &NewKpiDefinition,
) -> anyhow::Result<usize> {
    let row = NewKpiDefinitionRow {
        code: &def.code,
        name: &def.name,
        category: &def.category,
        format: def.format.as_str(),
    };
    let n = insert_into(kd::table)
        .values(&row)
        .on_conflict(kd::code)
        .do_update()
        .set((
            kd::name.eq(&def.name),
            kd::category.eq(&def.category),
            kd::format.eq(def.format.as_str()),
        ))
        .execute(conn)?;
    Ok(n)
}

/// Load every definition in id order.
pub fn load_definitions(conn: &mut SqliteConnection) -> anyhow::Result<Vec<KpiDefinition>> {
    kd::table
        .select(KpiDefinitionRow::as_select())
        .order(kd::id)
        .load(conn)?
        .into_iter()
        .map(|r| {
            Ok(KpiDefinition {
                format: r.format.parse()?,
                id: r.id,
                code: r.code,
                name: r.name,
                category: r.category,
            })
        })
        .collect()
}

/// Upsert one value on the natural key; the last write wins.
pub fn upsert_kpi_value(
    conn: &mut SqliteConnection,
    deal_id: &str,
    p: &KpiDataPoint,
) -> anyhow::Result<usize> {
    let row = NewKpiDataRow {
        deal_id,
        kpi_id: p.kpi_id,
        period_type: p.period_type.as_str(),
        period_date: p.period_date,
        data_type: p.data_type.as_str(),
        value: p.value,
        source: &p.source,
        source_ref: Some(p.source_ref.as_str()),
        created_by: p.created_by.as_deref(),
    };
    let n = insert_into(kv::table)
        .values(&row)
        .on_conflict((
            kv::deal_id,
            kv::kpi_id,
            kv::period_type,
            kv::period_date,
            kv::data_type,
        ))
        .do_update()
        .set((
            kv::value.eq(p.value),
            kv::source.eq(&p.source),
            kv::source_ref.eq(Some(p.source_ref.as_str())),
            kv::created_by.eq(p.created_by.as_deref()),
        ))
        .execute(conn)?;
    Ok(n)
}

impl ConnectionRepository for SqliteStore {
    fn create_connection(
        &mut self,
        new: &NewConnection,
        mapping: &[ColumnMapping],
    ) -> RepoResult<DataConnection> {
        self.conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
            let id = insert_connection(conn, new, mapping)?;
            debug!(connection_id = id, fund_id = %new.fund_id, "connection created");
            load_connection(conn, id)?.ok_or_else(|| RepoError::ConnectionMissing { id }.into())
        })
    }

    fn get_connection(&mut self, id: ConnectionId) -> RepoResult<Option<DataConnection>> {
        load_connection(&mut self.conn, id)
    }

    fn update_connection(
        &mut self,
        id: ConnectionId,
        patch: &ConnectionPatch,
    ) -> RepoResult<DataConnection> {
        self.conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
            let current = load_connection(conn, id)?.ok_or(RepoError::ConnectionMissing { id })?;
            if let Some(next) = patch.sync_status {
                if !current.sync_status.can_transition_to(next) {
                    warn!(connection_id = id, from = %current.sync_status, to = %next, "unexpected sync status transition");
                }
            }

            let changes = ConnectionChangeset {
                name: patch.name.as_deref(),
                deal_id: patch.deal_id.as_ref().map(Option::as_deref),
                spreadsheet_id: patch.spreadsheet_id.as_ref().map(Option::as_deref),
                sheet_name: patch.sheet_name.as_ref().map(Option::as_deref),
                sync_status: patch.sync_status.map(|s| s.as_str()),
                last_error: patch.last_error.as_ref().map(Option::as_deref),
                last_synced_at: patch.last_synced_at.map(|t| t.map(tz::to_rfc3339_millis)),
                sync_frequency: patch.sync_frequency.as_ref().map(Option::as_deref),
                sync_enabled: patch.sync_enabled,
            };
            if !changes.is_empty() {
                diesel::update(dc::table.find(id)).set(&changes).execute(conn)?;
            }
            if let Some(mapping) = &patch.column_mapping {
                replace_mappings(conn, id, mapping)?;
            }

            load_connection(conn, id)?.ok_or_else(|| RepoError::ConnectionMissing { id }.into())
        })
    }

    fn delete_connection(&mut self, id: ConnectionId) -> RepoResult<bool> {
        let n = diesel::delete(dc::table.find(id)).execute(&mut self.conn)?;
        Ok(n > 0)
    }

    fn list_connections(&mut self, fund_id: Option<&str>) -> RepoResult<Vec<DataConnection>> {
        let mut query = dc::table
            .select(ConnectionRow::as_select())
            .order(dc::id)
            .into_boxed();
        if let Some(fund) = fund_id {
            query = query.filter(dc::fund_id.eq(fund));
        }
        let rows: Vec<ConnectionRow> = query.load(&mut self.conn)?;

        let mappings = MappingRow::belonging_to(&rows)
            .select(MappingRow::as_select())
            .order(ccm::position)
            .load(&mut self.conn)?
            .grouped_by(&rows);

        rows.into_iter()
            .zip(mappings)
            .map(|(row, mapping)| connection_from_row(row, mapping))
            .collect()
    }
}

impl KpiRepository for SqliteStore {
    fn get_all_definitions(&mut self) -> RepoResult<Vec<KpiDefinition>> {
        load_definitions(&mut self.conn)
    }

    fn upsert_definitions(&mut self, definitions: &[NewKpiDefinition]) -> RepoResult<usize> {
        self.conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
            let mut n = 0;
            for d in definitions {
                n += upsert_kpi_definition(conn, d)?;
            }
            Ok(n)
        })
    }

    fn bulk_upsert_kpi_data(&mut self, deal_id: &str, points: &[KpiDataPoint]) -> RepoResult<usize> {
        self.conn.immediate_transaction::<_, anyhow::Error, _>(|conn| {
            for p in points {
                upsert_kpi_value(conn, deal_id, p)
                    .with_context(|| format!("upsert kpi {} for {}", p.kpi_id, p.period_date))?;
            }
            Ok(points.len())
        })
    }

    fn list_kpi_data(&mut self, deal_id: &str) -> RepoResult<Vec<StoredKpiValue>> {
        let rows: Vec<StoredKpiRow> = kv::table
            .inner_join(kd::table)
            .filter(kv::deal_id.eq(deal_id))
            .order((kv::period_date, kd::code, kv::data_type))
            .select((
                kv::deal_id,
                kd::code,
                kv::period_type,
                kv::period_date,
                kv::data_type,
                kv::value,
                kv::source,
                kv::source_ref,
                kv::created_by,
            ))
            .load(&mut self.conn)?;

        rows.into_iter()
            .map(|r| {
                Ok(StoredKpiValue {
                    period_type: r.period_type.parse()?,
                    data_type: r.data_type.parse()?,
                    deal_id: r.deal_id,
                    kpi_code: r.kpi_code,
                    period_date: r.period_date,
                    value: r.value,
                    source: r.source,
                    source_ref: r.source_ref,
                    created_by: r.created_by,
                })
            })
            .collect()
    }
}

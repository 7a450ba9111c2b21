//! In-process store with failure injection.
//!
//! Keeps the same observable contract as the SQLite store: natural-key
//! upsert, all-or-nothing bulk writes, mapping dedupe, and data that
//! outlives its connection.

use std::collections::BTreeMap;

use anyhow::bail;
use chrono::NaiveDate;
use indexmap::IndexMap;

use crate::{
    connection::{ConnectionId, ConnectionPatch, DataConnection, NewConnection, SyncStatus},
    kpi::{DataType, KpiDataPoint, KpiDefinition, NewKpiDefinition, PeriodType, StoredKpiValue},
    mapping::{ColumnMapping, dedupe_mappings},
    repo::{ConnectionRepository, KpiRepository, RepoError, RepoResult},
};

type NaturalKey = (String, i32, PeriodType, NaiveDate, DataType);

#[derive(Debug, Clone, PartialEq)]
struct StoredPoint {
    value: f64,
    source: String,
    source_ref: String,
    created_by: Option<String>,
}

/// Which repository call should fail, and with what message.
#[derive(Debug, Clone, Default)]
pub struct FailOn {
    pub create_connection: Option<String>,
    pub get_connection: Option<String>,
    pub get_all_definitions: Option<String>,
    pub bulk_upsert: Option<String>,
    /// Fails only the `update_connection` call that writes `success`.
    pub success_status: Option<String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    next_id: ConnectionId,
    connections: BTreeMap<ConnectionId, DataConnection>,
    definitions: Vec<KpiDefinition>,
    data: IndexMap<NaturalKey, StoredPoint>,
    /// Every `sync_status` written through `update_connection`, in order.
    pub status_log: Vec<(ConnectionId, SyncStatus)>,
    /// Number of `bulk_upsert_kpi_data` calls, failed ones included.
    pub upsert_calls: usize,
    pub fail_on: FailOn,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed definitions; ids are assigned in order starting at 1.
    pub fn with_definitions<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        let mut store = Self::new();
        store.definitions = codes
            .into_iter()
            .zip(1..)
            .map(|((code, name), id)| KpiDefinition {
                id,
                code: code.into(),
                name: name.into(),
                category: "general".into(),
                format: Default::default(),
            })
            .collect();
        store
    }

    /// Number of stored KPI values across all deals.
    pub fn data_len(&self) -> usize {
        self.data.len()
    }
}

fn injected(slot: &Option<String>) -> RepoResult<()> {
    match slot {
        Some(msg) => bail!("{msg}"),
        None => Ok(()),
    }
}

impl ConnectionRepository for MemoryStore {
    fn create_connection(
        &mut self,
        new: &NewConnection,
        mapping: &[ColumnMapping],
    ) -> RepoResult<DataConnection> {
        injected(&self.fail_on.create_connection)?;
        self.next_id += 1;
        let conn = DataConnection {
            id: self.next_id,
            fund_id: new.fund_id.clone(),
            deal_id: new.deal_id.clone(),
            provider: new.provider,
            name: new.name.clone(),
            spreadsheet_id: new.spreadsheet_id.clone(),
            sheet_name: new.sheet_name.clone(),
            credentials: new.credentials.clone(),
            column_mapping: dedupe_mappings(mapping.iter().cloned()),
            sync_status: SyncStatus::Pending,
            last_error: None,
            last_synced_at: None,
            sync_frequency: new.sync_frequency.clone(),
            sync_enabled: new.sync_enabled,
        };
        self.connections.insert(conn.id, conn.clone());
        Ok(conn)
    }

    fn get_connection(&mut self, id: ConnectionId) -> RepoResult<Option<DataConnection>> {
        injected(&self.fail_on.get_connection)?;
        Ok(self.connections.get(&id).cloned())
    }

    fn update_connection(
        &mut self,
        id: ConnectionId,
        patch: &ConnectionPatch,
    ) -> RepoResult<DataConnection> {
        if patch.sync_status == Some(SyncStatus::Success) {
            injected(&self.fail_on.success_status)?;
        }
        let conn = self
            .connections
            .get_mut(&id)
            .ok_or(RepoError::ConnectionMissing { id })?;

        let p = patch.clone();
        if let Some(v) = p.name {
            conn.name = v;
        }
        if let Some(v) = p.deal_id {
            conn.deal_id = v;
        }
        if let Some(v) = p.spreadsheet_id {
            conn.spreadsheet_id = v;
        }
        if let Some(v) = p.sheet_name {
            conn.sheet_name = v;
        }
        if let Some(v) = p.sync_status {
            conn.sync_status = v;
            self.status_log.push((id, v));
        }
        if let Some(v) = p.last_error {
            conn.last_error = v;
        }
        if let Some(v) = p.last_synced_at {
            conn.last_synced_at = v;
        }
        if let Some(v) = p.sync_frequency {
            conn.sync_frequency = v;
        }
        if let Some(v) = p.sync_enabled {
            conn.sync_enabled = v;
        }
        if let Some(v) = p.column_mapping {
            conn.column_mapping = dedupe_mappings(v);
        }
        Ok(conn.clone())
    }

    fn delete_connection(&mut self, id: ConnectionId) -> RepoResult<bool> {
        Ok(self.connections.remove(&id).is_some())
    }

    fn list_connections(&mut self, fund_id: Option<&str>) -> RepoResult<Vec<DataConnection>> {
        Ok(self
            .connections
            .values()
            .filter(|c| fund_id.is_none_or(|f| c.fund_id == f))
            .cloned()
            .collect())
    }
}

impl KpiRepository for MemoryStore {
    fn get_all_definitions(&mut self) -> RepoResult<Vec<KpiDefinition>> {
        injected(&self.fail_on.get_all_definitions)?;
        Ok(self.definitions.clone())
    }

    fn upsert_definitions(&mut self, definitions: &[NewKpiDefinition]) -> RepoResult<usize> {
        for d in definitions {
            match self.definitions.iter_mut().find(|e| e.code == d.code) {
                Some(existing) => {
                    existing.name = d.name.clone();
                    existing.category = d.category.clone();
                    existing.format = d.format;
                }
                None => {
                    let id = self.definitions.iter().map(|e| e.id).max().unwrap_or(0) + 1;
                    self.definitions.push(KpiDefinition {
                        id,
                        code: d.code.clone(),
                        name: d.name.clone(),
                        category: d.category.clone(),
                        format: d.format,
                    });
                }
            }
        }
        Ok(definitions.len())
    }

    fn bulk_upsert_kpi_data(&mut self, deal_id: &str, points: &[KpiDataPoint]) -> RepoResult<usize> {
        self.upsert_calls += 1;
        injected(&self.fail_on.bulk_upsert)?;
        for p in points {
            let key = (deal_id.to_string(), p.kpi_id, p.period_type, p.period_date, p.data_type);
            self.data.insert(
                key,
                StoredPoint {
                    value: p.value,
                    source: p.source.clone(),
                    source_ref: p.source_ref.clone(),
                    created_by: p.created_by.clone(),
                },
            );
        }
        Ok(points.len())
    }

    fn list_kpi_data(&mut self, deal_id: &str) -> RepoResult<Vec<StoredKpiValue>> {
        let code_of = |id: i32| {
            self.definitions
                .iter()
                .find(|d| d.id == id)
                .map(|d| d.code.clone())
                .unwrap_or_default()
        };
        let mut out: Vec<StoredKpiValue> = self
            .data
            .iter()
            .filter(|(k, _)| k.0 == deal_id)
            .map(|((deal, kpi_id, period_type, period_date, data_type), v)| StoredKpiValue {
                deal_id: deal.clone(),
                kpi_code: code_of(*kpi_id),
                period_type: *period_type,
                period_date: *period_date,
                data_type: *data_type,
                value: v.value,
                source: v.source.clone(),
                source_ref: Some(v.source_ref.clone()),
                created_by: v.created_by.clone(),
            })
            .collect();
        out.sort_by(|a, b| {
            (a.period_date, &a.kpi_code, a.data_type.as_str())
                .cmp(&(b.period_date, &b.kpi_code, b.data_type.as_str()))
        });
        Ok(out)
    }
}

mod common;
use common::{count, dated, new_connection, store};

use chrono::{TimeZone, Utc};
use kpi_ingest::cell::CellValue;
use kpi_ingest::connection::{ConnectionPatch, SourceProvider, SyncStatus};
use kpi_ingest::import;
use kpi_ingest::kpi::DataType;
use kpi_ingest::mapping::ColumnMapping;
use kpi_ingest::repo::{ConnectionRepository, KpiRepository, RepoError};

fn revenue() -> ColumnMapping {
    ColumnMapping::new("Total Revenue", "total_revenue", DataType::Actual)
}

#[test]
fn create_starts_pending_and_keeps_mapping_order() {
    let (_db, mut store) = store();
    let mapping = vec![
        ColumnMapping::new("Occupancy", "physical_occupancy", DataType::Actual),
        revenue(),
        ColumnMapping::new("Revenue Budget", "total_revenue", DataType::Budget),
    ];
    let conn = store
        .create_connection(&new_connection("Rent Roll"), &mapping)
        .expect("create");

    assert_eq!(conn.sync_status, SyncStatus::Pending);
    assert_eq!(conn.provider, SourceProvider::Excel);
    assert!(conn.last_synced_at.is_none());
    assert_eq!(conn.column_mapping, mapping);

    let loaded = store.get_connection(conn.id).unwrap().expect("stored");
    assert_eq!(loaded, conn);
}

#[test]
fn duplicate_columns_collapse_last_write_wins() {
    let (_db, mut store) = store();
    let mapping = vec![
        revenue(),
        ColumnMapping::new("Occupancy", "physical_occupancy", DataType::Actual),
        ColumnMapping::new("Total Revenue", "total_revenue", DataType::Forecast),
    ];
    let conn = store
        .create_connection(&new_connection("Dupes"), &mapping)
        .unwrap();

    assert_eq!(conn.column_mapping.len(), 2);
    let rev = conn
        .column_mapping
        .iter()
        .find(|m| m.column_name == "Total Revenue")
        .unwrap();
    assert_eq!(rev.data_type, DataType::Forecast);
}

#[test]
fn patch_updates_only_given_fields() {
    let (_db, mut store) = store();
    let conn = store
        .create_connection(&new_connection("Rent Roll"), &[revenue()])
        .unwrap();

    let failed = store
        .update_connection(conn.id, &ConnectionPatch::failed("boom"))
        .unwrap();
    assert_eq!(failed.sync_status, SyncStatus::Error);
    assert_eq!(failed.last_error.as_deref(), Some("boom"));
    assert_eq!(failed.column_mapping, conn.column_mapping);

    let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    store
        .update_connection(conn.id, &ConnectionPatch::syncing())
        .unwrap();
    let ok = store
        .update_connection(conn.id, &ConnectionPatch::succeeded(at))
        .unwrap();
    assert_eq!(ok.sync_status, SyncStatus::Success);
    assert_eq!(ok.last_error, None);
    assert_eq!(ok.last_synced_at, Some(at));
    assert_eq!(ok.name, "Rent Roll");

    let remapped = store
        .update_connection(
            conn.id,
            &ConnectionPatch::mapping(vec![ColumnMapping::new(
                "DSCR",
                "dscr",
                DataType::Actual,
            )]),
        )
        .unwrap();
    assert_eq!(remapped.column_mapping.len(), 1);
    assert_eq!(remapped.column_mapping[0].kpi_code, "dscr");
}

#[test]
fn unknown_ids() {
    let (_db, mut store) = store();
    assert!(store.get_connection(999).unwrap().is_none());
    assert!(!store.delete_connection(999).unwrap());

    let err = store
        .update_connection(999, &ConnectionPatch::syncing())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RepoError>(),
        Some(RepoError::ConnectionMissing { id: 999 })
    ));
}

#[test]
fn list_filters_by_fund() {
    let (_db, mut store) = store();
    store
        .create_connection(&new_connection("A"), &[])
        .unwrap();
    let mut other = new_connection("B");
    other.fund_id = "fund-2".into();
    store.create_connection(&other, &[]).unwrap();

    assert_eq!(store.list_connections(None).unwrap().len(), 2);
    let fund2 = store.list_connections(Some("fund-2")).unwrap();
    assert_eq!(fund2.len(), 1);
    assert_eq!(fund2[0].name, "B");
}

#[test]
fn list_groups_mappings_per_connection() {
    let (_db, mut store) = store();
    let a = store
        .create_connection(
            &new_connection("A"),
            &[
                ColumnMapping::new("Occupancy", "physical_occupancy", DataType::Actual),
                revenue(),
            ],
        )
        .unwrap();
    let empty = store.create_connection(&new_connection("Empty"), &[]).unwrap();
    let b = store
        .create_connection(
            &new_connection("B"),
            &[ColumnMapping::new("DSCR", "dscr", DataType::Budget)],
        )
        .unwrap();

    let listed = store.list_connections(None).unwrap();
    assert_eq!(listed.len(), 3);
    assert_eq!(listed[0], a);
    assert_eq!(listed[1], empty);
    assert!(listed[1].column_mapping.is_empty());
    assert_eq!(listed[2], b);
    assert_eq!(listed[0].column_mapping[0].column_name, "Occupancy");
}

#[test]
fn delete_cascades_mapping_but_keeps_data() {
    let (_db, mut store) = store();
    let conn = store
        .create_connection(&new_connection("Rent Roll"), &[revenue()])
        .unwrap();

    let res = import::import_excel(
        &mut store,
        "deal-1",
        conn.id,
        vec![dated("2024-01-01", &[("Total Revenue", CellValue::from(485_000.0))])],
        None,
    );
    assert!(res.success, "{:?}", res.errors);

    assert!(store.delete_connection(conn.id).unwrap());
    assert!(store.get_connection(conn.id).unwrap().is_none());
    assert_eq!(count(store.conn(), "connection_column_mappings"), 0);

    let data = store.list_kpi_data("deal-1").unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].source_ref.as_deref(), Some("Rent Roll:row1"));
}

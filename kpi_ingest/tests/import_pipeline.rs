mod common;
use common::{count, dated, new_connection, store};

use diesel::RunQueryDsl;
use kpi_ingest::cell::{CellValue, Row};
use kpi_ingest::connection::SyncStatus;
use kpi_ingest::import::{self, CreateConnectionImport};
use kpi_ingest::kpi::{DataType, PeriodType};
use kpi_ingest::mapping::{ColumnMapping, MappingSelection};
use kpi_ingest::normalize::Severity;
use kpi_ingest::repo::{ConnectionRepository, KpiRepository};
use kpi_ingest::source::FileSource;

fn selections() -> Vec<MappingSelection> {
    vec![
        MappingSelection::included(ColumnMapping::new(
            "Total Revenue",
            "total_revenue",
            DataType::Actual,
        )),
        MappingSelection::included(ColumnMapping::new(
            "Occupancy Rate",
            "physical_occupancy",
            DataType::Actual,
        )),
    ]
}

fn create_input(rows: Vec<Row>, mappings: Vec<MappingSelection>) -> CreateConnectionImport {
    CreateConnectionImport {
        connection: new_connection("Rent Roll"),
        deal_id: "deal-1".into(),
        mappings,
        rows,
        user_id: Some("user-1".into()),
    }
}

fn rows_with_errors() -> Vec<Row> {
    vec![
        dated(
            "2024-01-15",
            &[
                ("Total Revenue", CellValue::from("485,000")),
                ("Occupancy Rate", CellValue::from("abc")),
            ],
        ),
        dated(
            "2024-02-01",
            &[
                ("Total Revenue", CellValue::from(490_000.0)),
                ("Occupancy Rate", CellValue::from("94.5%")),
            ],
        ),
        dated(
            "03/01/2024",
            &[
                ("Total Revenue", CellValue::from("n/a")),
                ("Occupancy Rate", CellValue::from(95.0)),
            ],
        ),
    ]
}

#[test]
fn end_to_end_partial_row() {
    let (_db, mut store) = store();
    let rows = vec![dated(
        "2024-01-01",
        &[
            ("Total Revenue", CellValue::from("485,000")),
            ("Occupancy Rate", CellValue::from("bad")),
        ],
    )];

    let res = import::create_connection_and_import(&mut store, &create_input(rows, selections()));
    assert!(res.success, "{:?}", res.errors);
    assert_eq!(res.rows_imported, 1);
    assert_eq!(res.rows_skipped, 0);
    assert_eq!(res.columns_mapped, 2);
    assert_eq!(res.errors.len(), 1);
    assert_eq!(res.errors[0].severity, Severity::Warning);
    assert_eq!(res.errors[0].row, Some(1));
    assert_eq!(res.errors[0].column.as_deref(), Some("Occupancy Rate"));
    assert_eq!(res.errors[0].message, "Invalid numeric value");

    let data = store.list_kpi_data("deal-1").unwrap();
    assert_eq!(data.len(), 1);
    let v = &data[0];
    assert_eq!(v.kpi_code, "total_revenue");
    assert_eq!(v.value, 485_000.0);
    assert_eq!(v.period_type, PeriodType::Monthly);
    assert_eq!(v.period_date.to_string(), "2024-01-01");
    assert_eq!(v.data_type, DataType::Actual);
    assert_eq!(v.source, "excel");
    assert_eq!(v.created_by.as_deref(), Some("user-1"));

    let conn = store
        .get_connection(res.connection_id.unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(conn.sync_status, SyncStatus::Success);
    assert!(conn.last_synced_at.is_some());
    assert!(conn.last_error.is_none());
}

#[test]
fn missing_date_skips_whole_row() {
    let (_db, mut store) = store();
    let mut bad = dated(
        "2024-01-01",
        &[
            ("Total Revenue", CellValue::from(1.0)),
            ("Occupancy Rate", CellValue::from(2.0)),
        ],
    );
    bad.insert("Date".into(), CellValue::Empty);
    let good = dated("2024-02-01", &[("Total Revenue", CellValue::from(3.0))]);

    let res = import::create_connection_and_import(
        &mut store,
        &create_input(vec![bad, good], selections()),
    );
    assert!(res.success);
    assert_eq!(res.rows_skipped, 1);
    assert_eq!(res.rows_imported, 1);
    assert_eq!(res.errors.len(), 1);
    let e = &res.errors[0];
    assert_eq!((e.row, e.column.as_deref()), (Some(1), Some("Date")));
    assert_eq!(e.severity, Severity::Error);
    assert_eq!(store.list_kpi_data("deal-1").unwrap().len(), 1);
}

#[test]
fn unknown_code_and_bad_number_are_warnings() {
    let (_db, mut store) = store();
    let mut mappings = selections();
    mappings.push(MappingSelection::included(ColumnMapping::new(
        "Mystery",
        "not_a_kpi",
        DataType::Actual,
    )));
    mappings.push(MappingSelection::included(ColumnMapping::new(
        "DSCR",
        "dscr",
        DataType::Actual,
    )));
    let rows = vec![dated(
        "2024-01-01",
        &[
            ("Total Revenue", CellValue::from(100.0)),
            ("Occupancy Rate", CellValue::from("??")),
            ("Mystery", CellValue::from(5.0)),
            ("DSCR", CellValue::from("1.45")),
        ],
    )];

    let res = import::create_connection_and_import(&mut store, &create_input(rows, mappings));
    assert!(res.success);
    assert_eq!(res.rows_imported, 2);
    let issues: Vec<_> = res
        .errors
        .iter()
        .map(|e| (e.column.as_deref().unwrap(), e.severity, e.message.as_str()))
        .collect();
    assert_eq!(
        issues,
        vec![
            ("Occupancy Rate", Severity::Warning, "Invalid numeric value"),
            ("Mystery", Severity::Warning, "Unknown KPI code: not_a_kpi"),
        ]
    );
}

#[test]
fn excluded_selections_are_never_referenced() {
    let (_db, mut store) = store();
    let mappings = vec![
        MappingSelection::included(ColumnMapping::new(
            "Total Revenue",
            "total_revenue",
            DataType::Actual,
        )),
        MappingSelection::excluded(ColumnMapping::new("X", "y", DataType::Actual)),
    ];
    let rows = vec![dated(
        "2024-01-01",
        &[
            ("Total Revenue", CellValue::from(1.0)),
            ("X", CellValue::from("garbage")),
        ],
    )];

    let res = import::create_connection_and_import(&mut store, &create_input(rows, mappings));
    assert!(res.success);
    assert_eq!(res.columns_mapped, 1);
    assert!(res.errors.is_empty());

    let conn = store
        .get_connection(res.connection_id.unwrap())
        .unwrap()
        .unwrap();
    assert!(conn.column_mapping.iter().all(|m| m.column_name != "X"));
}

#[test]
fn errors_come_back_row_major() {
    let (_db, mut store) = store();
    let res = import::create_connection_and_import(
        &mut store,
        &create_input(rows_with_errors(), selections()),
    );
    assert!(res.success);
    let rows: Vec<_> = res.errors.iter().map(|e| e.row.unwrap()).collect();
    assert_eq!(rows, vec![1, 3]);
    assert_eq!(res.rows_imported, 4);
}

#[test]
fn reimport_overwrites_instead_of_duplicating() {
    let (_db, mut store) = store();
    let first = import::create_connection_and_import(
        &mut store,
        &create_input(rows_with_errors(), selections()),
    );
    let id = first.connection_id.unwrap();
    let before = store.list_kpi_data("deal-1").unwrap();

    let again = import::import_excel(&mut store, "deal-1", id, rows_with_errors(), Some("user-1"));
    assert!(again.success);
    assert_eq!(store.list_kpi_data("deal-1").unwrap(), before);
    assert_eq!(count(store.conn(), "kpi_data"), before.len() as i64);

    // same key, new value
    let fix = vec![dated("2024-01-31", &[("Total Revenue", CellValue::from(500_000.0))])];
    import::import_excel(&mut store, "deal-1", id, fix, None);
    let after = store.list_kpi_data("deal-1").unwrap();
    assert_eq!(after.len(), before.len());
    let jan = after
        .iter()
        .find(|v| v.kpi_code == "total_revenue" && v.period_date.to_string() == "2024-01-01")
        .unwrap();
    assert_eq!(jan.value, 500_000.0);
    assert_eq!(jan.created_by, None);
}

#[test]
fn entry_points_normalize_identically() {
    let (_db, mut store) = store();
    let created = import::create_connection_and_import(
        &mut store,
        &create_input(rows_with_errors(), selections()),
    );
    let id = created.connection_id.unwrap();
    let via_excel = import::import_excel(&mut store, "deal-2", id, rows_with_errors(), Some("user-1"));

    assert_eq!(created.errors, via_excel.errors);
    assert_eq!(created.rows_imported, via_excel.rows_imported);

    let strip = |deal: &str, store: &mut kpi_ingest::repo::sqlite::SqliteStore| {
        store
            .list_kpi_data(deal)
            .unwrap()
            .into_iter()
            .map(|mut v| {
                v.deal_id.clear();
                v
            })
            .collect::<Vec<_>>()
    };
    assert_eq!(strip("deal-1", &mut store), strip("deal-2", &mut store));
}

#[test]
fn unknown_connection_is_operation_fatal() {
    let (_db, mut store) = store();
    let res = import::import_excel(&mut store, "deal-1", 4242, rows_with_errors(), None);
    assert!(!res.success);
    assert_eq!(res.rows_imported, 0);
    assert_eq!(res.errors.len(), 1);
    let e = &res.errors[0];
    assert_eq!((e.row, e.column.as_deref()), (None, None));
    assert_eq!(e.message, "Connection not found");
    assert_eq!(count(store.conn(), "kpi_data"), 0);
}

#[test]
fn empty_mapping_is_operation_fatal() {
    let (_db, mut store) = store();
    let conn = store
        .create_connection(&new_connection("Unmapped"), &[])
        .unwrap();
    let res = import::import_excel(&mut store, "deal-1", conn.id, rows_with_errors(), None);
    assert!(!res.success);
    assert_eq!(res.errors[0].message, "Column mapping not configured");
    let after = store.get_connection(conn.id).unwrap().unwrap();
    assert_eq!(after.sync_status, SyncStatus::Pending);
}

#[test]
fn persistence_failure_marks_connection_error() {
    let (_db, mut store) = store();
    let conn = store
        .create_connection(
            &new_connection("Rent Roll"),
            &[ColumnMapping::new("Total Revenue", "total_revenue", DataType::Actual)],
        )
        .unwrap();
    diesel::sql_query("DROP TABLE kpi_data;")
        .execute(store.conn())
        .unwrap();

    let rows = vec![dated("2024-01-01", &[("Total Revenue", CellValue::from(1.0))])];
    let res = import::import_excel(&mut store, "deal-1", conn.id, rows, None);
    assert!(!res.success);
    assert_eq!(res.errors.len(), 1);
    assert!(res.errors[0].message.starts_with("Failed to save KPI data"));

    let after = store.get_connection(conn.id).unwrap().unwrap();
    assert_eq!(after.sync_status, SyncStatus::Error);
    assert_eq!(after.last_error.as_deref(), Some(res.errors[0].message.as_str()));
}

#[test]
fn sync_reads_rows_from_source() {
    let (db, mut store) = store();
    let conn = store
        .create_connection(
            &new_connection("Sheet"),
            &[
                ColumnMapping::new("Total Revenue", "total_revenue", DataType::Actual),
                ColumnMapping::new("Revenue Budget", "total_revenue", DataType::Budget),
            ],
        )
        .unwrap();

    let path = std::path::Path::new(&db.path).with_file_name("sheet.csv");
    std::fs::write(
        &path,
        "Date,Total Revenue,Revenue Budget\n\
         2024-01-01,\"$485,000\",480000\n\
         Feb 2024,,(1200)\n",
    )
    .unwrap();

    let mut source = FileSource::new(&path);
    let res = import::sync_google_sheets(&mut store, conn.id, "deal-1", Some("user-1"), &mut source);
    assert!(res.success, "{:?}", res.errors);
    assert_eq!(res.summary().rows_imported, 3);

    let data = store.list_kpi_data("deal-1").unwrap();
    let feb_budget = data
        .iter()
        .find(|v| v.period_date.to_string() == "2024-02-01")
        .unwrap();
    assert_eq!(feb_budget.data_type, DataType::Budget);
    assert_eq!(feb_budget.value, -1200.0);
    assert_eq!(feb_budget.source_ref.as_deref(), Some("Sheet:row2"));
}

#[test]
fn unreadable_source_is_operation_fatal() {
    let (db, mut store) = store();
    let conn = store
        .create_connection(
            &new_connection("Sheet"),
            &[ColumnMapping::new("Total Revenue", "total_revenue", DataType::Actual)],
        )
        .unwrap();

    let missing = std::path::Path::new(&db.path).with_file_name("missing.csv");
    let mut source = FileSource::new(missing);
    let res = import::sync_google_sheets(&mut store, conn.id, "deal-1", None, &mut source);
    assert!(!res.success);
    assert!(res.errors[0].message.starts_with("Failed to read spreadsheet"));
    let after = store.get_connection(conn.id).unwrap().unwrap();
    assert_eq!(after.sync_status, SyncStatus::Error);
}

#[test]
fn preview_never_writes() {
    let (_db, mut store) = store();
    let conn = store
        .create_connection(
            &new_connection("Rent Roll"),
            &[ColumnMapping::new("Total Revenue", "total_revenue", DataType::Actual)],
        )
        .unwrap();
    let rows = vec![
        dated(
            "2024-01-20",
            &[
                ("Total Revenue", CellValue::from("485,000")),
                ("Debt Service", CellValue::from(215_000.0)),
            ],
        ),
        dated("nope", &[("Total Revenue", CellValue::from("x"))]),
    ];

    let preview = import::preview_mapped_data(&mut store, conn.id, &rows).unwrap();
    assert_eq!(preview.columns, vec!["Date", "Total Revenue", "Debt Service"]);
    assert_eq!(preview.mapped_data.len(), 2);
    assert_eq!(
        preview.mapped_data[0].period.map(|d| d.to_string()).as_deref(),
        Some("2024-01-01")
    );
    assert_eq!(preview.mapped_data[0].values[0].value, Some(485_000.0));
    assert_eq!(
        preview.mapped_data[0].values[0].kpi_name.as_deref(),
        Some("Total Revenue")
    );
    assert_eq!(preview.mapped_data[1].period, None);
    assert_eq!(preview.mapped_data[1].values[0].value, None);

    assert_eq!(preview.unmapped_columns.len(), 1);
    let unmapped = &preview.unmapped_columns[0];
    assert_eq!(unmapped.column_name, "Debt Service");
    assert_eq!(
        unmapped.suggestion.as_ref().and_then(|s| s.kpi_code.as_deref()),
        Some("debt_service")
    );

    assert_eq!(count(store.conn(), "kpi_data"), 0);
    let after = store.get_connection(conn.id).unwrap().unwrap();
    assert_eq!(after.sync_status, SyncStatus::Pending);
}

#![allow(dead_code)]

use diesel::QueryableByName;
use diesel::prelude::*;
use diesel::sql_types::{BigInt, Integer, Text};
use kpi_ingest::cell::{CellValue, Row, row};
use kpi_ingest::connection::{NewConnection, SourceProvider};
use kpi_ingest::db::{connection, migrate};
use kpi_ingest::kpi_catalog::{self, SyncOptions};
use kpi_ingest::repo::sqlite::SqliteStore;
use std::path::PathBuf;
use tempfile::TempDir;

#[derive(QueryableByName)]
struct JournalMode {
    #[diesel(sql_type = Text)]
    journal_mode: String,
}
#[derive(QueryableByName)]
struct ForeignKeys {
    #[diesel(sql_type = Integer)]
    foreign_keys: i32,
}
#[derive(QueryableByName)]
struct BusyTimeout {
    #[diesel(sql_type = Integer, column_name = "timeout")]
    busy_timeout: i32,
}
#[derive(QueryableByName)]
struct Cnt {
    #[diesel(sql_type = BigInt)]
    cnt: i64,
}

pub struct TestDb {
    _dir: TempDir,    // keep alive for the life of the test
    pub path: String, // <tmpdir>/test.db
}

pub fn setup_db() -> (TestDb, SqliteConnection) {
    let dir = TempDir::new().expect("tempdir");
    let mut p = PathBuf::from(dir.path());
    p.push("test.db");
    let path = p.to_string_lossy().to_string();

    migrate::run_sqlite(&path).expect("migrations");

    let conn = connection::connect_sqlite(&path).expect("connect");
    (TestDb { _dir: dir, path }, conn)
}

/// Migrated store with the bundled KPI catalog loaded.
pub fn store() -> (TestDb, SqliteStore) {
    let (db, conn) = setup_db();
    let mut store = SqliteStore::from_connection(conn);
    kpi_catalog::sync_catalog(
        store.conn(),
        kpi_catalog::default_catalog().expect("bundled catalog"),
        SyncOptions::default(),
    )
    .expect("seed catalog");
    (db, store)
}

pub fn assert_sqlite_pragmas(conn: &mut SqliteConnection) {
    use diesel::sql_query;

    let jm: JournalMode = sql_query("PRAGMA journal_mode;").get_result(conn).unwrap();
    assert_eq!(jm.journal_mode.to_lowercase(), "wal");

    let fk: ForeignKeys = sql_query("PRAGMA foreign_keys;").get_result(conn).unwrap();
    assert_eq!(fk.foreign_keys, 1);

    let bt: BusyTimeout = sql_query("PRAGMA busy_timeout;").get_result(conn).unwrap();
    assert_eq!(bt.busy_timeout, 5000);
}

pub fn count(conn: &mut SqliteConnection, table: &str) -> i64 {
    diesel::sql_query(format!("SELECT COUNT(*) AS cnt FROM {table};"))
        .get_result::<Cnt>(conn)
        .unwrap()
        .cnt
}

pub fn fk_check_empty(conn: &mut SqliteConnection) {
    #[derive(QueryableByName)]
    struct Violation {
        #[diesel(sql_type = Text)]
        table: String,
    }
    let v: Vec<Violation> = diesel::sql_query("PRAGMA foreign_key_check;")
        .load(conn)
        .unwrap();
    assert!(
        v.is_empty(),
        "foreign key violations in {:?}",
        v.iter().map(|x| &x.table).collect::<Vec<_>>()
    );
}

pub fn new_connection(name: &str) -> NewConnection {
    NewConnection {
        fund_id: "fund-1".into(),
        deal_id: Some("deal-1".into()),
        provider: SourceProvider::Excel,
        name: name.into(),
        spreadsheet_id: None,
        sheet_name: None,
        credentials: None,
        sync_frequency: None,
        sync_enabled: false,
    }
}

/// `Date` plus `(column, value)` cells.
pub fn dated(date: &str, cells: &[(&str, CellValue)]) -> Row {
    let mut r = row([("Date", CellValue::from(date))]);
    for (k, v) in cells {
        r.insert((*k).to_string(), v.clone());
    }
    r
}

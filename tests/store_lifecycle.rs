use chrono::NaiveDate;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use persgest_lib::database::backup::{backup_dir_for, list_backups};
use persgest_lib::database::schema::{ABSENCE_TABLE, DEFAULT_ABSENCE_CODES, TABLES};
use persgest_lib::excel::sheet_names;
use persgest_lib::{CellValue, Database, StoreConfig, Table};

fn config(dir: &Path) -> StoreConfig {
    StoreConfig::new(dir.join("persgest_master.xlsx"))
}

fn overtime_table() -> Table {
    let mut table = Table::new(
        ["matricola", "nome", "data", "valore", "note"]
            .iter()
            .map(|c| c.to_string())
            .collect(),
    );
    table.rows.push(vec![
        CellValue::text("3371N"),
        CellValue::text("Rossi Mario"),
        CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 5).unwrap()),
        CellValue::Number(2.5),
        CellValue::Empty,
    ]);
    table.rows.push(vec![
        CellValue::text("A1234B"),
        CellValue::text("Bianchi Anna"),
        CellValue::Date(NaiveDate::from_ymd_opt(2024, 3, 6).unwrap()),
        CellValue::Number(1.0),
        CellValue::text("festivo"),
    ]);
    table
}

#[test]
fn test_save_then_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(config(dir.path())).unwrap();

    let table = overtime_table();
    db.save_table("Straordinario", &table).unwrap();

    assert_eq!(db.get_all("Straordinario").unwrap(), table);
    assert_eq!(sheet_names(db.path()).unwrap().len(), TABLES.len());
}

#[test]
fn test_save_leaves_other_tables_alone() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(config(dir.path())).unwrap();
    db.save_table("Straordinario", &overtime_table()).unwrap();

    let mut units = Table::new(vec!["UO".to_string()]);
    units.rows.push(vec![CellValue::text("Nord")]);
    db.save_table("tbl_UO", &units).unwrap();

    assert_eq!(db.get_all("Straordinario").unwrap(), overtime_table());
    assert_eq!(db.get_all(ABSENCE_TABLE).unwrap().len(), DEFAULT_ABSENCE_CODES.len());
}

#[test]
fn test_schema_check_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(config(dir.path())).unwrap();
    let version = db.version();

    let report = db.ensure_tables().unwrap();
    assert!(report.is_noop());
    assert_eq!(db.version(), version);

    let again = Database::open(config(dir.path())).unwrap();
    assert_eq!(again.version(), version);
}

#[test]
fn test_absence_codes_are_never_reset() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(config(dir.path())).unwrap();

    let mut codes = Table::new(vec!["Turno".to_string()]);
    codes.rows.push(vec![CellValue::text("XYZ")]);
    db.save_table(ABSENCE_TABLE, &codes).unwrap();
    drop(db);

    let db = Database::open(config(dir.path())).unwrap();
    let table = db.get_all(ABSENCE_TABLE).unwrap();
    assert_eq!(table.len(), 1);
    assert_eq!(table.rows[0][0], CellValue::text("XYZ"));
}

#[test]
fn test_versions_increase_with_every_write() {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(config(dir.path())).unwrap();

    let mut last = db.version();
    for unit in ["Nord", "Sud", "Est"] {
        let mut record = persgest_lib::Record::new();
        record.insert("UO".to_string(), CellValue::text(unit));
        db.add_record("tbl_UO", &record).unwrap();

        let now = db.version();
        assert_eq!(now, last + 1);
        last = now;
    }
    assert!(db.meta().last_write_ts.is_some());
}

#[test]
fn test_write_backs_up_and_keeps_only_the_newest() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.backup_keep_last = 2;
    let db = Database::open(cfg).unwrap();

    let backups_dir = backup_dir_for(db.path());
    fs::create_dir_all(&backups_dir).unwrap();
    let base = SystemTime::now() - Duration::from_secs(3600);
    let old: Vec<PathBuf> = (1..=4u64)
        .map(|i| {
            let path = backups_dir.join(format!("persgest_master_2023010{}_000000.xlsx", i));
            let file = File::create(&path).unwrap();
            file.set_modified(base + Duration::from_secs(i * 60)).unwrap();
            path
        })
        .collect();

    let before = fs::read(db.path()).unwrap();
    db.save_table("Straordinario", &overtime_table()).unwrap();

    let backups = list_backups(db.path());
    assert_eq!(backups.len(), 2);
    assert!(!old.contains(&backups[0]));
    assert_eq!(fs::read(&backups[0]).unwrap(), before);
    assert_eq!(backups[1], old[3]);
    assert!(old[..3].iter().all(|p| !p.exists()));
}

#[test]
fn test_truncated_store_is_recreated() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    fs::write(&cfg.path, b"PK\x03\x04 truncated").unwrap();

    let db = Database::open(cfg.clone()).unwrap();

    let bak = dir.path().join("persgest_master.xlsx.bak");
    assert_eq!(fs::read(bak).unwrap(), b"PK\x03\x04 truncated");
    assert_eq!(sheet_names(db.path()).unwrap().len(), TABLES.len());
    assert!(fs::metadata(&cfg.path).unwrap().len() >= cfg.min_store_bytes);
}

#[test]
fn test_unreadable_store_is_recreated() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(dir.path());
    fs::write(&cfg.path, vec![b'x'; 8192]).unwrap();

    let db = Database::open(cfg).unwrap();

    assert!(dir.path().join("persgest_master.xlsx.bak").exists());
    assert!(db.get_all("Attivita").unwrap().is_empty());
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_xlsxwriter::{Format, Workbook};
use tempfile::{tempdir, TempDir};
use wasteaudit_config::{BackupPolicy, BackupSettings};
use wasteaudit_io::backup::create_backup;
use wasteaudit_io::retry::{RetryPolicy, Sleeper};
use wasteaudit_io::{Correction, RecordStore, SourceWorkbook, StoreError, WriteOptions};
use wasteaudit_recon::config::PortfolioConfig;
use wasteaudit_recon::engine::{run, RunOptions};
use wasteaudit_recon::model::{Category, FieldValue, FindingKind, LoadWarning, View};

// -------------------------------------------------------------------------
// Fixture workbook
// -------------------------------------------------------------------------

const CONFIG: &str = r#"
name = "Fixture Portfolio"

[[properties]]
name = "Orion Prosper"
units = 453
property_type = "Garden-Style"

[[properties]]
name = "Bella Mirage"
ledger_sheet = "Bella Ledger"
"#;

fn write_rows(wb: &mut Workbook, name: &str, rows: &[&[&str]]) {
    let ws = wb.add_worksheet().set_name(name).unwrap();
    for (r, cells) in rows.iter().enumerate() {
        for (c, v) in cells.iter().enumerate() {
            if v.is_empty() {
                continue;
            }
            // Numbers as numbers, like a real export.
            match v.parse::<f64>() {
                Ok(n) => ws.write_number(r as u32, c as u16, n).unwrap(),
                Err(_) => ws.write_string(r as u32, c as u16, *v).unwrap(),
            };
        }
    }
}

fn fixture() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("Portfolio.xlsx");
    let mut wb = Workbook::new();

    write_rows(
        &mut wb,
        "Property Overview",
        &[
            &["Property", "Units", "Container Count", "Service Type", "Property Type"],
            &["Orion Prosper", "453", "10", "Front Load", "Garden-Style"],
            &["Bella Mirage", "300", "3x/week", "10", "Mid-Rise"],
        ],
    );
    write_rows(
        &mut wb,
        "Service Details",
        &[
            &["Property", "Container Type", "Size", "Quantity", "Frequency"],
            &["Orion Prosper", "FEL", "8", "8", "3x/week"],
            &["Orion Prosper", "FEL", "10", "2", "3"],
            &["Bella Mirage", "Compactor", "30", "1", "on-call"],
        ],
    );
    write_rows(
        &mut wb,
        "Spend by Category",
        &[
            &["Property", "Category", "Total"],
            &["Orion Prosper", "Base", "200"],
            &["Bella Mirage", "Base", "500"],
            &["Bella Mirage", "Tax", "500"],
        ],
    );
    write_rows(
        &mut wb,
        "Contract Terms",
        &[
            &["Property", "Vendor", "Contract Start", "Term", "Renewal Clause", "Notice Period"],
            &["Orion Prosper", "Republic", "2024-01-01", "36 months", "Auto", "90 days"],
        ],
    );

    // Orion's ledger, with real date cells.
    let date_format = Format::new().set_num_format("yyyy-mm-dd");
    let ws = wb.add_worksheet().set_name("Orion Prosper").unwrap();
    for (c, h) in ["Invoice Number", "Invoice Date", "Description", "Category", "Amount"].iter().enumerate() {
        ws.write_string(0, c as u16, *h).unwrap();
    }
    let lines: [(&str, f64, &str, &str, f64); 2] = [
        ("INV-1", 45662.0, "Front load service", "base", 100.0),
        ("INV-1", 45662.0, "Front load service", "base", 50.0),
    ];
    for (i, (inv, serial, desc, cat, amount)) in lines.iter().enumerate() {
        let r = i as u32 + 1;
        ws.write_string(r, 0, *inv).unwrap();
        ws.write_number_with_format(r, 1, *serial, &date_format).unwrap();
        ws.write_string(r, 2, *desc).unwrap();
        ws.write_string(r, 3, *cat).unwrap();
        ws.write_number(r, 4, *amount).unwrap();
    }

    write_rows(
        &mut wb,
        "Bella Ledger",
        &[
            &["Invoice Number", "Invoice Date", "Category", "Amount"],
            &["B-1", "2025-02-01", "base", "500"],
            &["B-1", "2025-02-01", "tax", "500"],
        ],
    );

    wb.save(&path).unwrap();
    (dir, path)
}

fn config() -> PortfolioConfig {
    PortfolioConfig::from_toml(CONFIG).unwrap()
}

#[derive(Default)]
struct NoSleep(usize);

impl Sleeper for NoSleep {
    fn sleep(&mut self, _delay: Duration) {
        self.0 += 1;
    }
}

fn options(policy: BackupPolicy) -> WriteOptions {
    WriteOptions {
        retry: RetryPolicy { attempts: 5, delay: Duration::ZERO },
        backup: BackupSettings { policy, max_age_hours: 24 },
    }
}

// -------------------------------------------------------------------------
// Loading
// -------------------------------------------------------------------------

#[test]
fn loads_views_and_ledgers() {
    let (_dir, path) = fixture();
    let store = RecordStore::open(&path).unwrap();
    let (portfolio, warnings) = store.load(&config());

    assert_eq!(portfolio.views_found.len(), 4);
    let orion = portfolio.get("Orion Prosper").unwrap();
    assert_eq!(orion.overview[0].units(), Some(453));
    assert_eq!(orion.service_details.len(), 2);
    let items = orion.line_items();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].invoice_date, chrono::NaiveDate::from_ymd_opt(2025, 1, 5));
    assert_eq!(items[0].category, Some(Category::Base));

    let bella = portfolio.get("Bella Mirage").unwrap();
    assert_eq!(bella.line_items().len(), 2);
    assert!(warnings.is_empty(), "{warnings:?}");
}

#[test]
fn end_to_end_findings() {
    let (_dir, path) = fixture();
    let config = config();
    let (portfolio, warnings) = RecordStore::open(&path).unwrap().load(&config);
    let report = run(&config, &portfolio, warnings, &RunOptions::default()).unwrap();

    let orion: Vec<FindingKind> =
        report.findings.iter().filter(|f| f.property == "Orion Prosper").map(|f| f.kind).collect();
    // Summary says $200, ledger says $150.
    assert_eq!(orion, vec![FindingKind::CategorySumMismatch]);
    let mismatch = report.findings.iter().find(|f| f.kind == FindingKind::CategorySumMismatch).unwrap();
    assert_eq!(mismatch.delta(), Some(50.0));

    let bella: Vec<FindingKind> =
        report.findings.iter().filter(|f| f.property == "Bella Mirage").map(|f| f.kind).collect();
    assert_eq!(
        bella,
        vec![
            FindingKind::MissingFromView,
            FindingKind::TypeCorruption,
            FindingKind::TypeCorruption,
            FindingKind::SuspiciousBaseEqualsTax,
        ]
    );

    let m = &report.metrics[0];
    assert_eq!(m.property, "Orion Prosper");
    assert!((m.yards_per_door.unwrap() - 2.409).abs() < 0.001);
}

#[test]
fn unopenable_source_is_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.xlsx");
    fs::write(&path, b"not a zip").unwrap();
    assert!(matches!(RecordStore::open(&path), Err(StoreError::SourceUnavailable { .. })));
}

#[test]
fn renamed_sheet_warns_and_reports_missing_view() {
    let (_dir, path) = fixture();
    let mut config = config();
    config.sheets.contract_terms = "Contracts 2025".into();
    let (portfolio, warnings) = RecordStore::open(&path).unwrap().load(&config);
    assert!(warnings.contains(&LoadWarning::SheetNotFound { sheet: "Contracts 2025".into() }));
    let report = run(&config, &portfolio, warnings, &RunOptions::default()).unwrap();
    let missing = report
        .findings
        .iter()
        .filter(|f| f.kind == FindingKind::MissingFromView && f.view == Some(View::ContractTerms))
        .count();
    assert_eq!(missing, 2);
}

// -------------------------------------------------------------------------
// Correction
// -------------------------------------------------------------------------

fn fix_container_count() -> Correction {
    Correction {
        property: "Bella Mirage".into(),
        view: View::Overview,
        field: "container count".into(),
        value: FieldValue::Number(1.0),
    }
}

#[test]
fn correction_requires_recent_backup() {
    let (_dir, path) = fixture();
    let before = fs::read(&path).unwrap();
    let mut store = RecordStore::open(&path).unwrap();
    let err = store
        .correct(&config(), &fix_container_count(), &options(BackupPolicy::Require), &mut NoSleep::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::BackupMissing { .. }));
    assert_eq!(fs::read(&path).unwrap(), before, "source must be untouched");
}

#[test]
fn correction_persists_and_audits() {
    let (_dir, path) = fixture();
    create_backup(&path).unwrap();
    let config = config();

    let mut store = RecordStore::open(&path).unwrap();
    let audit = store
        .correct(&config, &fix_container_count(), &options(BackupPolicy::Require), &mut NoSleep::default())
        .unwrap();
    assert_eq!(audit.sheet, "Property Overview");
    assert_eq!(audit.field, "Container Count");
    assert_eq!(audit.row, 3);
    assert_eq!(audit.before, Some(FieldValue::Text("3x/week".into())));
    assert_eq!(audit.after, FieldValue::Number(1.0));

    // Reload from disk: the fix is there, the rest survived.
    let reopened = SourceWorkbook::open(&path).unwrap();
    assert_eq!(reopened.sheet_names().len(), 6);
    let (portfolio, _) = RecordStore::open(&path).unwrap().load(&config);
    let bella = portfolio.get("Bella Mirage").unwrap();
    assert_eq!(bella.overview[0].container_count(), Some(1));
    let orion = portfolio.get("Orion Prosper").unwrap();
    assert_eq!(orion.line_items()[0].invoice_date, chrono::NaiveDate::from_ymd_opt(2025, 1, 5));
}

#[test]
fn correction_target_must_be_unique() {
    let (_dir, path) = fixture();
    let mut store = RecordStore::open(&path).unwrap();
    let mut correction = fix_container_count();
    correction.view = View::ServiceDetails;
    correction.property = "Orion Prosper".into();
    correction.field = "quantity".into();
    let err = store
        .correct(&config(), &correction, &options(BackupPolicy::Off), &mut NoSleep::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::TargetNotFound(ref m) if m.contains("2 rows")));

    correction.property = "Nowhere Flats".into();
    let err = store
        .correct(&config(), &correction, &options(BackupPolicy::Off), &mut NoSleep::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::TargetNotFound(_)));
}

#[test]
fn correction_of_unknown_column_fails() {
    let (_dir, path) = fixture();
    let mut store = RecordStore::open(&path).unwrap();
    let mut correction = fix_container_count();
    correction.field = "Paint Color".into();
    let err = store
        .correct(&config(), &correction, &options(BackupPolicy::Off), &mut NoSleep::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::ColumnNotFound { .. }));
}

fn csv_dir() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let root = dir.path().join("portfolio");
    fs::create_dir(&root).unwrap();
    let write = |name: &str, body: &str| fs::write(root.join(name), body).unwrap();
    write("Property Overview.csv", "Property,Units,Container Count\nOrion Prosper,450,10\n");
    write("Service Details.csv", "Property,Size,Quantity,Frequency\nOrion Prosper,8,10,3x/week\n");
    write("Spend by Category.csv", "Property,Category,Total\nOrion Prosper,base,\"1,000.00\"\n");
    write(
        "Contract Terms.csv",
        "Property,Vendor,Contract Start,Term,Renewal Clause,Notice Period\nOrion Prosper,WM,2024-01-01,36,Auto,TBD\n",
    );
    write("Orion Prosper.csv", "Invoice Number,Invoice Date,Category,Amount\nA-1,01/15/2025,base,1000\n");
    (dir, root)
}

fn backup_dir_for(file: &Path) {
    let backups = file.parent().unwrap().join("backups");
    fs::create_dir_all(&backups).unwrap();
    fs::write(backups.join("Property Overview 2025-01-01.csv"), b"copy").unwrap();
}

#[test]
fn csv_directory_loads_and_corrects_one_file() {
    let (_dir, root) = csv_dir();
    let config = config();
    let mut store = RecordStore::open(&root).unwrap();
    let (portfolio, _) = store.load(&config);
    let orion = portfolio.get("Orion Prosper").unwrap();
    assert_eq!(orion.overview[0].units(), Some(450));
    assert_eq!(orion.line_items()[0].extended_cents, Some(100_000));

    let overview = root.join("Property Overview.csv");
    backup_dir_for(&overview);
    let correction = Correction {
        property: "Orion Prosper".into(),
        view: View::Overview,
        field: "Units".into(),
        value: FieldValue::Number(453.0),
    };
    let audit = store
        .correct(&config, &correction, &options(BackupPolicy::Require), &mut NoSleep::default())
        .unwrap();
    assert_eq!(audit.before, Some(FieldValue::Text("450".into())));
    assert_eq!(
        fs::read_to_string(&overview).unwrap(),
        "Property,Units,Container Count\nOrion Prosper,453,10\n"
    );
    assert!(!root.join("Property Overview.csv.tmp").exists());
}

fn fix_units(value: f64) -> Correction {
    Correction {
        property: "Orion Prosper".into(),
        view: View::Overview,
        field: "Units".into(),
        value: FieldValue::Number(value),
    }
}

#[test]
fn failed_write_keeps_previous_value_in_memory() {
    let (_dir, root) = csv_dir();
    let config = config();
    let mut store = RecordStore::open(&root).unwrap();

    // The target can no longer be replaced by a file.
    let overview = root.join("Property Overview.csv");
    fs::remove_file(&overview).unwrap();
    fs::create_dir(&overview).unwrap();

    let err = store
        .correct(&config, &fix_units(999.0), &options(BackupPolicy::Off), &mut NoSleep::default())
        .unwrap_err();
    assert!(matches!(err, StoreError::Io(_)), "got {err:?}");
    assert!(!root.join("Property Overview.csv.tmp").exists());

    let (portfolio, _) = store.load(&config);
    assert_eq!(portfolio.get("Orion Prosper").unwrap().overview[0].units(), Some(450));

    // Once the file is back, the audit still reports the original value.
    fs::remove_dir(&overview).unwrap();
    let audit = store
        .correct(&config, &fix_units(453.0), &options(BackupPolicy::Off), &mut NoSleep::default())
        .unwrap();
    assert_eq!(audit.before, Some(FieldValue::Text("450".into())));
    assert_eq!(fs::read_to_string(&overview).unwrap(), "Property,Units,Container Count\nOrion Prosper,453,10\n");
}

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cisprice_core::{ImportTally, PriceRecord, UpsertKind};
use cisprice_storage::{MemoryPriceStore, PriceSession, PriceStore, StoreError};
use cisprice_sync::{FileStatus, ImportConfig, ImportPipeline};
use rust_decimal::Decimal;
use rust_xlsxwriter::Workbook;

/// Writes a CIS-style export: header, secondary header, then `(part, cost)` rows.
fn write_export(dir: &Path, file_name: &str, headers: [&str; 2], rows: &[(&str, &str)]) {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, headers[0]).expect("write");
    sheet.write_string(0, 1, headers[1]).expect("write");
    sheet.write_string(1, 0, "(text)").expect("write");
    sheet.write_string(1, 1, "(usd)").expect("write");
    for (i, (part, cost)) in rows.iter().enumerate() {
        let row = i as u32 + 2;
        if !part.is_empty() {
            sheet.write_string(row, 0, *part).expect("write");
        }
        sheet.write_string(row, 1, *cost).expect("write");
    }
    workbook.save(dir.join(file_name)).expect("save");
}

fn config_for(dir: &Path) -> ImportConfig {
    ImportConfig {
        source_dir: dir.to_path_buf(),
        ..ImportConfig::default()
    }
}

fn pipeline(dir: &Path, store: &MemoryPriceStore) -> ImportPipeline {
    ImportPipeline::new(config_for(dir), Box::new(store.clone())).expect("pipeline")
}

fn cost(value: &str) -> Option<Decimal> {
    Some(value.parse().expect("decimal"))
}

#[tokio::test]
async fn reimporting_a_file_updates_instead_of_inserting() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_export(
        dir.path(),
        "CIS-Raw Data 2024-03-15.xlsx",
        ["Part Number", "Cost (USD)"],
        &[("AB-100", "$1,234.567895"), ("AB-200", "0.5"), ("", "9.99")],
    );
    let store = MemoryPriceStore::new();

    let first = pipeline(dir.path(), &store).run_once().await.expect("first run");
    assert_eq!(first.totals, ImportTally { inserted: 2, updated: 0, skipped: 1 });
    let after_first = store.records().await;

    let second = pipeline(dir.path(), &store).run_once().await.expect("second run");
    assert_eq!(second.totals, ImportTally { inserted: 0, updated: 2, skipped: 1 });
    assert_eq!(store.records().await, after_first);
    assert_eq!(store.get("AB-100", "2024-03-15").await, cost("1234.56790"));
}

#[tokio::test]
async fn files_for_different_dates_keep_separate_records() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_export(
        dir.path(),
        "CIS-Raw Data 2024-03-15.xlsx",
        ["PN", "Cost"],
        &[("AB-100", "10")],
    );
    write_export(
        dir.path(),
        "CIS-Raw Data 2024-04-15.xlsx",
        ["part_number", "price"],
        &[("AB-100", "12.25")],
    );
    let store = MemoryPriceStore::new();

    let summary = pipeline(dir.path(), &store).run_once().await.expect("run");
    assert_eq!(summary.files_processed, 2);
    assert_eq!(summary.totals.inserted, 2);
    assert_eq!(store.get("AB-100", "2024-03-15").await, cost("10.00000"));
    assert_eq!(store.get("AB-100", "2024-04-15").await, cost("12.25000"));

    // Re-export of the earlier date with a new cost leaves the later date alone.
    let dir_again = tempfile::tempdir().expect("tempdir");
    write_export(
        dir_again.path(),
        "CIS-Raw Data 2024-03-15.xlsx",
        ["PN", "Cost"],
        &[("AB-100", "11")],
    );
    let rerun = pipeline(dir_again.path(), &store).run_once().await.expect("rerun");
    assert_eq!(rerun.totals, ImportTally { inserted: 0, updated: 1, skipped: 0 });
    assert_eq!(store.get("AB-100", "2024-03-15").await, cost("11.00000"));
    assert_eq!(store.get("AB-100", "2024-04-15").await, cost("12.25000"));
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn non_matching_and_unusable_files_are_skipped_at_file_level() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_export(dir.path(), "random.xlsx", ["PN", "Cost"], &[("X-1", "1")]);
    write_export(dir.path(), "CIS-Raw Data undated.xlsx", ["PN", "Cost"], &[("X-2", "1")]);
    write_export(
        dir.path(),
        "CIS-Raw Data 2024-01-31.xlsx",
        ["PN", "Description"],
        &[("X-3", "widget")],
    );
    std::fs::write(dir.path().join("CIS-Raw Data 2024-02-29.xls"), b"garbage").expect("write");
    std::fs::write(dir.path().join("CIS-Raw Data 2024-03-01.csv"), b"PN,Cost\n").expect("write");
    write_export(
        dir.path(),
        "CIS-Raw Data 2024-03-15.xlsx",
        ["Part_Number", "Cost_USD"],
        &[("X-4", "2")],
    );
    let store = MemoryPriceStore::new();

    let summary = pipeline(dir.path(), &store).run_once().await.expect("run");

    let statuses: Vec<_> = summary
        .files
        .iter()
        .map(|f| (f.file_name.as_str(), f.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("CIS-Raw Data 2024-01-31.xlsx", FileStatus::MissingColumn),
            ("CIS-Raw Data 2024-02-29.xls", FileStatus::LoadFailed),
            ("CIS-Raw Data 2024-03-15.xlsx", FileStatus::Imported),
            ("CIS-Raw Data undated.xlsx", FileStatus::NoDate),
        ]
    );
    assert_eq!(summary.files_found, 4);
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.files_skipped, 3);
    assert_eq!(summary.totals, ImportTally { inserted: 1, updated: 0, skipped: 0 });
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn missing_source_folder_aborts_the_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryPriceStore::new();
    let pipeline = pipeline(&dir.path().join("does-not-exist"), &store);

    let err = pipeline.run_once().await.expect_err("missing folder");
    assert!(format!("{err:#}").contains("reading source folder"));
}

#[tokio::test]
async fn empty_folder_yields_empty_summary() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = MemoryPriceStore::new();

    let summary = pipeline(dir.path(), &store).run_once().await.expect("run");
    assert_eq!(summary.files_found, 0);
    assert!(summary.files.is_empty());
    assert_eq!(summary.totals, ImportTally::default());
}

/// Loses its connection when asked to write one poisoned part number.
#[derive(Clone)]
struct DroppingStore {
    inner: MemoryPriceStore,
    poison: &'static str,
}

struct DroppingSession {
    inner: Box<dyn PriceSession>,
    poison: &'static str,
}

#[async_trait]
impl PriceStore for DroppingStore {
    fn describe(&self) -> String {
        "dropping test store".to_string()
    }

    async fn begin(&self) -> Result<Box<dyn PriceSession>, StoreError> {
        Ok(Box::new(DroppingSession {
            inner: self.inner.begin().await?,
            poison: self.poison,
        }))
    }
}

#[async_trait]
impl PriceSession for DroppingSession {
    async fn upsert(&mut self, record: &PriceRecord) -> Result<UpsertKind, StoreError> {
        if record.part_number == self.poison {
            return Err(StoreError::Connection("connection reset by peer".to_string()));
        }
        self.inner.upsert(record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.inner.rollback().await
    }
}

#[tokio::test]
async fn connection_loss_rolls_back_only_that_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_export(
        dir.path(),
        "CIS-Raw Data 2024-03-15.xlsx",
        ["PN", "Cost"],
        &[("AB-1", "1"), ("DROP", "2"), ("AB-3", "3")],
    );
    write_export(
        dir.path(),
        "CIS-Raw Data 2024-04-15.xlsx",
        ["PN", "Cost"],
        &[("AB-1", "4")],
    );
    let memory = MemoryPriceStore::new();
    let store = DroppingStore {
        inner: memory.clone(),
        poison: "DROP",
    };

    let summary = ImportPipeline::new(config_for(dir.path()), Box::new(store))
        .expect("pipeline")
        .run_once()
        .await
        .expect("run");

    assert_eq!(summary.files[0].status, FileStatus::RolledBack);
    assert_eq!(summary.files[0].tally, ImportTally::default());
    assert_eq!(summary.files[1].status, FileStatus::Imported);
    assert_eq!(summary.totals, ImportTally { inserted: 1, updated: 0, skipped: 0 });
    assert_eq!(memory.get("AB-1", "2024-03-15").await, None);
    assert_eq!(memory.get("AB-1", "2024-04-15").await, cost("4.00000"));
}

/// Fails either opening or committing the session for one date.
#[derive(Clone)]
struct FlakyStore {
    inner: MemoryPriceStore,
    date: &'static str,
    fail_begin: bool,
    begun: Arc<AtomicUsize>,
}

struct FlakySession {
    inner: Box<dyn PriceSession>,
    date: &'static str,
    seen_date: bool,
}

impl FlakyStore {
    fn new(inner: MemoryPriceStore, date: &'static str, fail_begin: bool) -> Self {
        Self {
            inner,
            date,
            fail_begin,
            begun: Default::default(),
        }
    }
}

#[async_trait]
impl PriceStore for FlakyStore {
    fn describe(&self) -> String {
        "flaky test store".to_string()
    }

    async fn begin(&self) -> Result<Box<dyn PriceSession>, StoreError> {
        // Files are processed in sorted order, so the first session belongs to `date`.
        let index = self.begun.fetch_add(1, Ordering::SeqCst);
        if self.fail_begin && index == 0 {
            return Err(StoreError::Connection("could not connect to server".to_string()));
        }
        Ok(Box::new(FlakySession {
            inner: self.inner.begin().await?,
            date: self.date,
            seen_date: false,
        }))
    }
}

#[async_trait]
impl PriceSession for FlakySession {
    async fn upsert(&mut self, record: &PriceRecord) -> Result<UpsertKind, StoreError> {
        if record.date == self.date {
            self.seen_date = true;
        }
        self.inner.upsert(record).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        if this.seen_date {
            this.inner.rollback().await?;
            return Err(StoreError::Connection("connection lost during commit".to_string()));
        }
        this.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        this.inner.rollback().await
    }
}

fn two_dated_exports(dir: &Path) {
    write_export(
        dir,
        "CIS-Raw Data 2024-03-15.xlsx",
        ["PN", "Cost"],
        &[("AB-1", "1"), ("AB-2", "2")],
    );
    write_export(dir, "CIS-Raw Data 2024-04-15.xlsx", ["PN", "Cost"], &[("AB-1", "4")]);
}

#[tokio::test]
async fn failed_commit_discards_the_file_and_the_batch_continues() {
    let dir = tempfile::tempdir().expect("tempdir");
    two_dated_exports(dir.path());
    let memory = MemoryPriceStore::new();
    let store = FlakyStore::new(memory.clone(), "2024-03-15", false);

    let summary = ImportPipeline::new(config_for(dir.path()), Box::new(store))
        .expect("pipeline")
        .run_once()
        .await
        .expect("run");

    assert_eq!(summary.files[0].status, FileStatus::RolledBack);
    assert_eq!(summary.files[0].tally, ImportTally::default());
    assert!(summary.files[0].detail.is_some());
    assert_eq!(summary.files[1].status, FileStatus::Imported);
    assert_eq!(summary.files_processed, 1);
    assert_eq!(summary.totals, ImportTally { inserted: 1, updated: 0, skipped: 0 });
    assert_eq!(memory.get("AB-1", "2024-03-15").await, None);
    assert_eq!(memory.get("AB-2", "2024-03-15").await, None);
    assert_eq!(memory.get("AB-1", "2024-04-15").await, cost("4.00000"));
}

#[tokio::test]
async fn unavailable_store_skips_the_file_and_the_batch_continues() {
    let dir = tempfile::tempdir().expect("tempdir");
    two_dated_exports(dir.path());
    let memory = MemoryPriceStore::new();
    let store = FlakyStore::new(memory.clone(), "2024-03-15", true);

    let summary = ImportPipeline::new(config_for(dir.path()), Box::new(store))
        .expect("pipeline")
        .run_once()
        .await
        .expect("run");

    assert_eq!(summary.files[0].status, FileStatus::StoreUnavailable);
    assert_eq!(summary.files[0].tally, ImportTally::default());
    assert_eq!(summary.files[1].status, FileStatus::Imported);
    assert_eq!(summary.files_skipped, 1);
    assert_eq!(summary.totals, ImportTally { inserted: 1, updated: 0, skipped: 0 });
    assert_eq!(memory.len().await, 1);
    assert_eq!(memory.get("AB-1", "2024-04-15").await, cost("4.00000"));
}

#[cfg(unix)]
#[tokio::test]
async fn non_utf8_file_names_are_still_opened() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = tempfile::tempdir().expect("tempdir");
    write_export(dir.path(), "staging.xlsx", ["PN", "Cost"], &[("AB-1", "3")]);
    let raw_name = OsStr::from_bytes(b"CIS-Raw Data 2024-03-15 \xff.xlsx");
    std::fs::rename(dir.path().join("staging.xlsx"), dir.path().join(raw_name)).expect("rename");
    let store = MemoryPriceStore::new();

    let summary = pipeline(dir.path(), &store).run_once().await.expect("run");

    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.files[0].status, FileStatus::Imported);
    assert_eq!(summary.files[0].file_name, "CIS-Raw Data 2024-03-15 \u{FFFD}.xlsx");
    assert_eq!(store.get("AB-1", "2024-03-15").await, cost("3.00000"));
}

#[tokio::test]
async fn summary_is_written_as_json_report() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_export(
        dir.path(),
        "CIS-Raw Data 2024-03-15.xlsx",
        ["PN", "Cost"],
        &[("AB-1", "1")],
    );
    let store = MemoryPriceStore::new();
    let summary = pipeline(dir.path(), &store).run_once().await.expect("run");

    let report_path = dir.path().join("reports").join("summary.json");
    summary.write_json(&report_path).await.expect("write report");
    let value: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&report_path).expect("read")).expect("json");
    assert_eq!(value["totals"]["inserted"], 1);
    assert_eq!(value["files"][0]["status"], "imported");
    assert_eq!(value["files"][0]["date"], "2024-03-15");
}

//! Batch import orchestration: enumerate exports, ingest each file, summarize the run.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use cisprice_adapters::{load_first_sheet, ColumnMap};
use cisprice_core::{FileNamePattern, ImportTally};
use cisprice_storage::{MemoryPriceStore, PgPriceStore, PriceStore};
use serde::Serialize;
use tokio::fs;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub mod config;
pub mod ingest;

pub use config::{ConfigError, DatabaseConfig, ImportConfig};
pub use ingest::{ingest_row, ingest_sheet, IngestOptions};

pub const CRATE_NAME: &str = "cisprice-sync";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Imported,
    /// Name carries no `<prefix> YYYY-MM-DD` token.
    NoDate,
    LoadFailed,
    MissingColumn,
    StoreUnavailable,
    /// Failed after rows were written; every write for the file was discarded.
    RolledBack,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_name: String,
    pub date: Option<String>,
    pub status: FileStatus,
    pub tally: ImportTally,
    pub detail: Option<String>,
}

impl FileReport {
    fn failed(file_name: &str, date: Option<&str>, status: FileStatus, detail: String) -> Self {
        Self {
            file_name: file_name.to_string(),
            date: date.map(str::to_string),
            status,
            tally: ImportTally::default(),
            detail: Some(detail),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub store: String,
    pub files_found: usize,
    pub files_processed: usize,
    pub files_skipped: usize,
    pub totals: ImportTally,
    pub files: Vec<FileReport>,
}

impl BatchSummary {
    pub fn render_line(&self) -> String {
        format!(
            "import complete: run_id={} files={}/{} inserted={} updated={} skipped={}",
            self.run_id,
            self.files_processed,
            self.files_found,
            self.totals.inserted,
            self.totals.updated,
            self.totals.skipped
        )
    }

    pub async fn write_json(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let bytes = serde_json::to_vec_pretty(self).context("serializing run summary")?;
        fs::write(path, bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }
}

/// A listed export: display name for matching and reports, real path for opening.
#[derive(Debug, Clone)]
struct Candidate {
    name: String,
    path: PathBuf,
}

pub struct ImportPipeline {
    config: ImportConfig,
    pattern: FileNamePattern,
    store: Box<dyn PriceStore>,
}

impl ImportPipeline {
    pub fn new(config: ImportConfig, store: Box<dyn PriceStore>) -> Result<Self> {
        config.validate().context("validating import config")?;
        let pattern = config.file_name_pattern()?;
        Ok(Self {
            config,
            pattern,
            store,
        })
    }

    pub fn with_postgres(config: ImportConfig) -> Result<Self> {
        let options = config
            .validate_for_database()
            .context("validating database config")?;
        let table = config.database.table_name()?;
        Self::new(config, Box::new(PgPriceStore::new(options, table)))
    }

    pub fn dry_run(config: ImportConfig) -> Result<Self> {
        Self::new(config, Box::new(MemoryPriceStore::new()))
    }

    fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            skip_leading_rows: self.config.skip_leading_rows,
            sample_rows: self.config.sample_rows,
        }
    }

    pub async fn run_once(&self) -> Result<BatchSummary> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        info!(%run_id, store = %self.store.describe(), "starting CIS price import");

        let (candidates, total_entries) = match self.list_candidates().await {
            Ok(listing) => listing,
            Err(err) => {
                error!(dir = %self.config.source_dir.display(), error = %err, "cannot access source folder");
                return Err(err);
            }
        };
        info!(
            candidates = candidates.len(),
            total_entries,
            "found spreadsheet exports to process"
        );
        if candidates.is_empty() {
            warn!(dir = %self.config.source_dir.display(), "no spreadsheet exports found");
        }

        let mut files = Vec::with_capacity(candidates.len());
        let mut totals = ImportTally::default();

        for Candidate { name: file_name, path } in &candidates {
            let Some(date) = self.pattern.extract_date(file_name) else {
                warn!(file = %file_name, "could not extract date from file name; skipping");
                files.push(FileReport::failed(
                    file_name,
                    None,
                    FileStatus::NoDate,
                    "no date token in file name".to_string(),
                ));
                continue;
            };

            info!(file = %file_name, date, "processing file");
            let report = self
                .import_file(path, file_name, date)
                .instrument(info_span!("import_file", file = %file_name, date))
                .await;

            info!(
                file = %file_name,
                status = ?report.status,
                inserted = report.tally.inserted,
                updated = report.tally.updated,
                skipped = report.tally.skipped,
                "file finished"
            );
            totals += report.tally;
            files.push(report);
        }

        let files_processed = files
            .iter()
            .filter(|f| f.status == FileStatus::Imported)
            .count();
        let summary = BatchSummary {
            run_id,
            started_at,
            finished_at: Utc::now(),
            store: self.store.describe(),
            files_found: candidates.len(),
            files_processed,
            files_skipped: candidates.len() - files_processed,
            totals,
            files,
        };
        info!(
            %run_id,
            inserted = summary.totals.inserted,
            updated = summary.totals.updated,
            skipped = summary.totals.skipped,
            files_processed = summary.files_processed,
            files_skipped = summary.files_skipped,
            "CIS price import completed"
        );
        Ok(summary)
    }

    /// Candidate file names sorted for a stable processing order, plus the
    /// number of directory entries inspected.
    async fn list_candidates(&self) -> Result<(Vec<Candidate>, usize)> {
        let dir = &self.config.source_dir;
        let mut entries = fs::read_dir(dir)
            .await
            .with_context(|| format!("reading source folder {}", dir.display()))?;

        let mut total = 0usize;
        let mut candidates = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("listing source folder {}", dir.display()))?
        {
            total += 1;
            let name = entry.file_name().to_string_lossy().into_owned();
            if self.pattern.is_candidate(&name) {
                candidates.push(Candidate {
                    name,
                    path: entry.path(),
                });
            }
        }
        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        Ok((candidates, total))
    }

    /// Load, resolve and ingest one file inside its own store session.
    /// Every failure is contained here and reported as a zero-count file.
    pub async fn import_file(&self, path: &Path, file_name: &str, date: &str) -> FileReport {
        let sheet = match load_first_sheet(path) {
            Ok(sheet) => sheet,
            Err(err) => {
                error!(error = %err, "error reading spreadsheet");
                return FileReport::failed(file_name, Some(date), FileStatus::LoadFailed, err.to_string());
            }
        };
        info!(
            sheet = sheet.name(),
            rows = sheet.len(),
            columns = %sheet.headers().join(", "),
            "spreadsheet read"
        );

        let columns = match ColumnMap::resolve(
            &sheet,
            &self.config.part_number_aliases,
            &self.config.cost_aliases,
        ) {
            Ok(columns) => columns,
            Err(err) => {
                error!(error = %err, "required column missing");
                return FileReport::failed(file_name, Some(date), FileStatus::MissingColumn, err.to_string());
            }
        };
        info!(
            part_number = %columns.part_number.label,
            cost = %columns.cost.label,
            "using columns"
        );

        let mut session = match self.store.begin().await {
            Ok(session) => session,
            Err(err) => {
                error!(error = %err, "could not open store session");
                return FileReport::failed(file_name, Some(date), FileStatus::StoreUnavailable, err.to_string());
            }
        };

        let tally = match ingest_sheet(session.as_mut(), &sheet, &columns, date, self.ingest_options()).await {
            Ok(tally) => tally,
            Err(err) => {
                error!(error = %err, "unexpected error processing file; rolling back");
                if let Err(rollback_err) = session.rollback().await {
                    warn!(error = %rollback_err, "rollback failed; connection discarded");
                }
                return FileReport::failed(file_name, Some(date), FileStatus::RolledBack, err.to_string());
            }
        };

        if let Err(err) = session.commit().await {
            error!(error = %err, "commit failed; file changes discarded");
            return FileReport::failed(file_name, Some(date), FileStatus::RolledBack, err.to_string());
        }

        FileReport {
            file_name: file_name.to_string(),
            date: Some(date.to_string()),
            status: FileStatus::Imported,
            tally,
            detail: None,
        }
    }
}

/// Build the pipeline for `config` and run one batch.
pub async fn run_import(config: ImportConfig, dry_run: bool) -> Result<BatchSummary> {
    let pipeline = if dry_run {
        ImportPipeline::dry_run(config)?
    } else {
        ImportPipeline::with_postgres(config)?
    };
    pipeline.run_once().await
}

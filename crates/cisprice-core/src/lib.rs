//! Core domain model for the CIS part price importer.

use std::fmt;
use std::ops::AddAssign;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub mod decimal;
pub mod filename;

pub use decimal::{normalize_decimal, parse_decimal, NormalizeError, COST_SCALE};
pub use filename::{DateTokenError, FileNamePattern, DEFAULT_FILE_PREFIX};

pub const CRATE_NAME: &str = "cisprice-core";

/// A single spreadsheet cell, detached from the reader that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Error cell such as `#N/A` or `#DIV/0!`.
    Error(String),
}

impl CellValue {
    /// Missing marker: empty cells, error cells and whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            CellValue::Empty | CellValue::Error(_) => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Float(f) => f.is_nan(),
            CellValue::Int(_) | CellValue::Bool(_) => false,
        }
    }

    /// Stringified form used for part numbers and decimal parsing.
    ///
    /// Integral floats render without a trailing `.0` so numeric part numbers
    /// keep the text the sheet shows.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 1e15 {
                    (*f as i64).to_string()
                } else {
                    f.to_string()
                }
            }
            CellValue::Bool(b) => b.to_string(),
            CellValue::Error(e) => e.clone(),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

/// The unit of persistence: one cost for one part on one effective date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub part_number: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub cost_usd: Decimal,
    /// `YYYY-MM-DD`, taken verbatim from the source file name.
    pub date: String,
}

/// Insert/update/skip counters, per file and summed per batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportTally {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl ImportTally {
    pub fn record(&mut self, outcome: &RowOutcome) {
        match outcome {
            RowOutcome::Inserted => self.inserted += 1,
            RowOutcome::Updated => self.updated += 1,
            RowOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

impl AddAssign for ImportTally {
    fn add_assign(&mut self, rhs: Self) {
        self.inserted += rhs.inserted;
        self.updated += rhs.updated;
        self.skipped += rhs.skipped;
    }
}

/// Whether an upsert created a new row or overwrote an existing cost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpsertKind {
    Inserted,
    Updated,
}

/// Result of ingesting one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOutcome {
    Inserted,
    Updated,
    Skipped(SkipReason),
}

impl From<UpsertKind> for RowOutcome {
    fn from(kind: UpsertKind) -> Self {
        match kind {
            UpsertKind::Inserted => RowOutcome::Inserted,
            UpsertKind::Updated => RowOutcome::Updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    BlankPartNumber,
    ErrorCell(String),
    Store(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::BlankPartNumber => f.write_str("blank part number"),
            SkipReason::ErrorCell(value) => write!(f, "error cell {value} in part number column"),
            SkipReason::Store(message) => write!(f, "store error: {message}"),
        }
    }
}

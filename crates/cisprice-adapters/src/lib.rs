//! Spreadsheet adapters: first-sheet loading via calamine and header alias resolution.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use cisprice_core::CellValue;
use thiserror::Error;

pub mod columns;

pub use columns::{resolve_column, ColumnMap, LogicalField, MissingColumn, ResolvedColumn};

pub const CRATE_NAME: &str = "cisprice-adapters";

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("opening workbook {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("workbook {path} has no sheets")]
    NoSheets { path: PathBuf },
    #[error("reading first sheet of {path}: {source}")]
    Sheet {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("first sheet of {path} is empty")]
    EmptySheet { path: PathBuf },
}

/// First worksheet of a workbook: a header row plus the rows below it.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    name: String,
    headers: Vec<String>,
    rows: Vec<Vec<CellValue>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            headers,
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Rows below the header row, in sheet order.
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Missing trailing cells read as empty.
    pub fn cell<'a>(row: &'a [CellValue], column: &ResolvedColumn) -> &'a CellValue {
        row.get(column.index).unwrap_or(&CellValue::Empty)
    }
}

pub fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Text(dt.to_string()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Error(e) => CellValue::Error(e.to_string()),
    }
}

/// Header labels are stringified; blank headers get an `Unnamed: <n>` placeholder.
fn header_label(index: usize, data: &Data) -> String {
    let label = cell_from_data(data).as_text();
    if label.trim().is_empty() {
        format!("Unnamed: {index}")
    } else {
        label
    }
}

/// Load the first worksheet of an `.xlsx` or `.xls` file, taking row 1 as the header.
pub fn load_first_sheet(path: impl AsRef<Path>) -> Result<Sheet, LoadError> {
    let path = path.as_ref();
    let mut workbook = open_workbook_auto(path).map_err(|source| LoadError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| LoadError::NoSheets {
            path: path.to_path_buf(),
        })?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| LoadError::NoSheets {
            path: path.to_path_buf(),
        })?
        .map_err(|source| LoadError::Sheet {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = range.rows();
    let headers = rows
        .next()
        .ok_or_else(|| LoadError::EmptySheet {
            path: path.to_path_buf(),
        })?
        .iter()
        .enumerate()
        .map(|(index, data)| header_label(index, data))
        .collect();
    let rows = rows
        .map(|row| row.iter().map(cell_from_data).collect())
        .collect();

    Ok(Sheet::new(name, headers, rows))
}

//! Header alias resolution.
//!
//! Exports vary header spelling and capitalization from release to release, so
//! each logical field carries an ordered alias list. Exact matches win over
//! case-insensitive ones, and earlier aliases win over later ones.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;
use tracing::info;

use crate::Sheet;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedColumn {
    /// Header label as it appears in the sheet.
    pub label: String,
    pub index: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalField {
    PartNumber,
    CostUsd,
}

impl fmt::Display for LogicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalField::PartNumber => f.write_str("Part Number"),
            LogicalField::CostUsd => f.write_str("Cost USD"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} column not found (available: {})", available.join(", "))]
pub struct MissingColumn {
    pub field: LogicalField,
    pub available: Vec<String>,
}

pub fn resolve_column<S: AsRef<str>>(headers: &[String], aliases: &[S]) -> Option<ResolvedColumn> {
    for alias in aliases {
        if let Some(index) = headers.iter().position(|h| h == alias.as_ref()) {
            return Some(ResolvedColumn {
                label: headers[index].clone(),
                index,
            });
        }
    }

    let mut folded: HashMap<String, usize> = HashMap::with_capacity(headers.len());
    for (index, header) in headers.iter().enumerate() {
        folded.entry(header.to_lowercase()).or_insert(index);
    }

    aliases.iter().find_map(|alias| {
        folded
            .get(&alias.as_ref().to_lowercase())
            .map(|&index| ResolvedColumn {
                label: headers[index].clone(),
                index,
            })
    })
}

/// Per-file mapping of the two logical fields onto actual sheet columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub part_number: ResolvedColumn,
    pub cost: ResolvedColumn,
}

impl ColumnMap {
    pub fn resolve<S: AsRef<str>>(
        sheet: &Sheet,
        part_number_aliases: &[S],
        cost_aliases: &[S],
    ) -> Result<Self, MissingColumn> {
        let lookup = |field: LogicalField, aliases: &[S]| {
            resolve_column(sheet.headers(), aliases).ok_or_else(|| {
                info!(
                    field = %field,
                    available = %sheet.headers().join(", "),
                    "no header alias matched"
                );
                MissingColumn {
                    field,
                    available: sheet.headers().to_vec(),
                }
            })
        };

        Ok(Self {
            part_number: lookup(LogicalField::PartNumber, part_number_aliases)?,
            cost: lookup(LogicalField::CostUsd, cost_aliases)?,
        })
    }
}

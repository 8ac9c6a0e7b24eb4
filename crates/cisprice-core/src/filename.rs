//! Date tokens embedded in export file names, e.g. `CIS-Raw Data 2024-03-15.xlsx`.

use regex::Regex;
use thiserror::Error;

pub const DEFAULT_FILE_PREFIX: &str = "CIS-Raw Data";

const SPREADSHEET_EXTENSIONS: [&str; 2] = [".xlsx", ".xls"];

#[derive(Debug, Error)]
pub enum DateTokenError {
    #[error("file prefix must not be empty")]
    EmptyPrefix,
    #[error("building file name pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Matches one family of export files by their fixed prefix.
#[derive(Debug, Clone)]
pub struct FileNamePattern {
    prefix: String,
    date_token: Regex,
}

impl FileNamePattern {
    pub fn new(prefix: &str) -> Result<Self, DateTokenError> {
        if prefix.is_empty() {
            return Err(DateTokenError::EmptyPrefix);
        }
        let date_token = Regex::new(&format!(r"{} (\d{{4}}-\d{{2}}-\d{{2}})", regex::escape(prefix)))?;
        Ok(Self {
            prefix: prefix.to_string(),
            date_token,
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `<prefix> ` at the start and a spreadsheet extension at the end.
    pub fn is_candidate(&self, file_name: &str) -> bool {
        file_name
            .strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with(' '))
            && SPREADSHEET_EXTENSIONS
                .iter()
                .any(|ext| file_name.ends_with(ext))
    }

    /// The first `<prefix> YYYY-MM-DD` token, verbatim. Day and month ranges are not checked.
    pub fn extract_date<'a>(&self, file_name: &'a str) -> Option<&'a str> {
        self.date_token
            .captures(file_name)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

//! Run-time configuration: defaults, an optional YAML file, then environment overrides.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use cisprice_core::{FileNamePattern, DEFAULT_FILE_PREFIX};
use cisprice_storage::{StoreError, TableName, DEFAULT_TABLE};
use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
    #[error("{0} alias list must not be empty")]
    EmptyAliases(&'static str),
    #[error(transparent)]
    Table(#[from] StoreError),
    #[error("database url is invalid: {0}")]
    DatabaseUrl(String),
    #[error("no database configured: set DATABASE_URL or CIS_DB_NAME")]
    MissingDatabase,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Full connection url; takes precedence over the individual parts.
    pub url: Option<String>,
    pub host: String,
    pub port: u16,
    pub database: Option<String>,
    pub user: String,
    pub password: Option<String>,
    pub table: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: "localhost".to_string(),
            port: 5432,
            database: None,
            user: "postgres".to_string(),
            password: None,
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn connect_options(&self) -> Result<PgConnectOptions, ConfigError> {
        if let Some(url) = &self.url {
            return PgConnectOptions::from_str(url)
                .map_err(|err| ConfigError::DatabaseUrl(err.to_string()));
        }
        let database = self.database.as_deref().ok_or(ConfigError::MissingDatabase)?;
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(database)
            .username(&self.user);
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }

    pub fn table_name(&self) -> Result<TableName, ConfigError> {
        Ok(TableName::new(&self.table)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub source_dir: PathBuf,
    pub file_prefix: String,
    pub part_number_aliases: Vec<String>,
    pub cost_aliases: Vec<String>,
    /// Rows discarded below the header before data starts. The CIS exports carry
    /// one secondary header row there.
    pub skip_leading_rows: usize,
    /// Leading data rows logged with raw and converted cost.
    pub sample_rows: usize,
    pub database: DatabaseConfig,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("./ExcelData"),
            file_prefix: DEFAULT_FILE_PREFIX.to_string(),
            part_number_aliases: ["Part_Number", "PN", "Part Number", "PartNumber"]
                .map(String::from)
                .to_vec(),
            cost_aliases: ["Cost_USD", "Cost", "USD", "Price", "Cost (USD)"]
                .map(String::from)
                .to_vec(),
            skip_leading_rows: 1,
            sample_rows: 5,
            database: DatabaseConfig::default(),
        }
    }
}

impl ImportConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(env_var)
    }

    /// Defaults with `lookup` applied as the environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// YAML file first, environment on top.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_yaml_file_with(path, env_var)
    }

    pub fn from_yaml_file_with(
        path: impl AsRef<Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("CIS_SOURCE_DIR") {
            self.source_dir = PathBuf::from(dir);
        }
        if let Some(prefix) = get("CIS_FILE_PREFIX") {
            self.file_prefix = prefix;
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database.url = Some(url);
        }
        if let Some(host) = get("CIS_DB_HOST") {
            self.database.host = host;
        }
        if let Some(port) = get("CIS_DB_PORT") {
            self.database.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CIS_DB_PORT",
                message: format!("{port:?} is not a port number"),
            })?;
        }
        if let Some(name) = get("CIS_DB_NAME") {
            self.database.database = Some(name);
        }
        if let Some(user) = get("CIS_DB_USER") {
            self.database.user = user;
        }
        if let Some(password) = lookup("CIS_DB_PASSWORD") {
            self.database.password = Some(password);
        }
        if let Some(table) = get("CIS_DB_TABLE") {
            self.database.table = table;
        }
        Ok(())
    }

    /// Checks everything that does not need the database or the source directory.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "source_dir",
                message: "must not be empty".to_string(),
            });
        }
        self.file_name_pattern()?;
        if self.part_number_aliases.iter().all(|a| a.trim().is_empty()) {
            return Err(ConfigError::EmptyAliases("part_number"));
        }
        if self.cost_aliases.iter().all(|a| a.trim().is_empty()) {
            return Err(ConfigError::EmptyAliases("cost"));
        }
        self.database.table_name()?;
        Ok(())
    }

    /// Dry runs never connect, so only real runs need usable connection settings.
    pub fn validate_for_database(&self) -> Result<PgConnectOptions, ConfigError> {
        self.validate()?;
        self.database.connect_options()
    }

    pub fn file_name_pattern(&self) -> Result<FileNamePattern, ConfigError> {
        FileNamePattern::new(&self.file_prefix).map_err(|err| ConfigError::InvalidValue {
            key: "file_prefix",
            message: err.to_string(),
        })
    }
}

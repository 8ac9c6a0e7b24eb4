//! Price history persistence: the store seam, PostgreSQL upserts and an in-memory store.

use async_trait::async_trait;
use cisprice_core::{PriceRecord, UpsertKind};
use thiserror::Error;

mod memory;
mod postgres;

pub use memory::MemoryPriceStore;
pub use postgres::PgPriceStore;

pub const CRATE_NAME: &str = "cisprice-storage";

pub const DEFAULT_TABLE: &str = "part_cost_history";

#[derive(Debug, Error)]
pub enum StoreError {
    /// The session's connection is gone; nothing more can be written for this file.
    #[error("store connection failed: {0}")]
    Connection(String),
    #[error("store query failed: {0}")]
    Query(String),
    #[error("invalid table name {0:?}")]
    InvalidTable(String),
}

impl StoreError {
    pub fn is_connection(&self) -> bool {
        matches!(self, StoreError::Connection(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::Configuration(_) => StoreError::Connection(err.to_string()),
            other => StoreError::Query(other.to_string()),
        }
    }
}

/// Table identifier checked once so it can be spliced into SQL text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: &str) -> Result<Self, StoreError> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid_start && valid_rest && name.len() <= 63 {
            Ok(Self(name.to_string()))
        } else {
            Err(StoreError::InvalidTable(name.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TableName {
    fn default() -> Self {
        Self(DEFAULT_TABLE.to_string())
    }
}

/// Opens one write session per imported file.
#[async_trait]
pub trait PriceStore: Send + Sync {
    /// Human-readable target for log lines, never including credentials.
    fn describe(&self) -> String;

    async fn begin(&self) -> Result<Box<dyn PriceSession>, StoreError>;
}

/// A single file's unit of work. Writes become visible only on `commit`.
#[async_trait]
pub trait PriceSession: Send {
    /// Upsert on `(part_number, date)`, overwriting only the cost. The returned kind
    /// reflects whether the key existed before the write.
    async fn upsert(&mut self, record: &PriceRecord) -> Result<UpsertKind, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

use async_trait::async_trait;
use cisprice_core::{PriceRecord, UpsertKind};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{Connection, PgConnection, PgPool, Postgres, Transaction};
use tracing::debug;

use crate::{PriceSession, PriceStore, StoreError, TableName};

/// Upserts into a PostgreSQL table with `UNIQUE (part_number, date)`.
#[derive(Debug, Clone)]
pub struct PgPriceStore {
    options: PgConnectOptions,
    table: TableName,
}

impl PgPriceStore {
    pub fn new(options: PgConnectOptions, table: TableName) -> Self {
        Self { options, table }
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }
}

#[derive(Debug, Clone)]
struct Statements {
    exists: String,
    upsert: String,
}

impl Statements {
    fn for_table(table: &TableName) -> Self {
        let table = table.as_str();
        Self {
            exists: format!("SELECT 1 FROM {table} WHERE part_number = $1 AND date = $2::date"),
            upsert: format!(
                r#"
                INSERT INTO {table} (part_number, cost_usd, date)
                VALUES ($1, $2, $3::date)
                ON CONFLICT (part_number, date) DO UPDATE
                   SET cost_usd = EXCLUDED.cost_usd
                "#
            ),
        }
    }
}

#[async_trait]
impl PriceStore for PgPriceStore {
    fn describe(&self) -> String {
        format!(
            "postgres://{}:{}/{} table {}",
            self.options.get_host(),
            self.options.get_port(),
            self.options.get_database().unwrap_or_default(),
            self.table.as_str()
        )
    }

    async fn begin(&self) -> Result<Box<dyn PriceSession>, StoreError> {
        // One dedicated connection per file, closed when the session ends.
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(self.options.clone())
            .await
            .map_err(|err| StoreError::Connection(err.to_string()))?;
        let tx = pool.begin().await?;
        debug!(store = %self.describe(), "opened store session");
        Ok(Box::new(PgSession {
            pool,
            tx,
            statements: Statements::for_table(&self.table),
        }))
    }
}

struct PgSession {
    pool: PgPool,
    tx: Transaction<'static, Postgres>,
    statements: Statements,
}

async fn upsert_row(
    conn: &mut PgConnection,
    statements: &Statements,
    record: &PriceRecord,
) -> Result<UpsertKind, StoreError> {
    let existing = sqlx::query(&statements.exists)
        .bind(&record.part_number)
        .bind(&record.date)
        .fetch_optional(&mut *conn)
        .await?;

    sqlx::query(&statements.upsert)
        .bind(&record.part_number)
        .bind(record.cost_usd)
        .bind(&record.date)
        .execute(&mut *conn)
        .await?;

    Ok(if existing.is_some() {
        UpsertKind::Updated
    } else {
        UpsertKind::Inserted
    })
}

#[async_trait]
impl PriceSession for PgSession {
    async fn upsert(&mut self, record: &PriceRecord) -> Result<UpsertKind, StoreError> {
        // A failed statement aborts the whole PostgreSQL transaction, so each row
        // runs under its own savepoint.
        let mut savepoint = Connection::begin(&mut *self.tx).await?;
        match upsert_row(&mut *savepoint, &self.statements, record).await {
            Ok(kind) => {
                savepoint.commit().await?;
                Ok(kind)
            }
            Err(err) => {
                if let Err(rollback_err) = savepoint.rollback().await {
                    return Err(StoreError::from(rollback_err));
                }
                Err(err)
            }
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PgSession { pool, tx, .. } = *self;
        let result = tx.commit().await.map_err(StoreError::from);
        pool.close().await;
        result
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let PgSession { pool, tx, .. } = *self;
        let result = tx.rollback().await.map_err(StoreError::from);
        pool.close().await;
        result
    }
}

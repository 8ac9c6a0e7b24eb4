use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use cisprice_core::{PriceRecord, UpsertKind};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::{PriceSession, PriceStore, StoreError};

type PriceKey = (String, String);

/// Process-local store with the same upsert and commit semantics as the
/// PostgreSQL table. Clones share one table. Backs `--dry-run`.
#[derive(Debug, Clone, Default)]
pub struct MemoryPriceStore {
    committed: Arc<Mutex<BTreeMap<PriceKey, Decimal>>>,
}

impl MemoryPriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, part_number: &str, date: &str) -> Option<Decimal> {
        self.committed
            .lock()
            .await
            .get(&(part_number.to_string(), date.to_string()))
            .copied()
    }

    pub async fn len(&self) -> usize {
        self.committed.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.committed.lock().await.is_empty()
    }

    /// Committed rows ordered by part number, then date.
    pub async fn records(&self) -> Vec<PriceRecord> {
        self.committed
            .lock()
            .await
            .iter()
            .map(|((part_number, date), cost_usd)| PriceRecord {
                part_number: part_number.clone(),
                cost_usd: *cost_usd,
                date: date.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl PriceStore for MemoryPriceStore {
    fn describe(&self) -> String {
        "in-memory store (dry run)".to_string()
    }

    async fn begin(&self) -> Result<Box<dyn PriceSession>, StoreError> {
        Ok(Box::new(MemorySession {
            committed: Arc::clone(&self.committed),
            staged: BTreeMap::new(),
        }))
    }
}

struct MemorySession {
    committed: Arc<Mutex<BTreeMap<PriceKey, Decimal>>>,
    staged: BTreeMap<PriceKey, Decimal>,
}

#[async_trait]
impl PriceSession for MemorySession {
    async fn upsert(&mut self, record: &PriceRecord) -> Result<UpsertKind, StoreError> {
        let key = (record.part_number.clone(), record.date.clone());
        let existed =
            self.staged.contains_key(&key) || self.committed.lock().await.contains_key(&key);
        self.staged.insert(key, record.cost_usd);
        Ok(if existed {
            UpsertKind::Updated
        } else {
            UpsertKind::Inserted
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemorySession { committed, staged } = *self;
        committed.lock().await.extend(staged);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}

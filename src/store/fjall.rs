//! Persistent holdings store on a fjall keyspace.
//!
//! Two partitions: `holdings` maps big-endian id bytes to the JSON record,
//! `holdings_idx` maps "kind/symbol" to the id and enforces the uniqueness
//! constraint.

use super::{Holding, HoldingKind, HoldingPatch, HoldingStore, NewHolding};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

pub struct FjallStore {
    keyspace: Keyspace,
    holdings: PartitionHandle,
    index: PartitionHandle,
    next_id: AtomicI64,
    // Serializes check-then-insert so the uniqueness index stays consistent.
    write_lock: Mutex<()>,
}

fn index_key(kind: HoldingKind, symbol: &str) -> String {
    format!("{kind}/{symbol}")
}

impl FjallStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(path).map_err(|e| StoreError::Backend(e.to_string()))?;

        let keyspace = fjall::Config::new(path).open()?;
        let holdings = keyspace.open_partition("holdings", PartitionCreateOptions::default())?;
        let index = keyspace.open_partition("holdings_idx", PartitionCreateOptions::default())?;

        let mut max_id = 0i64;
        for kv in holdings.iter() {
            let (key, _) = kv?;
            if let Ok(bytes) = <[u8; 8]>::try_from(key.as_ref()) {
                max_id = max_id.max(i64::from_be_bytes(bytes));
            }
        }

        debug!(path = %path.display(), max_id, "holdings store opened");
        Ok(Self {
            keyspace,
            holdings,
            index,
            next_id: AtomicI64::new(max_id + 1),
            write_lock: Mutex::new(()),
        })
    }

    fn read(&self, id: i64) -> Result<Option<Holding>, StoreError> {
        match self.holdings.get(id.to_be_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    fn write(&self, holding: &Holding) -> Result<(), StoreError> {
        self.holdings
            .insert(holding.id.to_be_bytes(), serde_json::to_vec(holding)?)?;
        self.index.insert(
            index_key(holding.kind, &holding.symbol),
            holding.id.to_be_bytes(),
        )?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    fn scan(&self) -> Result<Vec<Holding>, StoreError> {
        let mut all = Vec::new();
        for kv in self.holdings.iter() {
            let (_, value) = kv?;
            all.push(serde_json::from_slice::<Holding>(&value)?);
        }
        Ok(all)
    }
}

#[async_trait]
impl HoldingStore for FjallStore {
    async fn all(&self) -> Result<Vec<Holding>, StoreError> {
        let mut all = self.scan()?;
        all.sort_by(|a, b| (a.kind.to_string(), &a.symbol).cmp(&(b.kind.to_string(), &b.symbol)));
        Ok(all)
    }

    async fn by_kind(&self, kind: HoldingKind) -> Result<Vec<Holding>, StoreError> {
        let mut matched: Vec<Holding> = self
            .scan()?
            .into_iter()
            .filter(|h| h.kind == kind)
            .collect();
        matched.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(matched)
    }

    async fn get(&self, id: i64) -> Result<Holding, StoreError> {
        self.read(id)?.ok_or(StoreError::NotFound)
    }

    async fn get_by_symbol(
        &self,
        kind: HoldingKind,
        symbol: &str,
    ) -> Result<Holding, StoreError> {
        let id_bytes = self
            .index
            .get(index_key(kind, symbol))?
            .ok_or(StoreError::NotFound)?;
        let id = i64::from_be_bytes(
            <[u8; 8]>::try_from(id_bytes.as_ref())
                .map_err(|_| StoreError::Backend("corrupt index entry".to_string()))?,
        );
        self.read(id)?.ok_or(StoreError::NotFound)
    }

    async fn create(&self, holding: NewHolding) -> Result<Holding, StoreError> {
        let _guard = self.write_lock.lock().await;

        if self
            .index
            .get(index_key(holding.kind, &holding.symbol))?
            .is_some()
        {
            return Err(StoreError::AlreadyExists);
        }

        let now = Utc::now();
        let holding = Holding {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            kind: holding.kind,
            symbol: holding.symbol,
            quantity: holding.quantity,
            cost_basis: holding.cost_basis,
            created_at: now,
            updated_at: now,
        };
        self.write(&holding)?;
        Ok(holding)
    }

    async fn update(&self, id: i64, patch: HoldingPatch) -> Result<Holding, StoreError> {
        let _guard = self.write_lock.lock().await;

        let mut holding = self.read(id)?.ok_or(StoreError::NotFound)?;
        if let Some(quantity) = patch.quantity {
            holding.quantity = quantity;
        }
        if let Some(cost_basis) = patch.cost_basis {
            holding.cost_basis = cost_basis;
        }
        holding.updated_at = Utc::now();
        self.write(&holding)?;
        Ok(holding)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;

        let holding = self.read(id)?.ok_or(StoreError::NotFound)?;
        self.holdings.remove(id.to_be_bytes())?;
        self.index
            .remove(index_key(holding.kind, &holding.symbol))?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool, StoreError> {
        match self.holdings.iter().next() {
            Some(Ok(_)) => Ok(false),
            Some(Err(e)) => Err(e.into()),
            None => Ok(true),
        }
    }
}

//! In-memory holdings store for tests and ephemeral runs.

use super::{Holding, HoldingKind, HoldingPatch, HoldingStore, NewHolding};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

pub struct MemoryStore {
    holdings: RwLock<BTreeMap<i64, Holding>>,
    next_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            holdings: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HoldingStore for MemoryStore {
    async fn all(&self) -> Result<Vec<Holding>, StoreError> {
        let holdings = self.holdings.read().await;
        let mut all: Vec<Holding> = holdings.values().cloned().collect();
        all.sort_by(|a, b| (a.kind.to_string(), &a.symbol).cmp(&(b.kind.to_string(), &b.symbol)));
        Ok(all)
    }

    async fn by_kind(&self, kind: HoldingKind) -> Result<Vec<Holding>, StoreError> {
        let holdings = self.holdings.read().await;
        let mut matched: Vec<Holding> = holdings
            .values()
            .filter(|h| h.kind == kind)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(matched)
    }

    async fn get(&self, id: i64) -> Result<Holding, StoreError> {
        let holdings = self.holdings.read().await;
        holdings.get(&id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_by_symbol(
        &self,
        kind: HoldingKind,
        symbol: &str,
    ) -> Result<Holding, StoreError> {
        let holdings = self.holdings.read().await;
        holdings
            .values()
            .find(|h| h.kind == kind && h.symbol == symbol)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn create(&self, holding: NewHolding) -> Result<Holding, StoreError> {
        let mut holdings = self.holdings.write().await;
        if holdings
            .values()
            .any(|h| h.kind == holding.kind && h.symbol == holding.symbol)
        {
            return Err(StoreError::AlreadyExists);
        }

        let now = Utc::now();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let holding = Holding {
            id,
            kind: holding.kind,
            symbol: holding.symbol,
            quantity: holding.quantity,
            cost_basis: holding.cost_basis,
            created_at: now,
            updated_at: now,
        };
        holdings.insert(id, holding.clone());
        Ok(holding)
    }

    async fn update(&self, id: i64, patch: HoldingPatch) -> Result<Holding, StoreError> {
        let mut holdings = self.holdings.write().await;
        let holding = holdings.get_mut(&id).ok_or(StoreError::NotFound)?;

        if let Some(quantity) = patch.quantity {
            holding.quantity = quantity;
        }
        if let Some(cost_basis) = patch.cost_basis {
            holding.cost_basis = cost_basis;
        }
        holding.updated_at = Utc::now();
        Ok(holding.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let mut holdings = self.holdings.write().await;
        holdings.remove(&id).map(|_| ()).ok_or(StoreError::NotFound)
    }

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.holdings.read().await.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_fund(symbol: &str) -> NewHolding {
        NewHolding {
            kind: HoldingKind::Fund,
            symbol: symbol.to_string(),
            quantity: 10.0,
            cost_basis: 100.0,
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryStore::new();
        assert!(store.is_empty().await.unwrap());

        let created = store.create(new_fund("KUT")).await.unwrap();
        assert_eq!(created.symbol, "KUT");

        let fetched = store.get(created.id).await.unwrap();
        assert_eq!(fetched.symbol, "KUT");
        assert_eq!(fetched.quantity, 10.0);

        let by_symbol = store
            .get_by_symbol(HoldingKind::Fund, "KUT")
            .await
            .unwrap();
        assert_eq!(by_symbol.id, created.id);
    }

    #[tokio::test]
    async fn test_duplicate_symbol_rejected() {
        let store = MemoryStore::new();
        store.create(new_fund("KUT")).await.unwrap();

        let err = store.create(new_fund("KUT")).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists));

        // Same symbol under a different kind is a distinct holding
        let crypto = NewHolding {
            kind: HoldingKind::Crypto,
            symbol: "KUT".to_string(),
            quantity: 1.0,
            cost_basis: 1.0,
        };
        assert!(store.create(crypto).await.is_ok());
    }

    #[tokio::test]
    async fn test_partial_update() {
        let store = MemoryStore::new();
        let created = store.create(new_fund("KUT")).await.unwrap();

        let updated = store
            .update(
                created.id,
                HoldingPatch {
                    quantity: Some(25.0),
                    cost_basis: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.quantity, 25.0);
        assert_eq!(updated.cost_basis, 100.0);

        let err = store.update(999, HoldingPatch::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        let created = store.create(new_fund("KUT")).await.unwrap();

        store.delete(created.id).await.unwrap();
        assert!(matches!(
            store.get(created.id).await.unwrap_err(),
            StoreError::NotFound
        ));
        assert!(matches!(
            store.delete(created.id).await.unwrap_err(),
            StoreError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_by_kind_and_bulk_create() {
        let store = MemoryStore::new();
        let seeds = vec![
            new_fund("KUT"),
            new_fund("YZG"),
            NewHolding {
                kind: HoldingKind::Crypto,
                symbol: "BTCUSDT".to_string(),
                quantity: 0.5,
                cost_basis: 20000.0,
            },
            new_fund("KUT"), // duplicate, skipped
        ];

        let created = store.bulk_create(seeds).await.unwrap();
        assert_eq!(created, 3);

        let funds = store.by_kind(HoldingKind::Fund).await.unwrap();
        assert_eq!(funds.len(), 2);
        assert_eq!(funds[0].symbol, "KUT");
        assert_eq!(funds[1].symbol, "YZG");

        let cryptos = store.by_kind(HoldingKind::Crypto).await.unwrap();
        assert_eq!(cryptos.len(), 1);
    }
}

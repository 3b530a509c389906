//! Holdings persistence: the record store the aggregation engine reads from.
//!
//! At most one holding exists per (kind, symbol) pair; ids are assigned by
//! the store.

pub mod fjall;
pub mod memory;

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HoldingKind {
    Fund,
    Crypto,
}

impl Display for HoldingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HoldingKind::Fund => write!(f, "fund"),
            HoldingKind::Crypto => write!(f, "crypto"),
        }
    }
}

impl std::str::FromStr for HoldingKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fund" => Ok(HoldingKind::Fund),
            "crypto" => Ok(HoldingKind::Crypto),
            _ => Err(anyhow::anyhow!("Invalid holding kind: {}", s)),
        }
    }
}

/// A user's position in one symbol.
///
/// `cost_basis` is the total amount paid, not a per-unit price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    pub id: i64,
    pub kind: HoldingKind,
    pub symbol: String,
    pub quantity: f64,
    pub cost_basis: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewHolding {
    pub kind: HoldingKind,
    pub symbol: String,
    pub quantity: f64,
    pub cost_basis: f64,
}

/// Partial update; `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HoldingPatch {
    pub quantity: Option<f64>,
    pub cost_basis: Option<f64>,
}

#[async_trait]
pub trait HoldingStore: Send + Sync {
    async fn all(&self) -> Result<Vec<Holding>, StoreError>;

    async fn by_kind(&self, kind: HoldingKind) -> Result<Vec<Holding>, StoreError>;

    async fn get(&self, id: i64) -> Result<Holding, StoreError>;

    async fn get_by_symbol(&self, kind: HoldingKind, symbol: &str)
    -> Result<Holding, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] on a duplicate (kind, symbol).
    async fn create(&self, holding: NewHolding) -> Result<Holding, StoreError>;

    /// Fails with [`StoreError::NotFound`] for an unknown id.
    async fn update(&self, id: i64, patch: HoldingPatch) -> Result<Holding, StoreError>;

    /// Fails with [`StoreError::NotFound`] for an unknown id.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError>;

    /// Seeds multiple holdings; duplicates are skipped, not errors.
    async fn bulk_create(&self, holdings: Vec<NewHolding>) -> Result<usize, StoreError> {
        let mut created = 0;
        for holding in holdings {
            match self.create(holding).await {
                Ok(_) => created += 1,
                Err(StoreError::AlreadyExists) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(created)
    }
}

//! Durable inventory store boundary.
//!
//! The durable store is the source of truth for quantities; the cache
//! holds a shadow copy. The only write path is one batched conditional
//! decrement so partial application across a batch cannot occur from the
//! statement's own execution. Failures here are non-retryable at this
//! layer; compensation is the coordinator's responsibility.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod memory;
pub use memory::MemoryInventoryStore;

/// A durable stock row. `quantity` is never written negative.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StockItem {
    pub id: u64,
    pub quantity: i64,
}

/// Durable store failures.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InventoryError {
    #[error("inventory read failed: {reason}")]
    ReadFailed { reason: String },
    #[error("inventory update failed: {reason}")]
    UpdateFailed { reason: String },
}

/// Batched conditional decrement and bulk read over durable stock rows.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Apply every `(item_id, amount)` decrement in a single statement
    /// restricted to exactly the given id set. Amounts may be negative
    /// (a restock). Either the whole batch applies or none of it does.
    async fn decrement_batch(&self, updates: &[(u64, i64)]) -> Result<(), InventoryError>;

    /// Read all stock rows. Used by cache warm-up, not the request path.
    async fn all_items(&self) -> Result<Vec<StockItem>, InventoryError>;
}

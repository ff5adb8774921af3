//! In-memory implementation of [`InventoryStore`] for testing.
//!
//! Deterministic rows under one mutex, so a batch decrement is naturally
//! atomic, plus a one-shot write fault that can be armed to exercise the
//! coordinator's compensation path. Faults are reversible: each armed
//! fault fires exactly once and the store behaves normally afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{InventoryError, InventoryStore, StockItem};

/// In-memory deterministic inventory store.
#[derive(Default)]
pub struct MemoryInventoryStore {
    rows: Mutex<BTreeMap<u64, i64>>,
    fail_next_update: AtomicBool,
}

impl MemoryInventoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Insert or overwrite rows.
    pub async fn seed(&self, items: &[StockItem]) {
        let mut rows = self.rows.lock().await;
        for item in items {
            rows.insert(item.id, item.quantity);
        }
    }

    /// Arm a one-shot fault: the next [`InventoryStore::decrement_batch`]
    /// fails without touching any row.
    pub fn inject_update_fault(&self) {
        self.fail_next_update.store(true, Ordering::SeqCst);
    }

    /// Current durable quantity, if the row exists.
    pub async fn quantity(&self, item_id: u64) -> Option<i64> {
        self.rows.lock().await.get(&item_id).copied()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn decrement_batch(&self, updates: &[(u64, i64)]) -> Result<(), InventoryError> {
        if self.fail_next_update.swap(false, Ordering::SeqCst) {
            return Err(InventoryError::UpdateFailed {
                reason: "injected update fault".to_string(),
            });
        }

        // Single guard across the whole batch: all decrements apply
        // together. Ids without a row are skipped, matching a conditional
        // update restricted to the given id set.
        let mut rows = self.rows.lock().await;
        for (item_id, amount) in updates {
            if let Some(quantity) = rows.get_mut(item_id) {
                *quantity -= amount;
            }
        }
        Ok(())
    }

    async fn all_items(&self) -> Result<Vec<StockItem>, InventoryError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .map(|(id, quantity)| StockItem {
                id: *id,
                quantity: *quantity,
            })
            .collect())
    }
}

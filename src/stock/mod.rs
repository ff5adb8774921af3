//! Stock update orchestration.
//!
//! One algorithm, parameterized by whichever lock strategy is active:
//! acquire locks for the distinct item-id set, batch-read the cache,
//! validate the entire batch before writing anything, mutate the cache in
//! one pipelined write, persist through one batched conditional decrement,
//! and compensate the cache if persistence fails. Locks are always
//! released in a final step, whatever the outcome.

use std::collections::HashMap;
use std::sync::Arc;

use snafu::ResultExt;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::cache::{CacheError, CacheStore, keys};
use crate::coordination::LockStrategy;
use crate::inventory::InventoryStore;

pub mod error;
pub mod types;

pub use error::{ErrorBody, StockError};
pub use types::{OrderLine, StockOrderDto, StockResDto, StockUpdate, UpdateRequest, UpdateStockDto};

use error::{
    CacheSnafu, DatabaseSnafu, LockAcquisitionFailedSnafu, OutOfStockSnafu, StockNotFoundSnafu,
};

/// Orchestrates validate/mutate/persist/compensate for stock updates.
///
/// Strategy-agnostic: the only contact with locking is acquire-then-release
/// around the critical section.
pub struct StockCoordinator<C: CacheStore, I: InventoryStore, L: LockStrategy> {
    cache: Arc<C>,
    inventory: Arc<I>,
    locks: L,
}

impl<C: CacheStore, I: InventoryStore, L: LockStrategy> StockCoordinator<C, I, L> {
    pub fn new(cache: Arc<C>, inventory: Arc<I>, locks: L) -> Self {
        Self {
            cache,
            inventory,
            locks,
        }
    }

    /// Apply a batch of order lines.
    ///
    /// Either every line is reflected in both cache and durable store, or
    /// the call fails with no net state change. The response carries one
    /// entry per order line in the original order, each with the item's
    /// final quantity.
    pub async fn update_stock(
        &self,
        request: &UpdateRequest,
    ) -> Result<Vec<StockUpdate>, StockError> {
        let correlation = Uuid::new_v4().simple().to_string();
        let distinct = distinct_ids(&request.orders);
        debug!(
            correlation = %correlation,
            items = ?distinct,
            lines = request.orders.len(),
            "stock update received"
        );

        let guard = self
            .locks
            .acquire(&distinct)
            .await
            .context(LockAcquisitionFailedSnafu {
                item_ids: distinct.clone(),
            })
            .inspect_err(|e| error!(correlation = %correlation, error = %e, "lock acquisition failed"))?;
        debug!(correlation = %correlation, "locks acquired");

        let result = self.apply(&correlation, request, &distinct).await;

        // Locks released whatever happened inside the critical section.
        self.locks.release(guard).await;
        result
    }

    async fn apply(
        &self,
        correlation: &str,
        request: &UpdateRequest,
        distinct: &[u64],
    ) -> Result<Vec<StockUpdate>, StockError> {
        // Batch-read current quantities for the distinct ids.
        let stock_keys: Vec<String> = distinct.iter().map(|id| keys::stock_key(*id)).collect();
        let values = self
            .cache
            .batch_read(&stock_keys)
            .await
            .context(CacheSnafu)
            .inspect_err(|e| error!(correlation, error = %e, "stock batch read failed"))?;

        let mut working: HashMap<u64, i64> = HashMap::with_capacity(distinct.len());
        for (item_id, value) in distinct.iter().zip(values) {
            let Some(raw) = value else {
                return StockNotFoundSnafu { item_id: *item_id }.fail();
            };
            let quantity = raw.parse::<i64>().map_err(|_| {
                let source = CacheError::ReadFailed {
                    reason: format!("corrupt quantity for item {item_id}: '{raw}'"),
                };
                error!(correlation, error = %source, "stock cache entry unreadable");
                StockError::Cache { source }
            })?;
            working.insert(*item_id, quantity);
        }
        let originals = working.clone();

        // Validate the entire batch before writing anything. Lines walk in
        // input order against the working copy, so repeated item ids
        // accumulate; the first overdraw fails the whole call.
        for line in &request.orders {
            let Some(available) = working.get_mut(&line.item_id) else {
                return StockNotFoundSnafu {
                    item_id: line.item_id,
                }
                .fail();
            };
            if *available - line.quantity < 0 {
                return OutOfStockSnafu {
                    item_id: line.item_id,
                    requested: line.quantity,
                    available: *available,
                }
                .fail();
            }
            *available -= line.quantity;
        }

        // Rollback records hold each item's pre-request value for the
        // duration of this call only.
        let rollback: Vec<(String, String)> = distinct
            .iter()
            .map(|id| (keys::stock_key(*id), originals[id].to_string()))
            .collect();

        // One pipelined write of the final quantities.
        let entries: Vec<(String, String)> = distinct
            .iter()
            .map(|id| (keys::stock_key(*id), working[id].to_string()))
            .collect();
        if let Err(e) = self.cache.batch_write(&entries).await {
            error!(correlation, error = %e, "cache mutation failed, rolling back");
            self.roll_back(correlation, &rollback).await;
            return Err(StockError::StockUpdateFailed {
                cause: e.to_string(),
            });
        }

        // One batched conditional decrement covering exactly the distinct
        // id set, each amount the sum of that item's lines.
        let totals: Vec<(u64, i64)> = distinct
            .iter()
            .map(|id| (*id, originals[id] - working[id]))
            .collect();
        if let Err(e) = self.inventory.decrement_batch(&totals).await {
            error!(correlation, error = %e, "durable decrement failed, rolling back cache");
            self.roll_back(correlation, &rollback).await;
            return Err(StockError::StockUpdateFailed {
                cause: e.to_string(),
            });
        }

        debug!(correlation, items = distinct.len(), "stock update applied");
        Ok(request
            .orders
            .iter()
            .map(|line| StockUpdate {
                item_id: line.item_id,
                quantity: working[&line.item_id],
            })
            .collect())
    }

    /// Best-effort compensating rollback. A recovery path, not a commit
    /// protocol: its own failure is logged, never re-escalated.
    async fn roll_back(&self, correlation: &str, records: &[(String, String)]) {
        match self.cache.batch_write(records).await {
            Ok(()) => debug!(correlation, restored = records.len(), "cache rolled back"),
            Err(e) => {
                error!(correlation, error = %e, "rollback failed, cache diverges until next warm-up");
            }
        }
    }
}

/// Distinct item ids in first-seen order.
fn distinct_ids(orders: &[OrderLine]) -> Vec<u64> {
    let mut seen = Vec::with_capacity(orders.len());
    for line in orders {
        if !seen.contains(&line.item_id) {
            seen.push(line.item_id);
        }
    }
    seen
}

/// Seed every cache entry from the durable store.
///
/// Run by the service lifecycle before traffic is accepted; not part of
/// the per-request path. Entries are rewritten wholesale with no expiry.
pub async fn warm_cache<C: CacheStore, I: InventoryStore>(
    cache: &C,
    inventory: &I,
) -> Result<usize, StockError> {
    let items = inventory.all_items().await.context(DatabaseSnafu)?;
    let entries: Vec<(String, String)> = items
        .iter()
        .map(|item| (keys::stock_key(item.id), item.quantity.to_string()))
        .collect();
    cache.batch_write(&entries).await.context(CacheSnafu)?;
    info!(items = entries.len(), "cache warmed from durable store");
    Ok(entries.len())
}

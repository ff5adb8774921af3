//! Concurrency-controlled inventory decrements.
//!
//! `stockyard` keeps a low-latency cache and a durable store consistent
//! while many requests decrement finite stock in parallel. Locks are the
//! sole serialization mechanism: requests touching disjoint item sets never
//! block each other.
//!
//! Components, leaves first:
//!
//! - [`cache`] - atomic key/value primitives, pipelined batches, pub/sub,
//!   and server-evaluated atomic scripts.
//! - [`inventory`] - durable batched conditional decrement and bulk read.
//! - [`coordination`] - two interchangeable lock strategies: the
//!   all-or-nothing [`CompositeLock`] and the FIFO [`FairQueueLock`].
//! - [`stock`] - the update coordinator: acquire locks, read, validate the
//!   whole batch, mutate the cache, persist, compensate on failure, and
//!   always release.
//!
//! ```ignore
//! use stockyard::{
//!     CompositeLock, CompositeLockConfig, MemoryCacheStore, MemoryInventoryStore,
//!     StockCoordinator, UpdateRequest, OrderLine, warm_cache,
//! };
//!
//! let cache = MemoryCacheStore::new();
//! let inventory = MemoryInventoryStore::new();
//! warm_cache(cache.as_ref(), inventory.as_ref()).await?;
//!
//! let locks = CompositeLock::new(cache.clone(), CompositeLockConfig::default());
//! let coordinator = StockCoordinator::new(cache, inventory, locks);
//! let updates = coordinator
//!     .update_stock(&UpdateRequest {
//!         orders: vec![OrderLine { item_id: 1, quantity: 10 }],
//!     })
//!     .await?;
//! ```

pub mod cache;
pub mod config;
pub mod coordination;
pub mod inventory;
pub mod stock;

pub use cache::{CacheError, CacheStore, MemoryCacheStore, Script, ScriptOutcome, Subscription};
pub use config::{LockStrategyKind, StockServiceConfig};
pub use coordination::{
    CompositeLock, CompositeLockConfig, CoordinationError, FairLockConfig, FairQueueLock,
    LockStrategy, LockToken,
};
pub use inventory::{InventoryError, InventoryStore, MemoryInventoryStore, StockItem};
pub use stock::{
    ErrorBody, OrderLine, StockCoordinator, StockError, StockOrderDto, StockResDto, StockUpdate,
    UpdateRequest, UpdateStockDto, warm_cache,
};

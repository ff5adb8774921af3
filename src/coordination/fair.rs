//! Per-item FIFO lock with edge-triggered waiting.
//!
//! Each item id has its own wait queue: callers append a fresh token,
//! then atomically acquire only when their token reaches the queue head
//! and the lock key is free. Failed attempts block on a per-resource
//! release-notification topic instead of polling, so retry work is bounded
//! to one attempt per release event (plus a periodic fallback retry that
//! covers holders that crashed and let their lock entry expire without
//! publishing).
//!
//! Multi-item requests register every distinct id, then wait on all of
//! them concurrently and independently; there is no joint multi-item
//! queue. Two concurrent requests interleaving the same ids can therefore
//! block each other until a lock TTL expires. Batches that cannot tolerate
//! that should use [`CompositeLock`](crate::coordination::CompositeLock),
//! whose grants are all-or-nothing.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::cache::{CacheStore, Script, ScriptOutcome, keys};
use crate::coordination::error::{CacheSnafu, CoordinationError, NotificationsClosedSnafu};
use crate::coordination::{LockStrategy, LockToken};

/// Configuration for the fair queue lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairLockConfig {
    /// Lock entry time-to-live in milliseconds. A liveness backstop for
    /// crashed holders, not a cancellation mechanism.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// How long a waiter blocks on the notification topic before retrying
    /// anyway. Bounds the stall when a holder dies without publishing.
    #[serde(default = "default_fallback_retry_ms")]
    pub fallback_retry_ms: u64,
}

fn default_ttl_ms() -> u64 {
    1_000
}

fn default_fallback_retry_ms() -> u64 {
    250
}

impl Default for FairLockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            fallback_retry_ms: default_fallback_retry_ms(),
        }
    }
}

struct Holding {
    item_id: u64,
    token: LockToken,
}

/// Proof that a fair-queue acquisition holds every registered item.
pub struct FairGuard {
    holdings: Vec<Holding>,
}

/// FIFO per-resource mutual exclusion over the cache store.
pub struct FairQueueLock<C: CacheStore> {
    cache: Arc<C>,
    config: FairLockConfig,
}

impl<C: CacheStore> FairQueueLock<C> {
    pub fn new(cache: Arc<C>, config: FairLockConfig) -> Self {
        Self { cache, config }
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.config.ttl_ms)
    }

    /// Append the token to the item's wait queue and bump the
    /// total-registrations counter (informational only).
    async fn register(&self, item_id: u64) -> Result<Holding, CoordinationError> {
        let token = LockToken::generate();
        let position = self
            .cache
            .queue_push(&keys::queue_key(item_id), token.as_str())
            .await
            .context(CacheSnafu {
                operation: "fair lock registration",
            })?;
        let total = self
            .cache
            .increment(&keys::queue_total_key(item_id))
            .await
            .context(CacheSnafu {
                operation: "fair lock registration counter",
            })?;
        debug!(item_id, token = %token, position, total, "registered in wait queue");
        Ok(Holding { item_id, token })
    }

    /// Block until the holding's token is granted the lock.
    ///
    /// Opens one dedicated subscription for the duration of the wait; it is
    /// dropped on every exit path. The first attempt happens after the
    /// subscription is open so a release landing in between is never missed.
    async fn wait_for_grant(&self, holding: &Holding) -> Result<(), CoordinationError> {
        let queue_key = keys::queue_key(holding.item_id);
        let lock_key = keys::lock_key(holding.item_id);
        let topic = keys::release_topic(&lock_key);
        let fallback = Duration::from_millis(self.config.fallback_retry_ms);

        let mut subscription = self.cache.subscribe(&topic).await.context(CacheSnafu {
            operation: "fair lock subscription",
        })?;

        loop {
            let outcome = self
                .cache
                .evaluate(Script::AcquireFairLock {
                    queue_key: queue_key.clone(),
                    lock_key: lock_key.clone(),
                    token: holding.token.as_str().to_string(),
                    ttl: self.ttl(),
                })
                .await
                .context(CacheSnafu {
                    operation: "fair lock acquisition",
                })?;

            if outcome == ScriptOutcome::Acquired {
                debug!(item_id = holding.item_id, token = %holding.token, "fair lock acquired");
                return Ok(());
            }

            match tokio::time::timeout(fallback, subscription.recv()).await {
                // Release event on this resource's topic: retry immediately.
                Ok(Ok(_message)) => {}
                Ok(Err(_closed)) => {
                    return NotificationsClosedSnafu { lock_key }.fail();
                }
                // No event within the window; retry in case the holder
                // crashed and the lock entry silently expired.
                Err(_elapsed) => {
                    debug!(item_id = holding.item_id, "fallback retry without release event");
                }
            }
        }
    }
}

#[async_trait]
impl<C: CacheStore> LockStrategy for FairQueueLock<C> {
    type Guard = FairGuard;

    async fn acquire(&self, item_ids: &[u64]) -> Result<FairGuard, CoordinationError> {
        let mut ids: Vec<u64> = item_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();

        // Register everything first so queue positions reflect request
        // arrival, then wait on all ids concurrently.
        let mut holdings = Vec::with_capacity(ids.len());
        for id in ids {
            holdings.push(self.register(id).await?);
        }

        try_join_all(holdings.iter().map(|h| self.wait_for_grant(h))).await?;
        Ok(FairGuard { holdings })
    }

    async fn release(&self, guard: FairGuard) {
        for holding in &guard.holdings {
            let lock_key = keys::lock_key(holding.item_id);
            match self
                .cache
                .evaluate(Script::ReleaseIfOwner {
                    lock_key: lock_key.clone(),
                    token: holding.token.as_str().to_string(),
                })
                .await
            {
                Ok(ScriptOutcome::Released) => {
                    debug!(item_id = holding.item_id, token = %holding.token, "fair lock released");
                    let topic = keys::release_topic(&lock_key);
                    if let Err(e) = self
                        .cache
                        .publish(&topic, &keys::release_message(&lock_key))
                        .await
                    {
                        // Waiters fall back to the periodic retry.
                        warn!(item_id = holding.item_id, error = %e, "release notification failed");
                    }
                }
                // Expired and re-acquired by a later holder: normal no-op.
                Ok(_) => {
                    debug!(item_id = holding.item_id, token = %holding.token, "fair lock already expired or taken");
                }
                Err(e) => {
                    warn!(item_id = holding.item_id, error = %e, "fair lock release failed, entry will expire via TTL");
                }
            }
        }
    }
}

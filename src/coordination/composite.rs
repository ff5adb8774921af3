//! All-or-nothing composite lock over a set of item ids.
//!
//! One acquisition covers every lock key derived from the id set, granted
//! or denied as a single unit: if any single key is unavailable, keys
//! already taken in that attempt are handed back and the whole attempt
//! retries after a jittered delay. No fairness or ordering is guaranteed
//! among competitors; whichever caller's grant lands first proceeds.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::cache::{CacheStore, Script, ScriptOutcome, keys};
use crate::coordination::error::{CacheSnafu, CoordinationError, LockUnavailableSnafu};
use crate::coordination::{LockStrategy, LockToken};

/// Configuration for the composite lock.
///
/// Defaults give a worst case of roughly 20s (100 attempts spaced ~200ms
/// apart with up to 200ms jitter) before acquisition gives up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeLockConfig {
    /// Lock entry time-to-live in milliseconds.
    #[serde(default = "default_ttl_ms")]
    pub ttl_ms: u64,
    /// Clock-drift tolerance subtracted from the grant's validity window.
    #[serde(default = "default_drift_factor")]
    pub drift_factor: f64,
    /// Maximum acquisition attempts before failing.
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Maximum random jitter added to each delay in milliseconds.
    #[serde(default = "default_retry_jitter_ms")]
    pub retry_jitter_ms: u64,
}

fn default_ttl_ms() -> u64 {
    1_000
}

fn default_drift_factor() -> f64 {
    0.01
}

fn default_retry_count() -> u32 {
    100
}

fn default_retry_delay_ms() -> u64 {
    200
}

fn default_retry_jitter_ms() -> u64 {
    200
}

impl Default for CompositeLockConfig {
    fn default() -> Self {
        Self {
            ttl_ms: default_ttl_ms(),
            drift_factor: default_drift_factor(),
            retry_count: default_retry_count(),
            retry_delay_ms: default_retry_delay_ms(),
            retry_jitter_ms: default_retry_jitter_ms(),
        }
    }
}

/// Proof that a composite acquisition holds its whole key set.
#[derive(Debug)]
pub struct CompositeGuard {
    keys: Vec<String>,
    token: LockToken,
}

/// Quorum-style multi-resource mutual exclusion built on the cache store's
/// set-if-absent primitive.
pub struct CompositeLock<C: CacheStore> {
    cache: Arc<C>,
    config: CompositeLockConfig,
}

impl<C: CacheStore> CompositeLock<C> {
    pub fn new(cache: Arc<C>, config: CompositeLockConfig) -> Self {
        Self { cache, config }
    }

    fn ttl(&self) -> Duration {
        Duration::from_millis(self.config.ttl_ms)
    }

    /// Validity margin reserved for clock drift, per the drift factor plus
    /// a constant 2ms for small TTLs.
    fn drift(&self) -> Duration {
        Duration::from_millis((self.config.ttl_ms as f64 * self.config.drift_factor) as u64 + 2)
    }

    /// Try to take every key once. Returns the keys actually taken when the
    /// attempt fails partway, so the caller can hand them back.
    async fn try_acquire_all(
        &self,
        lock_keys: &[String],
        token: &LockToken,
    ) -> Result<Result<(), Vec<String>>, CoordinationError> {
        let mut taken: Vec<String> = Vec::with_capacity(lock_keys.len());
        for key in lock_keys {
            let granted = match self
                .cache
                .write_if_absent(key, token.as_str(), self.ttl())
                .await
                .context(CacheSnafu {
                    operation: "composite lock acquisition",
                }) {
                Ok(granted) => granted,
                Err(e) => {
                    self.hand_back(&taken, token).await;
                    return Err(e);
                }
            };
            if !granted {
                return Ok(Err(taken));
            }
            taken.push(key.clone());
        }
        Ok(Ok(()))
    }

    /// Compare-and-delete each key; mismatches and cache faults are logged,
    /// never escalated, because the entry TTL is the safety net.
    async fn hand_back(&self, lock_keys: &[String], token: &LockToken) {
        for key in lock_keys {
            match self
                .cache
                .evaluate(Script::ReleaseIfOwner {
                    lock_key: key.clone(),
                    token: token.as_str().to_string(),
                })
                .await
            {
                Ok(ScriptOutcome::Released) => {
                    debug!(key = %key, token = %token, "composite lock key released");
                }
                Ok(_) => {
                    debug!(key = %key, token = %token, "composite lock key already expired or taken");
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "composite lock release failed, entry will expire via TTL");
                }
            }
        }
    }
}

#[async_trait]
impl<C: CacheStore> LockStrategy for CompositeLock<C> {
    type Guard = CompositeGuard;

    async fn acquire(&self, item_ids: &[u64]) -> Result<CompositeGuard, CoordinationError> {
        let mut ids: Vec<u64> = item_ids.to_vec();
        ids.sort_unstable();
        ids.dedup();
        let lock_keys: Vec<String> = ids.iter().map(|id| keys::lock_key(*id)).collect();
        let token = LockToken::generate();

        let mut attempts = 0;
        while attempts < self.config.retry_count {
            attempts += 1;
            let started = Instant::now();

            match self.try_acquire_all(&lock_keys, &token).await? {
                Ok(()) => {
                    // A grant that took longer than the TTL minus drift has
                    // no validity left; hand it back and retry.
                    if started.elapsed() + self.drift() < self.ttl() {
                        debug!(
                            keys = ?lock_keys,
                            token = %token,
                            attempts,
                            "composite lock acquired"
                        );
                        return Ok(CompositeGuard {
                            keys: lock_keys,
                            token,
                        });
                    }
                    warn!(keys = ?lock_keys, attempts, "composite grant exceeded validity window");
                    self.hand_back(&lock_keys, &token).await;
                }
                Err(taken) => {
                    self.hand_back(&taken, &token).await;
                }
            }

            if attempts >= self.config.retry_count {
                break;
            }
            // Jittered pause before the next attempt.
            // Rng built inline to avoid holding a non-Send type across await.
            let jitter = rand::rng().random_range(0..=self.config.retry_jitter_ms);
            tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms + jitter)).await;
        }

        LockUnavailableSnafu {
            keys: lock_keys,
            attempts,
        }
        .fail()
    }

    async fn release(&self, guard: CompositeGuard) {
        self.hand_back(&guard.keys, &guard.token).await;
    }
}

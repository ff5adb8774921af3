//! Low-latency cache store abstraction.
//!
//! The cache holds a shadow copy of durable stock quantities plus all lock
//! bookkeeping (lock entries, wait queues, registration counters). The
//! trait exposes pipelined batches for round-trip efficiency and
//! server-evaluated atomic scripts for the compare-and-act semantics a
//! pipeline cannot provide: pipelined batches are NOT atomic across keys,
//! scripts are.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

pub mod keys;
pub mod memory;
pub use memory::MemoryCacheStore;

/// Cache store failures.
///
/// Always logged with their cause at the call site before surfacing;
/// never silently swallowed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache read failed: {reason}")]
    ReadFailed { reason: String },
    #[error("cache write failed: {reason}")]
    WriteFailed { reason: String },
    #[error("cache publish failed: {reason}")]
    PublishFailed { reason: String },
    #[error("subscription to '{topic}' closed")]
    SubscriptionClosed { topic: String },
}

/// A server-evaluated atomic script.
///
/// Each variant executes as one atomic unit on the store server. Against a
/// Redis backing store these map onto the fair-lock and compare-and-delete
/// Lua scripts; the in-memory adapter runs them under a single state guard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Script {
    /// Succeeds iff `token` is at the head of the queue at `queue_key` AND
    /// `lock_key` is currently unset. On success, sets `lock_key` to the
    /// token with the given TTL and pops the queue head. Otherwise a no-op.
    AcquireFairLock {
        queue_key: String,
        lock_key: String,
        token: String,
        ttl: Duration,
    },
    /// Deletes `lock_key` iff its current value equals `token`. A mismatch
    /// is a no-op, guarding against deleting a lock that expired and was
    /// re-acquired by a later holder.
    ReleaseIfOwner { lock_key: String, token: String },
}

/// Result of evaluating a [`Script`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScriptOutcome {
    /// `AcquireFairLock` set the lock key and popped the queue head.
    Acquired,
    /// `AcquireFairLock` was a no-op (not head, or lock held).
    NotAcquired,
    /// `ReleaseIfOwner` deleted the lock key.
    Released,
    /// `ReleaseIfOwner` was a no-op (token mismatch or key absent).
    NotReleased,
}

/// Handle to a pub/sub topic, yielding messages published after it was
/// opened. Dropping the handle closes the subscription; callers waiting on
/// a lock must hold exactly one for the duration of the wait and drop it on
/// every exit path.
pub struct Subscription {
    topic: String,
    receiver: broadcast::Receiver<String>,
}

impl Subscription {
    pub(crate) fn new(topic: String, receiver: broadcast::Receiver<String>) -> Self {
        Self { topic, receiver }
    }

    /// Topic this subscription is attached to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Wait for the next message on the topic.
    ///
    /// A waiter that falls behind the topic buffer skips to the oldest
    /// retained message; for edge-triggered lock retries a missed release
    /// event only means one extra retry, so lag is not an error.
    pub async fn recv(&mut self) -> Result<String, CacheError> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Ok(message),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(CacheError::SubscriptionClosed {
                        topic: self.topic.clone(),
                    });
                }
            }
        }
    }
}

/// Atomic key/value primitives, pipelined batches, pub/sub, and atomic
/// scripts over the cache server.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read one value. `None` if the key is absent or expired.
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Pipelined batch read. The result is index-aligned with `keys`.
    async fn batch_read(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError>;

    /// Write one value, optionally with a TTL.
    async fn write(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Pipelined batch write. NOT atomic across keys: a mid-batch failure
    /// can leave a partial write, which callers compensate for explicitly.
    async fn batch_write(&self, entries: &[(String, String)]) -> Result<(), CacheError>;

    /// Write `value` only if `key` is currently unset (SET NX PX).
    /// Returns whether the write happened.
    async fn write_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Append a token to the FIFO queue at `key`, returning the queue
    /// length after the push (the token's waiting position, 1-based).
    async fn queue_push(&self, key: &str, token: &str) -> Result<u64, CacheError>;

    /// Increment the numeric counter at `key`, returning the new value.
    async fn increment(&self, key: &str) -> Result<u64, CacheError>;

    /// Publish a message, returning the number of subscribers it reached.
    async fn publish(&self, topic: &str, message: &str) -> Result<usize, CacheError>;

    /// Open a subscription yielding messages published to `topic` from now
    /// until the handle is dropped.
    async fn subscribe(&self, topic: &str) -> Result<Subscription, CacheError>;

    /// Evaluate an atomic script on the store server.
    async fn evaluate(&self, script: Script) -> Result<ScriptOutcome, CacheError>;
}

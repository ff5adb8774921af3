//! Mutual exclusion over per-item cache resources.
//!
//! Two interchangeable strategies serialize concurrent stock updates:
//!
//! - [`CompositeLock`] - all-or-nothing acquisition over the whole item
//!   set, bounded retries, no fairness guarantee.
//! - [`FairQueueLock`] - per-item FIFO queues with edge-triggered waiting;
//!   grants for one contended item follow strict registration order.
//!
//! Both hand out an opaque guard that the coordinator releases in a final
//! step regardless of how the critical section ended.

use async_trait::async_trait;
use uuid::Uuid;

pub mod composite;
pub mod error;
pub mod fair;

pub use composite::{CompositeLock, CompositeLockConfig};
pub use error::CoordinationError;
pub use fair::{FairLockConfig, FairQueueLock};

/// Opaque per-acquisition ownership proof.
///
/// A fresh 128-bit random value per acquisition, never reused. Release
/// operations compare it against the stored lock value so a holder can
/// never delete a lock it no longer owns.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a fresh token. Uniqueness matters here, not secrecy.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A locking strategy the coordinator composes around its critical section:
/// resolve the item-id set, acquire, run the body, release.
///
/// `release` is infallible by contract: strategies log release failures and
/// rely on lock TTLs as the safety net, so the coordinator's final step can
/// never mask the outcome of the critical section.
#[async_trait]
pub trait LockStrategy: Send + Sync {
    /// Proof of acquisition, consumed by [`LockStrategy::release`].
    type Guard: Send;

    /// Acquire mutual exclusion for every id in `item_ids`.
    ///
    /// Callers pass distinct ids; strategies tolerate duplicates.
    async fn acquire(&self, item_ids: &[u64]) -> Result<Self::Guard, CoordinationError>;

    /// Release everything `guard` holds. Best-effort; failures are logged.
    async fn release(&self, guard: Self::Guard);
}

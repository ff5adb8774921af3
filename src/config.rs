//! Service configuration.
//!
//! Plain serde structs with per-field defaults so a partial document (or an
//! empty one) deserializes to working settings. Lock tuning lives next to
//! each strategy; this module selects the strategy and carries both.

use serde::{Deserialize, Serialize};

use crate::coordination::{CompositeLockConfig, FairLockConfig};

/// Which lock strategy serializes stock updates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategyKind {
    /// All-or-nothing multi-key lock; bounded retries, no fairness.
    #[default]
    Composite,
    /// Per-item FIFO queues; grants follow registration order.
    FairQueue,
}

/// Top-level settings for the stock service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockServiceConfig {
    /// Active lock strategy.
    #[serde(default)]
    pub strategy: LockStrategyKind,

    /// Composite lock tuning.
    #[serde(default)]
    pub composite: CompositeLockConfig,

    /// Fair queue lock tuning.
    #[serde(default)]
    pub fair: FairLockConfig,
}

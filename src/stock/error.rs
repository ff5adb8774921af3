//! Domain error taxonomy for stock updates.
//!
//! Domain errors raised before any mutation propagate unchanged; failures
//! after cache mutation are always preceded by a compensating rollback and
//! wrapped as [`StockError::StockUpdateFailed`]. A call never reports
//! partial success.

use chrono::{DateTime, Utc};
use serde::Serialize;
use snafu::Snafu;

use crate::cache::CacheError;
use crate::coordination::CoordinationError;
use crate::inventory::InventoryError;

/// Failures surfaced by the stock update coordinator.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StockError {
    /// The lock strategy exhausted its budget. Terminal; no cache or store
    /// state was touched.
    #[snafu(display("failed to acquire locks for items {item_ids:?}: {source}"))]
    LockAcquisitionFailed {
        item_ids: Vec<u64>,
        source: CoordinationError,
    },

    /// An item id has no cache entry.
    #[snafu(display("stock item {item_id} not found"))]
    StockNotFound { item_id: u64 },

    /// The batch would take an item's running total negative. Raised before
    /// any mutation.
    #[snafu(display(
        "insufficient stock for item {item_id}: requested {requested}, available {available}"
    ))]
    OutOfStock {
        item_id: u64,
        requested: i64,
        available: i64,
    },

    /// Any failure occurring after the cache was mutated. A best-effort
    /// rollback has already been attempted by the time this surfaces.
    #[snafu(display("stock update failed: {cause}"))]
    StockUpdateFailed { cause: String },

    /// Cache fault before any mutation.
    #[snafu(display("cache operation failed: {source}"))]
    Cache { source: CacheError },

    /// Durable store fault outside the update path (warm-up reads).
    #[snafu(display("inventory store operation failed: {source}"))]
    Database { source: InventoryError },
}

impl StockError {
    /// Stable wire code for the HTTP boundary.
    pub fn code(&self) -> u32 {
        match self {
            Self::OutOfStock { .. } => 3001,
            Self::StockNotFound { .. } => 3002,
            Self::StockUpdateFailed { .. } => 3003,
            Self::LockAcquisitionFailed { .. } => 1006,
            Self::Cache { source } => match source {
                CacheError::WriteFailed { .. } => 1003,
                CacheError::PublishFailed { .. } => 1008,
                CacheError::ReadFailed { .. } | CacheError::SubscriptionClosed { .. } => 1002,
            },
            Self::Database { source } => match source {
                InventoryError::ReadFailed { .. } => 2001,
                InventoryError::UpdateFailed { .. } => 2002,
            },
        }
    }

    /// Wire body for the HTTP boundary. Every domain failure flattens to
    /// the same HTTP status; the code disambiguates.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code(),
            message: self.to_string(),
            when: Utc::now(),
            data: None,
        }
    }
}

/// Wire shape of a failed call: `{ code, message, when, data? }`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: u32,
    pub message: String,
    pub when: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

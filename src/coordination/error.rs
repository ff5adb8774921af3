//! Error types for lock acquisition and release.

use snafu::Snafu;

use crate::cache::CacheError;

/// Failures raised by the lock strategies.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CoordinationError {
    /// The full key set could not be granted within the retry budget.
    #[snafu(display("lock set {keys:?} unavailable after {attempts} attempts"))]
    LockUnavailable { keys: Vec<String>, attempts: u32 },

    /// A cache round trip failed while acquiring.
    #[snafu(display("cache operation failed during {operation}: {source}"))]
    Cache {
        operation: &'static str,
        source: CacheError,
    },

    /// The release-notification stream closed while a waiter was blocked.
    #[snafu(display("release notifications closed while waiting for '{lock_key}'"))]
    NotificationsClosed { lock_key: String },
}

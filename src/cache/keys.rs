//! Cache key namespaces for stock state and lock bookkeeping.
//!
//! Every key carries the `{stock}` routing tag so that multi-key atomic
//! scripts stay co-located on a partitioned backing store (Redis cluster
//! hash tags). Four namespaces share the tag:
//!
//! - `stock` - shadow copy of durable quantities
//! - `lock` - per-item lock entries holding the owner token
//! - `lock_queue` - per-item FIFO wait queues
//! - `lock_queue_total` - informational total-registrations counters

/// Routing tag shared by all stock keys.
pub const TAG: &str = "{stock}";

/// Key holding the cached quantity for an item.
pub fn stock_key(item_id: u64) -> String {
    format!("{TAG}:stock:{item_id}")
}

/// Key holding the lock token for an item.
pub fn lock_key(item_id: u64) -> String {
    format!("{TAG}:lock:stock:{item_id}")
}

/// Key holding the FIFO wait queue for an item.
pub fn queue_key(item_id: u64) -> String {
    format!("{TAG}:lock_queue:stock:{item_id}")
}

/// Key holding the total-registrations counter for an item.
///
/// Observability only; never consulted for correctness.
pub fn queue_total_key(item_id: u64) -> String {
    format!("{TAG}:lock_queue_total:stock:{item_id}")
}

/// Pub/sub topic carrying release notifications for one lock key.
pub fn release_topic(lock_key: &str) -> String {
    format!("release:{lock_key}")
}

/// Message published on [`release_topic`] when a lock is released.
pub fn release_message(lock_key: &str) -> String {
    format!("{lock_key}:released")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_the_routing_tag() {
        for key in [stock_key(7), lock_key(7), queue_key(7), queue_total_key(7)] {
            assert!(key.starts_with("{stock}:"), "missing tag: {key}");
        }
    }

    #[test]
    fn namespaces_do_not_collide() {
        assert_eq!(stock_key(1), "{stock}:stock:1");
        assert_eq!(lock_key(1), "{stock}:lock:stock:1");
        assert_eq!(queue_key(1), "{stock}:lock_queue:stock:1");
        assert_eq!(queue_total_key(1), "{stock}:lock_queue_total:stock:1");
    }
}

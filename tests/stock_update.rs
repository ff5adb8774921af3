//! End-to-end concurrency properties for the stock update coordinator.
//!
//! Exercises both lock strategies against the in-memory stores: lost-update
//! freedom under contention, exact oversell cutoff, rollback on durable
//! faults, and cache/store convergence.

use std::sync::Arc;

use stockyard::{
    CacheStore, CompositeLock, CompositeLockConfig, FairLockConfig, FairQueueLock, LockStrategy,
    MemoryCacheStore, MemoryInventoryStore, OrderLine, StockCoordinator, StockError, StockItem,
    UpdateRequest, warm_cache,
};

fn composite(cache: Arc<MemoryCacheStore>) -> CompositeLock<MemoryCacheStore> {
    CompositeLock::new(
        cache,
        CompositeLockConfig {
            retry_count: 500,
            retry_delay_ms: 2,
            retry_jitter_ms: 3,
            ..CompositeLockConfig::default()
        },
    )
}

fn fair(cache: Arc<MemoryCacheStore>) -> FairQueueLock<MemoryCacheStore> {
    FairQueueLock::new(
        cache,
        FairLockConfig {
            ttl_ms: 1_000,
            fallback_retry_ms: 50,
        },
    )
}

async fn seeded_stores(
    items: &[StockItem],
) -> (Arc<MemoryCacheStore>, Arc<MemoryInventoryStore>) {
    let cache = MemoryCacheStore::new();
    let inventory = MemoryInventoryStore::new();
    inventory.seed(items).await;
    warm_cache(cache.as_ref(), inventory.as_ref())
        .await
        .unwrap();
    (cache, inventory)
}

async fn cached_quantity(cache: &MemoryCacheStore, item_id: u64) -> i64 {
    cache
        .read(&format!("{{stock}}:stock:{item_id}"))
        .await
        .unwrap()
        .unwrap()
        .parse()
        .unwrap()
}

fn single_line(item_id: u64, quantity: i64) -> UpdateRequest {
    UpdateRequest {
        orders: vec![OrderLine { item_id, quantity }],
    }
}

/// Five concurrent decrements of 10 from 100 must land at exactly 50 in
/// both cache and durable store.
async fn assert_no_lost_updates<L>(
    cache: Arc<MemoryCacheStore>,
    inventory: Arc<MemoryInventoryStore>,
    locks: L,
) where
    L: LockStrategy + 'static,
{
    let coordinator = Arc::new(StockCoordinator::new(cache.clone(), inventory.clone(), locks));

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.update_stock(&single_line(1, 10)).await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(cached_quantity(&cache, 1).await, 50);
    assert_eq!(inventory.quantity(1).await, Some(50));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_decrements_converge_under_composite_lock() {
    let (cache, inventory) = seeded_stores(&[StockItem { id: 1, quantity: 100 }]).await;
    let locks = composite(cache.clone());
    assert_no_lost_updates(cache, inventory, locks).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_decrements_converge_under_fair_lock() {
    let (cache, inventory) = seeded_stores(&[StockItem { id: 1, quantity: 100 }]).await;
    let locks = fair(cache.clone());
    assert_no_lost_updates(cache, inventory, locks).await;
}

/// With 30 units and five concurrent requests for 10, exactly three succeed
/// and the rest fail with OutOfStock; nothing oversells.
async fn assert_exact_oversell_cutoff<L>(
    cache: Arc<MemoryCacheStore>,
    inventory: Arc<MemoryInventoryStore>,
    locks: L,
) where
    L: LockStrategy + 'static,
{
    let coordinator = Arc::new(StockCoordinator::new(cache.clone(), inventory.clone(), locks));

    let tasks: Vec<_> = (0..5)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.update_stock(&single_line(1, 10)).await })
        })
        .collect();

    let mut succeeded = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(StockError::OutOfStock { .. }) => rejected += 1,
            Err(other) => panic!("unexpected failure: {other}"),
        }
    }

    assert_eq!(succeeded, 3);
    assert_eq!(rejected, 2);
    assert_eq!(cached_quantity(&cache, 1).await, 0);
    assert_eq!(inventory.quantity(1).await, Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn oversell_cutoff_is_exact_under_composite_lock() {
    let (cache, inventory) = seeded_stores(&[StockItem { id: 1, quantity: 30 }]).await;
    let locks = composite(cache.clone());
    assert_exact_oversell_cutoff(cache, inventory, locks).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn oversell_cutoff_is_exact_under_fair_lock() {
    let (cache, inventory) = seeded_stores(&[StockItem { id: 1, quantity: 30 }]).await;
    let locks = fair(cache.clone());
    assert_exact_oversell_cutoff(cache, inventory, locks).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn multi_item_batches_stay_consistent_under_contention() {
    let (cache, inventory) = seeded_stores(&[
        StockItem { id: 1, quantity: 60 },
        StockItem { id: 2, quantity: 40 },
    ])
    .await;
    let locks = composite(cache.clone());
    let coordinator = Arc::new(StockCoordinator::new(cache.clone(), inventory.clone(), locks));

    // Each task touches both items, with a duplicate line for item 1.
    let tasks: Vec<_> = (0..4)
        .map(|_| {
            let coordinator = coordinator.clone();
            tokio::spawn(async move {
                coordinator
                    .update_stock(&UpdateRequest {
                        orders: vec![
                            OrderLine {
                                item_id: 2,
                                quantity: 10,
                            },
                            OrderLine {
                                item_id: 1,
                                quantity: 5,
                            },
                            OrderLine {
                                item_id: 1,
                                quantity: 10,
                            },
                        ],
                    })
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    // 4 x (5 + 10) off item 1, 4 x 10 off item 2.
    assert_eq!(cached_quantity(&cache, 1).await, 0);
    assert_eq!(cached_quantity(&cache, 2).await, 0);
    assert_eq!(inventory.quantity(1).await, Some(0));
    assert_eq!(inventory.quantity(2).await, Some(0));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn durable_fault_compensates_and_later_requests_proceed() {
    let (cache, inventory) = seeded_stores(&[StockItem { id: 1, quantity: 100 }]).await;
    let locks = fair(cache.clone());
    let coordinator = StockCoordinator::new(cache.clone(), inventory.clone(), locks);

    inventory.inject_update_fault();
    let err = coordinator
        .update_stock(&single_line(1, 10))
        .await
        .unwrap_err();
    assert!(matches!(err, StockError::StockUpdateFailed { .. }));
    assert_eq!(cached_quantity(&cache, 1).await, 100);
    assert_eq!(inventory.quantity(1).await, Some(100));

    // The failed call released its locks; the next one goes through.
    let updates = coordinator
        .update_stock(&single_line(1, 10))
        .await
        .unwrap();
    assert_eq!(updates[0].quantity, 90);
    assert_eq!(inventory.quantity(1).await, Some(90));
}

#[tokio::test]
async fn response_preserves_original_line_order() {
    let (cache, inventory) = seeded_stores(&[
        StockItem { id: 1, quantity: 100 },
        StockItem { id: 2, quantity: 50 },
    ])
    .await;
    let locks = composite(cache.clone());
    let coordinator = StockCoordinator::new(cache, inventory, locks);

    let updates = coordinator
        .update_stock(&UpdateRequest {
            orders: vec![
                OrderLine {
                    item_id: 2,
                    quantity: 5,
                },
                OrderLine {
                    item_id: 1,
                    quantity: 10,
                },
                OrderLine {
                    item_id: 2,
                    quantity: 5,
                },
            ],
        })
        .await
        .unwrap();

    let ids: Vec<u64> = updates.iter().map(|u| u.item_id).collect();
    assert_eq!(ids, vec![2, 1, 2]);
    // Duplicate lines report the same final value.
    assert_eq!(updates[0].quantity, 40);
    assert_eq!(updates[2].quantity, 40);
    assert_eq!(updates[1].quantity, 90);
}

//! In-memory implementation of [`CacheStore`] for testing.
//!
//! Deterministic, non-persistent, no network I/O. Atomic scripts run under
//! a single state guard, mirroring what a cache server guarantees for
//! server-evaluated scripts. TTLs are honored lazily: an expired entry is
//! treated as absent (and removed) on its next access.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, broadcast};

use super::{CacheError, CacheStore, Script, ScriptOutcome, Subscription};

/// Buffered messages per topic before slow subscribers lag.
const TOPIC_BUFFER: usize = 64;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Entry>,
    queues: HashMap<String, VecDeque<String>>,
    /// One-shot batch-write fault: fail after this many entries land.
    batch_write_fault: Option<usize>,
}

impl State {
    /// Value at `key` if present and unexpired; expired entries are dropped.
    fn live(&mut self, key: &str) -> Option<String> {
        if self.entries.get(key).is_some_and(Entry::expired) {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.value.clone())
    }

    fn put(&mut self, key: &str, value: &str, ttl: Option<Duration>) {
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
    }
}

/// In-memory deterministic cache store.
///
/// Useful as the single concrete adapter in tests and simulations; a
/// production adapter maps the same trait onto a cache server, with
/// [`Script`] variants evaluated server-side.
#[derive(Default)]
pub struct MemoryCacheStore {
    state: Mutex<State>,
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Arm a one-shot fault in the next [`CacheStore::batch_write`]: the
    /// first `successful_writes` entries land, then the batch fails,
    /// leaving a partial write exactly as a mid-pipeline fault would.
    pub async fn inject_batch_write_fault(&self, successful_writes: usize) {
        self.state.lock().await.batch_write_fault = Some(successful_writes);
    }

    /// Current length of the FIFO queue at `key`.
    pub async fn queue_len(&self, key: &str) -> usize {
        self.state
            .lock()
            .await
            .queues
            .get(key)
            .map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn read(&self, key: &str) -> Result<Option<String>, CacheError> {
        Ok(self.state.lock().await.live(key))
    }

    async fn batch_read(&self, keys: &[String]) -> Result<Vec<Option<String>>, CacheError> {
        let mut state = self.state.lock().await;
        Ok(keys.iter().map(|key| state.live(key)).collect())
    }

    async fn write(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.state.lock().await.put(key, value, ttl);
        Ok(())
    }

    async fn batch_write(&self, entries: &[(String, String)]) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        let fault = state.batch_write_fault.take();
        for (index, (key, value)) in entries.iter().enumerate() {
            if fault.is_some_and(|after| index >= after) {
                return Err(CacheError::WriteFailed {
                    reason: format!("injected fault at batch index {index}"),
                });
            }
            state.put(key, value, None);
        }
        Ok(())
    }

    async fn write_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let mut state = self.state.lock().await;
        if state.live(key).is_some() {
            return Ok(false);
        }
        state.put(key, value, Some(ttl));
        Ok(true)
    }

    async fn queue_push(&self, key: &str, token: &str) -> Result<u64, CacheError> {
        let mut state = self.state.lock().await;
        let queue = state.queues.entry(key.to_string()).or_default();
        queue.push_back(token.to_string());
        Ok(queue.len() as u64)
    }

    async fn increment(&self, key: &str) -> Result<u64, CacheError> {
        let mut state = self.state.lock().await;
        let current = match state.live(key) {
            Some(value) => value.parse::<u64>().map_err(|_| CacheError::WriteFailed {
                reason: format!("counter at '{key}' is not an integer"),
            })?,
            None => 0,
        };
        let next = current + 1;
        state.put(key, &next.to_string(), None);
        Ok(next)
    }

    async fn publish(&self, topic: &str, message: &str) -> Result<usize, CacheError> {
        let topics = self.topics.lock().await;
        match topics.get(topic) {
            // send() only fails with zero receivers, which publish reports
            // as reaching nobody rather than as an error.
            Some(sender) => Ok(sender.send(message.to_string()).map_or(0, |n| n)),
            None => Ok(0),
        }
    }

    async fn subscribe(&self, topic: &str) -> Result<Subscription, CacheError> {
        let mut topics = self.topics.lock().await;
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_BUFFER).0);
        Ok(Subscription::new(topic.to_string(), sender.subscribe()))
    }

    async fn evaluate(&self, script: Script) -> Result<ScriptOutcome, CacheError> {
        let mut state = self.state.lock().await;
        match script {
            Script::AcquireFairLock {
                queue_key,
                lock_key,
                token,
                ttl,
            } => {
                let head = state
                    .queues
                    .get(&queue_key)
                    .and_then(|queue| queue.front().cloned());
                if head.as_deref() != Some(token.as_str()) || state.live(&lock_key).is_some() {
                    return Ok(ScriptOutcome::NotAcquired);
                }
                state.put(&lock_key, &token, Some(ttl));
                if let Some(queue) = state.queues.get_mut(&queue_key) {
                    queue.pop_front();
                }
                Ok(ScriptOutcome::Acquired)
            }
            Script::ReleaseIfOwner { lock_key, token } => {
                if state.live(&lock_key).as_deref() == Some(token.as_str()) {
                    state.entries.remove(&lock_key);
                    Ok(ScriptOutcome::Released)
                } else {
                    Ok(ScriptOutcome::NotReleased)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn batch_read_is_index_aligned() {
        let store = MemoryCacheStore::new();
        store.write("a", "1", None).await.unwrap();
        store.write("c", "3", None).await.unwrap();

        let values = store
            .batch_read(&["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("1".into()), None, Some("3".into())]);
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let store = MemoryCacheStore::new();
        store
            .write("k", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        assert_eq!(store.read("k").await.unwrap(), Some("v".into()));

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.read("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn write_if_absent_respects_live_entries() {
        let store = MemoryCacheStore::new();
        assert!(
            store
                .write_if_absent("lock", "t1", Duration::from_millis(30))
                .await
                .unwrap()
        );
        assert!(
            !store
                .write_if_absent("lock", "t2", Duration::from_secs(1))
                .await
                .unwrap()
        );

        // After expiry the key is free again.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(
            store
                .write_if_absent("lock", "t3", Duration::from_secs(1))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn fair_lock_script_requires_queue_head_and_free_lock() {
        let store = MemoryCacheStore::new();
        store.queue_push("q", "first").await.unwrap();
        store.queue_push("q", "second").await.unwrap();

        let acquire = |token: &str| Script::AcquireFairLock {
            queue_key: "q".into(),
            lock_key: "l".into(),
            token: token.into(),
            ttl: Duration::from_secs(1),
        };

        // Not at the head: no-op, queue untouched.
        let outcome = store.evaluate(acquire("second")).await.unwrap();
        assert_eq!(outcome, ScriptOutcome::NotAcquired);
        assert_eq!(store.queue_len("q").await, 2);

        // Head acquires, popping itself.
        let outcome = store.evaluate(acquire("first")).await.unwrap();
        assert_eq!(outcome, ScriptOutcome::Acquired);
        assert_eq!(store.queue_len("q").await, 1);

        // New head blocked while the lock key is set.
        let outcome = store.evaluate(acquire("second")).await.unwrap();
        assert_eq!(outcome, ScriptOutcome::NotAcquired);
    }

    #[tokio::test]
    async fn release_if_owner_ignores_foreign_tokens() {
        let store = MemoryCacheStore::new();
        store.write("l", "owner", None).await.unwrap();

        let outcome = store
            .evaluate(Script::ReleaseIfOwner {
                lock_key: "l".into(),
                token: "intruder".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, ScriptOutcome::NotReleased);
        assert_eq!(store.read("l").await.unwrap(), Some("owner".into()));

        let outcome = store
            .evaluate(Script::ReleaseIfOwner {
                lock_key: "l".into(),
                token: "owner".into(),
            })
            .await
            .unwrap();
        assert_eq!(outcome, ScriptOutcome::Released);
        assert_eq!(store.read("l").await.unwrap(), None);
    }

    #[tokio::test]
    async fn publish_reaches_open_subscriptions() {
        let store = MemoryCacheStore::new();
        assert_eq!(store.publish("t", "ignored").await.unwrap(), 0);

        let mut sub = store.subscribe("t").await.unwrap();
        assert_eq!(store.publish("t", "hello").await.unwrap(), 1);
        assert_eq!(sub.recv().await.unwrap(), "hello");

        drop(sub);
        assert_eq!(store.publish("t", "gone").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn injected_batch_fault_leaves_partial_write() {
        let store = MemoryCacheStore::new();
        store.inject_batch_write_fault(1).await;

        let entries = vec![("a".into(), "1".into()), ("b".into(), "2".into())];
        let err = store.batch_write(&entries).await.unwrap_err();
        assert!(matches!(err, CacheError::WriteFailed { .. }));

        // First entry landed, second did not.
        assert_eq!(store.read("a").await.unwrap(), Some("1".into()));
        assert_eq!(store.read("b").await.unwrap(), None);

        // Fault is one-shot.
        store.batch_write(&entries).await.unwrap();
        assert_eq!(store.read("b").await.unwrap(), Some("2".into()));
    }
}

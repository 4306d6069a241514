//! Blocking key/value store used to hand each command result to exactly
//! the caller awaiting it.
//!
//! `put` and `get` are order-independent: a result may arrive before its
//! caller starts waiting. One shared notifier is broadcast on every `put`
//! and each waiter re-checks its own key on wake, so many callers can wait
//! on disjoint keys without missed wakeups.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};

use crate::error::{ClientError, Result};

pub struct ResultStore<V> {
    items: Mutex<HashMap<u64, V>>,
    notify: Notify,
}

impl<V> Default for ResultStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ResultStore<V> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    /// Store a value under `key`. A key is produced at most once per
    /// consumption; a second `put` before the entry has been consumed fails
    /// with [`ClientError::DuplicateKey`].
    pub async fn put(&self, key: u64, value: V) -> Result<()> {
        {
            let mut items = self.items.lock().await;
            if items.contains_key(&key) {
                return Err(ClientError::DuplicateKey(key));
            }
            items.insert(key, value);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    /// Block until `key` appears or `timeout` elapses. With `remove` the
    /// entry is taken out on success, guaranteeing a single consumer.
    pub async fn get(&self, key: u64, timeout: Duration, remove: bool) -> Result<V>
    where
        V: Clone,
    {
        tokio::time::timeout(timeout, self.wait_for(key, remove))
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    async fn wait_for(&self, key: u64, remove: bool) -> Result<V>
    where
        V: Clone,
    {
        loop {
            // Register interest before the check so a put between the check
            // and the await still wakes this waiter.
            let notified = self.notify.notified();
            {
                let mut items = self.items.lock().await;
                if remove {
                    if let Some(value) = items.remove(&key) {
                        return Ok(value);
                    }
                } else if let Some(value) = items.get(&key) {
                    return Ok(value.clone());
                }
            }
            notified.await;
        }
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_returns_previously_put_value_immediately() {
        let store = ResultStore::new();
        store.put(7, "X").await.unwrap();
        let value = store.get(7, Duration::from_secs(1), true).await.unwrap();
        assert_eq!(value, "X");
        // Single-consumer: the key is gone until a new put.
        let err = store
            .get(7, Duration::from_millis(100), true)
            .await
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn duplicate_put_fails() {
        let store = ResultStore::new();
        store.put(1, 10).await.unwrap();
        let err = store.put(1, 20).await.unwrap_err();
        assert!(matches!(err, ClientError::DuplicateKey(1)));
    }

    #[tokio::test]
    async fn consumed_key_can_be_produced_again() {
        let store = ResultStore::new();
        store.put(5, 1).await.unwrap();
        assert_eq!(store.get(5, Duration::from_secs(1), true).await.unwrap(), 1);
        store.put(5, 2).await.unwrap();
        assert_eq!(store.get(5, Duration::from_secs(1), true).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn waiters_on_disjoint_keys_unblock_independently() {
        let store = std::sync::Arc::new(ResultStore::new());

        let s1 = store.clone();
        let waiter_b = tokio::spawn(async move {
            s1.get(2, Duration::from_secs(2), true).await
        });
        let s2 = store.clone();
        let waiter_a = tokio::spawn(async move {
            s2.get(1, Duration::from_secs(2), true).await
        });

        // Resolve key 2 first; the key-1 waiter must keep waiting.
        store.put(2, "b").await.unwrap();
        assert_eq!(waiter_b.await.unwrap().unwrap(), "b");
        assert!(!waiter_a.is_finished());

        store.put(1, "a").await.unwrap();
        assert_eq!(waiter_a.await.unwrap().unwrap(), "a");
    }

    #[tokio::test]
    async fn get_without_remove_leaves_the_entry() {
        let store = ResultStore::new();
        store.put(9, 99).await.unwrap();
        assert_eq!(
            store.get(9, Duration::from_secs(1), false).await.unwrap(),
            99
        );
        assert_eq!(store.len().await, 1);
    }
}

//! In-process [`BackingStore`] used for development wiring and tests.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering as AtomicOrdering},
    time::{Duration, Instant},
};
use tokio::sync::broadcast;

use super::{BackingStore, StoreError, Subscription};

const CHANNEL_CAPACITY: usize = 64;

#[derive(Default)]
struct Inner {
    values: HashMap<String, (String, Option<Instant>)>,
    sorted_sets: HashMap<String, HashMap<String, f64>>,
}

impl Inner {
    fn live_value(&mut self, key: &str) -> Option<&String> {
        let expired = self
            .values
            .get(key)
            .and_then(|(_, expiry)| *expiry)
            .is_some_and(|at| at <= Instant::now());
        if expired {
            self.values.remove(key);
        }
        self.values.get(key).map(|(value, _)| value)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    channels: DashMap<String, broadcast::Sender<String>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent data operation fail until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_string()));
        }
        Ok(())
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<String> {
        self.channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl BackingStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check()?;
        Ok(self.inner.lock().live_value(key).cloned())
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), StoreError> {
        self.check()?;
        let expiry = ttl.map(|ttl| Instant::now() + ttl);
        self.inner.lock().values.insert(key.to_string(), (value, expiry));
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> Result<(), StoreError> {
        self.check()?;
        let mut inner = self.inner.lock();
        for key in keys {
            inner.values.remove(key);
            inner.sorted_sets.remove(key);
        }
        Ok(())
    }

    async fn zadd(&self, key: &str, members: &[(String, f64)]) -> Result<(), StoreError> {
        self.check()?;
        let mut inner = self.inner.lock();
        let set = inner.sorted_sets.entry(key.to_string()).or_default();
        for (member, score) in members {
            set.insert(member.clone(), *score);
        }
        Ok(())
    }

    async fn zrem(&self, key: &str, members: &[String]) -> Result<(), StoreError> {
        self.check()?;
        let mut inner = self.inner.lock();
        if let Some(set) = inner.sorted_sets.get_mut(key) {
            for member in members {
                set.remove(member);
            }
            if set.is_empty() {
                inner.sorted_sets.remove(key);
            }
        }
        Ok(())
    }

    async fn zrevrange(
        &self,
        key: &str,
        limit: Option<usize>,
    ) -> Result<Vec<(String, f64)>, StoreError> {
        self.check()?;
        let inner = self.inner.lock();
        let Some(set) = inner.sorted_sets.get(key) else {
            return Ok(Vec::new());
        };

        let mut members: Vec<(String, f64)> =
            set.iter().map(|(member, score)| (member.clone(), *score)).collect();
        members.sort_by(|a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then_with(|| a.0.cmp(&b.0))
        });
        if let Some(limit) = limit {
            members.truncate(limit);
        }
        Ok(members)
    }

    async fn incr_batch(&self, increments: &[(String, i64)]) -> Result<(), StoreError> {
        self.check()?;
        let mut inner = self.inner.lock();
        for (key, delta) in increments {
            let current = match inner.live_value(key) {
                Some(raw) => raw.parse::<i64>().map_err(|_| {
                    StoreError::Serialization(format!("{key} does not hold an integer"))
                })?,
                None => 0,
            };
            inner.values.insert(key.clone(), ((current + delta).to_string(), None));
        }
        Ok(())
    }

    async fn publish(&self, channel: &str, message: String) -> Result<(), StoreError> {
        self.check()?;
        // No subscribers is not an error for a pub/sub channel.
        let _ = self.sender(channel).send(message);
        Ok(())
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        self.sender(channel).subscribe()
    }
}

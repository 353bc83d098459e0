//! Content-addressed cache of objective vectors.

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

/// Bounded map from sequence key to objective vector.
///
/// Reads take a shared lock and may run from any worker. Inserts are made by
/// the evaluation coordinator after each join, one per distinct key, so an
/// entry is never written twice concurrently. When full, the oldest entry is
/// evicted.
#[derive(Debug)]
pub struct ScoreCache {
    capacity: usize,
    inner: RwLock<CacheInner>,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, Vec<f64>>,
    order: VecDeque<String>,
}

impl ScoreCache {
    /// Create a cache holding at most `capacity` entries. A capacity of 0
    /// disables caching.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            inner: RwLock::new(CacheInner::default()),
        }
    }

    /// Whether caching is enabled.
    pub fn is_enabled(&self) -> bool {
        self.capacity > 0
    }

    /// Look up the objective vector cached for `key`.
    pub fn get(&self, key: &str) -> Option<Vec<f64>> {
        if !self.is_enabled() {
            return None;
        }
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(key).cloned()
    }

    /// Cache `objectives` for `key`. Existing entries are left untouched.
    pub fn insert(&self, key: String, objectives: Vec<f64>) {
        if !self.is_enabled() {
            return;
        }
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if inner.entries.contains_key(&key) {
            return;
        }
        while inner.entries.len() >= self.capacity {
            match inner.order.pop_front() {
                Some(oldest) => {
                    inner.entries.remove(&oldest);
                }
                None => break,
            }
        }
        inner.order.push_back(key.clone());
        inner.entries.insert(key, objectives);
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

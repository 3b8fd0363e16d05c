//! LRU cache of basket payloads bounded by total bytes.

use crate::error::Result;
use bytes::Bytes;
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};

/// Cache counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Total number of lookups
    pub lookups: u64,
    /// Lookups that found a payload
    pub hits: u64,
    /// Lookups that did not
    pub misses: u64,
    /// Payloads stored
    pub insertions: u64,
    /// Payloads dropped to make room
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups that hit (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        if self.lookups == 0 {
            0.0
        } else {
            self.hits as f64 / self.lookups as f64
        }
    }

    /// Zeroes every counter.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Default)]
struct Entries {
    /// Payloads by basket offset
    map: HashMap<u64, Bytes>,
    /// Offsets in use order, most recent at the back
    order: VecDeque<u64>,
    /// Sum of cached payload lengths
    size: usize,
}

impl Entries {
    fn touch(&mut self, offset: u64) {
        if let Some(pos) = self.order.iter().position(|&o| o == offset) {
            self.order.remove(pos);
        }
        self.order.push_back(offset);
    }

    fn remove(&mut self, offset: u64) -> Option<Bytes> {
        let value = self.map.remove(&offset)?;
        self.size -= value.len();
        self.order.retain(|&o| o != offset);
        Some(value)
    }

    fn pop_oldest(&mut self) -> bool {
        match self.order.pop_front() {
            Some(offset) => {
                if let Some(value) = self.map.remove(&offset) {
                    self.size -= value.len();
                }
                true
            }
            None => false,
        }
    }
}

/// Thread-safe LRU cache of decompressed baskets.
///
/// Capacity is in bytes; a capacity of 0 disables caching. Payloads larger
/// than the capacity are never stored.
///
/// # Thread Safety
///
/// Shared by every branch of a file through the file context; all methods
/// take `&self`.
#[derive(Debug)]
pub struct BasketCache {
    capacity: usize,
    entries: RwLock<Entries>,
    stats: RwLock<CacheStats>,
}

impl BasketCache {
    /// Creates a cache holding at most `capacity` bytes.
    ///
    /// # Examples
    ///
    /// ```
    /// use rootio::cache::BasketCache;
    ///
    /// let cache = BasketCache::new(16 * 1024 * 1024);
    /// assert!(cache.is_empty());
    /// ```
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: RwLock::new(Entries::default()),
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Looks up the payload of the basket at `offset`, marking it recently used.
    pub fn get(&self, offset: u64) -> Option<Bytes> {
        self.stats.write().lookups += 1;
        if self.capacity == 0 {
            self.stats.write().misses += 1;
            return None;
        }

        let found = {
            let mut entries = self.entries.write();
            let found = entries.map.get(&offset).cloned();
            if found.is_some() {
                entries.touch(offset);
            }
            found
        };

        let mut stats = self.stats.write();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    /// Stores a payload, evicting least recently used baskets to make room.
    pub fn insert(&self, offset: u64, value: Bytes) {
        if self.capacity == 0 || value.len() > self.capacity {
            return;
        }

        let mut evicted = 0;
        {
            let mut entries = self.entries.write();
            entries.remove(offset);
            while entries.size + value.len() > self.capacity && entries.pop_oldest() {
                evicted += 1;
            }
            entries.size += value.len();
            entries.map.insert(offset, value);
            entries.order.push_back(offset);
        }

        let mut stats = self.stats.write();
        stats.insertions += 1;
        stats.evictions += evicted;
    }

    /// Returns the cached payload or loads and caches it.
    ///
    /// Concurrent misses on the same offset may both load; the payload is a
    /// pure function of the file bytes so either result is kept.
    pub fn get_or_load<F>(&self, offset: u64, load: F) -> Result<Bytes>
    where
        F: FnOnce() -> Result<Bytes>,
    {
        if let Some(value) = self.get(offset) {
            return Ok(value);
        }
        let value = load()?;
        log::trace!("caching basket at {} ({} bytes)", offset, value.len());
        self.insert(offset, value.clone());
        Ok(value)
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().clone()
    }

    /// Zeroes the counters.
    pub fn reset_stats(&self) {
        self.stats.write().reset();
    }

    /// Drops every cached payload.
    pub fn clear(&self) {
        *self.entries.write() = Entries::default();
    }

    /// Bytes currently cached.
    pub fn size(&self) -> usize {
        self.entries.read().size
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of cached baskets.
    pub fn len(&self) -> usize {
        self.entries.read().map.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

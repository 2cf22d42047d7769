//! A bounded cache tier
//!
//! Entries live in an arena of slots. The key index stores generation-checked
//! handles, so a handle to a slot that has since been reused never resolves.

use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::models::{CacheEntry, CacheTier, EvictionStrategy, TierConfig};

pub(crate) type StoredEntry = CacheEntry<Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Handle {
    slot: usize,
    generation: u64,
}

#[derive(Debug)]
struct Slot {
    generation: u64,
    entry: Option<StoredEntry>,
}

/// Result of a read
#[derive(Debug)]
pub(crate) enum Lookup {
    Hit { value: Value, access_count: u64 },
    Expired(StoredEntry),
    Miss,
}

#[derive(Debug)]
pub(crate) struct Tier {
    name: CacheTier,
    capacity: usize,
    default_ttl: Duration,
    strategy: EvictionStrategy,
    slots: Vec<Slot>,
    free: Vec<usize>,
    index: HashMap<String, Handle>,
    total_size: usize,
}

impl Tier {
    pub(crate) fn new(name: CacheTier, config: &TierConfig) -> Self {
        Self {
            name,
            capacity: config.capacity.max(1),
            default_ttl: config.ttl(),
            strategy: config.strategy,
            slots: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            total_size: 0,
        }
    }

    pub(crate) fn name(&self) -> CacheTier {
        self.name
    }

    pub(crate) fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub(crate) fn len(&self) -> usize {
        self.index.len()
    }

    pub(crate) fn total_size(&self) -> usize {
        self.total_size
    }

    fn resolve(&self, key: &str) -> Option<usize> {
        let handle = self.index.get(key)?;
        let slot = self.slots.get(handle.slot)?;
        (slot.generation == handle.generation && slot.entry.is_some()).then_some(handle.slot)
    }

    fn entry(&self, key: &str) -> Option<&StoredEntry> {
        self.resolve(key)
            .and_then(|slot| self.slots[slot].entry.as_ref())
    }

    /// Read and record an access; expired entries are removed
    pub(crate) fn lookup(&mut self, key: &str, now: Instant) -> Lookup {
        let Some(slot) = self.resolve(key) else {
            return Lookup::Miss;
        };

        let expired = self.slots[slot]
            .entry
            .as_ref()
            .map_or(true, |entry| entry.is_expired(now));
        if expired {
            return match self.remove(key) {
                Some(entry) => Lookup::Expired(entry),
                None => Lookup::Miss,
            };
        }

        match self.slots[slot].entry.as_mut() {
            Some(entry) => {
                entry.touch(now);
                Lookup::Hit {
                    value: entry.value.clone(),
                    access_count: entry.access_count,
                }
            }
            None => Lookup::Miss,
        }
    }

    /// Whether a live entry exists, without recording an access
    pub(crate) fn contains_live(&self, key: &str, now: Instant) -> bool {
        self.entry(key).map_or(false, |entry| !entry.is_expired(now))
    }

    pub(crate) fn access_count(&self, key: &str) -> Option<u64> {
        self.entry(key).map(|entry| entry.access_count)
    }

    /// Store an entry, replacing any entry under the same key
    ///
    /// Inserting a new key into a full tier evicts exactly one entry, which
    /// is returned.
    pub(crate) fn insert(&mut self, entry: StoredEntry, now: Instant) -> Option<StoredEntry> {
        if let Some(slot) = self.resolve(&entry.key) {
            self.total_size += entry.size;
            if let Some(previous) = self.slots[slot].entry.replace(entry) {
                self.total_size -= previous.size;
            }
            return None;
        }

        let victim = if self.index.len() >= self.capacity {
            self.select_victim(now).and_then(|key| self.remove(&key))
        } else {
            None
        };

        let key = entry.key.clone();
        self.total_size += entry.size;
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot].entry = Some(entry);
                slot
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                self.slots.len() - 1
            }
        };
        let generation = self.slots[slot].generation;
        self.index.insert(key, Handle { slot, generation });

        victim
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<StoredEntry> {
        let handle = self.index.remove(key)?;
        let slot = self.slots.get_mut(handle.slot)?;
        if slot.generation != handle.generation {
            return None;
        }

        let entry = slot.entry.take()?;
        slot.generation += 1;
        self.free.push(handle.slot);
        self.total_size -= entry.size;
        Some(entry)
    }

    /// Reset the TTL so the entry expires `ttl` from now
    pub(crate) fn expire(&mut self, key: &str, ttl: Duration, now: Instant) -> bool {
        let Some(slot) = self.resolve(key) else {
            return false;
        };
        match self.slots[slot].entry.as_mut() {
            Some(entry) => {
                entry.ttl = now.saturating_duration_since(entry.created) + ttl;
                true
            }
            None => false,
        }
    }

    /// Remove every expired entry
    pub(crate) fn purge_expired(&mut self, now: Instant) -> Vec<StoredEntry> {
        let expired: Vec<String> = self
            .entries()
            .filter(|entry| entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect();

        expired
            .into_iter()
            .filter_map(|key| self.remove(&key))
            .collect()
    }

    /// Keys of entries that have not expired at `now`
    pub(crate) fn live_keys(&self, now: Instant) -> Vec<String> {
        self.entries()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.key.clone())
            .collect()
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &StoredEntry> {
        self.slots.iter().filter_map(|slot| slot.entry.as_ref())
    }

    pub(crate) fn clear(&mut self) -> usize {
        let removed = self.index.len();
        for slot in &mut self.slots {
            if slot.entry.take().is_some() {
                slot.generation += 1;
            }
        }
        self.free = (0..self.slots.len()).rev().collect();
        self.index.clear();
        self.total_size = 0;
        removed
    }

    fn select_victim(&self, now: Instant) -> Option<String> {
        let entries = self.entries();
        let victim = match self.strategy {
            EvictionStrategy::Lru => entries.min_by(|a, b| {
                a.last_accessed
                    .cmp(&b.last_accessed)
                    .then_with(|| a.created.cmp(&b.created))
            }),
            EvictionStrategy::Lfu => entries.min_by(|a, b| {
                a.access_count
                    .cmp(&b.access_count)
                    .then_with(|| a.last_accessed.cmp(&b.last_accessed))
            }),
            EvictionStrategy::Ttl => entries.min_by(|a, b| {
                a.remaining_ttl(now)
                    .cmp(&b.remaining_ttl(now))
                    .then_with(|| a.created.cmp(&b.created))
            }),
            EvictionStrategy::Size => entries.max_by(|a, b| {
                a.size
                    .cmp(&b.size)
                    .then_with(|| b.last_accessed.cmp(&a.last_accessed))
            }),
            EvictionStrategy::Adaptive => entries.min_by(|a, b| {
                a.adaptive_score(now)
                    .total_cmp(&b.adaptive_score(now))
                    .then_with(|| a.last_accessed.cmp(&b.last_accessed))
            }),
        };
        victim.map(|entry| entry.key.clone())
    }
}

//! Ephemeral per-owner result store.
//!
//! `ResultStore` maps an owner to at most one finished result and the
//! instant it was stored. It is backed by a sharded `DashMap`, so owners
//! on different shards never contend. Values are cloned out on read; no
//! map guard ever escapes a method, which keeps guards from being held
//! across `.await` points.

use std::fmt;
use std::time::Duration;

use cutout_types::owner::OwnerId;
use dashmap::DashMap;
use tokio::time::Instant;

/// Approximate heap footprint of a stored value.
pub trait ResidentSize {
    fn resident_bytes(&self) -> usize;
}

struct Entry<V> {
    payload: V,
    created_at: Instant,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Concurrent owner -> result map with insertion timestamps.
pub struct ResultStore<V> {
    entries: DashMap<OwnerId, Entry<V>>,
}

impl<V: Clone> ResultStore<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert or replace the owner's result with a fresh timestamp.
    ///
    /// Returns `true` if a previous result was replaced; that value is
    /// dropped here.
    pub fn put(&self, owner_id: OwnerId, payload: V) -> bool {
        let entry = Entry {
            payload,
            created_at: Instant::now(),
        };
        self.entries.insert(owner_id, entry).is_some()
    }

    /// Clone of the owner's result, leaving it in place.
    pub fn get(&self, owner_id: OwnerId) -> Option<V> {
        self.entries.get(&owner_id).map(|e| e.payload.clone())
    }

    /// Remove and return the owner's result. At most one caller wins.
    pub fn take(&self, owner_id: OwnerId) -> Option<V> {
        self.entries.remove(&owner_id).map(|(_, e)| e.payload)
    }

    pub fn contains(&self, owner_id: OwnerId) -> bool {
        self.entries.contains_key(&owner_id)
    }

    /// When the owner's current result was stored.
    pub fn created_at(&self, owner_id: OwnerId) -> Option<Instant> {
        self.entries.get(&owner_id).map(|e| e.created_at)
    }

    /// Remove every entry older than `ttl` at `now`; returns how many.
    pub fn sweep(&self, now: Instant, ttl: Duration) -> usize {
        self.evict_expired(now, ttl).len()
    }

    /// Remove and return every entry older than `ttl` at `now`.
    ///
    /// Each removal re-checks the entry under its shard lock, so a result
    /// replaced or taken concurrently is never evicted by mistake.
    pub fn evict_expired(&self, now: Instant, ttl: Duration) -> Vec<(OwnerId, V)> {
        let expired: Vec<OwnerId> = self
            .entries
            .iter()
            .filter(|e| e.value().is_expired(now, ttl))
            .map(|e| *e.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|owner_id| {
                self.entries
                    .remove_if(&owner_id, |_, e| e.is_expired(now, ttl))
                    .map(|(owner_id, e)| (owner_id, e.payload))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<V: Clone + ResidentSize> ResultStore<V> {
    /// Sum of [`ResidentSize`] over all stored results.
    pub fn resident_bytes(&self) -> usize {
        self.entries
            .iter()
            .map(|e| e.value().payload.resident_bytes())
            .sum()
    }
}

impl<V: Clone> Default for ResultStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> fmt::Debug for ResultStore<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultStore")
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    use super::*;
    use crate::cutout::Cutout;
    use image::RgbaImage;

    const TTL: Duration = Duration::from_secs(600);

    #[test]
    fn put_then_get() {
        let store = ResultStore::new();
        assert!(!store.put(OwnerId(1), "a".to_string()));
        assert_eq!(store.get(OwnerId(1)).as_deref(), Some("a"));
        // get does not consume
        assert_eq!(store.get(OwnerId(1)).as_deref(), Some("a"));
        assert_eq!(store.get(OwnerId(2)), None);
    }

    #[test]
    fn latest_put_wins_and_releases_previous() {
        let store = ResultStore::new();
        let first = Cutout::new(RgbaImage::new(2, 2));
        let first_weak = first.downgrade();
        let second = Cutout::new(RgbaImage::new(3, 3));

        store.put(OwnerId(5), first);
        assert!(store.put(OwnerId(5), second));

        assert_eq!(store.get(OwnerId(5)).unwrap().dimensions(), (3, 3));
        assert!(first_weak.upgrade().is_none(), "replaced payload still alive");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn take_consumes_exactly_once() {
        let store = ResultStore::new();
        store.put(OwnerId(3), 42u32);

        assert_eq!(store.take(OwnerId(3)), Some(42));
        assert_eq!(store.get(OwnerId(3)), None);
        assert_eq!(store.take(OwnerId(3)), None);
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_respects_ttl_boundary() {
        let store = ResultStore::new();
        store.put(OwnerId(1), 1u8);
        let t = store.created_at(OwnerId(1)).unwrap();

        assert_eq!(store.sweep(t + TTL - Duration::from_secs(1), TTL), 0);
        assert_eq!(store.sweep(t + TTL, TTL), 0);
        assert!(store.contains(OwnerId(1)));

        assert_eq!(store.sweep(t + TTL + Duration::from_secs(1), TTL), 1);
        assert_eq!(store.get(OwnerId(1)), None);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_only_removes_stale_entries() {
        let store = ResultStore::new();
        store.put(OwnerId(1), "old");
        tokio::time::advance(Duration::from_secs(30)).await;
        store.put(OwnerId(2), "new");

        let evicted = store.evict_expired(Instant::now(), Duration::from_secs(20));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0], (OwnerId(1), "old"));
        assert!(store.contains(OwnerId(2)));
    }

    #[test]
    fn distinct_owners_are_isolated_under_concurrency() {
        let store = Arc::new(ResultStore::new());
        let threads: Vec<_> = (0..8i64)
            .map(|owner| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for round in 0..500i64 {
                        let value = owner * 10_000 + round;
                        store.put(OwnerId(owner), value);
                        let seen = store.get(OwnerId(owner)).unwrap();
                        assert_eq!(seen / 10_000, owner);
                        if round % 3 == 0 {
                            assert_eq!(store.take(OwnerId(owner)), Some(value));
                        }
                    }
                })
            })
            .collect();

        for t in threads {
            t.join().unwrap();
        }
    }

    #[test]
    fn concurrent_take_has_single_winner() {
        for _ in 0..200 {
            let store = Arc::new(ResultStore::new());
            store.put(OwnerId(1), "payload");
            let winners = Arc::new(AtomicUsize::new(0));
            let barrier = Arc::new(Barrier::new(2));

            let threads: Vec<_> = (0..2)
                .map(|_| {
                    let store = Arc::clone(&store);
                    let winners = Arc::clone(&winners);
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || {
                        barrier.wait();
                        if store.take(OwnerId(1)).is_some() {
                            winners.fetch_add(1, Ordering::SeqCst);
                        }
                    })
                })
                .collect();
            for t in threads {
                t.join().unwrap();
            }
            assert_eq!(winners.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn take_racing_sweep_removes_once() {
        for _ in 0..200 {
            let store = Arc::new(ResultStore::new());
            store.put(OwnerId(1), 7u8);
            let expired_at = store.created_at(OwnerId(1)).unwrap() + TTL + Duration::from_secs(1);
            let barrier = Arc::new(Barrier::new(2));

            let taker = {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.take(OwnerId(1)).is_some() as usize
                })
            };
            let sweeper = {
                let store = Arc::clone(&store);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    store.sweep(expired_at, TTL)
                })
            };

            let removed = taker.join().unwrap() + sweeper.join().unwrap();
            assert_eq!(removed, 1);
            assert!(store.is_empty());
        }
    }

    #[test]
    fn resident_bytes_sums_payloads() {
        let store = ResultStore::new();
        store.put(OwnerId(1), Cutout::new(RgbaImage::new(2, 2)));
        store.put(OwnerId(2), Cutout::new(RgbaImage::new(4, 1)));
        assert_eq!(store.resident_bytes(), 16 + 16);
    }
}

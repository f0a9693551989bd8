// Identifier Registry: bounded, insertion-ordered map from notification
// identifier to platform handle, with strict FIFO eviction at capacity.

use std::collections::{HashMap, VecDeque};

use notif_types::PlatformHandle;
use parking_lot::RwLock;
use tracing::debug;

use crate::config::RegistryConfig;

/// A tracked notification: platform handle plus insertion sequence.
#[derive(Debug, Clone, Copy)]
struct RegistryEntry {
    handle: PlatformHandle,
    seq: u64,
}

struct RegistryInner {
    entries: HashMap<String, RegistryEntry>,
    /// Insertion-order queue of (seq, identifier). Entries whose sequence no
    /// longer matches the map are stale (superseded or removed) and are
    /// skipped lazily, so removals stay O(1).
    order: VecDeque<(u64, String)>,
    next_seq: u64,
}

impl RegistryInner {
    /// Pop the FIFO-oldest live entry off the order queue.
    fn pop_oldest(&mut self) -> Option<(String, PlatformHandle)> {
        while let Some((seq, id)) = self.order.pop_front() {
            match self.entries.get(&id) {
                Some(entry) if entry.seq == seq => {
                    let handle = entry.handle;
                    self.entries.remove(&id);
                    return Some((id, handle));
                }
                // Stale queue entry, skip.
                _ => continue,
            }
        }
        None
    }

    /// Drop stale order entries once they outnumber live ones.
    fn maybe_compact(&mut self) {
        if self.order.len() > self.entries.len() * 2 + 16 {
            let entries = &self.entries;
            self.order
                .retain(|(seq, id)| entries.get(id).is_some_and(|e| e.seq == *seq));
        }
    }
}

/// Bounded, ordered identifier → handle registry.
///
/// All mutations go through one exclusive lock; reads take a shared lock.
/// Insertion order is the order of successful inserts as observed by the
/// lock, and eviction always removes the strict FIFO-oldest surviving entry.
pub struct IdentifierRegistry {
    capacity: usize,
    inner: RwLock<RegistryInner>,
}

impl IdentifierRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            capacity: config.capacity.max(1),
            inner: RwLock::new(RegistryInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
                next_seq: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Insert or replace an entry.
    ///
    /// Re-inserting an existing identifier updates its handle and moves it
    /// to the most-recent position. At capacity the FIFO-oldest entry is
    /// evicted first and returned so the caller can clean up group
    /// membership and the native side; no entry is ever dropped silently.
    pub fn insert(
        &self,
        identifier: &str,
        handle: PlatformHandle,
    ) -> Option<(String, PlatformHandle)> {
        let mut inner = self.inner.write();
        let seq = inner.next_seq;
        inner.next_seq += 1;

        let replacing = inner.entries.contains_key(identifier);
        let evicted = if !replacing && inner.entries.len() >= self.capacity {
            inner.pop_oldest()
        } else {
            None
        };

        inner
            .entries
            .insert(identifier.to_string(), RegistryEntry { handle, seq });
        inner.order.push_back((seq, identifier.to_string()));
        inner.maybe_compact();

        if let Some((ref id, _)) = evicted {
            debug!(evicted = %id, count = inner.entries.len(), "registry at capacity, evicted oldest");
        }
        evicted
    }

    /// Remove one entry, returning its handle. Absent identifiers are a
    /// no-op.
    pub fn remove(&self, identifier: &str) -> Option<PlatformHandle> {
        let mut inner = self.inner.write();
        inner.entries.remove(identifier).map(|e| e.handle)
    }

    /// Remove a batch of entries under a single lock acquisition.
    ///
    /// Returns the (identifier, handle) pairs that were actually present so
    /// native cancellation can happen outside the lock.
    pub fn remove_many<I, S>(&self, identifiers: I) -> Vec<(String, PlatformHandle)>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut inner = self.inner.write();
        let mut removed = Vec::new();
        for id in identifiers {
            if let Some(entry) = inner.entries.remove(id.as_ref()) {
                removed.push((id.as_ref().to_string(), entry.handle));
            }
        }
        removed
    }

    /// Remove every entry, returning them in insertion order.
    pub fn drain_all(&self) -> Vec<(String, PlatformHandle)> {
        let mut inner = self.inner.write();
        let mut drained = Vec::with_capacity(inner.entries.len());
        while let Some(pair) = inner.pop_oldest() {
            drained.push(pair);
        }
        inner.order.clear();
        inner.entries.clear();
        drained
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.inner.read().entries.contains_key(identifier)
    }

    pub fn get(&self, identifier: &str) -> Option<PlatformHandle> {
        self.inner.read().entries.get(identifier).map(|e| e.handle)
    }

    pub fn count(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().entries.is_empty()
    }

    /// All live entries in insertion order.
    pub fn snapshot(&self) -> Vec<(String, PlatformHandle)> {
        let inner = self.inner.read();
        let mut seen = Vec::with_capacity(inner.entries.len());
        for (seq, id) in &inner.order {
            if let Some(entry) = inner.entries.get(id) {
                if entry.seq == *seq {
                    seen.push((id.clone(), entry.handle));
                }
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn registry(capacity: usize) -> IdentifierRegistry {
        IdentifierRegistry::new(RegistryConfig { capacity })
    }

    #[test]
    fn insert_and_remove_round_trip() {
        let reg = registry(10);
        assert!(reg.insert("a", PlatformHandle(1)).is_none());
        assert!(reg.contains("a"));
        assert_eq!(reg.remove("a"), Some(PlatformHandle(1)));
        assert!(!reg.contains("a"));
        assert_eq!(reg.remove("a"), None);
    }

    #[test]
    fn eviction_removes_strict_fifo_oldest() {
        let reg = registry(3);
        reg.insert("a", PlatformHandle(1));
        reg.insert("b", PlatformHandle(2));
        reg.insert("c", PlatformHandle(3));

        let evicted = reg.insert("d", PlatformHandle(4));
        assert_eq!(evicted, Some(("a".to_string(), PlatformHandle(1))));
        assert_eq!(reg.count(), 3);
        assert!(!reg.contains("a"));
        assert!(reg.contains("d"));
    }

    #[test]
    fn reinsert_moves_to_most_recent() {
        let reg = registry(3);
        reg.insert("a", PlatformHandle(1));
        reg.insert("b", PlatformHandle(2));
        reg.insert("c", PlatformHandle(3));

        // Refresh "a": it becomes the newest entry, so "b" is now oldest.
        assert!(reg.insert("a", PlatformHandle(9)).is_none());
        assert_eq!(reg.count(), 3);
        assert_eq!(reg.get("a"), Some(PlatformHandle(9)));

        let evicted = reg.insert("d", PlatformHandle(4));
        assert_eq!(evicted, Some(("b".to_string(), PlatformHandle(2))));
    }

    #[test]
    fn hundred_and_one_schedules_keep_count_at_hundred() {
        let reg = registry(100);
        for i in 0..101 {
            reg.insert(&format!("id-{i}"), PlatformHandle(i));
        }
        assert_eq!(reg.count(), 100);
        assert!(!reg.contains("id-0"));
        for i in 1..101 {
            assert!(reg.contains(&format!("id-{i}")), "id-{i} should survive");
        }
    }

    #[test]
    fn snapshot_preserves_insertion_order() {
        let reg = registry(10);
        reg.insert("a", PlatformHandle(1));
        reg.insert("b", PlatformHandle(2));
        reg.insert("a", PlatformHandle(3));
        let snap = reg.snapshot();
        assert_eq!(
            snap,
            vec![
                ("b".to_string(), PlatformHandle(2)),
                ("a".to_string(), PlatformHandle(3)),
            ]
        );
    }

    #[test]
    fn remove_many_takes_one_pass() {
        let reg = registry(10);
        reg.insert("a", PlatformHandle(1));
        reg.insert("b", PlatformHandle(2));
        reg.insert("c", PlatformHandle(3));
        let removed = reg.remove_many(["a", "c", "missing"]);
        assert_eq!(
            removed,
            vec![
                ("a".to_string(), PlatformHandle(1)),
                ("c".to_string(), PlatformHandle(3)),
            ]
        );
        assert_eq!(reg.count(), 1);
    }

    #[test]
    fn drain_all_returns_insertion_order() {
        let reg = registry(10);
        reg.insert("x", PlatformHandle(1));
        reg.insert("y", PlatformHandle(2));
        reg.insert("x", PlatformHandle(3));
        let drained = reg.drain_all();
        assert_eq!(
            drained,
            vec![
                ("y".to_string(), PlatformHandle(2)),
                ("x".to_string(), PlatformHandle(3)),
            ]
        );
        assert!(reg.is_empty());
    }

    #[test]
    fn stale_order_entries_are_compacted() {
        let reg = registry(4);
        // Repeatedly refresh the same identifiers; the order queue must not
        // grow without bound.
        for _ in 0..1000 {
            reg.insert("a", PlatformHandle(1));
            reg.insert("b", PlatformHandle(2));
        }
        let inner = reg.inner.read();
        assert!(inner.order.len() <= inner.entries.len() * 2 + 16);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any schedule sequence, the registry never exceeds capacity
        /// and the evicted entry is always the least-recently-inserted
        /// survivor.
        #[test]
        fn prop_capacity_and_fifo_eviction(
            ids in prop::collection::vec(0u8..20, 1..200),
            capacity in 1usize..8,
        ) {
            let reg = registry(capacity);
            // Model: insertion-ordered list of live ids.
            let mut model: Vec<String> = Vec::new();

            for (i, raw) in ids.iter().enumerate() {
                let id = format!("id-{raw}");
                let evicted = reg.insert(&id, PlatformHandle(i as i64));

                if let Some(pos) = model.iter().position(|m| *m == id) {
                    model.remove(pos);
                }
                if let Some((ref evicted_id, _)) = evicted {
                    prop_assert_eq!(model.first(), Some(evicted_id),
                        "eviction must hit the oldest survivor");
                    model.remove(0);
                }
                model.push(id);

                prop_assert!(reg.count() <= capacity);
                prop_assert_eq!(reg.count(), model.len());
            }

            let snap: Vec<String> = reg.snapshot().into_iter().map(|(id, _)| id).collect();
            prop_assert_eq!(snap, model);
        }
    }
}

//! Progressive-Resize Key Space
//!
//! This module implements the key space: a chained hash table that grows
//! without ever taking a single large rehash pause.
//!
//! ## Why two tables
//!
//! A plain hash table stops the world when it grows: every entry is
//! rehashed into the new bucket array in one call, and with millions of
//! keys that call is the latency spike clients remember. The key space
//! avoids it by keeping *two* bucket arrays during a resize:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        KeySpace                             │
//! │                                                             │
//! │   live (2x buckets)          draining (old buckets)         │
//! │  ┌──┬──┬──┬──┬──┬──┬──┐     ┌──┬──┬──┬──┐                  │
//! │  │  │  │  │  │  │  │  │ <── │▓▓│▓▓│  │  │  migrate cursor  │
//! │  └──┴──┴──┴──┴──┴──┴──┘     └──┴──┴──┴──┘       │          │
//! │        new inserts            ▓▓ = already moved ┘          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! When the load factor crosses the threshold, a bucket array twice the
//! size is allocated and the full one starts draining. Every subsequent
//! operation first moves one bucket's chain across, so the added latency
//! per call is one short chain, never the whole table. When the cursor
//! passes the last bucket the old array is dropped.
//!
//! ## Invariants
//!
//! - A key lives in exactly one of the two tables.
//! - The migrate cursor only advances; it resets only when the drain
//!   finishes and the old array is discarded.
//! - Bucket capacities are powers of two, so `hash & mask` selects a
//!   bucket.
//!
//! Lookups take `&mut self`: every external call, reads included, does
//! one unit of migration work.

use bytes::Bytes;
use std::hash::{DefaultHasher, Hash, Hasher};

/// Number of buckets in a fresh key space.
const INITIAL_BUCKETS: usize = 4;

/// Average chain length that triggers a resize.
const MAX_LOAD_FACTOR: usize = 8;

/// One stored key/value pair, chained per bucket.
struct Node {
    key: Bytes,
    value: Bytes,
    /// Hash of `key`, computed once at insert and reused on every
    /// migration and comparison.
    hash: u64,
    next: Option<Box<Node>>,
}

/// A single bucket array with power-of-two capacity.
struct Table {
    buckets: Vec<Option<Box<Node>>>,
    mask: u64,
    len: usize,
}

impl Table {
    fn with_buckets(n: usize) -> Self {
        debug_assert!(n.is_power_of_two());
        let mut buckets = Vec::with_capacity(n);
        buckets.resize_with(n, || None);
        Self {
            buckets,
            mask: (n - 1) as u64,
            len: 0,
        }
    }

    fn bucket_of(&self, hash: u64) -> usize {
        (hash & self.mask) as usize
    }

    /// Chains `node` at the head of its bucket.
    fn push(&mut self, mut node: Box<Node>) {
        let idx = self.bucket_of(node.hash);
        node.next = self.buckets[idx].take();
        self.buckets[idx] = Some(node);
        self.len += 1;
    }

    fn get(&self, hash: u64, key: &[u8]) -> Option<&Node> {
        let mut cur = self.buckets[self.bucket_of(hash)].as_deref();
        while let Some(node) = cur {
            // Compare bytes only after the cheap hash check passes.
            if node.hash == hash && node.key.as_ref() == key {
                return Some(node);
            }
            cur = node.next.as_deref();
        }
        None
    }

    fn get_mut(&mut self, hash: u64, key: &[u8]) -> Option<&mut Node> {
        let idx = self.bucket_of(hash);
        let mut cur = self.buckets[idx].as_deref_mut();
        while let Some(node) = cur {
            if node.hash == hash && node.key.as_ref() == key {
                return Some(node);
            }
            cur = node.next.as_deref_mut();
        }
        None
    }

    /// Detaches and returns the matching node, if present.
    fn take(&mut self, hash: u64, key: &[u8]) -> Option<Box<Node>> {
        let idx = self.bucket_of(hash);
        let taken = Self::take_from_chain(&mut self.buckets[idx], hash, key);
        if taken.is_some() {
            self.len -= 1;
        }
        taken
    }

    fn take_from_chain(
        chain: &mut Option<Box<Node>>,
        hash: u64,
        key: &[u8],
    ) -> Option<Box<Node>> {
        match chain {
            None => None,
            Some(node) if node.hash == hash && node.key.as_ref() == key => {
                let mut removed = chain.take();
                if let Some(node) = removed.as_mut() {
                    *chain = node.next.take();
                }
                removed
            }
            Some(node) => Self::take_from_chain(&mut node.next, hash, key),
        }
    }
}

/// The in-memory key space: all live entries, owned by the server.
pub struct KeySpace {
    /// Receives new inserts; during a resize this is the larger array.
    live: Table,
    /// The old, smaller array being emptied one bucket per call.
    draining: Option<Table>,
    /// Next bucket of `draining` to move.
    migrate_pos: usize,
}

impl KeySpace {
    /// Creates an empty key space.
    pub fn new() -> Self {
        Self {
            live: Table::with_buckets(INITIAL_BUCKETS),
            draining: None,
            migrate_pos: 0,
        }
    }

    /// Number of live entries across both tables.
    pub fn len(&self) -> usize {
        self.live.len + self.draining.as_ref().map_or(0, |t| t.len)
    }

    /// Returns true if no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true while a resize is still draining the old table.
    pub fn is_resizing(&self) -> bool {
        self.draining.is_some()
    }

    /// Looks up the value stored under `key`.
    ///
    /// Takes `&mut self` because a lookup, like every other call,
    /// advances an in-progress resize by one bucket.
    pub fn get(&mut self, key: &[u8]) -> Option<&Bytes> {
        self.migrate_step();
        let hash = hash_key(key);
        // A key is in exactly one table; check the newer one first.
        if let Some(node) = self.live.get(hash, key) {
            return Some(&node.value);
        }
        self.draining
            .as_ref()
            .and_then(|t| t.get(hash, key))
            .map(|n| &n.value)
    }

    /// Inserts or overwrites the value stored under `key`.
    pub fn insert(&mut self, key: Bytes, value: Bytes) {
        self.migrate_step();
        let hash = hash_key(&key);

        // Upsert in place wherever the key currently lives, so it never
        // occupies both tables at once.
        if let Some(node) = self.live.get_mut(hash, &key) {
            node.value = value;
            return;
        }
        if let Some(node) = self
            .draining
            .as_mut()
            .and_then(|t| t.get_mut(hash, &key))
        {
            node.value = value;
            return;
        }

        self.live.push(Box::new(Node {
            key,
            value,
            hash,
            next: None,
        }));
        self.maybe_start_resize();
    }

    /// Removes `key`, returning its value if it was present.
    pub fn remove(&mut self, key: &[u8]) -> Option<Bytes> {
        self.migrate_step();
        let hash = hash_key(key);
        let node = self
            .live
            .take(hash, key)
            .or_else(|| self.draining.as_mut().and_then(|t| t.take(hash, key)))?;
        Some(node.value)
    }

    /// Visits every live entry. Iteration order is unspecified.
    pub fn for_each(&self, mut visit: impl FnMut(&Bytes, &Bytes)) {
        if let Some(draining) = &self.draining {
            Self::visit_table(draining, &mut visit);
        }
        Self::visit_table(&self.live, &mut visit);
    }

    fn visit_table(table: &Table, visit: &mut impl FnMut(&Bytes, &Bytes)) {
        for bucket in &table.buckets {
            let mut cur = bucket.as_deref();
            while let Some(node) = cur {
                visit(&node.key, &node.value);
                cur = node.next.as_deref();
            }
        }
    }

    /// Moves one bucket's chain from the draining table into the live
    /// one. The cursor advances by exactly one bucket per call.
    fn migrate_step(&mut self) {
        let Some(draining) = self.draining.as_mut() else {
            return;
        };

        let mut chain = draining.buckets[self.migrate_pos].take();
        while let Some(mut node) = chain {
            chain = node.next.take();
            draining.len -= 1;
            self.live.push(node);
        }

        self.migrate_pos += 1;
        if self.migrate_pos == draining.buckets.len() {
            debug_assert_eq!(draining.len, 0);
            self.draining = None;
            self.migrate_pos = 0;
        }
    }

    fn maybe_start_resize(&mut self) {
        if self.draining.is_some() {
            return;
        }
        if self.live.len < self.live.buckets.len() * MAX_LOAD_FACTOR {
            return;
        }
        let grown = Table::with_buckets(self.live.buckets.len() * 2);
        self.draining = Some(std::mem::replace(&mut self.live, grown));
        self.migrate_pos = 0;
    }
}

impl Default for KeySpace {
    fn default() -> Self {
        Self::new()
    }
}

fn hash_key(key: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: usize) -> Bytes {
        Bytes::from(format!("key:{}", i))
    }

    fn value(i: usize) -> Bytes {
        Bytes::from(format!("value:{}", i))
    }

    #[test]
    fn test_get_missing() {
        let mut db = KeySpace::new();
        assert_eq!(db.get(b"nope"), None);
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn test_insert_and_get() {
        let mut db = KeySpace::new();
        db.insert(key(1), value(1));
        assert_eq!(db.get(&key(1)), Some(&value(1)));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_upsert_overwrites() {
        let mut db = KeySpace::new();
        db.insert(Bytes::from("k"), Bytes::from("v1"));
        db.insert(Bytes::from("k"), Bytes::from("v2"));
        assert_eq!(db.get(b"k"), Some(&Bytes::from("v2")));
        assert_eq!(db.len(), 1);
    }

    #[test]
    fn test_remove() {
        let mut db = KeySpace::new();
        db.insert(Bytes::from("k"), Bytes::from("v"));

        assert_eq!(db.remove(b"absent"), None);
        assert_eq!(db.len(), 1);

        assert_eq!(db.remove(b"k"), Some(Bytes::from("v")));
        assert_eq!(db.len(), 0);
        assert_eq!(db.get(b"k"), None);
    }

    #[test]
    fn test_all_keys_survive_resize() {
        let mut db = KeySpace::new();
        let n = 10_000;
        for i in 0..n {
            db.insert(key(i), value(i));
            // Everything inserted so far stays reachable mid-migration.
            if i % 97 == 0 {
                assert_eq!(db.get(&key(i / 2)), Some(&value(i / 2)));
            }
        }
        assert_eq!(db.len(), n);
        for i in 0..n {
            assert_eq!(db.get(&key(i)), Some(&value(i)), "key {} lost", i);
        }
    }

    #[test]
    fn test_resize_completes_within_bucket_count_ops() {
        let mut db = KeySpace::new();
        let mut i = 0;
        while !db.is_resizing() {
            db.insert(key(i), value(i));
            i += 1;
        }
        // The old table has at most as many buckets as the live one, and
        // each lookup drains one bucket.
        let bound = 2 * (db.live.buckets.len());
        for _ in 0..bound {
            db.get(b"whatever");
        }
        assert!(!db.is_resizing());
    }

    #[test]
    fn test_upsert_of_draining_key_stays_unique() {
        let mut db = KeySpace::new();
        let mut i = 0;
        while !db.is_resizing() {
            db.insert(key(i), value(i));
            i += 1;
        }
        // Overwrite every key while the resize is still in flight; the
        // count must not grow.
        let n = i;
        for j in 0..n {
            db.insert(key(j), Bytes::from("fresh"));
        }
        assert_eq!(db.len(), n);
        for j in 0..n {
            assert_eq!(db.get(&key(j)), Some(&Bytes::from("fresh")));
        }
    }

    #[test]
    fn test_remove_during_resize() {
        let mut db = KeySpace::new();
        let mut i = 0;
        while !db.is_resizing() {
            db.insert(key(i), value(i));
            i += 1;
        }
        let n = i;
        for j in 0..n {
            assert_eq!(db.remove(&key(j)), Some(value(j)));
        }
        assert_eq!(db.len(), 0);
    }

    #[test]
    fn test_for_each_sees_exactly_the_live_keys() {
        let mut db = KeySpace::new();
        for i in 0..100 {
            db.insert(key(i), value(i));
        }
        for i in 0..50 {
            db.remove(&key(i));
        }

        let mut seen: Vec<Bytes> = Vec::new();
        db.for_each(|k, _| seen.push(k.clone()));
        seen.sort();

        let mut expected: Vec<Bytes> = (50..100).map(key).collect();
        expected.sort();
        assert_eq!(seen, expected);
        assert_eq!(db.len(), 50);
    }

    #[test]
    fn test_empty_and_binary_keys() {
        let mut db = KeySpace::new();
        db.insert(Bytes::new(), Bytes::from("empty"));
        db.insert(Bytes::from(&b"a\x00b"[..]), Bytes::from("nul"));

        assert_eq!(db.get(b""), Some(&Bytes::from("empty")));
        assert_eq!(db.get(b"a\x00b"), Some(&Bytes::from("nul")));
        assert_eq!(db.get(b"ab"), None);
    }
}

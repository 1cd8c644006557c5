/*!
The per-segment concurrent associative table.
*/

use crate::entry::Entry;
use dashmap::mapref::entry::Entry as DEntry;
use dashmap::DashMap;
use std::hash::Hash;

/// A shard's key space is the user's key space plus one reserved
/// [`Sentinel`](ShardKey::Sentinel) value, distinguishable from any user
/// key, used as the per-shard purge lock (spec §3, §4.4).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ShardKey<K> {
    User(K),
    /// The reserved `(dcache, purging)` sentinel.
    Sentinel,
}

impl<K> ShardKey<K> {
    fn user(key: K) -> Self {
        ShardKey::User(key)
    }
}

/// What lives behind a [`ShardKey`] in the shard's table.
///
/// Keeping the sentinel out of `Entry<K, V>` itself means the purge lock
/// never needs a placeholder key/value for types that aren't `Default` --
/// the reserved slot simply isn't an `Entry` at all.
enum Slot<K, V> {
    Occupied(Entry<K, V>),
    Sentinel,
}

/// One of the `N` independent, concurrently-accessed associative tables
/// that partition a cache.
///
/// Backed by [`dashmap::DashMap`], which provides the atomic per-key
/// insert/lookup/delete and snapshot iteration this type relies on for
/// per-key-linearizable concurrent access without a single whole-shard
/// lock.
pub struct Shard<K, V> {
    name: String,
    table: DashMap<ShardKey<K>, Slot<K, V>>,
}

impl<K, V> Shard<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub(crate) fn new(name: String) -> Self {
        Shard {
            name,
            table: DashMap::new(),
        }
    }

    /// This shard's name, derived as `"<cache_name><index>"`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of entries in this shard, including the purge sentinel (if
    /// present) and expired-but-not-yet-reaped entries.
    pub fn count(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn get(&self, key: &K) -> Option<Entry<K, V>> {
        match self.table.get(&ShardKey::user(key.clone()))?.value() {
            Slot::Occupied(entry) => Some(entry.clone()),
            Slot::Sentinel => None,
        }
    }

    pub(crate) fn remove(&self, key: &K) -> Option<Entry<K, V>> {
        match self.table.remove(&ShardKey::user(key.clone()))?.1 {
            Slot::Occupied(entry) => Some(entry),
            Slot::Sentinel => None,
        }
    }

    /// Unconditional insert/replace. Returns `true` if this replaced an
    /// existing entry (so the caller knows the shard did not grow).
    pub(crate) fn set(&self, key: K, entry: Entry<K, V>) -> bool {
        matches!(
            self.table.insert(ShardKey::user(key), Slot::Occupied(entry)),
            Some(Slot::Occupied(_))
        )
    }

    /// Insert-if-absent. Returns `true` if the key was newly inserted.
    pub(crate) fn insert_if_absent(&self, key: K, entry: Entry<K, V>) -> bool {
        match self.table.entry(ShardKey::user(key)) {
            DEntry::Occupied(_) => false,
            DEntry::Vacant(vacant) => {
                vacant.insert(Slot::Occupied(entry));
                true
            }
        }
    }

    pub(crate) fn try_acquire_sentinel(&self) -> bool {
        match self.table.entry(ShardKey::Sentinel) {
            DEntry::Occupied(_) => false,
            DEntry::Vacant(vacant) => {
                vacant.insert(Slot::Sentinel);
                true
            }
        }
    }

    pub(crate) fn release_sentinel(&self) {
        self.table.remove(&ShardKey::Sentinel);
    }

    /// Snapshot the user keys currently in the shard, skipping the
    /// sentinel. Used by the purgers, which collect-then-delete rather
    /// than deleting while iterating, since `DashMap` offers no iterator
    /// pinning against concurrent structural change.
    pub(crate) fn snapshot_user_keys(&self) -> Vec<K> {
        self.table
            .iter()
            .filter_map(|kv| match kv.key() {
                ShardKey::User(k) => Some(k.clone()),
                ShardKey::Sentinel => None,
            })
            .collect()
    }

    /// Snapshot `(key, expiry)` pairs, skipping the sentinel.
    pub(crate) fn snapshot_user_expiries(&self) -> Vec<(K, i64)> {
        self.table
            .iter()
            .filter_map(|kv| match kv.value() {
                Slot::Occupied(entry) => Some((entry.key().clone(), entry.expiry())),
                Slot::Sentinel => None,
            })
            .collect()
    }

    pub(crate) fn delete_many(&self, keys: &[K]) -> usize {
        let mut removed = 0;
        for k in keys {
            if self.table.remove(&ShardKey::user(k.clone())).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub(crate) fn clear(&self) {
        self.table.clear();
    }
}

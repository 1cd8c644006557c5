/*!
The cache core: routes every operation to a shard, then performs a point
operation on it, checking occupancy and maybe purging on write paths.
*/

use crate::clock::Clock;
use crate::entry::{self, Entry};
use crate::error::{CacheBuildError, CacheError};
use crate::purge::{PurgeContext, Purger};
use crate::router::Router;
use crate::shard::Shard;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Below this `max_total`, `CacheBuilder` falls back to tiered defaults
/// for `segments` (spec §4.5).
fn default_segments(max_total: usize) -> usize {
    if max_total >= 10_000 {
        100
    } else if max_total >= 100 {
        10
    } else if max_total >= 10 {
        3
    } else {
        1
    }
}

/// The four shapes a [`Cache::fetch`] producer may return (spec §4.3's
/// producer-result table).
pub enum ProduceOutcome<V, E> {
    /// Insert `value` using the `ttl_seconds` the caller passed to `fetch`.
    Insert(V),
    /// Insert `value`, overriding the call-site ttl.
    InsertWithTtl(V, i64),
    /// Do not insert; hand the bare value back to the caller.
    Skip(V),
    /// Do not insert; propagate the error to the caller.
    Error(E),
}

/// What [`Cache::fetch`] returns. `Ok` covers both a cache hit and a
/// producer-inserted value (the spec's table collapses those into the
/// same `{ok, v}` shape); `Bare` is the producer's `{skip, v}`; `Err` is
/// the producer's `{error, e}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fetched<V, E> {
    Ok(V),
    Bare(V),
    Err(E),
}

impl<V, E> Fetched<V, E> {
    /// Unwrap `Ok`/`Bare` to their inner value; panic carrying `e` for
    /// `Err`. This is the `fetch!` behavior from spec §4.3.
    pub fn unwrap_or_fault(self) -> V
    where
        E: fmt::Debug,
    {
        match self {
            Fetched::Ok(v) | Fetched::Bare(v) => v,
            Fetched::Err(e) => panic!("fetch producer returned an error: {:?}", e),
        }
    }
}

/// A point-in-time snapshot of a cache's occupancy, for callers to feed
/// to their own logger or metrics system rather than the library logging
/// on their behalf.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheStats {
    pub segments: usize,
    pub max_per_segment: usize,
    pub size: usize,
}

struct CacheInner<K, V> {
    name: String,
    segments: Vec<Arc<Shard<K, V>>>,
    max_per_segment: usize,
    purger: Purger<K, V>,
    router: Router,
    clock: Clock,
    destroyed: AtomicBool,
}

/// A sharded, size-bounded, in-process key/value cache with per-entry TTL
/// and a pluggable purger.
///
/// Cheap to clone (an `Arc` bump); clones share the same shards, so the
/// static binding surface is just holding one of these (e.g. behind a
/// `once_cell::sync::Lazy` static, see [`crate::static_cache`]) rather
/// than looking a cache up by name on every call.
pub struct Cache<K, V> {
    inner: Arc<CacheInner<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
    fn clone(&self) -> Self {
        Cache {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Builder for [`Cache`]: a chain of `set_x(mut self, x) -> Self` calls
/// ending in `build()`.
pub struct CacheBuilder<K, V> {
    name: String,
    segments: Option<usize>,
    max_total: Option<usize>,
    purger: Purger<K, V>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Start building a cache named `name`. Names are used to derive
    /// shard names (`"<name>0"`, `"<name>1"`, ...) and appear in error
    /// messages for destroyed-cache misuse.
    pub fn new<S: Into<String>>(name: S) -> Self {
        CacheBuilder {
            name: name.into(),
            segments: None,
            max_total: None,
            purger: Purger::default(),
        }
    }

    /// Total entry budget across all shards. `max_per_segment` is derived
    /// as `max_total / segments`.
    pub fn max_total(mut self, max_total: usize) -> Self {
        self.max_total = Some(max_total);
        self
    }

    /// Explicit shard count, overriding the tiered default (spec §4.5).
    pub fn segments(mut self, segments: usize) -> Self {
        self.segments = Some(segments);
        self
    }

    /// Select the purge strategy (spec §4.4). Defaults to `Purger::Fast`.
    pub fn purger(mut self, purger: Purger<K, V>) -> Self {
        self.purger = purger;
        self
    }

    pub fn build(self) -> Result<Cache<K, V>, CacheBuildError> {
        let max_total = self.max_total.ok_or(CacheBuildError::MissingMaxTotal)?;
        if max_total == 0 {
            return Err(CacheBuildError::ZeroCapacity);
        }
        let segment_count = self.segments.unwrap_or_else(|| default_segments(max_total));
        if segment_count == 0 {
            return Err(CacheBuildError::ZeroSegments);
        }
        let max_per_segment = (max_total / segment_count).max(1);
        let segments = (0..segment_count)
            .map(|i| Arc::new(Shard::new(format!("{}{}", self.name, i))))
            .collect();
        Ok(Cache {
            inner: Arc::new(CacheInner {
                name: self.name,
                segments,
                max_per_segment,
                purger: self.purger,
                router: Router::new(segment_count),
                clock: Clock,
                destroyed: AtomicBool::new(false),
            }),
        })
    }
}

impl<K, V> Cache<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Number of shards.
    pub fn segment_count(&self) -> usize {
        self.inner.segments.len()
    }

    /// The soft per-shard occupancy bound.
    pub fn max_per_segment(&self) -> usize {
        self.inner.max_per_segment
    }

    fn assert_alive(&self) -> Result<(), CacheError> {
        if self.inner.destroyed.load(Ordering::SeqCst) {
            Err(CacheError::Destroyed {
                cache: self.inner.name.clone(),
            })
        } else {
            Ok(())
        }
    }

    fn route(&self, key: &K) -> &Arc<Shard<K, V>> {
        let idx = self.inner.router.route(key);
        &self.inner.segments[idx]
    }

    /// Look up `key`. Absent or expired both return `None`; an observed
    /// expired entry is deleted before returning (spec §4.3 `get`, the
    /// only mechanism that evicts one specific expired key outside of a
    /// capacity-triggered purge).
    pub fn get(&self, key: &K) -> Result<Option<V>, CacheError> {
        self.assert_alive()?;
        let shard = self.route(key);
        match shard.get(key) {
            None => Ok(None),
            Some(entry) => {
                let now = self.inner.clock.now();
                if entry.is_expired(now) {
                    shard.remove(key);
                    Ok(None)
                } else {
                    Ok(Some(entry.into_value()))
                }
            }
        }
    }

    /// Look up `key` and return the raw entry regardless of expiry;
    /// never deletes (spec §4.3 `entry`).
    pub fn entry(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError> {
        self.assert_alive()?;
        Ok(self.route(key).get(key))
    }

    /// `expiry - now` for `key`; may be negative; `None` if absent. Does
    /// not delete expired entries (spec §4.3 `ttl`).
    pub fn ttl(&self, key: &K) -> Result<Option<i64>, CacheError> {
        let now = self.inner.clock.now();
        let raw = self.entry(key)?;
        Ok(entry::ttl(&raw, now))
    }

    /// Insert or replace `key` with `value`, expiring `ttl_seconds` from
    /// now. A replace never triggers a purge (the shard did not grow); a
    /// new key does, if occupancy now exceeds `max_per_segment` (spec §4.3
    /// `put`).
    pub fn put(&self, key: K, value: V, ttl_seconds: i64) -> Result<(), CacheError> {
        self.assert_alive()?;
        let now = self.inner.clock.now();
        let expiry = now + ttl_seconds;
        let shard = self.route(&key);
        let entry = Entry::new(key.clone(), value, expiry);
        let inserted = shard.insert_if_absent(key.clone(), entry.clone());
        if inserted {
            if shard.count() > self.inner.max_per_segment {
                self.inner.purger.run(PurgeContext {
                    shard,
                    max_per_segment: self.inner.max_per_segment,
                    clock: &self.inner.clock,
                    triggering_key: key,
                    triggering_entry: entry,
                });
            }
        } else {
            shard.set(key, entry);
        }
        Ok(())
    }

    /// Delete `key`. Always succeeds, regardless of presence (spec §4.3
    /// `del`).
    pub fn del(&self, key: &K) -> Result<(), CacheError> {
        self.assert_alive()?;
        self.route(key).remove(key);
        Ok(())
    }

    /// Atomically delete-and-return `key`, any expiry (spec §4.3 `take`).
    pub fn take(&self, key: &K) -> Result<Option<Entry<K, V>>, CacheError> {
        self.assert_alive()?;
        Ok(self.route(key).remove(key))
    }

    /// Fetch-or-compute. On a hit, returns `Fetched::Ok` immediately. On a
    /// miss, invokes `producer` and applies spec §4.3's four-shape
    /// result table.
    ///
    /// No deduplication of concurrent misses on the same key is performed
    /// (spec §9 Open Question, kept as the source behaves): multiple
    /// producers may run for the same key concurrently, and the last
    /// `put` wins, which falls out of the shard's own per-key
    /// linearizability with no extra bookkeeping needed here.
    pub fn fetch<F, E>(
        &self,
        key: K,
        ttl_seconds: i64,
        producer: F,
    ) -> Result<Fetched<V, E>, CacheError>
    where
        F: FnOnce(&K) -> ProduceOutcome<V, E>,
    {
        self.assert_alive()?;
        if let Some(v) = self.get(&key)? {
            return Ok(Fetched::Ok(v));
        }
        match producer(&key) {
            ProduceOutcome::Insert(v) => {
                self.put(key, v.clone(), ttl_seconds)?;
                Ok(Fetched::Ok(v))
            }
            ProduceOutcome::InsertWithTtl(v, ttl) => {
                self.put(key, v.clone(), ttl)?;
                Ok(Fetched::Ok(v))
            }
            ProduceOutcome::Skip(v) => Ok(Fetched::Bare(v)),
            ProduceOutcome::Error(e) => Ok(Fetched::Err(e)),
        }
    }

    /// `fetch`, unwrapped: `Ok`/`Bare` become the value, a destroyed-cache
    /// error or a producer `Error` both become a panic carrying the
    /// fault (spec §4.3 `fetch!`).
    pub fn fetch_unwrap<F, E>(&self, key: K, ttl_seconds: i64, producer: F) -> V
    where
        F: FnOnce(&K) -> ProduceOutcome<V, E>,
        E: fmt::Debug,
    {
        match self.fetch(key, ttl_seconds, producer) {
            Ok(outcome) => outcome.unwrap_or_fault(),
            Err(e) => panic!("{}", e),
        }
    }

    /// Sum of per-shard counts. O(N); not atomic across shards; includes
    /// expired entries and the purge sentinel when present (spec §4.3
    /// `size`).
    pub fn size(&self) -> Result<usize, CacheError> {
        self.assert_alive()?;
        Ok(self.inner.segments.iter().map(|s| s.count()).sum())
    }

    /// A snapshot of current occupancy, for callers to log or export as a
    /// metric themselves; the library never logs this on its own.
    pub fn stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats {
            segments: self.inner.segments.len(),
            max_per_segment: self.inner.max_per_segment,
            size: self.size()?,
        })
    }

    /// Empty every shard; the cache itself remains usable (spec §4.3
    /// `clear`).
    pub fn clear(&self) -> Result<(), CacheError> {
        self.assert_alive()?;
        for shard in &self.inner.segments {
            shard.clear();
        }
        Ok(())
    }

    /// Deallocate every shard. Every subsequent operation on this handle
    /// (and any clone of it) fails with [`CacheError::Destroyed`] (spec
    /// §4.3 `destroy`).
    pub fn destroy(&self) -> Result<(), CacheError> {
        self.assert_alive()?;
        self.inner.destroyed.store(true, Ordering::SeqCst);
        for shard in &self.inner.segments {
            shard.clear();
        }
        Ok(())
    }

    /// Escape hatch: fold over the shard handles themselves (not their
    /// contents). Callers that use this are expected to know the raw
    /// storage contract, including the purge sentinel's presence (spec
    /// §4.3 `iterate`).
    pub fn iterate<Acc, F>(&self, init: Acc, mut f: F) -> Result<Acc, CacheError>
    where
        F: FnMut(Acc, &Arc<Shard<K, V>>) -> Acc,
    {
        self.assert_alive()?;
        let mut acc = init;
        for shard in &self.inner.segments {
            acc = f(acc, shard);
        }
        Ok(acc)
    }

    /// `iterate` without an accumulator (spec §4.3 `for_each`).
    pub fn for_each<F>(&self, mut f: F) -> Result<(), CacheError>
    where
        F: FnMut(&Arc<Shard<K, V>>),
    {
        self.assert_alive()?;
        for shard in &self.inner.segments {
            f(shard);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::purge::Purger;

    fn no_spawn_cache(max_total: usize, segments: usize) -> Cache<String, i32> {
        CacheBuilder::new("t")
            .max_total(max_total)
            .segments(segments)
            .purger(Purger::FastNoSpawn)
            .build()
            .unwrap()
    }

    #[test]
    fn basic_round_trip() {
        let c = no_spawn_cache(100, 1);
        assert_eq!(c.get(&"k".to_string()).unwrap(), None);
        assert_eq!(c.ttl(&"k".to_string()).unwrap(), None);

        c.put("k".to_string(), 1, 10).unwrap();
        assert_eq!(c.get(&"k".to_string()).unwrap(), Some(1));
        let ttl = c.ttl(&"k".to_string()).unwrap().unwrap();
        assert!((9..=10).contains(&ttl));

        c.put("k".to_string(), 2, 12).unwrap();
        assert_eq!(c.get(&"k".to_string()).unwrap(), Some(2));

        c.put("stale".to_string(), 3, -10).unwrap();
        assert_eq!(c.ttl(&"stale".to_string()).unwrap(), Some(-10));
        assert_eq!(c.get(&"stale".to_string()).unwrap(), None);
        assert_eq!(c.ttl(&"stale".to_string()).unwrap(), None);
    }

    #[test]
    fn replace_does_not_grow_shard() {
        let c = no_spawn_cache(100, 1);
        c.put("k".to_string(), 1, 10).unwrap();
        c.put("k".to_string(), 2, 10).unwrap();
        assert_eq!(c.size().unwrap(), 1);
    }

    #[test]
    fn take_then_get_is_null() {
        let c = no_spawn_cache(100, 1);
        c.put("k".to_string(), 1, 10).unwrap();
        let taken = c.take(&"k".to_string()).unwrap().unwrap();
        assert_eq!(taken.value(), &1);
        assert_eq!(c.get(&"k".to_string()).unwrap(), None);
    }

    #[test]
    fn del_then_get_is_null_regardless_of_ttl() {
        let c = no_spawn_cache(100, 1);
        c.put("k".to_string(), 1, 10).unwrap();
        c.del(&"k".to_string()).unwrap();
        assert_eq!(c.get(&"k".to_string()).unwrap(), None);
    }

    #[test]
    fn fetch_hit_miss_skip_error_and_ttl_override() {
        let c = no_spawn_cache(100, 1);
        c.put("f".to_string(), 4, 10).unwrap();
        assert_eq!(
            c.fetch("f".to_string(), 100, |_| ProduceOutcome::<i32, String>::Insert(999))
                .unwrap(),
            Fetched::Ok(4)
        );

        c.put("f".to_string(), 5, -10).unwrap();
        let v = c
            .fetch("f".to_string(), 100, |k: &String| {
                ProduceOutcome::<String, String>::Insert(format!("{k}x"))
            })
            .unwrap()
            .unwrap_or_fault();
        assert_eq!(v, "fx");

        let c2 = no_spawn_cache(100, 1);
        let skip = c2
            .fetch("f2".to_string(), 100, |_| {
                ProduceOutcome::<&'static str, String>::Skip("np")
            })
            .unwrap();
        assert_eq!(skip, Fetched::Bare("np"));
        assert_eq!(c2.get(&"f2".to_string()).unwrap(), None);

        let err = c2
            .fetch("f3".to_string(), 100, |_| {
                ProduceOutcome::<&'static str, &'static str>::Error("np2")
            })
            .unwrap();
        assert_eq!(err, Fetched::Err("np2"));
        assert_eq!(c2.get(&"f3".to_string()).unwrap(), None);

        let with_ttl = c2
            .fetch("f4".to_string(), 1, |_| {
                ProduceOutcome::<&'static str, String>::InsertWithTtl("v", 5)
            })
            .unwrap();
        assert_eq!(with_ttl, Fetched::Ok("v"));
        let ttl = c2.ttl(&"f4".to_string()).unwrap().unwrap();
        assert!((4..=5).contains(&ttl));
    }

    #[test]
    #[should_panic(expected = "fetch producer returned an error")]
    fn fetch_unwrap_panics_on_error() {
        let c = no_spawn_cache(100, 1);
        c.fetch_unwrap("fail".to_string(), 10, |_| {
            ProduceOutcome::<&'static str, &'static str>::Error("x")
        });
    }

    #[test]
    fn stats_snapshot_reflects_occupancy() {
        let c = no_spawn_cache(100, 4);
        c.put("a".to_string(), 1, 10).unwrap();
        c.put("b".to_string(), 2, 10).unwrap();
        let stats = c.stats().unwrap();
        assert_eq!(stats.segments, 4);
        assert_eq!(stats.max_per_segment, 25);
        assert_eq!(stats.size, 2);
    }

    #[test]
    fn destroy_fails_all_subsequent_ops() {
        let c = no_spawn_cache(100, 1);
        c.put("k".to_string(), 1, 10).unwrap();
        c.destroy().unwrap();
        assert!(matches!(
            c.get(&"k".to_string()),
            Err(CacheError::Destroyed { .. })
        ));
        assert!(matches!(c.put("k".to_string(), 1, 10), Err(CacheError::Destroyed { .. })));
        assert!(matches!(c.destroy(), Err(CacheError::Destroyed { .. })));
    }

    #[test]
    fn none_purger_allows_unbounded_growth() {
        let c: Cache<i32, i32> = CacheBuilder::new("t")
            .max_total(10)
            .segments(2)
            .purger(Purger::None)
            .build()
            .unwrap();
        for i in 0..100 {
            c.put(i, i, 10).unwrap();
        }
        assert_eq!(c.size().unwrap(), 100);
        for i in 0..100 {
            assert_eq!(c.get(&i).unwrap(), Some(i));
        }
    }

    #[test]
    fn fast_no_spawn_purger_keeps_shard_near_bound() {
        let c: Cache<i32, i32> = CacheBuilder::new("t")
            .max_total(100)
            .segments(1)
            .purger(Purger::FastNoSpawn)
            .build()
            .unwrap();
        for i in 0..1000 {
            c.put(i, i, 100).unwrap();
        }
        assert!(c.size().unwrap() <= 100 + 1);
    }

    #[test]
    fn expired_no_spawn_never_evicts_live_entries() {
        let c: Cache<i32, i32> = CacheBuilder::new("t")
            .max_total(1000)
            .segments(5)
            .purger(Purger::ExpiredNoSpawn)
            .build()
            .unwrap();
        for i in 0..1000 {
            let ttl = if i % 2 == 0 { 1000 } else { -10 };
            c.put(i, i, ttl).unwrap();
        }
        assert!(c.size().unwrap() < 900);
        for i in (0..1000).step_by(2) {
            assert_eq!(c.get(&i).unwrap(), Some(i));
        }
    }
}

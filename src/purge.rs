/*!
The purger family: strategy (what to remove) crossed with execution
(where the work runs).
*/

use crate::clock::Clock;
use crate::entry::Entry;
use crate::shard::Shard;
use std::hash::Hash;
use std::sync::Arc;

/// Lower bound of the fast-scan removal target.
const FAST_SCAN_MIN: usize = 10;
/// Upper bound of the fast-scan removal target.
const FAST_SCAN_MAX: usize = 1000;
/// Below this `max_per_segment`, an expired-first purge degrades to a
/// clear-all rather than paying for a scan (spec §4.4 "Tiny-shard
/// shortcut").
const TINY_SHARD_THRESHOLD: usize = 100;

/// A purger is selected at cache construction and identified by a tag or
/// a callable. See spec §4.4 for the full strategy/execution matrix.
pub enum Purger<K, V> {
    /// Fast strategy, dispatched on a detached thread.
    Fast,
    /// Fast strategy, run in-line.
    FastNoSpawn,
    /// Expired-first strategy, dispatched on a detached thread.
    Expired,
    /// Expired-first strategy, run in-line.
    ExpiredNoSpawn,
    /// Clear-all-then-reinsert, always in-line.
    Blocking,
    /// No-op; the shard is allowed to exceed its bound.
    None,
    /// Caller-supplied eviction policy; no sentinel is acquired for it.
    Custom(Arc<dyn Fn(&Shard<K, V>) + Send + Sync>),
}

/// `fast`/`expired` are commonly grouped as "the default" purger; `Fast`
/// is that default here (spec §4.4, §6's "purger" option default).
impl<K, V> Default for Purger<K, V> {
    fn default() -> Self {
        Purger::Fast
    }
}

impl<K, V> Clone for Purger<K, V> {
    fn clone(&self) -> Self {
        match self {
            Purger::Fast => Purger::Fast,
            Purger::FastNoSpawn => Purger::FastNoSpawn,
            Purger::Expired => Purger::Expired,
            Purger::ExpiredNoSpawn => Purger::ExpiredNoSpawn,
            Purger::Blocking => Purger::Blocking,
            Purger::None => Purger::None,
            Purger::Custom(f) => Purger::Custom(Arc::clone(f)),
        }
    }
}

/// Computes the fast-scan removal target: `clamp(max_per_segment * 0.05,
/// 10, 1000)` (spec §4.4).
fn fast_scan_target(max_per_segment: usize) -> usize {
    let raw = (max_per_segment as f64 * 0.05) as usize;
    raw.clamp(FAST_SCAN_MIN, FAST_SCAN_MAX)
}

/// Drop entries in (snapshot) iteration order until `target` have been
/// removed or the shard is exhausted. Never considers expiry.
fn fast_scan<K, V>(shard: &Shard<K, V>, max_per_segment: usize)
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    let target = fast_scan_target(max_per_segment);
    let candidates = shard.snapshot_user_keys();
    let victims: Vec<K> = candidates.into_iter().take(target).collect();
    shard.delete_many(&victims);
}

/// Delete every entry whose expiry has passed; if nothing was removed,
/// fall back to `fast_scan`. Below `TINY_SHARD_THRESHOLD`, skip the scan
/// entirely and clear the shard (spec §4.4 "Tiny-shard shortcut"). This
/// applies to the expired-first strategy only.
fn expired_first<K, V>(shard: &Shard<K, V>, max_per_segment: usize, clock: &Clock)
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    if max_per_segment < TINY_SHARD_THRESHOLD {
        shard.clear();
        return;
    }
    let now = clock.now();
    let expired: Vec<K> = shard
        .snapshot_user_expiries()
        .into_iter()
        .filter(|(_, expiry)| *expiry < now)
        .map(|(k, _)| k)
        .collect();
    let purged = shard.delete_many(&expired);
    if purged == 0 {
        fast_scan(shard, max_per_segment);
    }
}

/// Clear the shard entirely, then reinsert the entry that triggered the
/// purge. Blocks all shard operations for the duration (inherited from
/// `DashMap::clear`'s exclusive locking of every internal bucket).
fn blocking<K, V>(shard: &Shard<K, V>, triggering_key: K, triggering_entry: Entry<K, V>)
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    shard.clear();
    shard.set(triggering_key, triggering_entry);
}

/// What a `put` needs to hand a purger when it triggers one: the shard
/// (behind the same `Arc` the cache holds it in, so a spawn purger can
/// take a clone that outlives the triggering call), the bound, the
/// clock, and -- for `Blocking` -- the entry that tipped the shard over
/// its bound.
pub(crate) struct PurgeContext<'a, K, V> {
    pub shard: &'a Arc<Shard<K, V>>,
    pub max_per_segment: usize,
    pub clock: &'a Clock,
    pub triggering_key: K,
    pub triggering_entry: Entry<K, V>,
}

impl<K, V> Purger<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Run this purger for a shard that just tipped over its bound.
    ///
    /// For `Fast`/`Expired` the sentinel is the coordination point: if
    /// another purge is already in flight on this shard, this call
    /// returns immediately without doing anything (spec §4.4 "Purge
    /// sentinel"). `Blocking`/`None`/`Custom` never acquire the sentinel.
    pub(crate) fn run(&self, ctx: PurgeContext<'_, K, V>) {
        match self {
            Purger::Fast => {
                Self::spawn_guarded(ctx.shard, ctx.max_per_segment, move |shard, max| {
                    fast_scan(shard.as_ref(), max);
                })
            }
            Purger::FastNoSpawn => {
                Self::inline_guarded(ctx.shard, ctx.max_per_segment, |shard, max| {
                    fast_scan(shard, max);
                })
            }
            Purger::Expired => {
                let clock = *ctx.clock;
                Self::spawn_guarded(ctx.shard, ctx.max_per_segment, move |shard, max| {
                    expired_first(shard.as_ref(), max, &clock);
                })
            }
            Purger::ExpiredNoSpawn => {
                Self::inline_guarded(ctx.shard, ctx.max_per_segment, |shard, max| {
                    expired_first(shard, max, ctx.clock);
                })
            }
            Purger::Blocking => {
                blocking(ctx.shard.as_ref(), ctx.triggering_key, ctx.triggering_entry);
            }
            Purger::None => {}
            Purger::Custom(f) => {
                f(ctx.shard.as_ref());
            }
        }
    }

    /// Acquire the sentinel, run `work` on a detached thread, release the
    /// sentinel in the spawned task's `finally` position. If the sentinel
    /// is already held, another purge is in flight; return immediately.
    /// If the thread fails to spawn, release the sentinel ourselves
    /// before returning (spec §9 open question: "if the spawn fails, the
    /// sentinel would persist ... should release the sentinel on
    /// dispatch failure").
    fn spawn_guarded<F>(shard: &Arc<Shard<K, V>>, max_per_segment: usize, work: F)
    where
        F: FnOnce(&Arc<Shard<K, V>>, usize) + Send + 'static,
    {
        if !shard.try_acquire_sentinel() {
            return;
        }
        let shard_for_thread = Arc::clone(shard);
        let spawned = std::thread::Builder::new()
            .name("shardcache-purge".into())
            .spawn(move || {
                work(&shard_for_thread, max_per_segment);
                shard_for_thread.release_sentinel();
            });
        if spawned.is_err() {
            // The sentinel was acquired but the thread never started, so
            // its `finally`-position release never runs; release it here
            // instead. The triggering `put` is already logically complete
            // at this point, so this can't corrupt its return value.
            shard.release_sentinel();
        }
    }

    fn inline_guarded<F>(shard: &Shard<K, V>, max_per_segment: usize, work: F)
    where
        F: FnOnce(&Shard<K, V>, usize),
    {
        if !shard.try_acquire_sentinel() {
            return;
        }
        work(shard, max_per_segment);
        shard.release_sentinel();
    }
}

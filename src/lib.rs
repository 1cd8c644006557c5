/*!
A sharded, size-bounded, in-process key/value cache with per-entry TTL
and a pluggable purger.

A [`Cache`] partitions its key space across `N` independent shards (see
[`router`], [`shard`]), each an independently-locking concurrent table.
Every entry carries its own expiry (see [`entry`], [`clock`]); expired
entries are reaped either lazily, on [`Cache::get`], or proactively by
whichever [`purge::Purger`] the cache was built with, whenever a shard's
occupancy tips over its bound.

# Example

```
use shardcache::{Cache, CacheBuilder};

let cache: Cache<String, i32> = CacheBuilder::new("example")
    .max_total(10_000)
    .build()
    .expect("valid cache config");

cache.put("a".to_string(), 1, 60).unwrap();
assert_eq!(cache.get(&"a".to_string()).unwrap(), Some(1));
```

Two binding surfaces are supported: holding a [`Cache`] handle directly
(e.g. behind a [`static_cache!`] static), or registering one by name in
the process-wide [`registry`] and looking it up at call time.
*/

pub mod cache;
pub mod clock;
pub mod entry;
pub mod error;
pub mod purge;
pub mod registry;
pub mod router;
pub mod shard;

#[macro_use]
mod macros;

pub use cache::{Cache, CacheBuilder, CacheStats, Fetched, ProduceOutcome};
pub use clock::Clock;
pub use entry::Entry;
pub use error::{CacheBuildError, CacheError};
pub use purge::Purger;
pub use registry::{destroy_dynamic, dynamic, lookup_dynamic, setup_dynamic};
pub use router::Router;
pub use shard::Shard;

/// Support items referenced by macro expansions (`static_cache!`). Not
/// part of the public API; the re-export exists only so the macro can
/// name `$crate::__macro_support::Lazy` from a downstream crate.
#[doc(hidden)]
pub mod __macro_support {
    pub use once_cell::sync::Lazy;
}

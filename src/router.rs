/*!
Maps a user key to a shard index via a stable, non-cryptographic hash.
*/

use ahash::RandomState;
use std::hash::{BuildHasher, Hash};

/// Routes keys to one of `N` shards via a stable, well-distributed,
/// non-cryptographic hash mod `N`.
///
/// The hash is seeded once per `Router` and stable for the lifetime of the
/// process; it accepts any `Hash` key (strings, integers, composite keys)
/// with the same contract as a general-purpose hash. Routing is pure and
/// allocation-free.
#[derive(Clone)]
pub struct Router {
    hash_builder: RandomState,
    segments: usize,
}

impl Router {
    pub fn new(segments: usize) -> Self {
        assert!(segments > 0, "Router requires at least one segment");
        Router {
            hash_builder: RandomState::new(),
            segments,
        }
    }

    /// Number of shards this router routes over.
    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Route `key` to a shard index in `0..segments()`.
    pub fn route<K: Hash + ?Sized>(&self, key: &K) -> usize {
        (self.hash_builder.hash_one(key) as usize) % self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_is_pure() {
        let router = Router::new(16);
        let a = router.route(&"hello");
        let b = router.route(&"hello");
        assert_eq!(a, b);
        assert!(a < 16);
    }

    #[test]
    fn routes_heterogeneous_keys() {
        let router = Router::new(8);
        assert!(router.route(&42i64) < 8);
        assert!(router.route(&"composite:key:1") < 8);
        assert!(router.route(&(1u32, "two", 3i64)) < 8);
    }

    #[test]
    #[should_panic(expected = "at least one segment")]
    fn zero_segments_panics() {
        Router::new(0);
    }
}

/*!
Convenience macros over [`crate::cache::Cache`], built around
`once_cell::sync::Lazy`, already this workspace's lazily initialized
static of choice (see [`crate::clock`], [`crate::registry`]).
*/

/// Declare a process-wide static cache, built once on first access --
/// the static binding surface.
///
/// ```ignore
/// static_cache! {
///     static FIB_CACHE: Cache<u64, u64> = CacheBuilder::new("fib").max_total(10_000).build().unwrap();
/// }
/// ```
#[macro_export]
macro_rules! static_cache {
    (static $name:ident : Cache<$k:ty, $v:ty> = $init:expr;) => {
        static $name: $crate::__macro_support::Lazy<$crate::Cache<$k, $v>> =
            $crate::__macro_support::Lazy::new(|| $init);
    };
}

/// Fetch-or-compute against a cache, panicking the calling thread if the
/// producer body errors. The body is any expression evaluating to a
/// [`crate::cache::ProduceOutcome`].
///
/// ```ignore
/// let v = fetch!(FIB_CACHE, n, 3600, { ProduceOutcome::Insert(fib(n)) });
/// ```
#[macro_export]
macro_rules! fetch {
    ($cache:expr, $key:expr, $ttl:expr, $body:expr) => {
        $cache.fetch_unwrap($key, $ttl, |_key| $body)
    };
}

/*!
The dynamic binding surface: caches looked up by name at call time rather
than held directly in a static.
*/

use crate::cache::Cache;
use crate::error::CacheError;
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::any::Any;
use std::hash::Hash;
use std::sync::Arc;

/// A registered cache, kept both as a type-erased handle (for
/// [`lookup_dynamic`]'s downcast) and as a closure that knows how to call
/// the concrete `Cache<K, V>`'s own `destroy()` (so [`destroy_dynamic`]
/// can deallocate the cache itself, not just its name).
struct Registered {
    any: Arc<dyn Any + Send + Sync>,
    destroy: Box<dyn Fn() + Send + Sync>,
}

static REGISTRY: Lazy<DashMap<String, Registered>> = Lazy::new(DashMap::new);

/// Register `cache` under `name`, replacing any previous cache registered
/// under that name. The replaced cache (if any) is left exactly as it
/// was -- callers holding their own clone of it keep working; only the
/// name now resolves to the new cache.
pub fn setup_dynamic<K, V>(name: &str, cache: Cache<K, V>)
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    let destroy_handle = cache.clone();
    REGISTRY.insert(
        name.to_string(),
        Registered {
            any: Arc::new(cache),
            destroy: Box::new(move || {
                let _ = destroy_handle.destroy();
            }),
        },
    );
}

/// Look up the cache registered under `name`. `Ok(None)` means no cache is
/// registered there; `Err` means one is registered but under a different
/// `(K, V)` than requested, which this function cannot distinguish from
/// "unknown" without turbofish context at the call site -- callers that
/// need to tell those apart should track registration out of band.
pub fn lookup_dynamic<K, V>(name: &str) -> Option<Cache<K, V>>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    let entry = REGISTRY.get(name)?;
    entry.any.clone().downcast::<Cache<K, V>>().ok().map(|c| (*c).clone())
}

/// Look up `name`, failing with [`CacheError::UnknownCache`] if nothing is
/// registered there.
pub fn dynamic<K, V>(name: &str) -> Result<Cache<K, V>, CacheError>
where
    K: Send + Sync + 'static,
    V: Send + Sync + 'static,
{
    lookup_dynamic(name).ok_or_else(|| CacheError::UnknownCache {
        name: name.to_string(),
    })
}

/// Destroy the cache registered under `name`: deallocates its shards (so
/// every handle to it, including ones obtained before this call, starts
/// failing with [`CacheError::Destroyed`]) and removes the registration.
/// Returns whether a registration was present.
pub fn destroy_dynamic(name: &str) -> bool {
    match REGISTRY.remove(name) {
        Some((_, registered)) => {
            (registered.destroy)();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBuilder;
    use serial_test::serial;

    fn build() -> Cache<String, i32> {
        CacheBuilder::new("reg-test").max_total(10).build().unwrap()
    }

    #[test]
    #[serial]
    fn register_then_lookup() {
        let c = build();
        c.put("k".to_string(), 1, 10).unwrap();
        setup_dynamic("reg-a", c);

        let looked_up: Cache<String, i32> = dynamic("reg-a").unwrap();
        assert_eq!(looked_up.get(&"k".to_string()).unwrap(), Some(1));
        destroy_dynamic("reg-a");
    }

    #[test]
    #[serial]
    fn unknown_name_errors() {
        destroy_dynamic("reg-missing");
        let result: Result<Cache<String, i32>, CacheError> = dynamic("reg-missing");
        assert!(matches!(result, Err(CacheError::UnknownCache { .. })));
    }

    #[test]
    #[serial]
    fn destroy_dynamic_removes_the_registration_and_destroys_the_cache() {
        let c = build();
        setup_dynamic("reg-b", c.clone());
        assert!(destroy_dynamic("reg-b"));
        assert!(!destroy_dynamic("reg-b"));
        let result: Result<Cache<String, i32>, CacheError> = dynamic("reg-b");
        assert!(result.is_err());
        // a handle obtained before destroy_dynamic also fails loudly now
        assert!(matches!(
            c.get(&"k".to_string()),
            Err(CacheError::Destroyed { .. })
        ));
    }
}

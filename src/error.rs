/*!
Error types surfaced by the cache core and its construction.
*/

use thiserror::Error;

/// Misuse errors from the cache's operational surface (spec §7:
/// "operations on a destroyed cache raise a fatal ... fault", "reading an
/// unknown key from a dynamic cache whose registry is missing raises the
/// same fault").
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache `{cache}` has been destroyed; no further operations are valid")]
    Destroyed { cache: String },

    #[error("no dynamic cache registered under the name `{name}`")]
    UnknownCache { name: String },
}

/// Errors from [`crate::CacheBuilder::build`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheBuildError {
    #[error("`max_total` must be set before calling build()")]
    MissingMaxTotal,
    #[error("`max_total` must be greater than zero")]
    ZeroCapacity,
    #[error("`segments` must be greater than zero")]
    ZeroSegments,
}

/*!
Monotonic second counter used for all expiry arithmetic.
*/

use once_cell::sync::Lazy;
use std::time::Instant;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// A process-monotonic clock, measured in whole seconds since an
/// arbitrary per-process epoch.
///
/// Never moves backward and is unaffected by wall-clock adjustments.
/// Expiries computed against it are meaningless across process restarts;
/// the cache is purely in-memory.
#[derive(Clone, Copy, Debug, Default)]
pub struct Clock;

impl Clock {
    /// Current time, in whole seconds since the process epoch.
    pub fn now(&self) -> i64 {
        EPOCH.elapsed().as_secs() as i64
    }
}

//! Expiry policy
//!
//! Pure functions over unix millisecond timestamps. Nothing here reads the
//! clock; callers pass `now` in, which is what makes the credential state
//! machine testable with a manual clock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Access tokens are treated as expired this long before their literal expiry,
/// so a token is never sent that dies while the request is on the wire.
pub const REFRESH_SKEW: Duration = Duration::from_secs(60);

/// `now >= expiry`. The boundary instant counts as expired.
pub fn is_expired(expiry_ms: u64, now_ms: u64) -> bool {
    now_ms >= expiry_ms
}

/// Whether an access token should be replaced, applying [`REFRESH_SKEW`].
pub fn needs_refresh(expiry_ms: u64, now_ms: u64) -> bool {
    expires_within(expiry_ms, now_ms, REFRESH_SKEW)
}

/// Whether `expiry_ms` falls within `window` of `now_ms` (or has passed).
pub fn expires_within(expiry_ms: u64, now_ms: u64, window: Duration) -> bool {
    is_expired(expiry_ms.saturating_sub(duration_millis(window)), now_ms)
}

/// Convert a token endpoint `expires_in` delta (seconds) into an absolute
/// millisecond timestamp.
pub fn expires_at(now_ms: u64, expires_in_secs: u64) -> u64 {
    now_ms.saturating_add(expires_in_secs.saturating_mul(1000))
}

fn duration_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Source of "now" for the credential state machine.
pub trait Clock: Send + Sync {
    /// Current time as unix milliseconds.
    fn now_millis(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}

/// Manually advanced clock for tests and tooling.
#[derive(Debug, Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self(AtomicU64::new(now_ms))
    }

    pub fn set(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.0.fetch_add(duration_millis(by), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

//! Rate Limiter (Token Bucket Algorithm)
//!
//! Caps how fast clients may start work (submissions, metadata lookups).
//! One bucket for the whole server; state is a single atomic word.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Tokens are stored in thousandths so per-minute rates refill smoothly
const MILLI: u64 = 1000;

/// Largest burst that fits the 32-bit fixed-point token field
pub const MAX_BURST: u32 = (u32::MAX as u64 / MILLI) as u32;

/// Bucket settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Requests allowed back to back; 0 disables limiting
    pub burst: u32,
    /// Tokens added per minute
    pub per_minute: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            burst: 10,
            per_minute: 10,
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            burst: 0,
            per_minute: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.burst > 0
    }
}

/// Token bucket with a lock-free CAS loop
pub struct RateLimiter {
    // Upper 32 bits: milli-tokens
    // Lower 32 bits: last refill, whole seconds since `created`
    packed: AtomicU64,
    created: Instant,
    max_milli: u64,
    refill_milli_per_min: u64,
}

impl RateLimiter {
    /// Bucket starting full with `burst` tokens
    pub fn new(config: RateLimitConfig) -> Self {
        let max_milli = u64::from(config.burst.min(MAX_BURST)) * MILLI;
        Self {
            packed: AtomicU64::new(max_milli << 32),
            created: Instant::now(),
            max_milli,
            refill_milli_per_min: u64::from(config.per_minute) * MILLI,
        }
    }

    /// Consume one token; false when the bucket is empty
    pub fn check(&self) -> bool {
        let now_secs = u32::try_from(self.created.elapsed().as_secs()).unwrap_or(u32::MAX);

        loop {
            let packed = self.packed.load(Ordering::Acquire);
            let tokens = packed >> 32;
            let last_secs = (packed & 0xFFFF_FFFF) as u32;

            let delta_secs = u64::from(now_secs.saturating_sub(last_secs));
            let refill = delta_secs.saturating_mul(self.refill_milli_per_min) / 60;
            let available = tokens.saturating_add(refill).min(self.max_milli);

            let (remaining, allowed) = if available >= MILLI {
                (available - MILLI, true)
            } else {
                (available, false)
            };
            let next = (remaining << 32) | u64::from(now_secs.max(last_secs));

            match self
                .packed
                .compare_exchange(packed, next, Ordering::Release, Ordering::Acquire)
            {
                Ok(_) => return allowed,
                Err(_) => continue,
            }
        }
    }

    /// Whole tokens left (as of the last check)
    pub fn remaining(&self) -> u32 {
        ((self.packed.load(Ordering::Acquire) >> 32) / MILLI) as u32
    }
}

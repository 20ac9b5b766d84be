use std::time::{Duration, Instant};

use crate::shaper::CHUNK_SIZE_BYTES;

/// Per-flow, per-direction bandwidth limiter. Refill rate is `bandwidth_bps`;
/// capacity is the same, floored at one chunk's worth of bytes so a single
/// read from the shaper's fixed-size buffer is never larger than the bucket
/// can ever hold. Without the floor, a body whose scaled bandwidth drops
/// below `CHUNK_SIZE_BYTES` per second (distant bodies under the
/// inverse-square falloff) would see `consume` block forever instead of
/// just paying real-time for the excess.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(bandwidth_bps: f64) -> Self {
        let capacity = bandwidth_bps.max(CHUNK_SIZE_BYTES as f64);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: bandwidth_bps,
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Blocks the caller until `n` bytes' worth of tokens are available,
    /// then debits them. Never fails: bandwidth exhaustion only delays.
    pub async fn consume(&mut self, n: usize) {
        loop {
            let now = Instant::now();
            self.refill(now);
            if self.tokens >= n as f64 {
                self.tokens -= n as f64;
                return;
            }
            let deficit = n as f64 - self.tokens;
            let wait = Duration::from_secs_f64(deficit / self.refill_per_sec);
            tokio::time::sleep(wait).await;
        }
    }
}

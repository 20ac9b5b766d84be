use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);
const IDLE_EVICTION: Duration = Duration::from_secs(600);
const DEFAULT_SHARD_COUNT: usize = 16;

struct RateBucket {
    timestamps: VecDeque<Instant>,
    last_seen: Instant,
}

impl RateBucket {
    fn new(now: Instant) -> Self {
        Self {
            timestamps: VecDeque::new(),
            last_seen: now,
        }
    }

    fn admit(&mut self, now: Instant, allowed_per_minute: u32) -> bool {
        self.last_seen = now;
        while let Some(&oldest) = self.timestamps.front() {
            if now.saturating_duration_since(oldest) > WINDOW {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() >= allowed_per_minute as usize {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }
}

/// Per-client-IP sliding-window admission control, sharded across
/// partitioned locks so one busy IP's bucket never serializes unrelated
/// clients hashing to a different shard.
pub struct RateLimiter {
    shards: Vec<Mutex<HashMap<IpAddr, RateBucket>>>,
    allowed_per_minute: u32,
}

impl RateLimiter {
    pub fn new(allowed_per_minute: u32) -> Self {
        Self::with_shard_count(allowed_per_minute, default_shard_count())
    }

    fn with_shard_count(allowed_per_minute: u32, shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        Self {
            shards: (0..shard_count).map(|_| Mutex::new(HashMap::new())).collect(),
            allowed_per_minute,
        }
    }

    fn shard_index(&self, ip: &IpAddr) -> usize {
        let mut hasher = DefaultHasher::new();
        ip.hash(&mut hasher);
        (hasher.finish() as usize) % self.shards.len()
    }

    /// Returns `true` if `ip` is under its per-minute allowance and the
    /// request is admitted, recording it against the bucket either way is
    /// only done on admission.
    pub fn admit(&self, ip: IpAddr) -> bool {
        let now = Instant::now();
        let idx = self.shard_index(&ip);
        let mut shard = self.shards[idx].lock().expect("rate limiter shard poisoned");
        let bucket = shard.entry(ip).or_insert_with(|| RateBucket::new(now));
        bucket.admit(now, self.allowed_per_minute)
    }

    /// Drops buckets that have seen no traffic in the last ten minutes.
    /// Intended to be called periodically from the admin loop.
    pub fn evict_idle(&self) {
        let now = Instant::now();
        for shard in &self.shards {
            let mut shard = shard.lock().expect("rate limiter shard poisoned");
            shard.retain(|_, bucket| now.saturating_duration_since(bucket.last_seen) <= IDLE_EVICTION);
        }
    }
}

fn default_shard_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_SHARD_COUNT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn localhost() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
    }

    #[test]
    fn admits_up_to_the_configured_limit() {
        let limiter = RateLimiter::with_shard_count(3, 1);
        let ip = localhost();
        for _ in 0..3 {
            assert!(limiter.admit(ip));
        }
        assert!(!limiter.admit(ip));
    }

    #[test]
    fn different_ips_have_independent_buckets() {
        let limiter = RateLimiter::with_shard_count(1, 1);
        let a = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let b = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));
        assert!(limiter.admit(a));
        assert!(!limiter.admit(a));
        assert!(limiter.admit(b));
    }

    #[test]
    fn evict_idle_removes_buckets_with_no_recent_activity() {
        let limiter = RateLimiter::with_shard_count(100, 1);
        let ip = localhost();
        assert!(limiter.admit(ip));
        {
            let idx = limiter.shard_index(&ip);
            let mut shard = limiter.shards[idx].lock().unwrap();
            let bucket = shard.get_mut(&ip).unwrap();
            bucket.last_seen = Instant::now() - Duration::from_secs(700);
        }
        limiter.evict_idle();
        let idx = limiter.shard_index(&ip);
        assert!(limiter.shards[idx].lock().unwrap().get(&ip).is_none());
    }
}

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use space_catalog::Catalog;
use space_shaping::RateLimiter;

use crate::distance_cache::DistanceCache;

/// Background refresh cadence for the distance cache (spec §4.9).
const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

/// Single background task that recomputes the distance cache every 60s
/// and sweeps idle rate-limiter buckets on the same cadence. All
/// request-path code reads from `cache` rather than recomputing per
/// connection.
pub async fn run(catalog: Arc<Catalog>, cache: Arc<DistanceCache>, rate_limiter: Arc<RateLimiter>) {
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        ticker.tick().await;
        let now_unix = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64();
        match cache.refresh(&catalog, now_unix) {
            Ok(()) => {
                tracing::debug!(bodies = catalog.all().len(), "distance cache refreshed");
            }
            Err(err) => {
                tracing::error!(error = %err, "distance cache refresh failed");
            }
        }
        rate_limiter.evict_idle();
    }
}

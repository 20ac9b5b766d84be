//! Admission control and per-flow traffic shaping.
//!
//! Two independent concerns live here: [`RateLimiter`] decides whether a new
//! connection from a client IP is admitted at all, and [`Shaper`] replays an
//! already-admitted flow's bytes with a fixed one-way delay and a bandwidth
//! ceiling in each direction.

mod cancel;
mod delay_queue;
mod rate_limiter;
mod shaper;
mod token_bucket;

pub use cancel::CancellationToken;
pub use rate_limiter::RateLimiter;
pub use shaper::{Shaper, ShaperError, CHUNK_SIZE_BYTES, DEFAULT_SOFT_CAP_BYTES};
pub use token_bucket::TokenBucket;

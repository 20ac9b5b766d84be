use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::cancel::CancellationToken;
use crate::delay_queue::{Chunk, DelayQueue};
use crate::token_bucket::TokenBucket;

/// Fixed chunk size used when reading off the source side of a shaped
/// direction; keeps the hot path allocation-light (one `Vec` per chunk
/// rather than growable buffering).
pub const CHUNK_SIZE_BYTES: usize = 32 * 1024;

/// Soft cap on in-flight delayed bytes per direction before the reader
/// side is throttled.
pub const DEFAULT_SOFT_CAP_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ShaperError {
    #[error("i/o error while shaping a flow: {0}")]
    Io(#[from] std::io::Error),
}

/// Replays a flow's bytes with a fixed one-way delay `D` and a bandwidth
/// ceiling `B`, independently in each direction.
#[derive(Clone, Copy, Debug)]
pub struct Shaper {
    pub delay: Duration,
    pub bandwidth_bps: f64,
    pub soft_cap_bytes: usize,
}

impl Shaper {
    pub fn new(delay: Duration, bandwidth_bps: f64) -> Self {
        Self {
            delay,
            bandwidth_bps,
            soft_cap_bytes: DEFAULT_SOFT_CAP_BYTES,
        }
    }

    /// Pumps bytes from `src` to `dst`, holding each chunk (and the
    /// eventual FIN) in the delay queue for `self.delay` and pacing writes
    /// against a token bucket sized to `self.bandwidth_bps`. Returns the
    /// number of bytes delivered on clean close.
    pub async fn run_direction<R, W>(
        &self,
        mut src: R,
        mut dst: W,
        cancel: CancellationToken,
    ) -> Result<u64, ShaperError>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut queue = DelayQueue::new(self.soft_cap_bytes);
        let mut bucket = TokenBucket::new(self.bandwidth_bps);
        let mut buf = vec![0u8; CHUNK_SIZE_BYTES];
        let mut total = 0u64;
        let mut read_done = false;

        loop {
            if read_done && queue.is_empty() {
                return Ok(total);
            }

            let next_release = queue.peek_release_at();
            let can_read = !read_done && !queue.is_over_soft_cap();

            tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    // Grace period: let anything already in flight land before dropping.
                    tokio::time::sleep(self.delay).await;
                    return Ok(total);
                }

                result = src.read(&mut buf), if can_read => {
                    let n = result?;
                    if n == 0 {
                        read_done = true;
                        queue.push(Chunk::Fin, Instant::now() + self.delay);
                    } else {
                        queue.push(Chunk::Data(buf[..n].to_vec()), Instant::now() + self.delay);
                    }
                }

                _ = sleep_until_opt(next_release), if next_release.is_some() => {
                    if let Some(chunk) = queue.pop_ready(Instant::now()) {
                        match chunk {
                            Chunk::Data(data) => {
                                bucket.consume(data.len()).await;
                                dst.write_all(&data).await?;
                                total += data.len() as u64;
                            }
                            Chunk::Fin => {
                                dst.shutdown().await?;
                                return Ok(total);
                            }
                        }
                    }
                }
            }
        }
    }
}

async fn sleep_until_opt(at: Option<Instant>) {
    match at {
        Some(instant) => tokio::time::sleep_until(tokio::time::Instant::from_std(instant)).await,
        None => std::future::pending().await,
    }
}

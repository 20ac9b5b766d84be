use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::time::Instant;

/// A chunk of flow data, or the end-of-stream marker that stands in for a
/// half-close. The FIN travels through the same delay queue as data so the
/// peer observes it no earlier than a real chunk sent at the same moment.
#[derive(Debug)]
pub enum Chunk {
    Data(Vec<u8>),
    Fin,
}

impl Chunk {
    fn len(&self) -> usize {
        match self {
            Chunk::Data(bytes) => bytes.len(),
            Chunk::Fin => 0,
        }
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct ReleaseKey {
    release_at: Instant,
    seq: u64,
}

/// Priority queue keyed by release time: chunks are admitted in arrival
/// order and come back out no earlier than `release_at`, preserving
/// per-direction ordering even though the structure itself is heap-shaped
/// rather than a plain FIFO.
pub struct DelayQueue {
    heap: BinaryHeap<Reverse<ReleaseKey>>,
    pending: std::collections::HashMap<u64, Chunk>,
    next_seq: u64,
    queued_bytes: usize,
    soft_cap_bytes: usize,
}

impl DelayQueue {
    pub fn new(soft_cap_bytes: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            pending: std::collections::HashMap::new(),
            next_seq: 0,
            queued_bytes: 0,
            soft_cap_bytes,
        }
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes
    }

    pub fn is_over_soft_cap(&self) -> bool {
        self.queued_bytes >= self.soft_cap_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn push(&mut self, chunk: Chunk, release_at: Instant) {
        self.queued_bytes += chunk.len();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.pending.insert(seq, chunk);
        self.heap.push(Reverse(ReleaseKey { release_at, seq }));
    }

    /// Release time of the earliest-queued chunk, if any.
    pub fn peek_release_at(&self) -> Option<Instant> {
        self.heap.peek().map(|Reverse(key)| key.release_at)
    }

    /// Pops the earliest-queued chunk if its release time has passed.
    /// Returns `None` without mutating the queue if nothing is ready yet.
    pub fn pop_ready(&mut self, now: Instant) -> Option<Chunk> {
        let ready = matches!(self.heap.peek(), Some(Reverse(key)) if key.release_at <= now);
        if !ready {
            return None;
        }
        let Reverse(key) = self.heap.pop().expect("checked above");
        let chunk = self.pending.remove(&key.seq).expect("pushed alongside heap entry");
        self.queued_bytes -= chunk.len();
        Some(chunk)
    }
}

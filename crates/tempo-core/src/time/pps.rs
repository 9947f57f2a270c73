//! Hand-off of pulse-per-second edges from the edge interrupt to the main tick.
//!
//! Single producer, single consumer. The interrupt bumps a sequence counter
//! to an odd value, stores the edge timestamp, then bumps the counter to the
//! next even value. The main tick remembers the last even sequence it took,
//! so each edge is handed over at most once and a torn read is retried.
//! Timestamps are a free-running millisecond counter truncated to `u32`; all
//! differences use wrapping arithmetic, so the ~49 day rollover is harmless.

use core::hint::spin_loop;
use core::sync::atomic::{AtomicU32, Ordering, fence};

use embassy_time::Instant;

/// A rising edge as seen by the main tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseEdge {
    pub at: Instant,
}

pub struct PpsLatch {
    /// Odd while the interrupt is storing an edge.
    sequence: AtomicU32,
    edge_ms: AtomicU32,
    /// Sequence of the last edge taken. Only the main tick touches it.
    taken: AtomicU32,
}

impl PpsLatch {
    pub const fn new() -> Self {
        Self {
            sequence: AtomicU32::new(0),
            edge_ms: AtomicU32::new(0),
            taken: AtomicU32::new(0),
        }
    }

    /// Interrupt side: record an edge observed at `now_ms`.
    #[inline]
    pub fn on_edge(&self, now_ms: u32) {
        let sequence = self.sequence.load(Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(1), Ordering::Relaxed);
        fence(Ordering::Release);
        self.edge_ms.store(now_ms, Ordering::Relaxed);
        self.sequence.store(sequence.wrapping_add(2), Ordering::Release);
    }

    /// Main side: consume the newest edge not yet taken, if any.
    ///
    /// Edges that arrived between two calls collapse into the latest one.
    /// The edge instant is rebuilt from its age relative to `now`, which
    /// keeps the `u32` rollover out of the caller's arithmetic.
    pub fn take(&self, now: Instant) -> Option<PulseEdge> {
        let edge_ms = loop {
            let sequence = self.sequence.load(Ordering::Acquire);
            if sequence & 1 == 1 {
                spin_loop();
                continue;
            }
            if sequence == self.taken.load(Ordering::Relaxed) {
                return None;
            }

            let edge_ms = self.edge_ms.load(Ordering::Relaxed);
            fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == sequence {
                self.taken.store(sequence, Ordering::Relaxed);
                break edge_ms;
            }
        };

        let now_ms = now.as_millis();
        let age_ms = (now_ms as u32).wrapping_sub(edge_ms);
        Some(PulseEdge {
            at: Instant::from_millis(now_ms.saturating_sub(age_ms as u64)),
        })
    }

    pub fn is_pending(&self) -> bool {
        self.sequence.load(Ordering::Acquire) != self.taken.load(Ordering::Relaxed)
    }

    /// Milliseconds elapsed since the most recent edge.
    pub fn millis_since_edge(&self, now_ms: u32) -> u32 {
        now_ms.wrapping_sub(self.edge_ms.load(Ordering::Acquire))
    }
}

impl Default for PpsLatch {
    fn default() -> Self {
        Self::new()
    }
}

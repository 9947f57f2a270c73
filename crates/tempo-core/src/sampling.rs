//! Interrupt-fed ring of raw analog readings.
//!
//! The capture interrupt is the only writer: it stores the reading into the
//! slot under the cursor, then publishes the advanced cursor (and the `full`
//! flag when the cursor wraps) with release ordering. The main tick only
//! reads. It takes its snapshot inside a critical section so a capture can
//! never land halfway through an average.

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};

/// One periodic analog input. Values are raw converter counts; scaling to
/// physical units happens at the logging boundary.
pub trait AnalogChannel {
    fn read(&mut self) -> u16;
}

pub struct SampleBuffer<const N: usize> {
    slots: [AtomicU16; N],
    cursor: AtomicUsize,
    full: AtomicBool,
}

impl<const N: usize> SampleBuffer<N> {
    pub const fn new() -> Self {
        const { assert!(N > 0, "sample ring needs at least one slot") };
        Self {
            slots: [const { AtomicU16::new(0) }; N],
            cursor: AtomicUsize::new(0),
            full: AtomicBool::new(false),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Interrupt side: store one reading.
    #[inline]
    pub fn record(&self, raw: u16) {
        let cursor = self.cursor.load(Ordering::Relaxed);
        self.slots[cursor].store(raw, Ordering::Relaxed);

        let next = (cursor + 1) % N;
        if next == 0 {
            self.full.store(true, Ordering::Release);
        }
        self.cursor.store(next, Ordering::Release);
    }

    /// Interrupt side: read the channel and store the result.
    #[inline]
    pub fn capture<C: AnalogChannel>(&self, channel: &mut C) {
        self.record(channel.read());
    }

    /// Number of valid readings: the capacity once wrapped, else the cursor.
    pub fn len(&self) -> usize {
        if self.full.load(Ordering::Acquire) {
            N
        } else {
            self.cursor.load(Ordering::Acquire)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mean of the valid readings, `0.0` before the first capture.
    pub fn average(&self) -> f32 {
        critical_section::with(|_| {
            let count = self.len();
            if count == 0 {
                return 0.0;
            }

            let sum: u32 = self.slots[..count]
                .iter()
                .map(|slot| slot.load(Ordering::Relaxed) as u32)
                .sum();
            sum as f32 / count as f32
        })
    }
}

impl<const N: usize> Default for SampleBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ramp(u16);

    impl AnalogChannel for Ramp {
        fn read(&mut self) -> u16 {
            self.0 += 1;
            self.0
        }
    }

    #[test]
    fn test_empty_average_is_zero() {
        let buffer = SampleBuffer::<8>::new();
        assert!(buffer.is_empty());
        assert_eq!(buffer.average(), 0.0);
    }

    #[test]
    fn test_partial_fill_uses_cursor() {
        let buffer = SampleBuffer::<8>::new();
        buffer.record(10);
        buffer.record(20);
        buffer.record(60);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.average(), 30.0);
    }

    #[test]
    fn test_wraparound_keeps_latest_readings() {
        let buffer = SampleBuffer::<4>::new();
        for raw in [10, 20, 30, 40, 50] {
            buffer.record(raw);
        }

        assert_eq!(buffer.len(), 4);
        assert_eq!(buffer.average(), 35.0);
    }

    #[test]
    fn test_average_matches_mean_of_last_readings() {
        const CAPACITY: usize = 5;
        let buffer = SampleBuffer::<CAPACITY>::new();
        let mut channel = Ramp(0);
        let mut history = alloc::vec::Vec::new();

        for _ in 0..17 {
            buffer.capture(&mut channel);
            history.push(channel.0 as u32);

            let window = &history[history.len().saturating_sub(CAPACITY)..];
            let expected = window.iter().sum::<u32>() as f32 / window.len() as f32;
            assert_eq!(buffer.average(), expected);
        }
    }

    #[test]
    fn test_full_scale_readings_do_not_overflow() {
        let buffer = SampleBuffer::<100>::new();
        for _ in 0..250 {
            buffer.record(u16::MAX);
        }
        assert_eq!(buffer.average(), u16::MAX as f32);
    }
}

//! The authoritative wall clock.
//!
//! The clock is an anchor (epoch milliseconds at a monotonic instant) that is
//! extrapolated with the monotonic timer. It is seeded from the battery-backed
//! RTC at boot and re-anchored by the discipline engine on each commit.

use embassy_time::Instant;

use super::calendar::DateTime;

/// Battery-backed real-time clock chip.
pub trait RealTimeClock {
    fn get(&mut self) -> u32;
    fn set(&mut self, epoch_secs: u32);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockReading {
    pub secs: u32,
    /// Milliseconds into `secs`.
    pub sub_ms: u16,
}

impl ClockReading {
    fn from_epoch_ms(ms: u64) -> Self {
        Self {
            secs: (ms / 1000).min(u32::MAX as u64) as u32,
            sub_ms: (ms % 1000) as u16,
        }
    }

    pub fn epoch_ms(&self) -> u64 {
        self.secs as u64 * 1000 + self.sub_ms as u64
    }

    pub fn datetime(&self) -> DateTime {
        DateTime::from_epoch(self.secs)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    anchor_ms: u64,
    anchor_at: Instant,
    /// Readings never drop below this once a commit happened.
    floor_ms: u64,
    committed: bool,
}

impl SystemClock {
    /// Start from an RTC value. The result is not a commit: the first commit
    /// may move the clock in either direction.
    pub fn from_rtc(epoch_secs: u32, at: Instant) -> Self {
        Self {
            anchor_ms: epoch_secs as u64 * 1000,
            anchor_at: at,
            floor_ms: 0,
            committed: false,
        }
    }

    pub fn now(&self, at: Instant) -> ClockReading {
        let elapsed = at.saturating_duration_since(self.anchor_at).as_millis();
        ClockReading::from_epoch_ms((self.anchor_ms + elapsed).max(self.floor_ms))
    }

    /// Anchor `epoch_secs` to the instant `at` (a pulse edge).
    ///
    /// After the first commit the clock is monotonic: when the new anchor is
    /// behind the current reading, readings hold at the current value until
    /// the anchor catches up instead of stepping back.
    pub fn commit(&mut self, epoch_secs: u32, at: Instant) {
        if self.committed {
            self.floor_ms = self.floor_ms.max(self.now(at).epoch_ms());
        }
        self.anchor_ms = epoch_secs as u64 * 1000;
        self.anchor_at = at;
        self.committed = true;
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn year(&self, at: Instant) -> u16 {
        self.now(at).datetime().date.year
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u32 = 1_714_564_800; // 2024-05-01T12:00:00Z

    #[test]
    fn test_extrapolates_from_anchor() {
        let clock = SystemClock::from_rtc(T0, Instant::from_millis(5_000));

        assert_eq!(
            clock.now(Instant::from_millis(7_250)),
            ClockReading {
                secs: T0 + 2,
                sub_ms: 250
            }
        );
        assert!(!clock.is_committed());
        assert_eq!(clock.year(Instant::from_millis(5_000)), 2024);
    }

    #[test]
    fn test_first_commit_may_step_backwards() {
        let mut clock = SystemClock::from_rtc(T0 + 100, Instant::from_millis(0));
        clock.commit(T0, Instant::from_millis(1_000));

        assert_eq!(clock.now(Instant::from_millis(1_000)).secs, T0);
        assert!(clock.is_committed());
    }

    #[test]
    fn test_commit_behind_holds_until_caught_up() {
        let mut clock = SystemClock::from_rtc(T0, Instant::from_millis(0));
        clock.commit(T0, Instant::from_millis(0));

        // Local oscillator ran fast: at the edge the clock reads T0+5.400,
        // but the satellite says the edge is T0+5.
        let edge = Instant::from_millis(5_400);
        let before = clock.now(edge);
        clock.commit(T0 + 5, edge);

        assert_eq!(clock.now(edge), before);
        assert_eq!(clock.now(Instant::from_millis(5_600)), before);
        assert_eq!(
            clock.now(Instant::from_millis(5_900)),
            ClockReading {
                secs: T0 + 5,
                sub_ms: 500
            }
        );
    }

    #[test]
    fn test_monotonic_across_commits() {
        let mut clock = SystemClock::from_rtc(T0, Instant::from_millis(0));
        let targets = [T0 + 1, T0 + 1, T0 + 3, T0 + 2, T0 + 10, T0 + 4];
        clock.commit(T0, Instant::from_millis(0));
        let mut last = clock.now(Instant::from_millis(0));

        for (i, target) in targets.iter().enumerate() {
            let at = Instant::from_millis((i as u64 + 1) * 1_000);
            clock.commit(*target, at);
            for offset in [0u64, 300, 999] {
                let reading = clock.now(Instant::from_millis(at.as_millis() + offset));
                assert!(reading >= last, "{:?} < {:?}", reading, last);
                last = reading;
            }
        }
    }
}

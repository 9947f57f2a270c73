//! Time discipline engine.
//!
//! Combines the satellite fix (which second it is) with the pulse edge (when
//! that second starts) and commits the result to the system clock and the
//! RTC.
//!
//! ```text
//!   Unprimed ──fresh fix, resync due──▶ Primed ──next edge──▶ Idle
//!                                        ▲                     │
//!                                        └──fresh fix, resync due
//! ```
//!
//! A decoded fix describes the second whose edge has already passed, so the
//! primed target is the fix time plus one and is committed on the first edge
//! that arrives after priming. Edges in any other state are ignored.

use embassy_time::{Duration, Instant};
use log::{debug, info};

use super::clock::{RealTimeClock, SystemClock};
use super::fix::SatelliteFix;
use super::pps::PulseEdge;
use crate::config::LoggerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisciplineState {
    /// Nothing validated yet since boot.
    Unprimed,
    /// `target` will be committed on the first edge after `primed_at`.
    Primed { target: u32, primed_at: Instant },
    /// Synced; waiting for the resync interval to elapse.
    Idle,
}

/// A successful commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncEvent {
    pub epoch_secs: u32,
    pub edge: Instant,
}

pub struct TimeDiscipline {
    state: DisciplineState,
    /// Start of the current resync interval (boot or last commit).
    last_sync: Instant,
    fix_freshness_ms: u32,
    resync_interval: Duration,
    valid_epoch_year: u16,
}

impl TimeDiscipline {
    pub fn new(config: &LoggerConfig, boot: Instant) -> Self {
        Self {
            state: DisciplineState::Unprimed,
            last_sync: boot,
            fix_freshness_ms: config.fix_freshness_ms,
            resync_interval: config.resync_interval(),
            valid_epoch_year: config.valid_epoch_year,
        }
    }

    pub fn state(&self) -> DisciplineState {
        self.state
    }

    fn resync_due(&self, now: Instant, clock: &SystemClock) -> bool {
        now.saturating_duration_since(self.last_sync) >= self.resync_interval
            || clock.year(now) < self.valid_epoch_year
    }

    /// Run one main-tick step: commit on a qualifying edge, then try to
    /// (re)prime from the fix.
    pub fn service<R: RealTimeClock>(
        &mut self,
        now: Instant,
        edge: Option<PulseEdge>,
        fix: &SatelliteFix,
        clock: &mut SystemClock,
        rtc: &mut R,
    ) -> Option<SyncEvent> {
        let event = edge.and_then(|edge| self.on_edge(edge, clock, rtc));
        if event.is_none() {
            self.prime(now, fix, clock);
        }
        event
    }

    /// Attempt the transition into `Primed`. A fix must be fresh right now;
    /// while already primed, a newer fix replaces the target.
    pub fn prime(&mut self, now: Instant, fix: &SatelliteFix, clock: &SystemClock) -> bool {
        if !fix.is_time_fresh(self.fix_freshness_ms) {
            return false;
        }

        let primed = matches!(self.state, DisciplineState::Primed { .. });
        if !primed && !self.resync_due(now, clock) {
            return false;
        }

        let Some(fix_secs) = fix.datetime().and_then(|dt| dt.to_epoch()) else {
            debug!("Ignoring fix with invalid date/time: {:?}", fix.datetime());
            return false;
        };
        let target = fix_secs.saturating_add(1);

        match self.state {
            DisciplineState::Primed { target: current, .. } if current == target => false,
            _ => {
                debug!("Primed for {} on next edge", target);
                self.state = DisciplineState::Primed {
                    target,
                    primed_at: now,
                };
                true
            }
        }
    }

    /// Commit the primed target if `edge` arrived after priming.
    pub fn on_edge<R: RealTimeClock>(
        &mut self,
        edge: PulseEdge,
        clock: &mut SystemClock,
        rtc: &mut R,
    ) -> Option<SyncEvent> {
        let DisciplineState::Primed { target, primed_at } = self.state else {
            return None;
        };
        if edge.at <= primed_at {
            // This edge opened the second the fix describes.
            return None;
        }

        clock.commit(target, edge.at);
        rtc.set(target);
        self.state = DisciplineState::Idle;
        self.last_sync = edge.at;
        info!("Clock committed to {} at pulse edge", target);

        Some(SyncEvent {
            epoch_secs: target,
            edge: edge.at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::calendar::{DateTime, TimeOfDay};
    use crate::time::fix::Location;

    const T0: u32 = 1_714_564_800; // 2024-05-01T12:00:00Z

    #[derive(Default)]
    struct FakeRtc {
        value: u32,
        sets: usize,
    }

    impl RealTimeClock for FakeRtc {
        fn get(&mut self) -> u32 {
            self.value
        }

        fn set(&mut self, epoch_secs: u32) {
            self.value = epoch_secs;
            self.sets += 1;
        }
    }

    fn fix_at(epoch_secs: u32, age_ms: u32) -> SatelliteFix {
        let dt = DateTime::from_epoch(epoch_secs);
        SatelliteFix {
            date: Some(dt.date),
            time: Some(dt.time),
            location: Some(Location {
                latitude: 1.0,
                longitude: 2.0,
            }),
            fix_age_ms: Some(age_ms),
            location_age_ms: Some(age_ms),
        }
    }

    fn ms(v: u64) -> Instant {
        Instant::from_millis(v)
    }

    fn edge(v: u64) -> Option<PulseEdge> {
        Some(PulseEdge { at: ms(v) })
    }

    struct Rig {
        engine: TimeDiscipline,
        clock: SystemClock,
        rtc: FakeRtc,
    }

    impl Rig {
        /// Boot with an RTC that reads `rtc_secs`, `boot_ms` into uptime.
        fn new(rtc_secs: u32, boot_ms: u64) -> Self {
            Self {
                engine: TimeDiscipline::new(&LoggerConfig::default(), ms(boot_ms)),
                clock: SystemClock::from_rtc(rtc_secs, ms(boot_ms)),
                rtc: FakeRtc {
                    value: rtc_secs,
                    sets: 0,
                },
            }
        }

        fn step(
            &mut self,
            now: u64,
            edge: Option<PulseEdge>,
            fix: &SatelliteFix,
        ) -> Option<SyncEvent> {
            self.engine
                .service(ms(now), edge, fix, &mut self.clock, &mut self.rtc)
        }
    }

    #[test]
    fn test_edges_ignored_while_unprimed() {
        let mut rig = Rig::new(T0, 0);
        let stale = fix_at(T0, 5_000);

        for second in 1..20u64 {
            assert_eq!(rig.step(second * 1_000, edge(second * 1_000), &stale), None);
        }
        assert_eq!(rig.engine.state(), DisciplineState::Unprimed);
        assert!(!rig.clock.is_committed());
        assert_eq!(rig.rtc.sets, 0);
    }

    #[test]
    fn test_prime_then_commit_on_next_edge() {
        // RTC says 2000, so a resync is due immediately.
        let mut rig = Rig::new(946_684_800, 0);

        // Fix for T0 decoded 120 ms after its edge at 1000 ms.
        assert_eq!(rig.step(1_120, None, &fix_at(T0, 20)), None);
        assert_eq!(
            rig.engine.state(),
            DisciplineState::Primed {
                target: T0 + 1,
                primed_at: ms(1_120)
            }
        );

        let event = rig.step(2_003, edge(2_000), &fix_at(T0, 900));
        assert_eq!(
            event,
            Some(SyncEvent {
                epoch_secs: T0 + 1,
                edge: ms(2_000)
            })
        );
        assert_eq!(rig.engine.state(), DisciplineState::Idle);
        assert_eq!(rig.rtc.value, T0 + 1);
        assert_eq!(rig.clock.now(ms(2_500)).secs, T0 + 1);
        assert_eq!(rig.clock.now(ms(2_500)).sub_ms, 500);
    }

    #[test]
    fn test_edge_before_priming_is_not_committed() {
        let mut rig = Rig::new(946_684_800, 0);

        // The edge that opened T0 is still pending when the fix for T0 lands.
        assert_eq!(rig.step(1_150, edge(1_000), &fix_at(T0, 10)), None);
        assert!(matches!(
            rig.engine.state(),
            DisciplineState::Primed { target, .. } if target == T0 + 1
        ));

        // An edge stamped before the priming instant is never committed.
        let late = PulseEdge { at: ms(1_100) };
        assert_eq!(rig.engine.on_edge(late, &mut rig.clock, &mut rig.rtc), None);
        assert!(!rig.clock.is_committed());
        assert_eq!(rig.rtc.sets, 0);
    }

    #[test]
    fn test_stale_fix_does_not_prime() {
        let mut rig = Rig::new(946_684_800, 0);
        assert_eq!(rig.step(1_000, None, &fix_at(T0, 500)), None);
        assert_eq!(rig.engine.state(), DisciplineState::Unprimed);
        assert!(!rig.engine.prime(ms(1_000), &SatelliteFix::empty(), &rig.clock));
    }

    #[test]
    fn test_fix_going_stale_while_primed_still_commits() {
        let mut rig = Rig::new(946_684_800, 0);
        rig.step(1_100, None, &fix_at(T0, 100));

        // Receiver goes quiet; fix ages past the threshold before the edge.
        assert_eq!(rig.step(1_900, None, &fix_at(T0, 900)), None);
        let event = rig.step(2_001, edge(2_000), &fix_at(T0, 1_001));
        assert_eq!(event.map(|e| e.epoch_secs), Some(T0 + 1));
    }

    #[test]
    fn test_resync_waits_for_interval_when_year_valid() {
        let mut rig = Rig::new(T0, 0);

        // Clock year is valid, so nothing happens before 10 s of uptime.
        rig.step(5_100, None, &fix_at(T0 + 5, 100));
        assert_eq!(rig.engine.state(), DisciplineState::Unprimed);

        rig.step(10_100, None, &fix_at(T0 + 10, 100));
        assert!(matches!(rig.engine.state(), DisciplineState::Primed { .. }));
        let event = rig.step(11_000, edge(11_000), &fix_at(T0 + 10, 1_000));
        assert_eq!(event.map(|e| e.epoch_secs), Some(T0 + 11));

        // Synced at 11 s: the next priming is due at 21 s.
        rig.step(12_100, None, &fix_at(T0 + 12, 100));
        assert_eq!(rig.engine.state(), DisciplineState::Idle);
        rig.step(21_100, None, &fix_at(T0 + 21, 100));
        assert!(matches!(rig.engine.state(), DisciplineState::Primed { .. }));
    }

    #[test]
    fn test_newer_fix_replaces_primed_target() {
        let mut rig = Rig::new(946_684_800, 0);
        rig.step(1_100, None, &fix_at(T0, 100));
        // No edge at 2000 (pulse lost), next fix arrives for T0+1.
        rig.step(2_100, None, &fix_at(T0 + 1, 100));

        let event = rig.step(3_000, edge(3_000), &fix_at(T0 + 1, 900));
        assert_eq!(event.map(|e| e.epoch_secs), Some(T0 + 2));
    }

    #[test]
    fn test_invalid_fix_fields_do_not_prime() {
        let mut rig = Rig::new(946_684_800, 0);
        let mut fix = fix_at(T0, 10);
        fix.time = Some(TimeOfDay {
            hour: 25,
            minute: 0,
            second: 0,
        });

        assert!(!rig.engine.prime(ms(1_000), &fix, &rig.clock));
        assert_eq!(rig.engine.state(), DisciplineState::Unprimed);
    }

    #[test]
    fn test_commits_only_values_from_fresh_fixes_and_stay_monotonic() {
        let mut rig = Rig::new(946_684_800, 0);
        let mut last = None;

        // Fix ages cycle through fresh and stale; edges every second.
        for second in 1..60u64 {
            let edge_ms = second * 1_000;
            let age = if second % 3 == 0 { 700 } else { 80 };
            let fix = fix_at(T0 + second as u32, age);

            if let Some(event) = rig.step(edge_ms + 5, edge(edge_ms), &fix) {
                // The primed fix one second earlier must have been fresh.
                assert_ne!((second - 1) % 3, 0);
                assert_eq!(event.epoch_secs, T0 + second as u32);
            }
            rig.step(edge_ms + 120, None, &fix);

            let reading = rig.clock.now(ms(edge_ms + 500));
            if rig.clock.is_committed() {
                if let Some(prev) = last {
                    assert!(reading >= prev);
                }
                last = Some(reading);
            }
        }
        assert!(rig.rtc.sets >= 1);
    }
}

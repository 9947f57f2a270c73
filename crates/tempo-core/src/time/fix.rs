//! Snapshot of the satellite receiver's decoded state.

use embassy_time::Instant;

use super::calendar::{Date, DateTime, TimeOfDay};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    /// Degrees, positive north.
    pub latitude: f64,
    /// Degrees, positive east.
    pub longitude: f64,
}

/// What the decoder knew at one tick. Ages are measured from the moment the
/// matching sentence finished decoding; `None` means never received.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SatelliteFix {
    pub date: Option<Date>,
    pub time: Option<TimeOfDay>,
    pub location: Option<Location>,
    pub fix_age_ms: Option<u32>,
    pub location_age_ms: Option<u32>,
}

impl SatelliteFix {
    pub const fn empty() -> Self {
        Self {
            date: None,
            time: None,
            location: None,
            fix_age_ms: None,
            location_age_ms: None,
        }
    }

    /// True when the date/time fields were updated less than `threshold_ms` ago.
    pub fn is_time_fresh(&self, threshold_ms: u32) -> bool {
        matches!(self.fix_age_ms, Some(age) if age < threshold_ms)
    }

    /// The location, if both the fix and the location are younger than
    /// `threshold_ms`.
    pub fn fresh_location(&self, threshold_ms: u32) -> Option<Location> {
        if !self.is_time_fresh(threshold_ms) {
            return None;
        }
        match self.location_age_ms {
            Some(age) if age >= threshold_ms => None,
            _ => self.location,
        }
    }

    pub fn datetime(&self) -> Option<DateTime> {
        Some(DateTime {
            date: self.date?,
            time: self.time?,
        })
    }
}

/// Pull-based view of an external satellite-receiver decoder.
pub trait SatelliteSource {
    /// Feed one received byte. Returns true when it completed a sentence.
    fn encode(&mut self, byte: u8) -> bool;

    /// Current decoded values with ages relative to `now`.
    fn snapshot(&self, now: Instant) -> SatelliteFix;
}

//! Satellite receiver adapter: NMEA 0183 bytes in, [`SatelliteFix`] out.
//!
//! Date and time come from RMC only, since GGA carries no date. Position is
//! taken from whichever of RMC or GGA arrived last. Void fixes leave the
//! previous values (and their ages) untouched.

use embassy_time::Instant;
use log::debug;
use nmea0183::{ParseResult, Parser};

use super::calendar::{Date, DateTime, TimeOfDay};
use super::fix::{Location, SatelliteFix, SatelliteSource};

/// XOR of the sentence bytes between `$` and `*`.
pub fn sentence_checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |acc, b| acc ^ b)
}

pub struct NmeaReceiver {
    parser: Parser,
    /// Last valid RMC date/time and when it finished decoding.
    datetime: Option<(DateTime, Instant)>,
    location: Option<(Location, Instant)>,
}

impl NmeaReceiver {
    pub fn new() -> Self {
        Self {
            parser: Parser::new(),
            datetime: None,
            location: None,
        }
    }

    /// Feed one byte that was received at `at`.
    pub fn encode_at(&mut self, byte: u8, at: Instant) -> bool {
        let Some(result) = self.parser.parse_from_byte(byte) else {
            return false;
        };

        match result {
            Ok(ParseResult::RMC(Some(rmc))) => {
                self.update_from_rmc(&rmc, at);
                true
            }
            Ok(ParseResult::GGA(Some(gga))) => {
                self.update_location(gga.latitude.as_f64(), gga.longitude.as_f64(), at);
                true
            }
            // Void fixes and sentence types we do not use.
            Ok(_) => false,
            Err(e) => {
                debug!("NMEA parse error: {}", e);
                false
            }
        }
    }

    fn update_from_rmc(&mut self, rmc: &nmea0183::RMC, at: Instant) {
        let date = &rmc.datetime.date;
        let time = &rmc.datetime.time;
        let datetime = DateTime {
            date: Date {
                year: date.year,
                month: date.month,
                day: date.day,
            },
            time: TimeOfDay {
                hour: time.hours,
                minute: time.minutes,
                // Fractional seconds are dropped; the pulse edge carries them.
                second: time.seconds as u8,
            },
        };

        if datetime.is_valid() {
            self.datetime = Some((datetime, at));
        } else {
            debug!("RMC with invalid date/time: {}", datetime);
        }
        self.update_location(rmc.latitude.as_f64(), rmc.longitude.as_f64(), at);
    }

    fn update_location(&mut self, latitude: f64, longitude: f64, at: Instant) {
        self.location = Some((
            Location {
                latitude,
                longitude,
            },
            at,
        ));
    }
}

impl Default for NmeaReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl SatelliteSource for NmeaReceiver {
    fn encode(&mut self, byte: u8) -> bool {
        self.encode_at(byte, Instant::now())
    }

    fn snapshot(&self, now: Instant) -> SatelliteFix {
        let age = |at: Instant| now.saturating_duration_since(at).as_millis() as u32;
        SatelliteFix {
            date: self.datetime.map(|(dt, _)| dt.date),
            time: self.datetime.map(|(dt, _)| dt.time),
            location: self.location.map(|(loc, _)| loc),
            fix_age_ms: self.datetime.map(|(_, at)| age(at)),
            location_age_ms: self.location.map(|(_, at)| age(at)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;

    /// Frame `body` as `$<body>*<checksum>\r\n`.
    fn sentence(body: &str) -> String {
        format!("${}*{:02X}\r\n", body, sentence_checksum(body.as_bytes()))
    }

    fn feed(receiver: &mut NmeaReceiver, text: &str, at_ms: u64) -> usize {
        let at = Instant::from_millis(at_ms);
        text.bytes().filter(|b| receiver.encode_at(*b, at)).count()
    }

    const RMC: &str = "GPRMC,123519.45,A,4807.038,N,01131.000,E,022.4,084.4,010524,003.1,W";
    const GGA: &str = "GPGGA,123520,4807.038,S,01131.000,W,1,08,0.9,545.4,M,46.9,M,,";

    #[test]
    fn test_checksum_matches_receiver_output() {
        let line = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";
        assert_eq!(
            sentence("GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,"),
            line
        );
    }

    #[test]
    fn test_valid_rmc_sets_time_and_position() {
        let mut receiver = NmeaReceiver::new();
        assert_eq!(feed(&mut receiver, &sentence(RMC), 1_000), 1);

        let fix = receiver.snapshot(Instant::from_millis(1_000));
        assert_eq!(
            fix.datetime(),
            Some(DateTime {
                date: Date {
                    year: 2024,
                    month: 5,
                    day: 1,
                },
                time: TimeOfDay {
                    hour: 12,
                    minute: 35,
                    second: 19,
                },
            })
        );
        let location = fix.location.unwrap();
        assert!((location.latitude - 48.1173).abs() < 0.001);
        assert!((location.longitude - 11.516_666).abs() < 0.001);
    }

    #[test]
    fn test_void_rmc_keeps_previous_fix() {
        let mut receiver = NmeaReceiver::new();
        let void = "GPRMC,123521,V,,,,,,,010524,,";
        assert_eq!(feed(&mut receiver, &sentence(void), 1_000), 0);
        assert_eq!(receiver.snapshot(Instant::from_millis(1_000)), SatelliteFix::empty());

        feed(&mut receiver, &sentence(RMC), 2_000);
        assert_eq!(feed(&mut receiver, &sentence(void), 3_000), 0);

        let fix = receiver.snapshot(Instant::from_millis(3_000));
        assert_eq!(fix.time.unwrap().second, 19);
        assert_eq!(fix.fix_age_ms, Some(1_000));
        assert_eq!(fix.location_age_ms, Some(1_000));
    }

    #[test]
    fn test_gga_gives_position_without_time() {
        let mut receiver = NmeaReceiver::new();
        assert_eq!(feed(&mut receiver, &sentence(GGA), 500), 1);

        let fix = receiver.snapshot(Instant::from_millis(500));
        assert_eq!(fix.date, None);
        assert_eq!(fix.time, None);
        assert_eq!(fix.fix_age_ms, None);
        assert_eq!(fix.location_age_ms, Some(0));
        let location = fix.location.unwrap();
        assert!((location.latitude + 48.1173).abs() < 0.001);
        assert!((location.longitude + 11.516_666).abs() < 0.001);
    }

    #[test]
    fn test_bad_checksum_is_rejected() {
        let mut receiver = NmeaReceiver::new();
        // Day of month changed from 01 to 02 after the checksum was taken.
        let corrupt = sentence(RMC).replace(",010524,", ",020524,");
        assert_eq!(feed(&mut receiver, &corrupt, 1_000), 0);
        assert_eq!(receiver.snapshot(Instant::from_millis(1_000)), SatelliteFix::empty());

        // The parser recovers on the next sentence.
        assert_eq!(feed(&mut receiver, &sentence(RMC), 2_000), 1);
    }

    #[test]
    fn test_snapshot_ages_track_each_sentence() {
        let mut receiver = NmeaReceiver::new();
        feed(&mut receiver, &sentence(RMC), 1_000);
        feed(&mut receiver, &sentence(GGA), 1_400);

        let fix = receiver.snapshot(Instant::from_millis(1_900));
        assert_eq!(fix.fix_age_ms, Some(900));
        assert_eq!(fix.location_age_ms, Some(500));
        // GGA replaced the RMC position.
        assert!(fix.location.unwrap().latitude < 0.0);

        // A snapshot taken before the sentence landed reads as age zero.
        let early = receiver.snapshot(Instant::from_millis(900));
        assert_eq!(early.fix_age_ms, Some(0));
    }
}

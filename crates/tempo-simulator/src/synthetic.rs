//! Synthetic satellite receiver output and analog input.
//!
//! The fake receiver sends an RMC and a GGA sentence for each second,
//! shortly after the pulse edge that opened that second, which is the
//! timing a real receiver has. They are decoded by the same NMEA adapter
//! the firmware uses.

use std::fmt::Write as _;

use tempo_core::sampling::AnalogChannel;
use tempo_core::time::nmea::sentence_checksum;
use tempo_core::time::{DateTime, Location};

/// Origin of the simulated position track.
const HOME: Location = Location {
    latitude: 48.137_154,
    longitude: 11.576_124,
};

/// Position of the simulated receiver at `epoch_secs`.
pub fn position_at(epoch_secs: u64) -> Location {
    let t = epoch_secs as f64;
    // Slow wander of a few metres around the origin.
    Location {
        latitude: HOME.latitude + 0.000_05 * (t / 60.0).sin(),
        longitude: HOME.longitude + 0.000_05 * (t / 45.0).cos(),
    }
}

/// `ddmm.mmmm,H` (or `dddmm.mmmm,H` for longitude).
fn coordinate(out: &mut String, degrees: f64, width: usize, hemispheres: [char; 2]) {
    let hemisphere = if degrees < 0.0 { hemispheres[1] } else { hemispheres[0] };
    let degrees = degrees.abs();
    let whole = degrees.trunc();
    let minutes = (degrees - whole) * 60.0;
    let _ = write!(out, "{:0width$}{:07.4},{}", whole as u32, minutes, hemisphere);
}

fn framed(body: &str) -> String {
    format!("${}*{:02X}\r\n", body, sentence_checksum(body.as_bytes()))
}

/// Build the RMC and GGA sentences describing `epoch_secs`.
pub fn sentences_for(epoch_secs: u64) -> String {
    let DateTime { date, time } = DateTime::from_epoch(epoch_secs as u32);
    let position = position_at(epoch_secs);

    let mut fields = String::new();
    coordinate(&mut fields, position.latitude, 2, ['N', 'S']);
    fields.push(',');
    coordinate(&mut fields, position.longitude, 3, ['E', 'W']);

    let hhmmss = format!("{:02}{:02}{:02}.00", time.hour, time.minute, time.second);
    let rmc = format!(
        "GPRMC,{hhmmss},A,{fields},000.0,000.0,{:02}{:02}{:02},003.1,E",
        date.day,
        date.month,
        date.year % 100
    );
    let gga = format!("GPGGA,{hhmmss},{fields},1,08,0.9,520.0,M,47.0,M,,");

    framed(&rmc) + &framed(&gga)
}

/// A 12-bit converter watching a slowly breathing signal.
pub struct SyntheticChannel {
    step: u32,
}

impl SyntheticChannel {
    pub fn new() -> Self {
        Self { step: 0 }
    }
}

impl AnalogChannel for SyntheticChannel {
    fn read(&mut self) -> u16 {
        self.step = self.step.wrapping_add(1);
        let t = self.step as f32 / 100.0;
        let counts = 2048.0 + 1200.0 * (t / 30.0).sin() + 40.0 * (t * 7.0).sin();
        counts.clamp(0.0, 4095.0) as u16
    }
}

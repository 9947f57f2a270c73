//! Wall-clock time: calendar math, the pulse latch, the satellite fix view
//! and its NMEA decoder, the disciplined system clock and the downstream
//! sync frame.

pub mod calendar;
pub mod clock;
pub mod discipline;
pub mod fix;
pub mod nmea;
pub mod notify;
pub mod pps;

pub use calendar::{Date, DateTime, TimeOfDay};
pub use clock::{ClockReading, RealTimeClock, SystemClock};
pub use discipline::{DisciplineState, SyncEvent, TimeDiscipline};
pub use fix::{Location, SatelliteFix, SatelliteSource};
pub use nmea::NmeaReceiver;
pub use pps::{PpsLatch, PulseEdge};

use core::fmt::{self, Write as _};

use super::LogError;
use crate::time::{DateTime, Location};

/// Placeholder for coordinates when no fresh position is available.
pub const UNAVAILABLE: &str = "NA";

pub const RECORD_CAPACITY: usize = 96;

pub type RecordLine = heapless::String<RECORD_CAPACITY>;

/// One CSV line: `timestamp,longitude,latitude,value`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime,
    pub location: Option<Location>,
    pub value: f32,
}

impl LogRecord {
    /// Render the record followed by `\n`.
    pub fn to_line(&self) -> Result<RecordLine, LogError> {
        let mut line = RecordLine::new();
        writeln!(line, "{}", self).map_err(|_| LogError::Format)?;
        Ok(line)
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},", self.timestamp)?;
        match self.location {
            Some(location) => write!(f, "{:.6},{:.6}", location.longitude, location.latitude)?,
            None => write!(f, "{},{}", UNAVAILABLE, UNAVAILABLE)?,
        }
        write!(f, ",{:.4}", self.value)
    }
}

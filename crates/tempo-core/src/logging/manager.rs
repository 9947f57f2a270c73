// cSpell: disable
use core::fmt::Write as _;

use log::{debug, error, info, warn};

use super::{LogError, LogRecord, LogStorage};
use crate::config::LoggerConfig;
use crate::time::{DateTime, SatelliteFix};

/// `MMDDHHMM.CSV` is 12 characters.
pub type FileName = heapless::String<12>;

/// 8.3 short name for a log file created at `epoch_secs`, e.g.
/// `05011230.CSV`. Unique per minute within a year.
pub fn session_file_name(epoch_secs: u32) -> FileName {
    let dt = DateTime::from_epoch(epoch_secs);
    let mut name = FileName::new();
    // Two digits per field always fits.
    let _ = write!(
        name,
        "{:02}{:02}{:02}{:02}.CSV",
        dt.date.month, dt.date.day, dt.time.hour, dt.time.minute
    );
    name
}

/// The currently open append target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSession<H> {
    pub handle: H,
    /// Clock seconds when the file was opened.
    pub created: u32,
    /// Records appended since the last flush.
    pub pending_writes: u16,
}

/// Writes timestamped records with bounded loss on power failure.
///
/// Two independent cadences apply:
/// - **rotation**: the file is replaced once it is `rotation_interval_secs` old
/// - **flush**: every `flush_threshold` records are forced to the medium
///
/// Failures never panic. A failed open leaves no session and is retried on
/// the next [`ensure_session`](Self::ensure_session); a failed write drops
/// the session so the next tick reopens.
pub struct LoggingManager<S: LogStorage> {
    storage: S,
    session: Option<LogSession<S::Handle>>,
    rotation_interval_secs: u32,
    flush_threshold: u16,
    position_freshness_ms: u32,
    value_scale: f32,
    /// Set after a dropped record was reported; cleared when a file opens.
    drop_reported: bool,
}

impl<S: LogStorage> LoggingManager<S> {
    pub fn new(storage: S, config: &LoggerConfig) -> Self {
        Self {
            storage,
            session: None,
            rotation_interval_secs: config.rotation_interval_secs,
            flush_threshold: config.flush_threshold.max(1),
            position_freshness_ms: config.position_freshness_ms,
            value_scale: config.value_scale,
            drop_reported: false,
        }
    }

    /// Bring up the storage medium.
    pub fn init_storage(&mut self) -> Result<(), S::Error> {
        self.storage.init()
    }

    pub fn session(&self) -> Option<&LogSession<S::Handle>> {
        self.session.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Make sure a file is open and younger than the rotation interval.
    ///
    /// A clock that reads earlier than the open file's creation time also
    /// rotates: the first commit may step the clock back past it.
    pub fn ensure_session(&mut self, now: u32) -> Result<(), LogError> {
        if let Some(session) = &self.session {
            match now.checked_sub(session.created) {
                Some(age) if age < self.rotation_interval_secs => return Ok(()),
                Some(age) => info!("Rotating log file after {} s", age),
                None => info!(
                    "Clock stepped back {} s, rotating log file",
                    session.created - now
                ),
            }
        }

        self.close();

        let name = session_file_name(now);
        match self.storage.open(&name, true) {
            Ok(handle) => {
                self.session = Some(LogSession {
                    handle,
                    created: now,
                    pending_writes: 0,
                });
                self.drop_reported = false;
                info!("Logging to {}", name);
                Ok(())
            }
            Err(e) => {
                error!("Error opening {}: {:?}", name, e);
                Err(LogError::OpenFailed)
            }
        }
    }

    /// Format and append the record for clock second `now`.
    ///
    /// Coordinates come from `fix` only when its location is fresh; otherwise
    /// both fields are written as `NA`. `average` is in raw counts and is
    /// scaled here.
    pub fn write_record(
        &mut self,
        now: u32,
        fix: &SatelliteFix,
        average: f32,
    ) -> Result<(), LogError> {
        let record = LogRecord {
            timestamp: DateTime::from_epoch(now),
            location: fix.fresh_location(self.position_freshness_ms),
            value: average * self.value_scale,
        };
        self.append(&record)
    }

    pub fn append(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let Some(session) = self.session.as_mut() else {
            if !self.drop_reported {
                error!("No log file open, dropping record {}", record);
                self.drop_reported = true;
            }
            return Err(LogError::NoSession);
        };

        let line = record.to_line()?;
        if let Err(e) = self.storage.write(session.handle, line.as_bytes()) {
            error!("Failed to append record: {:?}", e);
            self.close();
            return Err(LogError::WriteFailed);
        }
        debug!("{}", record);

        session.pending_writes += 1;
        if session.pending_writes >= self.flush_threshold {
            session.pending_writes = 0;
            self.storage.flush(session.handle).map_err(|e| {
                error!("Failed to flush log file: {:?}", e);
                LogError::FlushFailed
            })?;
        }

        Ok(())
    }

    /// Close the open file, if any.
    pub fn close(&mut self) {
        if let Some(session) = self.session.take() {
            match self.storage.close(session.handle) {
                Ok(()) => info!("Closed log file"),
                Err(e) => warn!("Failed to close log file cleanly: {:?}", e),
            }
        }
    }
}

//! Start/stop control of logging and the persisted on/off flag.

pub mod console;

pub use console::{ConsoleCommand, ConsoleReader, HELP_TEXT};

use embassy_time::Instant;
use log::info;

use crate::logging::{LogStorage, LoggingManager};

/// Flag byte value meaning "logging". Anything else, including erased
/// memory, means idle.
pub const FLAG_LOGGING: u8 = 1;
pub const FLAG_IDLE: u8 = 0;

/// Non-volatile single-byte store.
pub trait FlagStore {
    fn read(&mut self, address: u16) -> u8;
    fn write(&mut self, address: u16, value: u8);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndicatorPattern {
    /// Slow heartbeat while idle.
    Default,
    /// Fast blink while logging.
    Fast,
}

/// Status LED driver. `service` is called every tick to advance the pattern.
pub trait StatusIndicator {
    fn set_pattern(&mut self, pattern: IndicatorPattern);
    fn service(&mut self, now: Instant);
}

/// Host-visible file transfer (e.g. USB mass storage).
pub trait HostTransfer {
    fn service(&mut self);
    fn reset(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Logging,
    Idle,
}

pub struct SessionController {
    state: SessionState,
    flag_address: u16,
}

impl SessionController {
    /// Restore the state persisted before the last power cycle.
    pub fn resume<F, I>(flags: &mut F, indicator: &mut I, flag_address: u16) -> Self
    where
        F: FlagStore,
        I: StatusIndicator,
    {
        let state = if flags.read(flag_address) == FLAG_LOGGING {
            info!("Resuming logging from persisted flag");
            indicator.set_pattern(IndicatorPattern::Fast);
            SessionState::Logging
        } else {
            indicator.set_pattern(IndicatorPattern::Default);
            SessionState::Idle
        };

        Self {
            state,
            flag_address,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_logging(&self) -> bool {
        self.state == SessionState::Logging
    }

    pub fn start<F, I>(&mut self, flags: &mut F, indicator: &mut I)
    where
        F: FlagStore,
        I: StatusIndicator,
    {
        self.state = SessionState::Logging;
        flags.write(self.flag_address, FLAG_LOGGING);
        indicator.set_pattern(IndicatorPattern::Fast);
        info!("Logging started");
    }

    pub fn stop<F, I, S>(&mut self, flags: &mut F, indicator: &mut I, logger: &mut LoggingManager<S>)
    where
        F: FlagStore,
        I: StatusIndicator,
        S: LogStorage,
    {
        self.state = SessionState::Idle;
        flags.write(self.flag_address, FLAG_IDLE);
        logger.close();
        indicator.set_pattern(IndicatorPattern::Default);
        info!("Logging stopped");
    }
}

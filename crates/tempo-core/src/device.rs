//! The device context: every component of the logger, owned by the main tick.
//!
//! Interrupt handlers never see the context. They only touch
//! [`SharedState`], whose fields each have exactly one interrupt-side writer:
//!
//! | field        | written by          | read by   |
//! |--------------|---------------------|-----------|
//! | `pps`        | pulse edge ISR      | main tick |
//! | `samples`    | sample capture ISR  | main tick |
//! | `wall_clock` | main tick           | FAT time source |

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_time::Instant;
use embedded_io::{Read, ReadReady, Write};
use log::{error, info, warn};
use thiserror_no_std::Error;

use crate::config::LoggerConfig;
use crate::logging::{LogStorage, LoggingManager};
use crate::sampling::SampleBuffer;
use crate::session::{
    ConsoleCommand, ConsoleReader, FlagStore, HELP_TEXT, HostTransfer, SessionController,
    SessionState, StatusIndicator,
};
use crate::time::notify::send_sync;
use crate::time::{
    ClockReading, DateTime, DisciplineState, PpsLatch, RealTimeClock, SatelliteFix,
    SatelliteSource, SystemClock, TimeDiscipline,
};

/// Most console commands handled per tick; the rest wait for the next one.
const MAX_COMMANDS_PER_TICK: usize = 8;

/// State shared with interrupt context. Lives in a `static`.
pub struct SharedState<const N: usize> {
    pub pps: PpsLatch,
    pub samples: SampleBuffer<N>,
    /// Clock seconds as of the last tick.
    pub wall_clock: AtomicU32,
}

impl<const N: usize> SharedState<N> {
    pub const fn new() -> Self {
        Self {
            pps: PpsLatch::new(),
            samples: SampleBuffer::new(),
            wall_clock: AtomicU32::new(0),
        }
    }
}

impl<const N: usize> Default for SharedState<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// The concrete peripheral types of one hardware (or simulated) build.
pub trait Board {
    type Gps: SatelliteSource;
    type GpsPort: Read + ReadReady;
    type Console: Read + ReadReady + Write;
    /// Secondary serial line receiving time-sync frames.
    type SyncPort: Write;
    type Rtc: RealTimeClock;
    type Storage: LogStorage;
    type Flags: FlagStore;
    type Indicator: StatusIndicator;
    type Host: HostTransfer;
}

pub struct Peripherals<B: Board> {
    pub gps: B::Gps,
    pub gps_port: B::GpsPort,
    pub console: B::Console,
    pub sync_port: B::SyncPort,
    pub rtc: B::Rtc,
    pub storage: B::Storage,
    pub flags: B::Flags,
    pub indicator: B::Indicator,
    pub host: B::Host,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    #[error("storage medium failed to initialize")]
    StorageUnavailable,
}

/// Read everything currently buffered on `port`, one byte at a time.
fn drain<P, F>(port: &mut P, mut on_byte: F)
where
    P: Read + ReadReady,
    F: FnMut(u8),
{
    let mut buf = [0u8; 64];
    loop {
        match port.read_ready() {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => {
                warn!("Serial port error: {:?}", e);
                break;
            }
        }
        match port.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => buf[..n].iter().for_each(|b| on_byte(*b)),
            Err(e) => {
                warn!("Serial read failed: {:?}", e);
                break;
            }
        }
    }
}

pub struct DeviceContext<'a, B: Board, const N: usize> {
    shared: &'a SharedState<N>,
    gps: B::Gps,
    gps_port: B::GpsPort,
    console: B::Console,
    sync_port: B::SyncPort,
    rtc: B::Rtc,
    flags: B::Flags,
    indicator: B::Indicator,
    host: B::Host,
    clock: SystemClock,
    discipline: TimeDiscipline,
    logger: LoggingManager<B::Storage>,
    session: SessionController,
    console_reader: ConsoleReader,
    last_second: Option<u32>,
}

impl<'a, B: Board, const N: usize> DeviceContext<'a, B, N> {
    /// Bring the device up.
    ///
    /// Seeds the clock from the RTC, mounts storage and restores the logging
    /// flag. A storage failure is the one fatal boot error; the caller is
    /// expected to halt rather than run without durable storage.
    pub fn boot(
        peripherals: Peripherals<B>,
        shared: &'a SharedState<N>,
        config: LoggerConfig,
        now: Instant,
    ) -> Result<Self, BootError> {
        let Peripherals {
            gps,
            gps_port,
            console,
            sync_port,
            mut rtc,
            storage,
            mut flags,
            mut indicator,
            host,
        } = peripherals;

        let rtc_secs = rtc.get();
        let clock = SystemClock::from_rtc(rtc_secs, now);
        shared.wall_clock.store(rtc_secs, Ordering::Relaxed);
        if clock.year(now) < config.valid_epoch_year {
            warn!("Unable to sync with the RTC, waiting for satellite time");
        } else {
            info!("RTC has set the system time: {}", DateTime::from_epoch(rtc_secs));
        }

        info!("Initializing storage...");
        let mut logger = LoggingManager::new(storage, &config);
        logger.init_storage().map_err(|e| {
            error!("Card failed, or not present: {:?}", e);
            BootError::StorageUnavailable
        })?;
        info!("Storage initialized");

        let session = SessionController::resume(&mut flags, &mut indicator, config.flag_address);

        Ok(Self {
            shared,
            gps,
            gps_port,
            console,
            sync_port,
            rtc,
            flags,
            indicator,
            host,
            clock,
            discipline: TimeDiscipline::new(&config, now),
            logger,
            session,
            console_reader: ConsoleReader::new(),
            last_second: None,
        })
    }

    /// One pass of the cooperative main loop.
    pub fn tick(&mut self, now: Instant) {
        self.host.service();
        self.indicator.service(now);

        let gps = &mut self.gps;
        drain(&mut self.gps_port, |byte| {
            gps.encode(byte);
        });
        let fix = self.gps.snapshot(now);

        self.poll_console();

        let edge = self.shared.pps.take(now);
        if let Some(event) = self
            .discipline
            .service(now, edge, &fix, &mut self.clock, &mut self.rtc)
        {
            if let Err(e) = send_sync(&mut self.sync_port, event.epoch_secs) {
                warn!("Failed to send time sync: {:?}", e);
            }
        }

        let reading = self.clock.now(now);
        self.shared.wall_clock.store(reading.secs, Ordering::Relaxed);
        if self.last_second != Some(reading.secs) {
            self.last_second = Some(reading.secs);
            self.on_new_second(reading.secs, &fix);
        }
    }

    fn poll_console(&mut self) {
        let mut commands = heapless::Vec::<ConsoleCommand, MAX_COMMANDS_PER_TICK>::new();
        let reader = &mut self.console_reader;
        drain(&mut self.console, |byte| {
            if let Some(command) = reader.push(byte) {
                if commands.push(command).is_err() {
                    warn!("Console command dropped, too many in one tick");
                }
            }
        });

        for command in commands {
            self.handle_command(command);
        }
    }

    fn handle_command(&mut self, command: ConsoleCommand) {
        match command {
            ConsoleCommand::StartLogging => self.session.start(&mut self.flags, &mut self.indicator),
            ConsoleCommand::StopLogging => {
                self.session
                    .stop(&mut self.flags, &mut self.indicator, &mut self.logger);
            }
            ConsoleCommand::ResetTransfer => {
                info!("Resetting host file transfer");
                self.host.reset();
            }
            ConsoleCommand::Help => {
                if let Err(e) = self.console.write_all(HELP_TEXT.as_bytes()) {
                    warn!("Failed to print help: {:?}", e);
                }
            }
        }
    }

    /// Display step, plus one record when logging.
    fn on_new_second(&mut self, secs: u32, fix: &SatelliteFix) {
        let average = self.shared.samples.average();
        info!("Clock: {} average: {:.1}", DateTime::from_epoch(secs), average);

        if !self.session.is_logging() {
            return;
        }
        // The logger reports its own failures. Without an open file this
        // second's record is skipped and the open is retried next second.
        if self.logger.ensure_session(secs).is_ok() {
            let _ = self.logger.write_record(secs, fix, average);
        }
    }

    pub fn clock_reading(&self, now: Instant) -> ClockReading {
        self.clock.now(now)
    }

    pub fn is_clock_committed(&self) -> bool {
        self.clock.is_committed()
    }

    pub fn discipline_state(&self) -> DisciplineState {
        self.discipline.state()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn logger(&self) -> &LoggingManager<B::Storage> {
        &self.logger
    }
}

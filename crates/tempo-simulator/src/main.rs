//! Desktop simulator for the tempo field logger.
//!
//! Runs the same device context as the firmware with host stand-ins:
//!
//! | Peripheral        | Simulated by                                  |
//! |-------------------|-----------------------------------------------|
//! | pulse-per-second  | thread firing on every host second boundary   |
//! | satellite UART    | NMEA RMC + GGA ~120 ms after each edge        |
//! | analog sampler    | thread capturing a synthetic signal           |
//! | SD card           | `<data dir>/card/`                            |
//! | RTC, flag byte    | `<data dir>/rtc.txt`, `<data dir>/flags.bin`  |
//! | console           | stdin / stdout                                |
//!
//! Usage: `tempo-simulator [data dir]` (default `tempo-data`). An optional
//! postcard-encoded `TEMPO.CFG` in the card directory overrides defaults.
//! Set `RUST_LOG=debug` for per-record output.

mod board;
mod synthetic;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use embassy_time::Instant;
use log::{error, info, warn};

use tempo_core::config::{DEFAULT_SAMPLE_CAPACITY, LoggerConfig};
use tempo_core::device::{DeviceContext, Peripherals, SharedState};
use tempo_core::time::NmeaReceiver;

use board::{
    ChannelPort, DirStorage, FileFlags, FileRtc, LogIndicator, NoHost, SimBoard, StdConsole,
    SyncLog,
};
use synthetic::{SyntheticChannel, sentences_for};

const DEFAULT_DATA_DIR: &str = "tempo-data";
const CONFIG_FILE: &str = "TEMPO.CFG";

/// Receiver latency between the edge and the end of its sentences.
const SENTENCE_DELAY: Duration = Duration::from_millis(120);

/// Main loop pacing.
const TICK_PERIOD: Duration = Duration::from_millis(5);

static SHARED: SharedState<DEFAULT_SAMPLE_CAPACITY> = SharedState::new();

// ---------------------------------------------------------------------------
// Interrupt stand-ins
// ---------------------------------------------------------------------------

/// Pulse edge on every host second, followed by the sentences for that second.
fn run_pulse_source(gps: Sender<Vec<u8>>) {
    loop {
        let host = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let to_edge = Duration::from_secs(1) - Duration::from_nanos(host.subsec_nanos() as u64);
        thread::sleep(to_edge);

        SHARED.pps.on_edge(Instant::now().as_millis() as u32);

        thread::sleep(SENTENCE_DELAY);
        if gps.send(sentences_for(host.as_secs() + 1).into_bytes()).is_err() {
            return;
        }
    }
}

fn run_sampler(period: Duration) {
    let mut channel = SyntheticChannel::new();
    loop {
        SHARED.samples.capture(&mut channel);
        thread::sleep(period);
    }
}

fn run_console_input(console: Sender<Vec<u8>>) {
    for line in std::io::stdin().lock().lines() {
        let Ok(mut line) = line else {
            break;
        };
        line.push('\n');
        if console.send(line.into_bytes()).is_err() {
            break;
        }
    }
    info!("Console input closed");
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

fn load_config(card_dir: &Path) -> LoggerConfig {
    let path = card_dir.join(CONFIG_FILE);
    let Ok(bytes) = std::fs::read(&path) else {
        info!("No {} found, using defaults", CONFIG_FILE);
        return LoggerConfig::default();
    };

    match LoggerConfig::from_postcard(&bytes) {
        Ok(config) => {
            info!("Loaded {}", path.display());
            config
        }
        Err(e) => {
            warn!("Ignoring {}: {}", path.display(), e);
            LoggerConfig::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting tempo simulator");

    let data_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
    let card_dir = data_dir.join("card");
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        error!("Cannot create {}: {}", data_dir.display(), e);
        return ExitCode::FAILURE;
    }

    let config = load_config(&card_dir);
    let sample_period = Duration::from_millis(config.sample_period_ms as u64);

    let (gps_tx, gps_rx) = mpsc::channel();
    let (console_tx, console_rx) = mpsc::channel();
    thread::spawn(move || run_pulse_source(gps_tx));
    thread::spawn(move || run_sampler(sample_period));
    thread::spawn(move || run_console_input(console_tx));

    let peripherals = Peripherals::<SimBoard> {
        gps: NmeaReceiver::new(),
        gps_port: ChannelPort::new(gps_rx),
        console: StdConsole::new(ChannelPort::new(console_rx)),
        sync_port: SyncLog::default(),
        rtc: FileRtc::new(data_dir.join("rtc.txt")),
        storage: DirStorage::new(card_dir),
        flags: FileFlags::new(data_dir.join("flags.bin")),
        indicator: LogIndicator::new(),
        host: NoHost,
    };

    let mut device = match DeviceContext::boot(peripherals, &SHARED, config, Instant::now()) {
        Ok(device) => device,
        Err(e) => {
            error!("Boot failed: {}", e);
            return ExitCode::FAILURE;
        }
    };
    info!("Type s to start logging, x to stop, anything else for help");

    loop {
        device.tick(Instant::now());
        thread::sleep(TICK_PERIOD);
    }
}

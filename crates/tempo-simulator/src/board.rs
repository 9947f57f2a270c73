//! Host stand-ins for the logger's peripherals.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write as _};
use std::path::PathBuf;
use std::sync::mpsc::Receiver;
use std::time::{SystemTime, UNIX_EPOCH};

use embassy_time::{Duration, Instant};
use embedded_io::{ErrorKind, ErrorType, Read, ReadReady, Write};
use log::{debug, info, trace, warn};

use tempo_core::device::Board;
use tempo_core::logging::LogStorage;
use tempo_core::session::{FlagStore, HostTransfer, IndicatorPattern, StatusIndicator};
use tempo_core::time::{NmeaReceiver, RealTimeClock};

/// What a battery-backed RTC reads after losing power: 2000-01-01T00:00:00Z.
const RTC_RESET_EPOCH: u32 = 946_684_800;

fn host_epoch_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Serial ports
// ---------------------------------------------------------------------------

/// Receive side of a simulated UART, fed from another thread.
pub struct ChannelPort {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
}

impl ChannelPort {
    pub fn new(rx: Receiver<Vec<u8>>) -> Self {
        Self {
            rx,
            pending: VecDeque::new(),
        }
    }
}

impl ErrorType for ChannelPort {
    type Error = Infallible;
}

impl ReadReady for ChannelPort {
    fn read_ready(&mut self) -> Result<bool, Infallible> {
        // A disconnected sender just means no more input.
        while let Ok(chunk) = self.rx.try_recv() {
            self.pending.extend(chunk);
        }
        Ok(!self.pending.is_empty())
    }
}

impl Read for ChannelPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Infallible> {
        let n = buf.len().min(self.pending.len());
        for (slot, byte) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

/// Console: lines typed on stdin in, help text out on stdout.
pub struct StdConsole {
    input: ChannelPort,
}

impl StdConsole {
    pub fn new(input: ChannelPort) -> Self {
        Self { input }
    }
}

impl ErrorType for StdConsole {
    type Error = ErrorKind;
}

impl ReadReady for StdConsole {
    fn read_ready(&mut self) -> Result<bool, ErrorKind> {
        Ok(self.input.read_ready().unwrap_or(false))
    }
}

impl Read for StdConsole {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ErrorKind> {
        Ok(self.input.read(buf).unwrap_or(0))
    }
}

impl Write for StdConsole {
    fn write(&mut self, buf: &[u8]) -> Result<usize, ErrorKind> {
        io::stdout().write(buf).map_err(|_| ErrorKind::Other)
    }

    fn flush(&mut self) -> Result<(), ErrorKind> {
        io::stdout().flush().map_err(|_| ErrorKind::Other)
    }
}

/// Downstream sync line. Frames are logged instead of transmitted.
#[derive(Default)]
pub struct SyncLog {
    line: Vec<u8>,
}

impl ErrorType for SyncLog {
    type Error = Infallible;
}

impl Write for SyncLog {
    fn write(&mut self, buf: &[u8]) -> Result<usize, Infallible> {
        for &byte in buf {
            if byte == b'\n' {
                info!("Sync frame: {}", String::from_utf8_lossy(&self.line));
                self.line.clear();
            } else {
                self.line.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), Infallible> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RTC and flag byte
// ---------------------------------------------------------------------------

/// RTC that keeps running across simulator restarts: the file stores the
/// offset from host time, as a coin cell would keep the chip counting.
pub struct FileRtc {
    path: PathBuf,
}

impl FileRtc {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl RealTimeClock for FileRtc {
    fn get(&mut self) -> u32 {
        let Ok(text) = fs::read_to_string(&self.path) else {
            return RTC_RESET_EPOCH;
        };
        match text.trim().parse::<i64>() {
            Ok(offset) => (host_epoch_secs() + offset).clamp(0, u32::MAX as i64) as u32,
            Err(e) => {
                warn!("Corrupt RTC file {}: {}", self.path.display(), e);
                RTC_RESET_EPOCH
            }
        }
    }

    fn set(&mut self, epoch_secs: u32) {
        let offset = epoch_secs as i64 - host_epoch_secs();
        if let Err(e) = fs::write(&self.path, offset.to_string()) {
            warn!("Failed to persist RTC: {}", e);
        }
    }
}

/// Byte-addressed flag memory in a small file. Missing bytes read as erased.
pub struct FileFlags {
    path: PathBuf,
}

impl FileFlags {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl FlagStore for FileFlags {
    fn read(&mut self, address: u16) -> u8 {
        fs::read(&self.path)
            .ok()
            .and_then(|bytes| bytes.get(address as usize).copied())
            .unwrap_or(0xFF)
    }

    fn write(&mut self, address: u16, value: u8) {
        let mut bytes = fs::read(&self.path).unwrap_or_default();
        let index = address as usize;
        if bytes.len() <= index {
            bytes.resize(index + 1, 0xFF);
        }
        bytes[index] = value;
        if let Err(e) = fs::write(&self.path, bytes) {
            warn!("Failed to persist flag byte: {}", e);
        }
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Log files in a host directory.
pub struct DirStorage {
    root: PathBuf,
    files: Vec<Option<File>>,
}

impl DirStorage {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            files: Vec::new(),
        }
    }

    fn file(&mut self, handle: usize) -> io::Result<&mut File> {
        self.files
            .get_mut(handle)
            .and_then(Option::as_mut)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "stale log handle"))
    }
}

impl LogStorage for DirStorage {
    type Handle = usize;
    type Error = io::Error;

    fn init(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.root)?;
        info!("Storage directory {}", self.root.display());
        Ok(())
    }

    fn open(&mut self, name: &str, append: bool) -> io::Result<usize> {
        let file = OpenOptions::new()
            .create(true)
            .append(append)
            .write(true)
            .truncate(!append)
            .open(self.root.join(name))?;

        let slot = self.files.iter().position(Option::is_none);
        Ok(match slot {
            Some(index) => {
                self.files[index] = Some(file);
                index
            }
            None => {
                self.files.push(Some(file));
                self.files.len() - 1
            }
        })
    }

    fn write(&mut self, handle: usize, bytes: &[u8]) -> io::Result<()> {
        self.file(handle)?.write_all(bytes)
    }

    fn flush(&mut self, handle: usize) -> io::Result<()> {
        let file = self.file(handle)?;
        file.flush()?;
        file.sync_data()
    }

    fn close(&mut self, handle: usize) -> io::Result<()> {
        let file = self
            .files
            .get_mut(handle)
            .and_then(Option::take)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "stale log handle"))?;
        file.sync_all()
    }
}

// ---------------------------------------------------------------------------
// Indicator and host transfer
// ---------------------------------------------------------------------------

/// Status LED rendered as trace output.
pub struct LogIndicator {
    pattern: IndicatorPattern,
    lit: bool,
    last_toggle: Instant,
}

impl LogIndicator {
    pub fn new() -> Self {
        Self {
            pattern: IndicatorPattern::Default,
            lit: false,
            last_toggle: Instant::from_millis(0),
        }
    }

    fn half_period(&self) -> Duration {
        match self.pattern {
            IndicatorPattern::Default => Duration::from_millis(1000),
            IndicatorPattern::Fast => Duration::from_millis(100),
        }
    }
}

impl StatusIndicator for LogIndicator {
    fn set_pattern(&mut self, pattern: IndicatorPattern) {
        if self.pattern != pattern {
            debug!("Indicator pattern {:?}", pattern);
        }
        self.pattern = pattern;
    }

    fn service(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_toggle) >= self.half_period() {
            self.lit = !self.lit;
            self.last_toggle = now;
            trace!("LED {}", if self.lit { "on" } else { "off" });
        }
    }
}

/// The simulator has no USB side; log files are already on the host.
pub struct NoHost;

impl HostTransfer for NoHost {
    fn service(&mut self) {}

    fn reset(&mut self) {
        info!("No host transfer attached, nothing to reset");
    }
}

pub struct SimBoard;

impl Board for SimBoard {
    type Gps = NmeaReceiver;
    type GpsPort = ChannelPort;
    type Console = StdConsole;
    type SyncPort = SyncLog;
    type Rtc = FileRtc;
    type Storage = DirStorage;
    type Flags = FileFlags;
    type Indicator = LogIndicator;
    type Host = NoHost;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("tempo-sim-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_channel_port_reads_across_chunks() {
        let (tx, rx) = mpsc::channel();
        let mut port = ChannelPort::new(rx);
        assert!(!port.read_ready().unwrap());

        tx.send(b"ab".to_vec()).unwrap();
        tx.send(b"cde".to_vec()).unwrap();
        assert!(port.read_ready().unwrap());

        let mut buf = [0u8; 4];
        assert_eq!(port.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(port.read(&mut buf).unwrap(), 1);
        assert_eq!(buf[0], b'e');
    }

    #[test]
    fn test_flags_default_to_erased() {
        let dir = scratch_dir("flags");
        let mut flags = FileFlags::new(dir.join("flags.bin"));
        assert_eq!(flags.read(3), 0xFF);

        flags.write(3, 1);
        assert_eq!(flags.read(3), 1);
        assert_eq!(flags.read(0), 0xFF);
    }

    #[test]
    fn test_rtc_keeps_counting_after_set() {
        let dir = scratch_dir("rtc");
        let mut rtc = FileRtc::new(dir.join("rtc.txt"));
        assert_eq!(rtc.get(), RTC_RESET_EPOCH);

        rtc.set(1_714_564_800);
        let read = rtc.get();
        assert!((1_714_564_800..1_714_564_803).contains(&read));
    }

    #[test]
    fn test_dir_storage_appends_and_reuses_handles() {
        let dir = scratch_dir("storage");
        let mut storage = DirStorage::new(dir.join("card"));
        storage.init().unwrap();

        let first = storage.open("A.CSV", true).unwrap();
        storage.write(first, b"one\n").unwrap();
        storage.close(first).unwrap();
        assert!(storage.write(first, b"late\n").is_err());

        let again = storage.open("A.CSV", true).unwrap();
        assert_eq!(again, first);
        storage.write(again, b"two\n").unwrap();
        storage.flush(again).unwrap();

        let text = fs::read_to_string(dir.join("card").join("A.CSV")).unwrap();
        assert_eq!(text, "one\ntwo\n");
    }
}

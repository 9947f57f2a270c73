use core::sync::atomic::{AtomicU32, Ordering};

use embedded_sdmmc::{
    BlockDevice, Mode, RawDirectory, RawFile, RawVolume, TimeSource, Timestamp, VolumeIdx,
    VolumeManager,
};
use log::{info, warn};

use super::LogStorage;
use crate::time::DateTime;

/// FAT timestamps from the shared wall-clock cell the main tick keeps updated.
pub struct ClockTimeSource<'a> {
    epoch_secs: &'a AtomicU32,
}

impl<'a> ClockTimeSource<'a> {
    pub const fn new(epoch_secs: &'a AtomicU32) -> Self {
        Self { epoch_secs }
    }
}

impl TimeSource for ClockTimeSource<'_> {
    fn get_timestamp(&self) -> Timestamp {
        let dt = DateTime::from_epoch(self.epoch_secs.load(Ordering::Relaxed));
        Timestamp {
            year_since_1970: dt.date.year.saturating_sub(1970).min(u8::MAX as u16) as u8,
            zero_indexed_month: dt.date.month - 1,
            zero_indexed_day: dt.date.day - 1,
            hours: dt.time.hour,
            minutes: dt.time.minute,
            seconds: dt.time.second,
        }
    }
}

/// Log storage on the first FAT volume of an SD card, files in the root
/// directory.
///
/// The volume and root directory are opened once in [`LogStorage::init`] and
/// stay open; log files are opened and closed around rotation.
pub struct SdCardStorage<B, T>
where
    B: BlockDevice,
    T: TimeSource,
{
    volume_mgr: VolumeManager<B, T, 4, 4, 1>,
    volume: Option<RawVolume>,
    root_dir: Option<RawDirectory>,
}

impl<B, T> SdCardStorage<B, T>
where
    B: BlockDevice,
    T: TimeSource,
{
    /// Create a new SD card storage manager
    pub fn new(block_device: B, ts: T) -> Self {
        let volume_mgr = VolumeManager::new(block_device, ts);

        Self {
            volume_mgr,
            volume: None,
            root_dir: None,
        }
    }

    fn root(&self) -> Result<RawDirectory, embedded_sdmmc::Error<B::Error>> {
        self.root_dir.ok_or(embedded_sdmmc::Error::BadHandle)
    }

    /// Read a whole file from the root directory into `buffer`.
    ///
    /// Returns the number of bytes read; stops at the end of `buffer`.
    pub fn read_file(
        &mut self,
        file_name: &str,
        buffer: &mut [u8],
    ) -> Result<usize, embedded_sdmmc::Error<B::Error>> {
        let file = self
            .volume_mgr
            .open_file_in_dir(self.root()?, file_name, Mode::ReadOnly)?;

        let mut count = 0;
        let result = loop {
            if count == buffer.len() {
                break Ok(count);
            }
            match self.volume_mgr.read(file, &mut buffer[count..]) {
                Ok(0) => break Ok(count), // EOF
                Ok(n) => count += n,
                Err(e) => break Err(e),
            }
        };

        // Close explicitly to handle errors
        self.volume_mgr.close_file(file)?;
        result
    }
}

impl<B, T> LogStorage for SdCardStorage<B, T>
where
    B: BlockDevice,
    T: TimeSource,
{
    type Handle = RawFile;
    type Error = embedded_sdmmc::Error<B::Error>;

    fn init(&mut self) -> Result<(), Self::Error> {
        if self.root_dir.is_some() {
            return Ok(());
        }

        let volume = self.volume_mgr.open_raw_volume(VolumeIdx(0))?;
        let root_dir = match self.volume_mgr.open_root_dir(volume) {
            Ok(dir) => dir,
            Err(e) => {
                if let Err(close_err) = self.volume_mgr.close_volume(volume) {
                    warn!("Failed to close volume after root dir error: {:?}", close_err);
                }
                return Err(e);
            }
        };

        self.volume = Some(volume);
        self.root_dir = Some(root_dir);
        info!("SD card volume 0 mounted");
        Ok(())
    }

    fn open(&mut self, name: &str, append: bool) -> Result<RawFile, Self::Error> {
        let mode = if append {
            Mode::ReadWriteCreateOrAppend
        } else {
            Mode::ReadWriteCreateOrTruncate
        };
        self.volume_mgr.open_file_in_dir(self.root()?, name, mode)
    }

    fn write(&mut self, handle: RawFile, bytes: &[u8]) -> Result<(), Self::Error> {
        self.volume_mgr.write(handle, bytes)
    }

    fn flush(&mut self, handle: RawFile) -> Result<(), Self::Error> {
        self.volume_mgr.flush_file(handle)
    }

    fn close(&mut self, handle: RawFile) -> Result<(), Self::Error> {
        self.volume_mgr.close_file(handle)
    }
}

//! The removable storage medium, as seen by the logging manager.

use core::fmt::Debug;

/// Append-target storage. Handles are cheap copies of an open file id.
pub trait LogStorage {
    type Handle: Copy + Debug;
    type Error: Debug;

    /// Bring the medium up. Called once at boot; failure is fatal.
    fn init(&mut self) -> Result<(), Self::Error>;

    fn open(&mut self, name: &str, append: bool) -> Result<Self::Handle, Self::Error>;

    fn write(&mut self, handle: Self::Handle, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Force everything written so far onto the medium.
    fn flush(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;

    fn close(&mut self, handle: Self::Handle) -> Result<(), Self::Error>;
}

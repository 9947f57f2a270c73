//! Time-sync notification for downstream devices.
//!
//! Frame: the header byte `T`, the epoch seconds in ASCII decimal, `\n`.
//! Receivers using the common `T<unixtime>` serial sync convention accept it
//! as is.

use core::fmt::Write as _;

use embedded_io::Write;

pub const SYNC_HEADER: u8 = b'T';

/// Header + ten digits + terminator fits in 12 bytes.
pub type SyncFrame = heapless::String<16>;

pub fn encode_sync(epoch_secs: u32) -> SyncFrame {
    let mut frame = SyncFrame::new();
    // A u32 has at most ten digits, so this can never overflow the frame.
    let _ = writeln!(frame, "{}{}", SYNC_HEADER as char, epoch_secs);
    frame
}

pub fn send_sync<W: Write>(port: &mut W, epoch_secs: u32) -> Result<(), W::Error> {
    port.write_all(encode_sync(epoch_secs).as_bytes())?;
    port.flush()
}

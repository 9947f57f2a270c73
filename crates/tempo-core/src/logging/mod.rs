//! Durable, rotating record log on removable storage.

pub mod manager;
pub mod record;
pub mod sd_card;
pub mod storage;

pub use manager::*;
pub use record::{LogRecord, RecordLine, UNAVAILABLE};
pub use sd_card::{ClockTimeSource, SdCardStorage};
pub use storage::LogStorage;

use thiserror_no_std::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogError {
    #[error("failed to open log file")]
    OpenFailed,
    #[error("no log file open, record dropped")]
    NoSession,
    #[error("failed to append record")]
    WriteFailed,
    #[error("failed to flush log file")]
    FlushFailed,
    #[error("record does not fit the line buffer")]
    Format,
}

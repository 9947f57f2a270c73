//! Tunables for the logger, persisted as a postcard blob.

use alloc::vec::Vec;

use embassy_time::Duration;
use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

/// Ring capacity used by the binaries: one second of samples at 10 ms.
pub const DEFAULT_SAMPLE_CAPACITY: usize = 100;

/// Shortest allowed rotation interval. Rotated file names resolve to the
/// minute, so anything shorter would reopen the same file.
pub const MIN_ROTATION_INTERVAL_SECS: u32 = 60;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config blob could not be decoded")]
    Decode,
    #[error("config blob could not be encoded")]
    Encode,
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct LoggerConfig {
    /// A time fix younger than this may prime the discipline engine.
    pub fix_freshness_ms: u32,
    /// A location younger than this is written to records; older ones log as
    /// `NA`. Both the time fix and the location must pass this gate. Set it
    /// equal to `fix_freshness_ms` to use one staleness threshold for both
    /// clock priming and coordinates.
    pub position_freshness_ms: u32,
    /// Minimum spacing between two clock commits.
    pub resync_interval_ms: u32,
    /// A clock reading before this year forces an immediate resync.
    pub valid_epoch_year: u16,
    /// Period of the analog capture interrupt.
    pub sample_period_ms: u32,
    /// Age at which the open log file is closed and a new one started.
    pub rotation_interval_secs: u32,
    /// Number of appended records between durability flushes.
    pub flush_threshold: u16,
    /// Multiplier from raw ADC counts to the logged unit.
    pub value_scale: f32,
    /// Address of the logging flag in the persisted byte store.
    pub flag_address: u16,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            fix_freshness_ms: 500,
            position_freshness_ms: 2000,
            resync_interval_ms: 10_000,
            valid_epoch_year: 2024,
            sample_period_ms: 10,
            rotation_interval_secs: 3600,
            flush_threshold: 10,
            value_scale: 3.3 / 4095.0,
            flag_address: 0,
        }
    }
}

impl LoggerConfig {
    /// Decode and validate a postcard-encoded config.
    pub fn from_postcard(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_postcard(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fix_freshness_ms == 0 {
            return Err(ConfigError::Invalid("fix_freshness_ms must be non-zero"));
        }
        if self.sample_period_ms == 0 {
            return Err(ConfigError::Invalid("sample_period_ms must be non-zero"));
        }
        if self.rotation_interval_secs < MIN_ROTATION_INTERVAL_SECS {
            return Err(ConfigError::Invalid("rotation_interval_secs below 60"));
        }
        if self.flush_threshold == 0 {
            return Err(ConfigError::Invalid("flush_threshold must be non-zero"));
        }
        if !self.value_scale.is_finite() {
            return Err(ConfigError::Invalid("value_scale must be finite"));
        }
        Ok(())
    }

    pub fn resync_interval(&self) -> Duration {
        Duration::from_millis(self.resync_interval_ms as u64)
    }

    pub fn sample_period(&self) -> Duration {
        Duration::from_millis(self.sample_period_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(LoggerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_postcard_round_trip() {
        let config = LoggerConfig {
            rotation_interval_secs: 900,
            flush_threshold: 4,
            ..LoggerConfig::default()
        };

        let bytes = config.to_postcard().unwrap();
        assert_eq!(LoggerConfig::from_postcard(&bytes), Ok(config));
    }

    #[test]
    fn test_rejects_short_rotation() {
        let config = LoggerConfig {
            rotation_interval_secs: 30,
            ..LoggerConfig::default()
        };
        let bytes = config.to_postcard().unwrap();

        assert!(matches!(
            LoggerConfig::from_postcard(&bytes),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_rejects_zero_flush_threshold() {
        let config = LoggerConfig {
            flush_threshold: 0,
            ..LoggerConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_truncated_blob_is_decode_error() {
        let bytes = LoggerConfig::default().to_postcard().unwrap();

        assert_eq!(
            LoggerConfig::from_postcard(&bytes[..3]),
            Err(ConfigError::Decode)
        );
    }
}

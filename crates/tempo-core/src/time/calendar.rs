//! Proleptic Gregorian calendar arithmetic on epoch seconds.
//!
//! Epoch values are `u32` seconds since 1970-01-01T00:00:00Z, the same
//! representation the storage layer uses for timestamps.

use core::fmt;

const SECS_PER_DAY: u32 = 86_400;

/// Days between 0000-03-01 and 1970-01-01 in the shifted-era calendar.
const UNIX_EPOCH_DAYS: i64 = 719_468;
const DAYS_PER_ERA: i64 = 146_097;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: u16,
    pub month: u8,
    pub day: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateTime {
    pub date: Date,
    pub time: TimeOfDay,
}

pub const fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub const fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Days since the unix epoch for a civil date.
fn days_from_civil(year: i64, month: i64, day: i64) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = (if year >= 0 { year } else { year - 399 }) / 400;
    let year_of_era = year - era * 400;
    let shifted_month = (month + 9) % 12;
    let day_of_year = (153 * shifted_month + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * DAYS_PER_ERA + day_of_era - UNIX_EPOCH_DAYS
}

/// Civil date for a day count since the unix epoch.
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let days = days + UNIX_EPOCH_DAYS;
    let era = (if days >= 0 { days } else { days - (DAYS_PER_ERA - 1) }) / DAYS_PER_ERA;
    let day_of_era = days - era * DAYS_PER_ERA;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let shifted_month = (5 * day_of_year + 2) / 153;
    let day = (day_of_year - (153 * shifted_month + 2) / 5 + 1) as u8;
    let month = (if shifted_month < 10 {
        shifted_month + 3
    } else {
        shifted_month - 9
    }) as u8;
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

impl DateTime {
    pub const fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            date: Date { year, month, day },
            time: TimeOfDay {
                hour,
                minute,
                second,
            },
        }
    }

    /// Checks field ranges. Leap seconds (`second == 60`) are rejected.
    pub fn is_valid(&self) -> bool {
        let Date { year, month, day } = self.date;
        (1..=12).contains(&month)
            && day >= 1
            && day <= days_in_month(year, month)
            && self.time.hour < 24
            && self.time.minute < 60
            && self.time.second < 60
    }

    /// Seconds since the unix epoch, or `None` when the fields are out of
    /// range or the instant is not representable as `u32`.
    pub fn to_epoch(&self) -> Option<u32> {
        if !self.is_valid() {
            return None;
        }

        let days = days_from_civil(
            self.date.year as i64,
            self.date.month as i64,
            self.date.day as i64,
        );
        let secs = days * SECS_PER_DAY as i64
            + self.time.hour as i64 * 3600
            + self.time.minute as i64 * 60
            + self.time.second as i64;

        u32::try_from(secs).ok()
    }

    pub fn from_epoch(secs: u32) -> Self {
        let (year, month, day) = civil_from_days((secs / SECS_PER_DAY) as i64);
        let rem = secs % SECS_PER_DAY;

        Self::new(
            year as u16,
            month,
            day,
            (rem / 3600) as u8,
            (rem % 3600 / 60) as u8,
            (rem % 60) as u8,
        )
    }
}

/// ISO-8601 in UTC, e.g. `2024-05-01T12:30:05Z`.
impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}Z",
            self.date.year,
            self.date.month,
            self.date.day,
            self.time.hour,
            self.time.minute,
            self.time.second
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_unix_epoch_origin() {
        assert_eq!(DateTime::new(1970, 1, 1, 0, 0, 0).to_epoch(), Some(0));
        assert_eq!(DateTime::from_epoch(0), DateTime::new(1970, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_known_instants() {
        assert_eq!(
            DateTime::new(2000, 3, 1, 0, 0, 0).to_epoch(),
            Some(951_868_800)
        );
        assert_eq!(
            DateTime::new(2024, 2, 29, 12, 0, 0).to_epoch(),
            Some(1_709_208_000)
        );
        assert_eq!(
            DateTime::from_epoch(1_709_208_000),
            DateTime::new(2024, 2, 29, 12, 0, 0)
        );
    }

    #[test]
    fn test_year_boundary() {
        let new_year = DateTime::new(2025, 1, 1, 0, 0, 0).to_epoch().unwrap();
        assert_eq!(
            DateTime::from_epoch(new_year - 1),
            DateTime::new(2024, 12, 31, 23, 59, 59)
        );
    }

    #[test]
    fn test_leap_rules() {
        assert!(is_leap_year(2000));
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(1900));
        assert!(!is_leap_year(2023));
        assert_eq!(days_in_month(2023, 2), 28);
        assert_eq!(days_in_month(2024, 2), 29);
    }

    #[test]
    fn test_invalid_fields_have_no_epoch() {
        assert_eq!(DateTime::new(2023, 2, 29, 0, 0, 0).to_epoch(), None);
        assert_eq!(DateTime::new(2024, 13, 1, 0, 0, 0).to_epoch(), None);
        assert_eq!(DateTime::new(2024, 1, 1, 24, 0, 0).to_epoch(), None);
        assert_eq!(DateTime::new(2024, 1, 1, 0, 0, 60).to_epoch(), None);
        assert_eq!(DateTime::new(1969, 12, 31, 23, 59, 59).to_epoch(), None);
    }

    #[test]
    fn test_display_is_iso8601() {
        let dt = DateTime::new(2024, 5, 1, 12, 30, 5);
        assert_eq!(dt.to_string(), "2024-05-01T12:30:05Z");
    }
}

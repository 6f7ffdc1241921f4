//! Time-to-live encoding.
//!
//! A TTL is two bytes on disk: a count and a unit. All arithmetic on TTLs
//! goes through minutes so callers never touch the packed representation.

use crate::error::{CoreError, CoreResult};
use std::fmt;

const MINUTES_PER_DAY: u64 = 24 * 60;

/// Unit of a [`Ttl`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TtlUnit {
    /// No TTL.
    Empty = 0,
    /// Minutes (`m`).
    Minute = 1,
    /// Hours (`h`).
    Hour = 2,
    /// Days (`d`).
    Day = 3,
    /// Weeks (`w`).
    Week = 4,
    /// 30-day months (`M`).
    Month = 5,
    /// 365-day years (`y`).
    Year = 6,
}

impl TtlUnit {
    const DESCENDING: [TtlUnit; 6] = [
        TtlUnit::Year,
        TtlUnit::Month,
        TtlUnit::Week,
        TtlUnit::Day,
        TtlUnit::Hour,
        TtlUnit::Minute,
    ];

    /// Length of one unit in minutes.
    #[must_use]
    pub const fn minutes(self) -> u64 {
        match self {
            Self::Empty => 0,
            Self::Minute => 1,
            Self::Hour => 60,
            Self::Day => MINUTES_PER_DAY,
            Self::Week => 7 * MINUTES_PER_DAY,
            Self::Month => 30 * MINUTES_PER_DAY,
            Self::Year => 365 * MINUTES_PER_DAY,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Empty),
            1 => Some(Self::Minute),
            2 => Some(Self::Hour),
            3 => Some(Self::Day),
            4 => Some(Self::Week),
            5 => Some(Self::Month),
            6 => Some(Self::Year),
            _ => None,
        }
    }

    fn from_suffix(c: char) -> Option<Self> {
        match c {
            'm' => Some(Self::Minute),
            'h' => Some(Self::Hour),
            'd' => Some(Self::Day),
            'w' => Some(Self::Week),
            'M' => Some(Self::Month),
            'y' => Some(Self::Year),
            _ => None,
        }
    }

    fn suffix(self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::Minute => "m",
            Self::Hour => "h",
            Self::Day => "d",
            Self::Week => "w",
            Self::Month => "M",
            Self::Year => "y",
        }
    }
}

/// A needle or volume time-to-live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ttl {
    count: u8,
    unit: TtlUnit,
}

impl Default for Ttl {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl Ttl {
    /// The "no TTL" sentinel.
    pub const EMPTY: Self = Self {
        count: 0,
        unit: TtlUnit::Empty,
    };

    /// Creates a TTL; a zero count or empty unit yields [`Ttl::EMPTY`].
    #[must_use]
    pub const fn new(count: u8, unit: TtlUnit) -> Self {
        if count == 0 || matches!(unit, TtlUnit::Empty) {
            Self::EMPTY
        } else {
            Self { count, unit }
        }
    }

    /// Parses strings such as `3d`, `12h` or `""`; a bare number is minutes.
    ///
    /// Counts above 255 are re-expressed in a larger unit.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown unit or a malformed count.
    pub fn parse(s: &str) -> CoreResult<Self> {
        let s = s.trim();
        let Some(last) = s.chars().last() else {
            return Ok(Self::EMPTY);
        };
        let (count_str, unit) = if last.is_ascii_digit() {
            (s, TtlUnit::Minute)
        } else {
            let unit = TtlUnit::from_suffix(last)
                .ok_or_else(|| CoreError::invalid_format(format!("unknown ttl unit in {s:?}")))?;
            (&s[..s.len() - last.len_utf8()], unit)
        };
        let count: u64 = count_str
            .parse()
            .map_err(|_| CoreError::invalid_format(format!("invalid ttl count in {s:?}")))?;
        Ok(Self::from_minutes(count.saturating_mul(unit.minutes())))
    }

    /// Re-expresses a duration in minutes, preferring the largest unit that
    /// represents it exactly. Durations no unit fits exactly are rounded
    /// down to the longest TTL not exceeding them, so a needle never
    /// outlives its original expiry.
    #[must_use]
    pub fn from_minutes(minutes: u64) -> Self {
        if minutes == 0 {
            return Self::EMPTY;
        }
        for unit in TtlUnit::DESCENDING {
            let per = unit.minutes();
            if minutes % per == 0 && minutes / per <= u64::from(u8::MAX) {
                return Self::new((minutes / per) as u8, unit);
            }
        }
        let mut best = Self::EMPTY;
        for unit in TtlUnit::DESCENDING {
            let count = (minutes / unit.minutes()).min(u64::from(u8::MAX)) as u8;
            let candidate = Self::new(count, unit);
            if candidate.to_minutes() > best.to_minutes() {
                best = candidate;
            }
        }
        best
    }

    /// Creates a TTL of `days` days.
    #[must_use]
    pub fn from_days(days: u64) -> Self {
        Self::from_minutes(days.saturating_mul(MINUTES_PER_DAY))
    }

    /// Decodes the two-byte on-disk form.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown unit byte.
    pub fn from_bytes(bytes: [u8; 2]) -> CoreResult<Self> {
        let unit = TtlUnit::from_byte(bytes[1])
            .ok_or_else(|| CoreError::invalid_format(format!("unknown ttl unit {}", bytes[1])))?;
        Ok(Self::new(bytes[0], unit))
    }

    /// Encodes the two-byte on-disk form.
    #[must_use]
    pub const fn to_bytes(self) -> [u8; 2] {
        [self.count, self.unit as u8]
    }

    /// Returns the count.
    #[must_use]
    pub const fn count(self) -> u8 {
        self.count
    }

    /// Returns the unit.
    #[must_use]
    pub const fn unit(self) -> TtlUnit {
        self.unit
    }

    /// Returns true for [`Ttl::EMPTY`].
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.count == 0
    }

    /// Total length in minutes.
    #[must_use]
    pub const fn to_minutes(self) -> u64 {
        self.count as u64 * self.unit.minutes()
    }

    /// Whole days covered by this TTL.
    #[must_use]
    pub const fn days(self) -> u64 {
        self.to_minutes() / MINUTES_PER_DAY
    }

    /// Returns the TTL left after a needle has been stored for
    /// `stored_days` whole days; never negative.
    #[must_use]
    pub fn aged(self, stored_days: u64) -> Self {
        let elapsed = stored_days.saturating_mul(MINUTES_PER_DAY);
        Self::from_minutes(self.to_minutes().saturating_sub(elapsed))
    }
}

impl fmt::Display for Ttl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return Ok(());
        }
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn parse_units() {
        assert_eq!(Ttl::parse("3d").unwrap(), Ttl::new(3, TtlUnit::Day));
        assert_eq!(Ttl::parse("12h").unwrap(), Ttl::new(12, TtlUnit::Hour));
        assert_eq!(Ttl::parse("2w").unwrap(), Ttl::new(2, TtlUnit::Week));
        assert_eq!(Ttl::parse("1M").unwrap(), Ttl::new(1, TtlUnit::Month));
        assert_eq!(Ttl::parse("5").unwrap(), Ttl::new(5, TtlUnit::Minute));
        assert_eq!(Ttl::parse("").unwrap(), Ttl::EMPTY);
        assert_eq!(Ttl::parse("0d").unwrap(), Ttl::EMPTY);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(Ttl::parse("3x").is_err());
        assert!(Ttl::parse("d").is_err());
    }

    #[test]
    fn large_counts_move_to_larger_unit() {
        assert_eq!(Ttl::parse("300d").unwrap(), Ttl::new(10, TtlUnit::Month));
        assert_eq!(Ttl::from_days(365), Ttl::new(1, TtlUnit::Year));
    }

    #[test]
    fn inexact_durations_round_down() {
        // 257 days: no unit is exact within a byte count
        assert_eq!(Ttl::from_days(257), Ttl::new(255, TtlUnit::Day));
        // 297 days: 42 weeks is the closest fit below
        assert_eq!(Ttl::from_days(297), Ttl::new(42, TtlUnit::Week));
        assert_eq!(Ttl::from_minutes(u64::MAX), Ttl::new(255, TtlUnit::Year));
    }

    #[test]
    fn aged_months_never_outlive_original_expiry() {
        let ttl = Ttl::new(10, TtlUnit::Month);
        let aged = ttl.aged(3);
        assert!(aged.days() <= 297);
        assert_eq!(aged, Ttl::new(42, TtlUnit::Week));
    }

    #[test]
    fn bytes_roundtrip() {
        let ttl = Ttl::new(7, TtlUnit::Day);
        assert_eq!(ttl.to_bytes(), [7, 3]);
        assert_eq!(Ttl::from_bytes([7, 3]).unwrap(), ttl);
        assert!(Ttl::from_bytes([1, 9]).is_err());
    }

    #[test]
    fn aging_subtracts_whole_days() {
        let ttl = Ttl::new(10, TtlUnit::Day);
        assert_eq!(ttl.aged(3), Ttl::new(1, TtlUnit::Week));
        assert_eq!(ttl.aged(4), Ttl::new(6, TtlUnit::Day));
        assert_eq!(ttl.aged(10), Ttl::EMPTY);
        assert_eq!(ttl.aged(400), Ttl::EMPTY);
        assert_eq!(ttl.aged(0), ttl);
    }

    #[test]
    fn display() {
        assert_eq!(Ttl::new(3, TtlUnit::Day).to_string(), "3d");
        assert_eq!(Ttl::EMPTY.to_string(), "");
    }

    proptest! {
        #[test]
        fn from_minutes_never_exceeds_input(minutes in 1u64..100_000_000) {
            let ttl = Ttl::from_minutes(minutes);
            prop_assert!(!ttl.is_empty());
            prop_assert!(ttl.to_minutes() <= minutes);
        }

        #[test]
        fn aging_never_goes_negative(days in 1u8..=255, stored in 0u64..1000) {
            let ttl = Ttl::new(days, TtlUnit::Day);
            let aged = ttl.aged(stored);
            if stored >= u64::from(days) {
                prop_assert!(aged.is_empty());
            } else {
                prop_assert_eq!(aged.days(), u64::from(days) - stored);
            }
        }
    }
}

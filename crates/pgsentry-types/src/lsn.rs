//! PostgreSQL log sequence numbers and timelines.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A PostgreSQL LSN, stored as the flat byte offset PostgreSQL itself uses
/// internally (`file_id << 32 | file_offset`).
///
/// PostgreSQL prints LSNs as `XXXXXXXX/XXXXXXXX` (two hex words). `Lsn`
/// parses and renders that form so it round-trips through
/// `pg_current_wal_lsn()` / `pg_last_wal_replay_lsn()` without losing
/// precision to floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Lsn(pub u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    #[must_use]
    pub fn new(value: u64) -> Self {
        Lsn(value)
    }

    /// Byte distance `self - other`, as `pg_wal_lsn_diff` computes it.
    /// Negative when `self` is behind `other`.
    #[must_use]
    pub fn diff(self, other: Lsn) -> i64 {
        self.0 as i64 - other.0 as i64
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}/{:08X}", self.0 >> 32, self.0 & 0xFFFF_FFFF)
    }
}

/// Error returned when parsing a malformed LSN string.
#[derive(Debug, thiserror::Error)]
#[error("invalid LSN string: {0}")]
pub struct ParseLsnError(String);

impl FromStr for Lsn {
    type Err = ParseLsnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (hi, lo) = s.split_once('/').ok_or_else(|| ParseLsnError(s.to_string()))?;
        let hi = u64::from_str_radix(hi, 16).map_err(|_| ParseLsnError(s.to_string()))?;
        let lo = u64::from_str_radix(lo, 16).map_err(|_| ParseLsnError(s.to_string()))?;
        Ok(Lsn((hi << 32) | lo))
    }
}

impl TryFrom<String> for Lsn {
    type Error = ParseLsnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Lsn> for String {
    fn from(value: Lsn) -> Self {
        value.to_string()
    }
}

/// PostgreSQL timeline ID. Incremented by exactly one on every promotion;
/// used to detect divergent histories (spec invariant I3: nondecreasing in
/// the DCS).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timeline(pub u32);

impl Timeline {
    #[must_use]
    pub fn next(self) -> Timeline {
        Timeline(self.0 + 1)
    }
}

impl fmt::Display for Timeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Timeline {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Timeline(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lsn_round_trips_through_display_and_parse() {
        let lsn = Lsn::new(0x1_0000_0001);
        let text = lsn.to_string();
        assert_eq!(text, "1/00000001");
        assert_eq!(text.parse::<Lsn>().unwrap(), lsn);
    }

    #[test]
    fn lsn_diff_is_signed() {
        let ahead = Lsn::new(200);
        let behind = Lsn::new(150);
        assert_eq!(ahead.diff(behind), 50);
        assert_eq!(behind.diff(ahead), -50);
    }

    #[test]
    fn lsn_ordering_matches_numeric_value() {
        assert!(Lsn::new(10) < Lsn::new(20));
    }

    #[test]
    fn timeline_next_increments_by_one() {
        assert_eq!(Timeline(4).next(), Timeline(5));
    }
}

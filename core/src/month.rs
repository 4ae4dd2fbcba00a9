//! Calendar month value type.
//!
//! Every period in the engine is a `YYYY-MM` month. Parsing happens once at
//! the boundary; everything downstream works with the typed value.

use crate::error::{EngineError, EngineResult};
use chrono::Datelike;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Month {
    year: i32,
    month: u32, // 1..=12
}

impl Month {
    pub fn new(year: i32, month: u32) -> EngineResult<Self> {
        if !(1..=12).contains(&month) {
            return Err(EngineError::MalformedMonth {
                input: format!("{year:04}-{month:02}"),
            });
        }
        Ok(Self { year, month })
    }

    /// Parse a `YYYY-MM` string. Anything else is a `MalformedMonth` error.
    pub fn parse(input: &str) -> EngineResult<Self> {
        let malformed = || EngineError::MalformedMonth {
            input: input.to_string(),
        };
        let (y, m) = input.split_once('-').ok_or_else(malformed)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(malformed());
        }
        let year: i32 = y.parse().map_err(|_| malformed())?;
        let month: u32 = m.parse().map_err(|_| malformed())?;
        Self::new(year, month).map_err(|_| malformed())
    }

    /// The current calendar month in local time.
    pub fn current() -> Self {
        let now = chrono::Local::now();
        Self {
            year: now.year(),
            month: now.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// The immediately preceding calendar month, handling year rollover.
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// Inclusive trailing window ending at `self`, ascending order.
    /// `trailing_window(12)` on 2025-06 yields 2024-07 ..= 2025-06.
    pub fn trailing_window(&self, len: usize) -> Vec<Month> {
        let mut window = Vec::with_capacity(len);
        let mut cursor = *self;
        for _ in 0..len {
            window.push(cursor);
            cursor = cursor.prev();
        }
        window.reverse();
        window
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for Month {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Month {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Month {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Month::parse(&raw).map_err(serde::de::Error::custom)
    }
}

// Months travel to and from SQLite as TEXT, so lexicographic ordering in
// queries matches chronological ordering.
impl ToSql for Month {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.to_string()))
    }
}

impl FromSql for Month {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Month::parse(text).map_err(|e| FromSqlError::Other(Box::new(e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays() {
        let m = Month::parse("2025-07").unwrap();
        assert_eq!(m.year(), 2025);
        assert_eq!(m.month(), 7);
        assert_eq!(m.to_string(), "2025-07");
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["2025", "2025-13", "2025-00", "25-07", "2025-7", "abc-de", ""] {
            assert!(
                Month::parse(bad).is_err(),
                "expected '{bad}' to be rejected"
            );
        }
    }

    #[test]
    fn prev_handles_year_rollover() {
        let jan = Month::parse("2025-01").unwrap();
        assert_eq!(jan.prev().to_string(), "2024-12");
        let jul = Month::parse("2025-07").unwrap();
        assert_eq!(jul.prev().to_string(), "2025-06");
    }

    #[test]
    fn trailing_window_is_inclusive_and_ascending() {
        let m = Month::parse("2025-06").unwrap();
        let window = m.trailing_window(12);
        assert_eq!(window.len(), 12);
        assert_eq!(window.first().unwrap().to_string(), "2024-07");
        assert_eq!(window.last().unwrap().to_string(), "2025-06");
        assert!(window.windows(2).all(|w| w[0] < w[1]));
    }
}

use std::fmt;

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

use crate::error::TypeError;

/// Number of characters in a file timestamp (`yyyyMMddHHmmssSSS`).
pub const FILE_TIMESTAMP_LEN: usize = 17;

const FORMAT: &str = "%Y%m%d%H%M%S%3f";

/// Millisecond-precision UTC timestamp as embedded in event file names.
///
/// Formatted as `yyyyMMddHHmmssSSS` with no separators, always exactly
/// [`FILE_TIMESTAMP_LEN`] characters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileTimestamp(DateTime<Utc>);

impl FileTimestamp {
    /// Wrap an instant, truncating it to millisecond precision.
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self(instant.trunc_subsecs(3))
    }

    /// Parse the 17-digit form. Any other length fails.
    pub fn parse(value: &str) -> Result<Self, TypeError> {
        let invalid = |reason: &str| TypeError::InvalidTimestamp {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if value.len() != FILE_TIMESTAMP_LEN {
            return Err(invalid("expected exactly 17 digits"));
        }
        if !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("non-digit character"));
        }

        let datetime = NaiveDateTime::parse_from_str(value, FORMAT)
            .map_err(|e| invalid(&e.to_string()))?;

        Ok(Self(datetime.and_utc()))
    }

    /// The wrapped instant.
    pub fn instant(&self) -> DateTime<Utc> {
        self.0
    }
}

impl From<DateTime<Utc>> for FileTimestamp {
    fn from(instant: DateTime<Utc>) -> Self {
        Self::new(instant)
    }
}

impl fmt::Display for FileTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(FORMAT))
    }
}

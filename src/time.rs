use std::fmt;
use std::ops;
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{Error, Result};

/// A point in time, stored as milliseconds since the UNIX epoch.
///
/// The trust layer only ever compares times, windows them, and carries them
/// on the wire, so a single signed millisecond count is all it needs. Wire
/// form is an 8-byte big-endian i64.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    /// Encoded size in bytes.
    pub const WIRE_LEN: usize = 8;

    /// One second, as a span in milliseconds.
    pub const SECOND: i64 = 1_000;
    pub const MINUTE: i64 = 60 * Self::SECOND;
    pub const HOUR: i64 = 60 * Self::MINUTE;
    pub const DAY: i64 = 24 * Self::HOUR;
    /// One non-leap year.
    pub const YEAR: i64 = 365 * Self::DAY;

    pub fn from_millis(millis: i64) -> Time {
        Time(millis)
    }

    pub fn millis(self) -> i64 {
        self.0
    }

    /// The current system time. Clamps to the epoch if the system clock is
    /// set before 1970.
    pub fn now() -> Time {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Time(millis)
    }

    pub fn min_value() -> Time {
        Time(i64::MIN)
    }

    pub fn max_value() -> Time {
        Time(i64::MAX)
    }

    /// Append the 8-byte wire form onto a byte vector.
    pub fn encode_vec(&self, vec: &mut Vec<u8>) {
        vec.extend_from_slice(&self.0.to_be_bytes());
    }

    /// Read the 8-byte wire form from the start of a buffer.
    pub fn decode(mut buf: &[u8]) -> Result<Time> {
        let millis = buf
            .read_i64::<BigEndian>()
            .map_err(|_| Error::LengthTooShort {
                step: "decode time",
                actual: buf.len(),
                expected: Self::WIRE_LEN,
            })?;
        Ok(Time(millis))
    }
}

impl ops::Add<i64> for Time {
    type Output = Time;
    fn add(self, span: i64) -> Time {
        Time(self.0.saturating_add(span))
    }
}

impl ops::Sub<i64> for Time {
    type Output = Time;
    fn sub(self, span: i64) -> Time {
        Time(self.0.saturating_sub(span))
    }
}

impl ops::Sub<Time> for Time {
    type Output = i64;
    fn sub(self, other: Time) -> i64 {
        self.0.saturating_sub(other.0)
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

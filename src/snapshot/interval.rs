//! Bucket interval literals such as `30m`, `12h` or `6M`.
//!
//! The unit is always the last character and is case-sensitive: `m` is a
//! minute, `M` is a month (30 days). A year is 365 days.

use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use chrono::Duration;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::result;
use std::str::FromStr;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;
const WEEK: i64 = 7 * DAY;
const MONTH: i64 = 30 * DAY;
const YEAR: i64 = 365 * DAY;

/// Largest unit first, so `Display` picks the shortest exact spelling.
const UNITS: [(char, i64); 7] = [
    ('y', YEAR),
    ('M', MONTH),
    ('w', WEEK),
    ('d', DAY),
    ('h', HOUR),
    ('m', MINUTE),
    ('s', 1),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketInterval(Duration);

impl BucketInterval {
    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl From<BucketInterval> for Duration {
    fn from(value: BucketInterval) -> Self {
        value.0
    }
}

impl FromStr for BucketInterval {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidInterval {
            text: s.to_string(),
            reason: reason.to_string(),
        };
        let Some(unit) = s.chars().last() else {
            return Err(invalid("cannot be blank"));
        };
        let number = &s[..s.len() - unit.len_utf8()];
        let n: i64 = number
            .parse()
            .map_err(|e: std::num::ParseIntError| invalid(&e.to_string()))?;
        if n < 0 {
            return Err(invalid("must not be negative"));
        }
        let seconds = UNITS
            .iter()
            .find(|(c, _)| *c == unit)
            .map(|(_, secs)| *secs)
            .ok_or_else(|| invalid(&format!("invalid unit: {unit:?}")))?;
        n.checked_mul(seconds)
            .and_then(Duration::try_seconds)
            .map(BucketInterval)
            .ok_or_else(|| invalid("out of range"))
    }
}

impl Display for BucketInterval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let secs = self.0.num_seconds();
        let (unit, size) = UNITS
            .iter()
            .find(|(_, size)| secs != 0 && secs % size == 0)
            .copied()
            .unwrap_or(('s', 1));
        write!(f, "{}{}", secs / size, unit)
    }
}

impl Serialize for BucketInterval {
    fn serialize<S: Serializer>(&self, serializer: S) -> result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct BucketIntervalVisitor;

impl Visitor<'_> for BucketIntervalVisitor {
    type Value = BucketInterval;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("an interval like \"90s\", \"12h\" or \"6M\"")
    }

    fn visit_str<E>(self, v: &str) -> result::Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.parse().map_err(serde::de::Error::custom)
    }
}

impl<'de> Deserialize<'de> for BucketInterval {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> result::Result<Self, D::Error> {
        deserializer.deserialize_str(BucketIntervalVisitor)
    }
}

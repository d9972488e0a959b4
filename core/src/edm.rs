// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Edm primitive wrappers
//!
//! Typed wrappers for the OData Edm primitives that appear in query
//! literals and entity metadata:
//! - [`EdmDateTimeOffset`]: `Edm.DateTimeOffset`, wraps `time::OffsetDateTime`
//!   and (de)serializes using RFC 3339. Display always uses canonical
//!   RFC 3339 formatting; `+00:00` is rendered as `Z` while non-UTC
//!   offsets are preserved.
//! - [`EdmDate`]: `Edm.Date`, calendar date in `yyyy-MM-dd` form.
//! - [`EdmTimeOfDay`]: `Edm.TimeOfDay`, wall-clock time in
//!   `HH:mm:ss[.fff]` form.
//!
//! `Edm.Guid` is represented directly by `uuid::Uuid` and `Edm.Decimal`
//! by `rust_decimal::Decimal`; neither needs a wrapper here.
//!
//! Examples
//! ```rust
//! use datasync_core::EdmDateTimeOffset;
//! use std::str::FromStr;
//!
//! let z = EdmDateTimeOffset::from_str("2024-08-23T20:22:54.291Z").unwrap();
//! assert_eq!(z.unix_millis(), 1724444574291);
//! assert_eq!(z.to_string(), "2024-08-23T20:22:54.291Z");
//! ```

use core::convert::TryFrom;
use core::str::FromStr;
use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Display;
use std::fmt::Error as FmtError;
use std::fmt::Formatter;
use std::fmt::Result as FmtResult;
use time::format_description::well_known::Rfc3339;
use time::{Date, Month, OffsetDateTime, Time};

/// Type corresponding to `Edm.DateTimeOffset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EdmDateTimeOffset(#[serde(with = "time::serde::rfc3339")] OffsetDateTime);

impl EdmDateTimeOffset {
    /// The current instant in UTC.
    #[must_use]
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Construct from milliseconds since the Unix epoch.
    ///
    /// Fails when the value is outside the representable calendar range.
    pub fn from_unix_millis(millis: i64) -> Result<Self, EdmError> {
        let nanos = i128::from(millis) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos)
            .map(Self)
            .map_err(|_| EdmError::OutOfRange(millis))
    }

    /// Milliseconds since the Unix epoch, truncating sub-millisecond digits.
    #[must_use]
    pub fn unix_millis(&self) -> i64 {
        (self.0.unix_timestamp_nanos() / 1_000_000) as i64
    }
}

impl From<OffsetDateTime> for EdmDateTimeOffset {
    fn from(dt: OffsetDateTime) -> Self {
        Self(dt)
    }
}

impl From<EdmDateTimeOffset> for OffsetDateTime {
    fn from(w: EdmDateTimeOffset) -> Self {
        w.0
    }
}

impl Display for EdmDateTimeOffset {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let s = self.0.format(&Rfc3339).map_err(|_| FmtError)?;
        f.write_str(&s)
    }
}

#[allow(clippy::absolute_paths)]
impl FromStr for EdmDateTimeOffset {
    type Err = EdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = OffsetDateTime::parse(s, &Rfc3339)
            .map_err(|_| EdmError::BadLiteral("Edm.DateTimeOffset", s.to_string()))?;
        Ok(Self(dt))
    }
}

/// Type corresponding to `Edm.Date`, `yyyy-MM-dd`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdmDate(Date);

impl From<Date> for EdmDate {
    fn from(d: Date) -> Self {
        Self(d)
    }
}

impl From<EdmDate> for Date {
    fn from(w: EdmDate) -> Self {
        w.0
    }
}

impl Display for EdmDate {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl FromStr for EdmDate {
    type Err = EdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || EdmError::BadLiteral("Edm.Date", s.to_string());
        let mut parts = s.splitn(3, '-');
        let year: i32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let month: u8 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let day: u8 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let month = Month::try_from(month).map_err(|_| bad())?;
        let date = Date::from_calendar_date(year, month, day).map_err(|_| bad())?;
        Ok(Self(date))
    }
}

impl Serialize for EdmDate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EdmDate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}

/// Type corresponding to `Edm.TimeOfDay`, `HH:mm:ss[.fff]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdmTimeOfDay(Time);

impl From<Time> for EdmTimeOfDay {
    fn from(t: Time) -> Self {
        Self(t)
    }
}

impl From<EdmTimeOfDay> for Time {
    fn from(w: EdmTimeOfDay) -> Self {
        w.0
    }
}

impl Display for EdmTimeOfDay {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let millis = self.0.millisecond();
        if millis == 0 {
            write!(
                f,
                "{:02}:{:02}:{:02}",
                self.0.hour(),
                self.0.minute(),
                self.0.second()
            )
        } else {
            write!(
                f,
                "{:02}:{:02}:{:02}.{:03}",
                self.0.hour(),
                self.0.minute(),
                self.0.second(),
                millis
            )
        }
    }
}

impl FromStr for EdmTimeOfDay {
    type Err = EdmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || EdmError::BadLiteral("Edm.TimeOfDay", s.to_string());
        let (clock, fraction) = match s.find('.') {
            Some(idx) => (&s[..idx], Some(&s[idx + 1..])),
            None => (s, None),
        };
        let mut parts = clock.splitn(3, ':');
        let hour: u8 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let minute: u8 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let second: u8 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let millis: u16 = match fraction {
            None => 0,
            Some(frac) if !frac.is_empty() && frac.len() <= 3 => {
                let digits: u16 = frac.parse().map_err(|_| bad())?;
                // ".5" means 500ms, ".05" means 50ms
                digits * 10_u16.pow(3 - frac.len() as u32)
            }
            Some(_) => return Err(bad()),
        };
        let time = Time::from_hms_milli(hour, minute, second, millis).map_err(|_| bad())?;
        Ok(Self(time))
    }
}

impl Serialize for EdmTimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for EdmTimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(DeError::custom)
    }
}

/// Errors produced while parsing or constructing Edm primitives.
#[derive(Debug)]
pub enum EdmError {
    BadLiteral(&'static str, String),
    OutOfRange(i64),
}

impl Display for EdmError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::BadLiteral(ty, lit) => write!(f, "invalid {} literal: {:?}", ty, lit),
            Self::OutOfRange(ms) => write!(f, "timestamp out of range: {}ms", ms),
        }
    }
}

#[allow(clippy::absolute_paths)]
impl std::error::Error for EdmError {}

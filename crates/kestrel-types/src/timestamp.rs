use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{TypeError, TypeResult};

const NANOS_PER_SEC: i64 = 1_000_000_000;

/// Zone-less HTTP date forms, always read as UTC: ANSI C `asctime` and RFC 850.
const NAIVE_DATE_FORMATS: [&str; 2] = ["%a %b %e %H:%M:%S %Y", "%A, %d-%b-%y %H:%M:%S GMT"];

/// Nanosecond-precision point in time since the UNIX epoch.
///
/// This is the value the index database orders commits by. Its canonical
/// text form is ten integer digits, a dot, and five fractional digits
/// (`1500000000.00000`), the format carried in `X-Timestamp`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Create a timestamp from nanoseconds since the epoch.
    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    /// Nanoseconds since the epoch.
    pub fn as_nanos(&self) -> i64 {
        self.0
    }

    /// Parse a timestamp from any supported representation.
    ///
    /// Accepts decimal seconds (`1500000000.12345`, up to nanosecond
    /// precision, extra digits truncated), RFC 1123 HTTP dates, RFC 3339,
    /// ANSI C `asctime` dates and RFC 850 dates.
    pub fn parse(s: &str) -> TypeResult<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(TypeError::InvalidTimestamp(s.to_string()));
        }
        if s.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
            return Self::parse_decimal(s);
        }
        Self::parse_date(s).ok_or_else(|| TypeError::InvalidTimestamp(s.to_string()))
    }

    fn parse_date(s: &str) -> Option<Self> {
        if let Ok(dt) = DateTime::parse_from_rfc2822(s).or_else(|_| DateTime::parse_from_rfc3339(s)) {
            return dt.timestamp_nanos_opt().map(Self);
        }
        NAIVE_DATE_FORMATS.iter().find_map(|fmt| {
            let naive = NaiveDateTime::parse_from_str(s, fmt).ok()?;
            Utc.from_utc_datetime(&naive).timestamp_nanos_opt().map(Self)
        })
    }

    fn parse_decimal(s: &str) -> TypeResult<Self> {
        let invalid = || TypeError::InvalidTimestamp(s.to_string());
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if whole.is_empty() && frac.is_empty() {
            return Err(invalid());
        }
        if !whole.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(invalid());
        }

        let secs: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid())?
        };
        let mut nanos: i64 = 0;
        let mut scale = NANOS_PER_SEC;
        for digit in frac.bytes().take(9) {
            scale /= 10;
            nanos += i64::from(digit - b'0') * scale;
        }

        secs.checked_mul(NANOS_PER_SEC)
            .and_then(|n| n.checked_add(nanos))
            .map(Self)
            .ok_or_else(invalid)
    }

    /// Canonical `X-Timestamp` form: `%016.05f` seconds.
    pub fn canonical(&self) -> String {
        let secs = self.0.div_euclid(NANOS_PER_SEC);
        let frac = self.0.rem_euclid(NANOS_PER_SEC) / 10_000;
        format!("{secs:010}.{frac:05}")
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.canonical())
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_nanos_opt().unwrap_or_default())
    }
}

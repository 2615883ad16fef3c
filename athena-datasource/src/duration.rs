// Copyright (c) 2020-present, UMD Database Group.
//
// This program is free software: you can use, redistribute, and/or modify
// it under the terms of the GNU Affero General Public License, version 3
// or later ("AGPL"), as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or
// FITNESS FOR A PARTICULAR PURPOSE.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <http://www.gnu.org/licenses/>.

//! A duration that travels as a human readable string, e.g. `"30s"` or
//! `"5m"`, in the query JSON.
//!
//! Besides the humantime forms the query editor's `time.ParseDuration` syntax
//! is understood, including fractions such as `"1.5h"`. Durations are capped
//! at the range of a signed 64-bit nanosecond count, about 292 years.

use crate::error::DatasourceError;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::Deref;

const NANOS_PER_SEC: u128 = 1_000_000_000;
const MAX_NANOS: u128 = i64::MAX as u128;

/// The cache duration of a query.
///
/// An empty string deserializes to zero, which disables caching, and so does
/// a negative duration. Any JSON value other than a string is rejected.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(pub std::time::Duration);

impl Duration {
    /// Returns true if the duration is zero.
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Parses a human readable duration.
    pub fn parse(text: &str) -> crate::error::Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Duration::default());
        }
        let (negative, body) = match text.strip_prefix('-') {
            Some(body) => (true, body),
            None => (false, text.strip_prefix('+').unwrap_or(text)),
        };

        let d = match humantime::parse_duration(body) {
            Ok(d) => d,
            Err(e) => fractional(body).ok_or_else(|| {
                DatasourceError::Config(format!("invalid duration {:?}: {}", text, e))
            })?,
        };
        if d.as_nanos() > MAX_NANOS {
            return Err(DatasourceError::Config(format!(
                "duration {:?} is out of range",
                text
            )));
        }

        if negative {
            Ok(Duration::default())
        } else {
            Ok(Duration(d))
        }
    }
}

/// Parses the `time.ParseDuration` syntax: a sequence of decimal numbers with
/// an optional fraction, each followed by one of `ns`, `us`, `ms`, `s`, `m`
/// or `h`.
fn fractional(s: &str) -> Option<std::time::Duration> {
    match s {
        "" => return None,
        "0" => return Some(std::time::Duration::ZERO),
        _ => {}
    }

    let mut nanos: u128 = 0;
    let mut rest = s;
    while !rest.is_empty() {
        let len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (whole, after) = rest.split_at(len);
        rest = after;

        let mut fraction = "";
        if let Some(after) = rest.strip_prefix('.') {
            let len = after.find(|c: char| !c.is_ascii_digit()).unwrap_or(after.len());
            fraction = &after[..len];
            rest = &after[len..];
        }
        if whole.is_empty() && fraction.is_empty() {
            return None;
        }

        let len = rest
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(rest.len());
        let unit = match &rest[..len] {
            "ns" => 1,
            "us" | "\u{b5}s" | "\u{3bc}s" => 1_000,
            "ms" => 1_000_000,
            "s" => NANOS_PER_SEC,
            "m" => 60 * NANOS_PER_SEC,
            "h" => 3600 * NANOS_PER_SEC,
            _ => return None,
        };
        rest = &rest[len..];

        if !whole.is_empty() {
            nanos = nanos.checked_add(whole.parse::<u128>().ok()?.checked_mul(unit)?)?;
        }
        // digits past the 18th are below a nanosecond even for hours
        let digits = &fraction[..fraction.len().min(18)];
        if !digits.is_empty() {
            let scale = 10u128.pow(digits.len() as u32);
            nanos = nanos.checked_add(digits.parse::<u128>().ok()? * unit / scale)?;
        }
    }

    let secs = u64::try_from(nanos / NANOS_PER_SEC).ok()?;
    Some(std::time::Duration::new(secs, (nanos % NANOS_PER_SEC) as u32))
}

impl Deref for Duration {
    type Target = std::time::Duration;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<std::time::Duration> for Duration {
    fn from(d: std::time::Duration) -> Self {
        Duration(d)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            write!(f, "0s")
        } else {
            write!(f, "{}", humantime::format_duration(self.0))
        }
    }
}

struct DurationVisitor;

impl<'de> Visitor<'de> for DurationVisitor {
    type Value = Duration;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a duration string such as \"30s\" or \"5m\"")
    }

    fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Duration::parse(value).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(DurationVisitor)
    }
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    #[test]
    fn human_readable_strings() {
        let d: Duration = serde_json::from_str("\"30s\"").unwrap();
        assert_eq!(StdDuration::from_secs(30), *d);

        let d: Duration = serde_json::from_str("\"5m\"").unwrap();
        assert_eq!(StdDuration::from_secs(300), *d);

        let d: Duration = serde_json::from_str("\"1h30m\"").unwrap();
        assert_eq!(StdDuration::from_secs(5400), *d);
    }

    #[test]
    fn empty_string_is_zero() {
        let d: Duration = serde_json::from_str("\"\"").unwrap();
        assert!(d.is_zero());
    }

    #[test]
    fn non_strings_are_rejected() {
        assert!(serde_json::from_str::<Duration>("30").is_err());
        assert!(serde_json::from_str::<Duration>("null").is_err());
        assert!(serde_json::from_str::<Duration>("{\"s\": 1}").is_err());
        assert!(serde_json::from_str::<Duration>("\"soon\"").is_err());
    }

    #[test]
    fn go_duration_syntax() {
        let parse = |text: &str| *Duration::parse(text).unwrap();
        assert_eq!(StdDuration::from_secs(5400), parse("1.5h"));
        assert_eq!(StdDuration::from_millis(500), parse(".5s"));
        assert_eq!(StdDuration::from_secs(7200), parse("1.5h30m"));
        assert_eq!(StdDuration::from_micros(2500), parse("2.5ms"));
        assert_eq!(StdDuration::ZERO, parse("0"));

        let d: Duration = serde_json::from_str("\"2.5m\"").unwrap();
        assert_eq!(StdDuration::from_secs(150), *d);

        assert!(Duration::parse("1.5").is_err());
        assert!(Duration::parse("1.5 fortnights").is_err());
        assert!(Duration::parse(".h").is_err());
        assert!(Duration::parse("-").is_err());
    }

    #[test]
    fn negative_disables_caching() {
        assert!(Duration::parse("-5m").unwrap().is_zero());
        assert!(Duration::parse("-1.5h").unwrap().is_zero());
        assert_eq!(StdDuration::from_secs(300), *Duration::parse("+5m").unwrap());
    }

    #[test]
    fn out_of_range() {
        // about 292 years is the limit
        assert!(Duration::parse("200y").is_ok());
        assert!(matches!(
            Duration::parse("300000000000y"),
            Err(DatasourceError::Config(_))
        ));
        assert!(serde_json::from_str::<Duration>("\"300000000000y\"").is_err());
        assert!(Duration::parse("99999999999999999999h").is_err());
    }

    #[test]
    fn serializes_back_to_text() {
        let d = Duration(StdDuration::from_secs(300));
        assert_eq!("\"5m\"", serde_json::to_string(&d).unwrap());
        assert_eq!("\"0s\"", serde_json::to_string(&Duration::default()).unwrap());
    }
}

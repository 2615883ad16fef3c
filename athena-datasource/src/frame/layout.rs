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

//! Time layouts of textual timestamp columns.
//!
//! Layouts are written against the reference time `Mon Jan 2 15:04:05 MST
//! 2006`, e.g. `2006-01-02 15:04:05.000`, which is how the query editor and
//! the Athena type table describe them. A layout containing `%` is taken as a
//! strftime format instead. Timestamps without an offset are read as UTC and
//! dates without a time of day as midnight UTC.

use crate::error::{DatasourceError, Result};
use chrono::format::{self, Fixed, Item, Numeric, Pad, Parsed, StrftimeItems};
use chrono::{DateTime, NaiveTime, TimeZone, Utc};

/// `RFC3339` in reference notation.
pub const RFC3339: &str = "2006-01-02T15:04:05Z07:00";
/// `RFC3339` with optional nanoseconds in reference notation.
pub const RFC3339_NANO: &str = "2006-01-02T15:04:05.999999999Z07:00";

/// Reference tokens, longest first where they share a prefix.
const TOKENS: &[(&str, Item<'static>)] = &[
    ("January", Item::Fixed(Fixed::LongMonthName)),
    ("Jan", Item::Fixed(Fixed::ShortMonthName)),
    ("Monday", Item::Fixed(Fixed::LongWeekdayName)),
    ("Mon", Item::Fixed(Fixed::ShortWeekdayName)),
    ("MST", Item::Fixed(Fixed::TimezoneName)),
    ("2006", Item::Numeric(Numeric::Year, Pad::Zero)),
    ("002", Item::Numeric(Numeric::Ordinal, Pad::Zero)),
    ("01", Item::Numeric(Numeric::Month, Pad::Zero)),
    ("02", Item::Numeric(Numeric::Day, Pad::Zero)),
    ("03", Item::Numeric(Numeric::Hour12, Pad::Zero)),
    ("04", Item::Numeric(Numeric::Minute, Pad::Zero)),
    ("05", Item::Numeric(Numeric::Second, Pad::Zero)),
    ("06", Item::Numeric(Numeric::YearMod100, Pad::Zero)),
    ("15", Item::Numeric(Numeric::Hour, Pad::Zero)),
    ("_2", Item::Numeric(Numeric::Day, Pad::Space)),
    ("1", Item::Numeric(Numeric::Month, Pad::None)),
    ("2", Item::Numeric(Numeric::Day, Pad::None)),
    ("3", Item::Numeric(Numeric::Hour12, Pad::None)),
    ("4", Item::Numeric(Numeric::Minute, Pad::None)),
    ("5", Item::Numeric(Numeric::Second, Pad::None)),
    ("PM", Item::Fixed(Fixed::UpperAmPm)),
    ("pm", Item::Fixed(Fixed::LowerAmPm)),
    ("Z07:00", Item::Fixed(Fixed::TimezoneOffsetColonZ)),
    ("Z0700", Item::Fixed(Fixed::TimezoneOffsetZ)),
    ("-07:00", Item::Fixed(Fixed::TimezoneOffsetColon)),
    ("-0700", Item::Fixed(Fixed::TimezoneOffset)),
];

/// A compiled time layout.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeLayout {
    /// RFC 3339, with or without fractional seconds.
    Rfc3339,
    /// A strftime format.
    Strftime(String),
    /// A reference layout translated into format items.
    Reference(Vec<Item<'static>>),
}

impl Default for TimeLayout {
    fn default() -> Self {
        TimeLayout::Rfc3339
    }
}

impl TimeLayout {
    /// Compiles a layout. An empty layout means RFC 3339.
    pub fn new(layout: &str) -> Self {
        match layout {
            "" | RFC3339 | RFC3339_NANO => TimeLayout::Rfc3339,
            l if l.contains('%') => TimeLayout::Strftime(l.to_string()),
            l => TimeLayout::Reference(translate(l)),
        }
    }

    /// Parses a timestamp.
    pub fn parse(&self, text: &str) -> Result<DateTime<Utc>> {
        let conversion_error = |e: format::ParseError| {
            DatasourceError::Conversion(format!("cannot parse time {:?}: {}", text, e))
        };
        let mut parsed = Parsed::new();
        match self {
            TimeLayout::Rfc3339 => {
                return DateTime::parse_from_rfc3339(text)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(conversion_error);
            }
            TimeLayout::Strftime(layout) => {
                format::parse(&mut parsed, text, StrftimeItems::new(layout))
                    .map_err(conversion_error)?
            }
            TimeLayout::Reference(items) => {
                format::parse(&mut parsed, text, items.iter()).map_err(conversion_error)?
            }
        }

        if let Ok(t) = parsed.to_datetime() {
            return Ok(t.with_timezone(&Utc));
        }
        if let Ok(t) = parsed.to_naive_datetime_with_offset(0) {
            return Ok(Utc.from_utc_datetime(&t));
        }
        parsed
            .to_naive_date()
            .map(|d| Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)))
            .map_err(conversion_error)
    }
}

/// Translates a reference layout into format items.
fn translate(layout: &str) -> Vec<Item<'static>> {
    let mut items = vec![];
    let mut literal = String::new();
    let mut rest = layout;

    while let Some(c) = rest.chars().next() {
        let token = TOKENS
            .iter()
            .find(|(token, _)| rest.starts_with(token))
            .map(|(token, item)| (token.len(), item.clone()))
            .or_else(|| fraction(rest).map(|len| (len, Item::Fixed(Fixed::Nanosecond))));

        match token {
            Some((len, item)) => {
                flush(&mut literal, &mut items);
                items.push(item);
                rest = &rest[len..];
            }
            None if c.is_whitespace() => {
                flush(&mut literal, &mut items);
                items.push(Item::OwnedSpace(c.to_string().into_boxed_str()));
                rest = &rest[c.len_utf8()..];
            }
            None => {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
            }
        }
    }
    flush(&mut literal, &mut items);
    items
}

/// Returns the length of a `.000` or `.999` fractional second at the start of
/// `s`.
fn fraction(s: &str) -> Option<usize> {
    let digits = s.strip_prefix('.')?;
    let first = digits.chars().next().filter(|c| *c == '0' || *c == '9')?;
    let run = digits.chars().take_while(|c| *c == first).count();
    match digits[run..].chars().next() {
        Some(c) if c.is_ascii_digit() => None,
        _ => Some(1 + run),
    }
}

fn flush(literal: &mut String, items: &mut Vec<Item<'static>>) {
    if !literal.is_empty() {
        items.push(Item::OwnedLiteral(std::mem::take(literal).into_boxed_str()));
    }
}

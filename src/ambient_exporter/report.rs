// ambient_exporter - Prometheus metrics exporter for Ambient Weather stations
//
// Copyright 2024 Nick Pillitteri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

use percent_encoding::percent_decode_str;
use std::collections::HashMap;
use std::error;
use std::fmt;
use std::num::ParseFloatError;
use url::form_urlencoded;

const PASSKEY_FIELD: &str = "PASSKEY";
const PASSKEY_MASK: &str = "******";

#[derive(Debug)]
pub enum ReportError {
    MissingField(String),
    InvalidNumber {
        field: String,
        value: String,
        source: ParseFloatError,
    },
    OutOfRange {
        field: String,
        value: String,
    },
    MalformedQuery {
        segment: String,
        reason: &'static str,
    },
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingField(field) => write!(f, "no such field {}", field),
            Self::InvalidNumber { field, value, source } => {
                write!(f, "failed to parse {} value '{}': {}", field, value, source)
            }
            Self::OutOfRange { field, value } => write!(f, "{} value '{}' out of range", field, value),
            Self::MalformedQuery { segment, reason } => write!(f, "malformed query segment '{}': {}", segment, reason),
        }
    }
}

impl error::Error for ReportError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Self::InvalidNumber { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Fields submitted by a weather station, decoded from a URL query string.
///
/// Stations may repeat a field. All values are kept in the order they were sent but only
/// the first one is ever read.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Fields {
    values: HashMap<String, Vec<String>>,
}

impl Fields {
    /// Decode a `key=value&key=value` query string.
    ///
    /// Pairs that can't be decoded are skipped and returned as errors alongside every
    /// pair that could be decoded, so a single bad value doesn't discard the whole report.
    pub fn parse(query: &str) -> (Self, Vec<ReportError>) {
        let mut fields = Self::default();
        let mut errors = Vec::new();

        for segment in query.split('&') {
            if let Err(reason) = check_segment(segment) {
                errors.push(ReportError::MalformedQuery {
                    segment: redact(segment),
                    reason,
                });
                continue;
            }

            for (key, value) in form_urlencoded::parse(segment.as_bytes()) {
                fields.insert(key, value);
            }
        }

        (fields, errors)
    }

    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.values.entry(key.into()).or_default().push(value.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// First value submitted for `name`, if any.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    /// First value for `name` with any carriage returns or line feeds removed.
    pub fn string(&self, name: &str) -> Result<String, ReportError> {
        self.first(name)
            .map(|v| v.replace(['\r', '\n'], ""))
            .ok_or_else(|| ReportError::MissingField(name.to_owned()))
    }

    /// First value for `name` parsed as a floating point number.
    ///
    /// Values too large to represent are an error rather than infinity. Explicit `inf`
    /// and `NaN` are accepted.
    pub fn number(&self, name: &str) -> Result<f64, ReportError> {
        let value = self.string(name)?;
        let parsed = match value.parse::<f64>() {
            Ok(v) => v,
            Err(e) => {
                return Err(ReportError::InvalidNumber {
                    field: name.to_owned(),
                    value,
                    source: e,
                })
            }
        };

        if parsed.is_infinite() && !is_infinity_literal(&value) {
            return Err(ReportError::OutOfRange {
                field: name.to_owned(),
                value,
            });
        }

        Ok(parsed)
    }
}

impl<K, V> FromIterator<(K, V)> for Fields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut fields = Self::default();
        for (k, v) in iter {
            fields.insert(k, v);
        }
        fields
    }
}

/// A single report from a weather station: where it came from and what it contained.
#[derive(Debug, Clone)]
pub struct Report {
    pub remote_address: String,
    pub fields: Fields,
}

impl Report {
    pub fn new<S: Into<String>>(remote_address: S, fields: Fields) -> Self {
        Report {
            remote_address: remote_address.into(),
            fields,
        }
    }
}

/// Replace the value of any `PASSKEY` pair in a raw query or URI so it can be logged.
///
/// The key may be preceded by the rest of a path (`/data/report/PASSKEY=...`) or a `?`.
pub fn redact(query: &str) -> String {
    query
        .split('&')
        .map(|segment| match segment.split_once('=') {
            Some((key, _)) if key.rsplit(['/', '?']).next() == Some(PASSKEY_FIELD) => {
                format!("{}={}", key, PASSKEY_MASK)
            }
            _ => segment.to_owned(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Reject query segments that can't be decoded without guessing: `;` separators,
/// truncated or non-hex `%` escapes, and escapes that don't decode to UTF-8.
fn check_segment(segment: &str) -> Result<(), &'static str> {
    if segment.contains(';') {
        return Err("invalid semicolon separator");
    }

    let bytes = segment.as_bytes();
    for (i, _) in bytes.iter().enumerate().filter(|(_, b)| **b == b'%') {
        match bytes.get(i + 1..i + 3) {
            Some([hi, lo]) if hi.is_ascii_hexdigit() && lo.is_ascii_hexdigit() => {}
            _ => return Err("invalid percent escape"),
        }
    }

    percent_decode_str(segment)
        .decode_utf8()
        .map(|_| ())
        .map_err(|_| "invalid utf-8")
}

fn is_infinity_literal(value: &str) -> bool {
    let unsigned = value.trim_start_matches(['+', '-']);
    unsigned.eq_ignore_ascii_case("inf") || unsigned.eq_ignore_ascii_case("infinity")
}

//! Defensive helpers for turning loosely shaped provider JSON into suggestion
//! fields. A field that does not match is absent; nothing here fails.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;

use super::Highlight;

const ISO_UTC_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%z",
    "%Y-%m-%dT%H:%M:%S%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Resolves a dotted path (`"scheduledTime.utc"`, `"categories.0.name"`)
/// inside `value`.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| match current {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?),
            _ => current.get(key),
        })
        .filter(|found| !found.is_null())
}

/// First non-null value among `paths`, tried in order.
pub fn pick<'a>(value: &'a Value, paths: &[&str]) -> Option<&'a Value> {
    paths.iter().find_map(|path| lookup(value, path))
}

/// First usable text among `paths`. Numbers are accepted and rendered as text.
pub fn pick_str(value: &Value, paths: &[&str]) -> Option<String> {
    paths.iter().find_map(|path| match lookup(value, path)? {
        Value::String(s) => Some(s.trim())
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

pub fn pick_decimal(value: &Value, paths: &[&str]) -> Option<Decimal> {
    paths.iter().find_map(|path| match lookup(value, path)? {
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    })
}

pub fn pick_timestamp(value: &Value, paths: &[&str]) -> Option<String> {
    paths
        .iter()
        .find_map(|path| lookup(value, path)?.as_str().and_then(normalize_timestamp))
}

/// Parses an ISO-like, provider-local (`2024-05-01 11:25-07:00`), or compact
/// (`20240501T112500`) timestamp. Values without an offset are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(expanded) = expand_compact(raw) {
        return parse_naive(&expanded);
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(&Utc));
        }
    }
    let naive = raw.strip_suffix('Z').unwrap_or(raw);
    if let Some(parsed) = parse_naive(naive) {
        return Some(parsed);
    }
    NaiveDate::parse_from_str(naive, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc())
}

/// Strict ISO-8601 UTC rendering of [`parse_timestamp`]; `None` when invalid.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    parse_timestamp(raw).map(|parsed| format_utc(&parsed))
}

pub fn format_utc(instant: &DateTime<Utc>) -> String {
    instant.format(ISO_UTC_FORMAT).to_string()
}

/// `YYYYMMDDTHHMMSS` → `YYYY-MM-DDTHH:MM:SS`.
fn expand_compact(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let compact = bytes.len() == 15
        && bytes[8] == b'T'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 8 || b.is_ascii_digit());
    if !compact {
        return None;
    }
    Some(format!(
        "{}-{}-{}T{}:{}:{}",
        &raw[0..4],
        &raw[4..6],
        &raw[6..8],
        &raw[9..11],
        &raw[11..13],
        &raw[13..15]
    ))
}

fn parse_naive(raw: &str) -> Option<DateTime<Utc>> {
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

/// Date part of a request date (`2024-05-01` or a full timestamp).
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    raw.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
        .or_else(|| parse_timestamp(raw).map(|instant| instant.date_naive()))
}

/// `"<name> (<code>)"`, or whichever of the two exists.
pub fn labelled_code(name: Option<&str>, code: Option<&str>) -> Option<String> {
    match (name, code) {
        (Some(name), Some(code)) if name != code => Some(format!("{name} ({code})")),
        (Some(name), _) => Some(name.to_string()),
        (None, Some(code)) => Some(code.to_string()),
        (None, None) => None,
    }
}

/// Collects highlights, skipping facts the provider did not report.
#[derive(Debug, Default)]
pub struct Highlights(Vec<Highlight>);

impl Highlights {
    pub fn push(&mut self, label: &str, value: Option<impl Into<String>>) -> &mut Self {
        if let Some(value) = value {
            let value = value.into();
            if !value.trim().is_empty() {
                self.0.push(Highlight {
                    label: label.to_string(),
                    value,
                });
            }
        }
        self
    }

    pub fn finish(self) -> Option<Vec<Highlight>> {
        if self.0.is_empty() {
            None
        } else {
            Some(self.0)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn compact_timestamps_become_iso_utc() {
        assert_eq!(
            normalize_timestamp("20240501T083000").as_deref(),
            Some("2024-05-01T08:30:00Z")
        );
        assert_eq!(
            normalize_timestamp("19991231T235959").as_deref(),
            Some("1999-12-31T23:59:59Z")
        );
    }

    #[test]
    fn offsets_are_converted_to_utc() {
        assert_eq!(
            normalize_timestamp("2024-05-01 11:25-07:00").as_deref(),
            Some("2024-05-01T18:25:00Z")
        );
        assert_eq!(
            normalize_timestamp("2024-05-01T11:25:00+09:00").as_deref(),
            Some("2024-05-01T02:25:00Z")
        );
        assert_eq!(
            normalize_timestamp("2024-05-01 18:25Z").as_deref(),
            Some("2024-05-01T18:25:00Z")
        );
        assert_eq!(
            normalize_timestamp("2024-05-01T10:05:00").as_deref(),
            Some("2024-05-01T10:05:00Z")
        );
    }

    #[test]
    fn invalid_dates_are_absent() {
        assert_eq!(normalize_timestamp("20241345T250000"), None);
        assert_eq!(normalize_timestamp("2024-02-30T10:00:00Z"), None);
        assert_eq!(normalize_timestamp("tomorrow morning"), None);
        assert_eq!(normalize_timestamp(""), None);
    }

    #[test]
    fn pick_walks_fallback_keys_in_order() {
        let payload = json!({
            "departure": {
                "scheduledTimeLocal": null,
                "scheduledTime": {"utc": "2024-05-01 18:25Z"},
                "airport": {"iata": "SFO", "name": ""}
            }
        });
        let departure = &payload["departure"];

        assert_eq!(
            pick_timestamp(
                departure,
                &["scheduledTimeLocal", "scheduledTimeUtc", "scheduledTime.utc"]
            )
            .as_deref(),
            Some("2024-05-01T18:25:00Z")
        );
        // Empty strings do not count as a value.
        assert_eq!(
            pick_str(departure, &["airport.name", "airport.iata"]).as_deref(),
            Some("SFO")
        );
        assert_eq!(pick(departure, &["gate", "terminal"]), None);
        assert_eq!(lookup(&payload, "arrival.airport.name"), None);
    }

    #[test]
    fn decimals_come_from_numbers_or_strings() {
        let payload = json!({"lat": "35.6856", "lon": 139.7514, "bad": "north"});
        assert_eq!(
            pick_decimal(&payload, &["lat"]),
            Some(Decimal::new(356856, 4))
        );
        assert!(pick_decimal(&payload, &["lon"]).is_some());
        assert_eq!(pick_decimal(&payload, &["bad"]), None);
    }

    #[test]
    fn request_dates_accept_timestamps() {
        assert_eq!(
            parse_date("2024-05-01"),
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        assert_eq!(
            parse_date("2024-05-01T22:00:00Z"),
            NaiveDate::from_ymd_opt(2024, 5, 1)
        );
        assert_eq!(parse_date("May 1st"), None);
    }

    #[test]
    fn highlights_skip_missing_facts() {
        let mut highlights = Highlights::default();
        highlights
            .push("Departure", labelled_code(Some("San Francisco Intl"), Some("SFO")))
            .push("Airline", None::<String>)
            .push("Terminal", Some(" "));
        assert_eq!(
            highlights.finish(),
            Some(vec![Highlight {
                label: "Departure".to_string(),
                value: "San Francisco Intl (SFO)".to_string(),
            }])
        );
        assert_eq!(Highlights::default().finish(), None);
    }
}

//! Decoding of modem SMS timestamps.
//!
//! The modem reports service centre timestamps as `yy/MM/dd,hh:mm:ss±zz`
//! where `zz` is the timezone offset in quarter hours (GSM 03.40), so
//! `+04` means UTC+01:00 and `+03` means UTC+00:45.

use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Minutes per unit of the timezone field.
pub const QUARTER_HOUR_MINUTES: u32 = 15;

fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(\d{2})/(\d{2})/(\d{2}),(\d{2}):(\d{2}):(\d{2})([+-])(\d{2})")
            .expect("timestamp pattern is valid")
    })
}

/// Build the ISO 8601 form of a modem timestamp, e.g.
/// `26/01/08,21:47:12+04` → `2026-01-08T21:47:12+01:00`.
///
/// Returns `None` if the input does not match the modem format or the offset
/// is a day or more.
pub fn timestamp_to_iso8601(raw: &str) -> Option<String> {
    let caps = timestamp_pattern().captures(raw)?;

    let year = 2000 + caps[1].parse::<u32>().ok()?;
    let quarters: u32 = caps[8].parse().ok()?;
    let offset_minutes = quarters * QUARTER_HOUR_MINUTES;
    if offset_minutes >= 24 * 60 {
        return None;
    }

    Some(format!(
        "{year}-{}-{}T{}:{}:{}{}{:02}:{:02}",
        &caps[2],
        &caps[3],
        &caps[4],
        &caps[5],
        &caps[6],
        &caps[7],
        offset_minutes / 60,
        offset_minutes % 60,
    ))
}

/// Decode a modem timestamp into an absolute instant.
///
/// Never fails: a string that does not match the modem format, or that names
/// an impossible date or offset, decodes to `None`.
pub fn decode_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let iso = timestamp_to_iso8601(raw)?;
    DateTime::parse_from_rfc3339(&iso)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

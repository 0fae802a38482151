use std::time::{SystemTime, UNIX_EPOCH};

use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

const NANOS_PER_MILLI: i128 = 1_000_000;
const NANOS_PER_SECOND: i128 = 1_000_000_000;

pub fn unix_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_millis() as u64)
}

#[must_use]
pub fn format_unix_ms(timestamp_unix_ms: u64) -> String {
    let nanos = i128::from(timestamp_unix_ms)
        .checked_mul(NANOS_PER_MILLI)
        .unwrap_or(i128::MAX);
    let Ok(dt) = OffsetDateTime::from_unix_timestamp_nanos(nanos) else {
        return format!("{timestamp_unix_ms}ms");
    };
    let dt = dt.to_offset(UtcOffset::UTC);
    format!(
        "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}.{:03}Z",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
        dt.millisecond()
    )
}

/// Renders a warehouse timestamp cell.
///
/// The SQL API encodes `TIMESTAMP_*` values as epoch seconds with a fractional
/// part, optionally followed by a timezone offset in minutes
/// (`"1717000000.123000000 1440"`). Anything that does not look like that is
/// returned unchanged.
#[must_use]
pub fn format_epoch_text(raw: &str) -> String {
    match parse_epoch_text(raw) {
        Some(dt) => dt.format(&Rfc3339).unwrap_or_else(|_| raw.to_string()),
        None => raw.to_string(),
    }
}

fn parse_epoch_text(raw: &str) -> Option<OffsetDateTime> {
    let epoch = raw.split_whitespace().next()?;
    let (seconds_raw, fraction_raw) = match epoch.split_once('.') {
        Some((seconds, fraction)) => (seconds, fraction),
        None => (epoch, ""),
    };
    if seconds_raw.is_empty()
        || fraction_raw.len() > 9
        || !fraction_raw.chars().all(|ch| ch.is_ascii_digit())
    {
        return None;
    }

    let seconds: i128 = seconds_raw.parse().ok()?;
    let fraction_nanos: i128 = if fraction_raw.is_empty() {
        0
    } else {
        let padded = format!("{fraction_raw:0<9}");
        padded.parse().ok()?
    };
    let nanos = seconds
        .checked_mul(NANOS_PER_SECOND)?
        .checked_add(if seconds < 0 { -fraction_nanos } else { fraction_nanos })?;

    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .map(|dt| dt.to_offset(UtcOffset::UTC))
}

use std::time::{SystemTime, UNIX_EPOCH};

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

const NANOS_PER_MILLI: i128 = 1_000_000;
const CALENDAR_DATE_LEN: usize = 10;
const CALENDAR_DATE: &[BorrowedFormatItem<'static>] = format_description!("[year]-[month]-[day]");

#[must_use]
pub fn unix_timestamp_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| duration.as_secs())
}

#[must_use]
pub fn format_unix_ms(timestamp_unix_ms: u64) -> String {
    let nanos = i128::from(timestamp_unix_ms)
        .checked_mul(NANOS_PER_MILLI)
        .unwrap_or(i128::MAX);
    let dt = OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .unwrap_or(OffsetDateTime::UNIX_EPOCH)
        .to_offset(UtcOffset::UTC);
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

/// Parses a strict `YYYY-MM-DD` calendar date.
#[must_use]
pub fn parse_calendar_date(raw: &str) -> Option<Date> {
    Date::parse(raw, CALENDAR_DATE).ok()
}

#[must_use]
pub fn format_calendar_date(date: Date) -> Option<String> {
    date.format(CALENDAR_DATE).ok()
}

/// Parses the leading `YYYY-MM-DD` of a date or datetime string
/// (`2024-01-05`, `2024-01-05 00:00:00`, `2024-01-05T10:00:00Z`).
#[must_use]
pub fn parse_leading_date(raw: &str) -> Option<Date> {
    let candidate = raw.trim();
    let prefix = candidate.get(..CALENDAR_DATE_LEN)?;
    let rest = &candidate[CALENDAR_DATE_LEN..];
    if !(rest.is_empty() || rest.starts_with(' ') || rest.starts_with('T')) {
        return None;
    }
    parse_calendar_date(prefix)
}

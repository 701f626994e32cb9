use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// Enumeration of errors produced while normalizing source timestamps.
/// Any of these is fatal for the record being written, never for the pipeline.
#[derive(Error, Debug)]
pub enum TimestampError {
    #[error("'{0}' does not match the expected format '{1}'")]
    UnparseableTimestamp(String, &'static str),
    #[error("'{0}' carries an unknown timezone name")]
    UnknownZoneName(String),
    #[error("structured timestamp tuple {0:?} is out of range")]
    InvalidParsedTuple(Vec<u32>),
}

const FEED_FORMAT_NUMERIC: &str = "%a, %d %b %Y %H:%M:%S %z";
const FEED_FORMAT_NAIVE: &str = "%a, %d %b %Y %H:%M:%S";

/// Build a timestamp from a feed parser's structured time tuple
/// (year, month, day, hour, minute, second, ...); trailing elements are ignored.
pub fn from_parsed_tuple(parts: &[u32]) -> Result<DateTime<Utc>, TimestampError> {
    let invalid = || TimestampError::InvalidParsedTuple(parts.to_vec());

    let [year, month, day, hour, minute, second] = parts.get(..6).ok_or_else(invalid)? else {
        return Err(invalid());
    };

    NaiveDate::from_ymd_opt(*year as i32, *month, *day)
        .and_then(|date| date.and_hms_opt(*hour, *minute, *second))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(invalid)
}

/// Parse an RFC-2822-style feed date such as `Mon, 02 Jan 2006 15:04:05 +0000`.
///
/// The trailing timezone token decides the parse path: a digit anywhere in it
/// selects numeric-offset parsing, no digit selects named-zone parsing against
/// the RFC 2822 obsolete zone table.
pub fn parse_feed_timestamp(raw: &str) -> Result<DateTime<Utc>, TimestampError> {
    let zone_token = raw.rsplit(' ').next().unwrap_or_default();

    if zone_token.chars().any(|c| c.is_ascii_digit()) {
        let parsed = DateTime::parse_from_str(raw, FEED_FORMAT_NUMERIC).map_err(|_| {
            TimestampError::UnparseableTimestamp(raw.to_owned(), FEED_FORMAT_NUMERIC)
        })?;
        return Ok(parsed.with_timezone(&Utc));
    }

    let head = raw
        .strip_suffix(zone_token)
        .unwrap_or(raw)
        .trim_end();
    let naive = NaiveDateTime::parse_from_str(head, FEED_FORMAT_NAIVE)
        .map_err(|_| TimestampError::UnparseableTimestamp(raw.to_owned(), FEED_FORMAT_NAIVE))?;
    let offset = named_zone_offset(zone_token)
        .ok_or_else(|| TimestampError::UnknownZoneName(raw.to_owned()))?;

    match offset.from_local_datetime(&naive).single() {
        Some(with_zone) => Ok(with_zone.with_timezone(&Utc)),
        None => Err(TimestampError::UnparseableTimestamp(
            raw.to_owned(),
            FEED_FORMAT_NAIVE,
        )),
    }
}

/// Parse a timestamp with no timezone information, taken to be UTC.
pub fn parse_naive_utc(raw: &str, format: &'static str) -> Result<DateTime<Utc>, TimestampError> {
    NaiveDateTime::parse_from_str(raw, format)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| TimestampError::UnparseableTimestamp(raw.to_owned(), format))
}

/// Parse a timestamp that carries a numeric offset.
pub fn parse_with_offset(raw: &str, format: &'static str) -> Result<DateTime<Utc>, TimestampError> {
    DateTime::parse_from_str(raw, format)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|_| TimestampError::UnparseableTimestamp(raw.to_owned(), format))
}

/// RFC 2822 obsolete zone names. Unknown names are rejected rather than
/// silently read as UTC.
fn named_zone_offset(token: &str) -> Option<FixedOffset> {
    let hours = match token {
        "UT" | "GMT" | "UTC" | "Z" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

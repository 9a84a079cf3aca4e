//! Fixed-width ISO-8601 UTC timestamps with millisecond precision.
//!
//! `YYYY-MM-DDTHH:MM:SS.mmmZ`, always 24 characters, so string order is
//! time order for years 0000 to 9999.

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

use super::ActionError;

pub const TIMESTAMP_LEN: usize = 24;

/// 9999-12-31T23:59:59.999Z, the last instant with a four-digit year.
pub const MAX_MILLIS: u64 = 253_402_300_799_999;

const FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
);

/// Format milliseconds since the Unix epoch.
pub fn format_millis(millis: u64) -> Result<String, ActionError> {
    if millis > MAX_MILLIS {
        return Err(ActionError::Timestamp(format!(
            "{} ms is past year 9999",
            millis
        )));
    }
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
        .map_err(|err| ActionError::Timestamp(err.to_string()))?
        .format(FORMAT)
        .map_err(|err| ActionError::Timestamp(err.to_string()))
}

/// Parse a timestamp produced by [`format_millis`].
pub fn parse_millis(s: &str) -> Option<u64> {
    if s.len() != TIMESTAMP_LEN || !s.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let instant = PrimitiveDateTime::parse(s, FORMAT).ok()?.assume_utc();
    u64::try_from(instant.unix_timestamp_nanos() / 1_000_000).ok()
}

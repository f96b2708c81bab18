//! Conversions between UTC instants and the INTEGER Unix-second columns they are stored in.

use rusqlite::{Row, types::Type};
use time::{OffsetDateTime, UtcOffset};

/// Convert `instant` to whole Unix seconds for storage.
///
/// Any sub-second component is discarded.
pub(crate) fn to_unix_seconds(instant: OffsetDateTime) -> i64 {
    instant.unix_timestamp()
}

/// Read the column at `index` as Unix seconds and return it as a UTC instant.
pub(crate) fn get_instant(row: &Row, index: usize) -> Result<OffsetDateTime, rusqlite::Error> {
    let seconds: i64 = row.get(index)?;

    OffsetDateTime::from_unix_timestamp(seconds)
        .map(|instant| instant.to_offset(UtcOffset::UTC))
        .map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(index, Type::Integer, Box::new(error))
        })
}

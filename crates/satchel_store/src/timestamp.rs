//! Best-effort record timestamps.

use satchel_codec::Record;

/// Field names checked for a record's timestamp, in priority order.
const TIMESTAMP_FIELDS: &[&str] = &["timestamp", "createdAt", "startTime"];

/// Returns a record's best-effort timestamp in epoch milliseconds.
///
/// Checks `timestamp`, then `createdAt`, then `startTime`. Records carry
/// whatever fields the application gave them; a record with none of these
/// has no usable age and yields `None`.
#[must_use]
pub fn record_timestamp(record: &Record) -> Option<i64> {
    TIMESTAMP_FIELDS
        .iter()
        .find_map(|field| record.get(*field).and_then(|v| v.as_i64()))
}

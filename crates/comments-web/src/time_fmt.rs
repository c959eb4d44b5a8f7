//! ISO-8601 rendering of [`comments_core::Timestamp`] for the JSON API.
//!
//! The core only ever compares/orders millisecond instants (see
//! `comments-core::time`); formatting them as `…sssZ` strings is purely an
//! HTTP-boundary concern, so it lives here rather than in `comments-core`.

use comments_core::Timestamp;
use time::OffsetDateTime;
use time::macros::format_description;

const ISO8601_MILLIS: &[time::format_description::FormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// Renders `ts` as `2024-01-02T03:04:05.678Z`.
pub fn to_iso8601(ts: Timestamp) -> String {
    let dt = OffsetDateTime::UNIX_EPOCH + time::Duration::milliseconds(ts.as_millis());
    dt.format(ISO8601_MILLIS)
        .expect("fixed-width format description cannot fail")
}

use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::de;

/// Treats an absent *or* empty query-string value as `None` rather than a
/// parse error — query extractors otherwise choke on `?author_id=`.
///
/// Parses via `FromStr` rather than re-driving `T`'s `Deserialize` impl: the
/// latter only works for types whose deserializer reads a string (e.g. an
/// id newtype), and falls over for plain integers, whose `visit_str` isn't
/// implemented by serde's numeric visitors.
pub(crate) fn empty_string_as_none<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    if let Some(str) = Option::<String>::deserialize(deserializer)? {
        let str = str.trim();
        if str.is_empty() {
            Ok(None)
        } else {
            str.parse().map(Some).map_err(de::Error::custom)
        }
    } else {
        Ok(None)
    }
}

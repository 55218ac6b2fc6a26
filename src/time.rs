//! # UTC instants: parsing, formatting and sampling grids
//!
//! Every instant handled by the engine is a [`chrono::DateTime<Utc>`]. Inputs come from
//! several wire formats (prediction logs, CDM KVN blocks, Space-Track JSON, CLI flags),
//! some of which carry an explicit offset and some of which do not. The rule is simple:
//!
//! * an explicit offset (`Z`, `+02:00`, …) is honored and converted to UTC,
//! * a **naive** timestamp is assumed to already be UTC.
//!
//! Output is always ISO-8601 with a `Z` suffix (see [`to_iso_z`]), and per-run artifact
//! names use the compact `YYYYMMDDTHHMMSSZ` stamp (see [`run_stamp`]).
//!
//! The [`iso8601_opt`] and [`iso8601_window`] submodules plug those rules into `serde`
//! through `#[serde(with = "...")]`.
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

use crate::conjunctor_errors::ConjunctorError;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an ISO-8601 timestamp into a UTC instant.
///
/// Arguments
/// -----------------
/// * `input`: a timestamp such as `2025-11-08T00:00:00Z`, `2025-11-08T01:00:00+01:00`,
///   `2025-11-08T00:00:00.123` (naive, read as UTC), `2025-11-08 00:00:00` or a bare
///   date `2025-11-08` (midnight UTC).
///
/// Return
/// ----------
/// * The instant in UTC, or [`ConjunctorError::InvalidTimestamp`] if no format matches.
pub fn parse_utc(input: &str) -> Result<DateTime<Utc>, ConjunctorError> {
    let s = input.trim();

    if let Ok(aware) = DateTime::parse_from_rfc3339(s) {
        return Ok(aware.with_timezone(&Utc));
    }

    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .ok_or_else(|| ConjunctorError::InvalidTimestamp(s.to_string()))
}

/// Format an instant as ISO-8601 UTC with a `Z` suffix.
///
/// Sub-second digits are only emitted when present (`2025-11-08T00:00:00Z`,
/// `2025-11-08T00:00:00.250Z`).
pub fn to_iso_z(instant: &DateTime<Utc>) -> String {
    instant.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Compact stamp used to name per-run artifacts, e.g. `20251108T000000Z`.
pub fn run_stamp(instant: &DateTime<Utc>) -> String {
    instant.format("%Y%m%dT%H%M%SZ").to_string()
}

/// Build the sampling grid of a screening window.
///
/// The window is half-open: the returned instants are `start + k·step` for every `k`
/// such that `k·step < duration`.
///
/// Arguments
/// -----------------
/// * `start`: first sample.
/// * `duration`: window length (non-positive gives an empty grid).
/// * `step`: sampling interval (must be strictly positive, otherwise the grid is empty).
///
/// Return
/// ----------
/// * The sample instants in increasing order.
pub fn step_epochs(start: DateTime<Utc>, duration: Duration, step: Duration) -> Vec<DateTime<Utc>> {
    if step <= Duration::zero() || duration <= Duration::zero() {
        return Vec::new();
    }

    let mut epochs = Vec::new();
    let mut offset = Duration::zero();
    while offset < duration {
        epochs.push(start + offset);
        offset += step;
    }
    epochs
}

/// `serde` adapter for an optional UTC instant.
///
/// A missing field, `null`, or a string that is not a timestamp all deserialize to
/// `None`: the record is kept and later rejected by sanitization, where the drop is
/// counted.
pub mod iso8601_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        instant: &Option<DateTime<Utc>>,
        s: S,
    ) -> Result<S::Ok, S::Error> {
        match instant {
            Some(t) => s.serialize_some(&super::to_iso_z(t)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(d)?;
        Ok(raw.and_then(|s| super::parse_utc(&s).ok()))
    }
}

/// `serde` adapter for a `(start, end)` window written as `["start", "end"]`.
pub mod iso8601_window {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        window: &(DateTime<Utc>, DateTime<Utc>),
        s: S,
    ) -> Result<S::Ok, S::Error> {
        [super::to_iso_z(&window.0), super::to_iso_z(&window.1)].serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        d: D,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>), D::Error> {
        let [start, end] = <[String; 2]>::deserialize(d)?;
        Ok((
            super::parse_utc(&start).map_err(D::Error::custom)?,
            super::parse_utc(&end).map_err(D::Error::custom)?,
        ))
    }
}

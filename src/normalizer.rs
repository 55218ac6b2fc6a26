//! # Ground-truth normalization
//!
//! Converts raw conjunction reports (CCSDS CDM in **KVN** form, or the JSON objects
//! served by public CDM catalogs) into the engine's canonical
//! [`GroundTruthConjunction`] schema.
//!
//! ## Overview
//! -----------------
//! * [`parse_kvn_blocks`] – split a KVN document into one [`RawCdm`] per message.
//! * [`raw_cdm_from_json`] – flatten a JSON object into a [`RawCdm`].
//! * [`normalize_cdm`] – map one [`RawCdm`] to a [`GroundTruthConjunction`] (fail closed).
//! * [`normalize_all`] – normalize a batch, drop failures and count them.
//!
//! ## Field mapping
//! -----------------
//! | Canonical field | Accepted keys |
//! |---|---|
//! | `cdm_id` | `MESSAGE_ID`, `CDM_ID` |
//! | `norad_primary` | `OBJECT1_NORAD_CAT_ID`, `OBJECT1_OBJECT_DESIGNATOR`, `SAT_1_ID` |
//! | `norad_secondary` | `OBJECT2_NORAD_CAT_ID`, `OBJECT2_OBJECT_DESIGNATOR`, `SAT_2_ID` |
//! | `tca_utc` | `TCA`, `TIME_OF_CLOSEST_APPROACH` |
//! | `miss_distance_km` | `MISS_DISTANCE` |
//! | `rel_speed_kms` | `RELATIVE_SPEED` |
//!
//! In a KVN message the per-object keys follow an `OBJECT = OBJECT1` (or `OBJECT2`)
//! line; they are stored with the `OBJECT1_`/`OBJECT2_` prefix so both objects share
//! the same flat map.
//!
//! ## Units
//! -----------------
//! `MISS_DISTANCE` and `RELATIVE_SPEED` may carry a bracketed unit: `[m]` and `[m/s]`
//! are converted to km and km/s, `[km]`, `[km/s]` or no unit are taken as-is.
//!
//! ## Error policy
//! -----------------
//! Missing optional fields stay `None`. A record without two resolvable catalog ids or
//! without a parseable TCA is rejected with a [`NormalizeError`] and never reaches the
//! matcher.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::{
    conjunction::{lenient_id::catalog_id_from_str, GroundTruthConjunction},
    constants::{CatalogId, M_TO_KM},
    time::parse_utc,
};

/// One raw conjunction message: upper-cased keys → textual values.
pub type RawCdm = BTreeMap<String, String>;

const MESSAGE_ID_KEYS: [&str; 2] = ["MESSAGE_ID", "CDM_ID"];
const OBJECT1_KEYS: [&str; 3] = [
    "OBJECT1_NORAD_CAT_ID",
    "OBJECT1_OBJECT_DESIGNATOR",
    "SAT_1_ID",
];
const OBJECT2_KEYS: [&str; 3] = [
    "OBJECT2_NORAD_CAT_ID",
    "OBJECT2_OBJECT_DESIGNATOR",
    "SAT_2_ID",
];
const TCA_KEYS: [&str; 2] = ["TCA", "TIME_OF_CLOSEST_APPROACH"];

/// Record-level normalization failures.
///
/// Variants
/// -----------------
/// * `MissingCatalogId` – no id key present for object 1 or 2 (payload: `1` or `2`).
/// * `InvalidCatalogId` – an id key is present but is not an unsigned integer.
/// * `MissingTca` – no TCA key present.
/// * `InvalidTca` – the TCA value is not an ISO-8601 timestamp.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("No catalog id for object {0}")]
    MissingCatalogId(u8),
    #[error("Invalid catalog id: {0}")]
    InvalidCatalogId(String),
    #[error("No time of closest approach")]
    MissingTca,
    #[error("Invalid time of closest approach: {0}")]
    InvalidTca(String),
}

/// Counters produced by [`normalize_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NormalizeDiagnostics {
    pub received: usize,
    pub normalized: usize,
    pub dropped: usize,
}

/// Split a KVN document into raw CDM messages.
///
/// A message ends at a blank line or when a new `CCSDS_CDM_VERS` header starts.
/// `COMMENT` lines and lines without `=` are ignored.
pub fn parse_kvn_blocks(kvn_text: &str) -> Vec<RawCdm> {
    let mut blocks = Vec::new();
    let mut current = RawCdm::new();
    let mut object_prefix: Option<&'static str> = None;

    fn flush(current: &mut RawCdm, blocks: &mut Vec<RawCdm>) {
        if !current.is_empty() {
            blocks.push(std::mem::take(current));
        }
    }

    for line in kvn_text.lines().map(str::trim) {
        if line.is_empty() {
            flush(&mut current, &mut blocks);
            object_prefix = None;
            continue;
        }
        if line.starts_with("COMMENT") {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_uppercase();
        let value = value.trim().to_string();

        if key == "CCSDS_CDM_VERS" {
            flush(&mut current, &mut blocks);
            object_prefix = None;
        }

        if key == "OBJECT" {
            object_prefix = match value.to_uppercase().as_str() {
                "OBJECT1" => Some("OBJECT1_"),
                "OBJECT2" => Some("OBJECT2_"),
                _ => None,
            };
            continue;
        }

        let key = match object_prefix {
            Some(prefix) if !key.starts_with("OBJECT1_") && !key.starts_with("OBJECT2_") => {
                format!("{prefix}{key}")
            }
            _ => key,
        };
        current.insert(key, value);
    }
    flush(&mut current, &mut blocks);

    blocks
}

/// Flatten one JSON CDM object into a [`RawCdm`].
///
/// Strings are kept verbatim, numbers and booleans are stringified, `null` and nested
/// values are skipped.
pub fn raw_cdm_from_json(object: &Map<String, Value>) -> RawCdm {
    object
        .iter()
        .filter_map(|(k, v)| {
            let text = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((k.to_uppercase(), text))
        })
        .collect()
}

fn first_value<'a>(block: &'a RawCdm, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| block.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
}

fn catalog_id(block: &RawCdm, keys: &[&str], object: u8) -> Result<CatalogId, NormalizeError> {
    let raw = first_value(block, keys).ok_or(NormalizeError::MissingCatalogId(object))?;
    catalog_id_from_str(raw).ok_or_else(|| NormalizeError::InvalidCatalogId(raw.to_string()))
}

/// Parse `"715"`, `"715 [m]"`, `"14.7 [km/s]"` and convert to kilometer-based units.
fn quantity_km(raw: &str) -> Option<f64> {
    let (number, unit) = match raw.split_once('[') {
        Some((n, u)) => (n.trim(), u.trim_end_matches(']').trim().to_lowercase()),
        None => (raw.trim(), String::new()),
    };
    let value: f64 = number.parse().ok()?;
    match unit.as_str() {
        "m" | "m/s" => Some(value * M_TO_KM),
        "" | "km" | "km/s" => Some(value),
        _ => None,
    }
}

/// TCA of a raw message, if present and parseable.
pub fn raw_tca(block: &RawCdm) -> Option<DateTime<Utc>> {
    first_value(block, &TCA_KEYS).and_then(|raw| parse_utc(raw).ok())
}

/// Normalize one raw message into a [`GroundTruthConjunction`].
///
/// Arguments
/// -----------------
/// * `block`: the raw key/value message.
/// * `provider`: provenance tag stored on the record (e.g. `"space-track"`).
///
/// Return
/// ----------
/// * The normalized record, or a [`NormalizeError`] when the pair or the TCA cannot be
///   resolved. Optional fields that fail to parse become `None`.
pub fn normalize_cdm(
    block: &RawCdm,
    provider: &str,
) -> Result<GroundTruthConjunction, NormalizeError> {
    let primary = catalog_id(block, &OBJECT1_KEYS, 1)?;
    let secondary = catalog_id(block, &OBJECT2_KEYS, 2)?;

    let tca_raw = first_value(block, &TCA_KEYS).ok_or(NormalizeError::MissingTca)?;
    let tca = parse_utc(tca_raw).map_err(|_| NormalizeError::InvalidTca(tca_raw.to_string()))?;

    Ok(GroundTruthConjunction {
        cdm_id: first_value(block, &MESSAGE_ID_KEYS).map(str::to_string),
        norad_primary: Some(primary),
        norad_secondary: Some(secondary),
        tca_utc: Some(tca),
        miss_distance_km: first_value(block, &["MISS_DISTANCE"]).and_then(quantity_km),
        rel_speed_kms: first_value(block, &["RELATIVE_SPEED"]).and_then(quantity_km),
        provider: provider.to_string(),
    })
}

/// Normalize a batch of raw messages, dropping and counting the ones that fail.
pub fn normalize_all(
    blocks: &[RawCdm],
    provider: &str,
) -> (Vec<GroundTruthConjunction>, NormalizeDiagnostics) {
    let mut diagnostics = NormalizeDiagnostics {
        received: blocks.len(),
        ..Default::default()
    };

    let records: Vec<GroundTruthConjunction> = blocks
        .iter()
        .filter_map(|block| match normalize_cdm(block, provider) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(
                    message_id = first_value(block, &MESSAGE_ID_KEYS).unwrap_or("?"),
                    error = %e,
                    "dropping ground-truth record"
                );
                None
            }
        })
        .collect();

    diagnostics.normalized = records.len();
    diagnostics.dropped = diagnostics.received - diagnostics.normalized;
    (records, diagnostics)
}

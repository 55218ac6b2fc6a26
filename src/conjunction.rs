//! # Conjunction records
//!
//! The two record types exchanged between the screening side and the validation side
//! of the engine:
//!
//! * [`PredictedConjunction`] – the engine's own closest-approach estimate for a pair,
//!   produced by the close-pair finder and the risk scorer, persisted as one JSON line
//!   per record.
//! * [`GroundTruthConjunction`] – an authoritative report (CDM-class) after
//!   normalization.
//!
//! Both are keyed by a [`PairKey`], the catalog-id pair sorted ascending, so that
//! `(A, B)` and `(B, A)` denote the same pair.
//!
//! ## Wire tolerance
//! -----------------
//! Records are read back from logs written by other tools, so identifiers and instants
//! are modeled as `Option`: a catalog id given as `25544`, `25544.0` or `"25544"` is
//! accepted, anything else (`"abc"`, `1.5`, `null`, out-of-range) becomes `None`.
//! Such records are **not** coerced: the matcher drops and counts them.
use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{CatalogId, Kilometer, KmPerSecond};

/// Unordered pair of catalog ids, stored sorted ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(pub CatalogId, pub CatalogId);

impl PairKey {
    pub fn new(a: CatalogId, b: CatalogId) -> Self {
        if a <= b {
            PairKey(a, b)
        } else {
            PairKey(b, a)
        }
    }

    /// Build a key from two optional ids; `None` if either is missing.
    pub fn from_ids(a: Option<CatalogId>, b: Option<CatalogId>) -> Option<Self> {
        Some(PairKey::new(a?, b?))
    }
}

impl std::fmt::Display for PairKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

/// Engine-side close-approach estimate for one pair of objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedConjunction {
    #[serde(default, alias = "norad_a", with = "lenient_id")]
    pub norad_id_a: Option<CatalogId>,
    #[serde(default, alias = "norad_b", with = "lenient_id")]
    pub norad_id_b: Option<CatalogId>,
    #[serde(default, with = "crate::time::iso8601_opt")]
    pub tca_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub min_dist_km: Option<Kilometer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closing_velocity_kms: Option<KmPerSecond>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_class: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_a: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_b: Option<String>,
}

impl PredictedConjunction {
    /// A bare prediction: pair, TCA and minimum distance, no risk or names yet.
    pub fn new(
        norad_id_a: CatalogId,
        norad_id_b: CatalogId,
        tca_utc: DateTime<Utc>,
        min_dist_km: Kilometer,
    ) -> Self {
        PredictedConjunction {
            norad_id_a: Some(norad_id_a),
            norad_id_b: Some(norad_id_b),
            tca_utc: Some(tca_utc),
            min_dist_km: Some(min_dist_km),
            closing_velocity_kms: None,
            risk_score: None,
            risk_class: None,
            name_a: None,
            name_b: None,
        }
    }

    pub fn pair_key(&self) -> Option<PairKey> {
        PairKey::from_ids(self.norad_id_a, self.norad_id_b)
    }

    /// Total order used to make matching independent of input order.
    ///
    /// Compares pair key, TCA, distance, risk, closing velocity, then the stored id
    /// order and names.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.pair_key()
            .cmp(&other.pair_key())
            .then_with(|| self.tca_utc.cmp(&other.tca_utc))
            .then_with(|| cmp_opt_f64(self.min_dist_km, other.min_dist_km))
            .then_with(|| cmp_opt_f64(self.risk_score, other.risk_score))
            .then_with(|| self.risk_class.cmp(&other.risk_class))
            .then_with(|| cmp_opt_f64(self.closing_velocity_kms, other.closing_velocity_kms))
            .then_with(|| self.norad_id_a.cmp(&other.norad_id_a))
            .then_with(|| self.name_a.cmp(&other.name_a))
            .then_with(|| self.name_b.cmp(&other.name_b))
    }
}

/// Authoritative conjunction report after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthConjunction {
    #[serde(default)]
    pub cdm_id: Option<String>,
    #[serde(default, with = "lenient_id")]
    pub norad_primary: Option<CatalogId>,
    #[serde(default, with = "lenient_id")]
    pub norad_secondary: Option<CatalogId>,
    #[serde(default, with = "crate::time::iso8601_opt")]
    pub tca_utc: Option<DateTime<Utc>>,
    #[serde(default)]
    pub miss_distance_km: Option<Kilometer>,
    #[serde(default)]
    pub rel_speed_kms: Option<KmPerSecond>,
    #[serde(default)]
    pub provider: String,
}

impl GroundTruthConjunction {
    pub fn pair_key(&self) -> Option<PairKey> {
        PairKey::from_ids(self.norad_primary, self.norad_secondary)
    }

    /// Total order used to rank ground-truth candidates that share a pair key.
    pub fn canonical_cmp(&self, other: &Self) -> Ordering {
        self.pair_key()
            .cmp(&other.pair_key())
            .then_with(|| self.tca_utc.cmp(&other.tca_utc))
            .then_with(|| cmp_opt_f64(self.miss_distance_km, other.miss_distance_km))
            .then_with(|| cmp_opt_f64(self.rel_speed_kms, other.rel_speed_kms))
            .then_with(|| self.cdm_id.cmp(&other.cdm_id))
            .then_with(|| self.norad_primary.cmp(&other.norad_primary))
            .then_with(|| self.provider.cmp(&other.provider))
    }
}

/// `None` sorts first, floats by IEEE total order.
fn cmp_opt_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => x.total_cmp(&y),
    }
}

/// `serde` adapter for catalog ids read from loosely typed sources.
pub(crate) mod lenient_id {
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    use crate::constants::CatalogId;

    pub fn serialize<S: Serializer>(id: &Option<CatalogId>, s: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(v) => s.serialize_some(v),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<CatalogId>, D::Error> {
        let raw = Option::<Value>::deserialize(d)?;
        Ok(raw.as_ref().and_then(catalog_id_from_value))
    }

    pub(crate) fn catalog_id_from_value(value: &Value) -> Option<CatalogId> {
        match value {
            Value::Number(n) => n
                .as_u64()
                .or_else(|| {
                    n.as_f64()
                        .filter(|f| f.fract() == 0.0 && *f >= 0.0)
                        .map(|f| f as u64)
                })
                .and_then(|v| CatalogId::try_from(v).ok()),
            Value::String(s) => catalog_id_from_str(s),
            _ => None,
        }
    }

    pub(crate) fn catalog_id_from_str(s: &str) -> Option<CatalogId> {
        s.trim().parse::<CatalogId>().ok()
    }
}

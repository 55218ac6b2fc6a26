//! # Risk scoring
//!
//! Maps a predicted miss distance to a score in `[0, 1]` and a binary risk class:
//!
//! ```text
//! risk_score = exp(-d / scale)
//! risk_class = 1  if d < 0.2 · scale, else 0
//! ```
//!
//! The score is `1.0` for a zero distance, `e⁻¹ ≈ 0.3679` at one scale length, and
//! decreases monotonically with distance. Scoring is pure: re-scoring an already
//! scored record yields the same fields.
use std::cmp::Ordering;

use serde::Serialize;

use crate::{
    conjunction::PredictedConjunction,
    constants::{Kilometer, DEFAULT_RISK_SCALE_KM, RISK_CLASS_FRACTION},
    conjunctor_errors::ConjunctorError,
};

/// Score and class of one distance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RiskAssessment {
    pub risk_score: f64,
    pub risk_class: u8,
}

/// Exponential-decay risk model with a validated distance scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RiskScorer {
    scale_km: Kilometer,
}

impl Default for RiskScorer {
    fn default() -> Self {
        RiskScorer {
            scale_km: DEFAULT_RISK_SCALE_KM,
        }
    }
}

impl RiskScorer {
    /// Build a scorer; `scale_km` must be finite and strictly positive.
    pub fn new(scale_km: Kilometer) -> Result<Self, ConjunctorError> {
        if !(scale_km.is_finite() && scale_km > 0.0) {
            return Err(ConjunctorError::InvalidParameter(format!(
                "risk scale must be finite and > 0, got {scale_km}"
            )));
        }
        Ok(RiskScorer { scale_km })
    }

    pub fn scale_km(&self) -> Kilometer {
        self.scale_km
    }

    /// Score one distance (km). Negative distances count as contact, `NaN` as no risk.
    pub fn score(&self, distance_km: Kilometer) -> RiskAssessment {
        if distance_km.is_nan() {
            return RiskAssessment {
                risk_score: 0.0,
                risk_class: 0,
            };
        }
        let d = distance_km.max(0.0);
        RiskAssessment {
            risk_score: (-d / self.scale_km).exp(),
            risk_class: u8::from(d < RISK_CLASS_FRACTION * self.scale_km),
        }
    }

    /// Fill `risk_score` / `risk_class` in place. Records without a distance are left
    /// untouched.
    pub fn annotate(&self, record: &mut PredictedConjunction) {
        if let Some(d) = record.min_dist_km {
            let RiskAssessment {
                risk_score,
                risk_class,
            } = self.score(d);
            record.risk_score = Some(risk_score);
            record.risk_class = Some(risk_class);
        }
    }

    /// Score a batch and order it by decreasing risk.
    ///
    /// Unscored records come last; equal scores keep the canonical record order, so the
    /// result does not depend on the input order.
    pub fn apply(&self, mut records: Vec<PredictedConjunction>) -> Vec<PredictedConjunction> {
        records.iter_mut().for_each(|r| self.annotate(r));
        records.sort_by(|a, b| by_descending_risk(a, b).then_with(|| a.canonical_cmp(b)));
        records
    }
}

fn by_descending_risk(a: &PredictedConjunction, b: &PredictedConjunction) -> Ordering {
    match (a.risk_score, b.risk_score) {
        (Some(x), Some(y)) => y.total_cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

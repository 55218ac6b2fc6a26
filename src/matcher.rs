//! # Pair matcher
//!
//! Aligns the engine's [`PredictedConjunction`]s with normalized
//! [`GroundTruthConjunction`]s and classifies every record as a true positive, a false
//! positive or a false negative.
//!
//! ## Algorithm
//! -----------------
//! 1. **Sanitize** both sides: a record without a resolvable pair of distinct catalog
//!    ids or without a TCA is dropped and counted in [`MatchDiagnostics`].
//! 2. **Index** ground truth by [`PairKey`].
//! 3. Walk the predictions in canonical order. For each one, among the *unconsumed*
//!    candidates sharing its pair key whose TCA lies within `tca_window`, select the
//!    smallest `|Δt|` (exact ties go to the first candidate in canonical order).
//! 4. If a distance tolerance is configured and both sides carry a distance, a
//!    selection with `|Δd| > dist_window_km` is demoted to no match.
//! 5. A selection is a **TP** and consumes the candidate; otherwise the prediction is
//!    an **FP**.
//! 6. Every unconsumed ground-truth record whose pair key was predicted at least once is
//!    an **FN**. Ground truth on a pair the engine never predicted is a coverage gap,
//!    not a miss: it is only counted in [`MatchDiagnostics::untracked_ground_truth`].
//!
//! Both inputs are sorted canonically before matching, so the outcome depends on the
//! multiset of records and the parameters only, never on input order.
use ahash::{AHashMap, AHashSet};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    conjunction::{GroundTruthConjunction, PairKey, PredictedConjunction},
    constants::{Kilometer, DEFAULT_DIST_WINDOW_KM, DEFAULT_TCA_WINDOW_S},
    conjunctor_errors::ConjunctorError,
};

/// Matching tolerances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchParams {
    /// Maximum `|Δt|` between prediction and ground-truth TCA.
    pub tca_window: Duration,
    /// Maximum `|Δd|` between predicted and reported miss distance; `None` disables
    /// the distance check.
    pub dist_window_km: Option<Kilometer>,
}

impl Default for MatchParams {
    fn default() -> Self {
        MatchParams {
            tca_window: Duration::seconds(DEFAULT_TCA_WINDOW_S),
            dist_window_km: Some(DEFAULT_DIST_WINDOW_KM),
        }
    }
}

impl MatchParams {
    pub fn builder() -> MatchParamsBuilder {
        MatchParamsBuilder::new()
    }
}

/// Builder for [`MatchParams`], with validation.
#[derive(Debug, Clone, Default)]
pub struct MatchParamsBuilder {
    params: MatchParams,
}

impl MatchParamsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tca_window(mut self, v: Duration) -> Self {
        self.params.tca_window = v;
        self
    }
    /// Window in seconds; values beyond the `Duration` range saturate.
    pub fn tca_window_s(self, seconds: i64) -> Self {
        let window = Duration::try_seconds(seconds).unwrap_or(if seconds < 0 {
            Duration::MIN
        } else {
            Duration::MAX
        });
        self.tca_window(window)
    }
    pub fn dist_window_km(mut self, v: Option<Kilometer>) -> Self {
        self.params.dist_window_km = v;
        self
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `tca_window ≥ 0`.
    /// * `dist_window_km`, when set, finite and `≥ 0`.
    pub fn build(self) -> Result<MatchParams, ConjunctorError> {
        let p = self.params;
        if p.tca_window < Duration::zero() {
            return Err(ConjunctorError::InvalidParameter(format!(
                "tca_window must be >= 0, got {}",
                p.tca_window
            )));
        }
        if let Some(tol) = p.dist_window_km {
            if !(tol.is_finite() && tol >= 0.0) {
                return Err(ConjunctorError::InvalidParameter(format!(
                    "dist_window_km must be finite and >= 0, got {tol}"
                )));
            }
        }
        Ok(p)
    }
}

/// Classification of one match record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchType {
    #[serde(rename = "TP")]
    TruePositive,
    #[serde(rename = "FP")]
    FalsePositive,
    #[serde(rename = "FN")]
    FalseNegative,
}

/// One classified record: a TP links both sides, an FP only the prediction, an FN only
/// the ground truth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    #[serde(rename = "type")]
    pub kind: MatchType,
    pub pred: Option<PredictedConjunction>,
    pub cdm: Option<GroundTruthConjunction>,
}

impl MatchResult {
    pub fn true_positive(pred: PredictedConjunction, cdm: GroundTruthConjunction) -> Self {
        MatchResult {
            kind: MatchType::TruePositive,
            pred: Some(pred),
            cdm: Some(cdm),
        }
    }

    pub fn false_positive(pred: PredictedConjunction) -> Self {
        MatchResult {
            kind: MatchType::FalsePositive,
            pred: Some(pred),
            cdm: None,
        }
    }

    pub fn false_negative(cdm: GroundTruthConjunction) -> Self {
        MatchResult {
            kind: MatchType::FalseNegative,
            pred: None,
            cdm: Some(cdm),
        }
    }
}

/// Input accounting of one matching pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchDiagnostics {
    pub predictions_in: usize,
    pub predictions_clean: usize,
    pub predictions_dropped: usize,
    pub ground_truth_in: usize,
    pub ground_truth_clean: usize,
    pub ground_truth_dropped: usize,
    /// Sanitized ground truth on pairs with no prediction at all.
    pub untracked_ground_truth: usize,
}

/// Output of [`match_conjunctions`]: TP/FP records in canonical prediction order, then
/// FN records in canonical ground-truth order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchOutcome {
    pub results: Vec<MatchResult>,
    pub diagnostics: MatchDiagnostics,
}

fn usable_key(key: Option<PairKey>) -> Option<PairKey> {
    key.filter(|k| k.0 != k.1)
}

/// Classify predictions and ground truth into TP / FP / FN.
///
/// Arguments
/// -----------------
/// * `predictions`: the engine's conjunctions for the window.
/// * `ground_truth`: normalized authoritative reports for the same window.
/// * `params`: time and distance tolerances.
///
/// Return
/// ----------
/// * A [`MatchOutcome`]; invalid records are not errors, they are counted and skipped.
pub fn match_conjunctions(
    predictions: &[PredictedConjunction],
    ground_truth: &[GroundTruthConjunction],
    params: &MatchParams,
) -> MatchOutcome {
    let mut preds: Vec<&PredictedConjunction> = predictions
        .iter()
        .filter(|p| usable_key(p.pair_key()).is_some() && p.tca_utc.is_some())
        .collect();
    preds.sort_by(|a, b| a.canonical_cmp(b));

    let mut truths: Vec<&GroundTruthConjunction> = ground_truth
        .iter()
        .filter(|g| usable_key(g.pair_key()).is_some() && g.tca_utc.is_some())
        .collect();
    truths.sort_by(|a, b| a.canonical_cmp(b));

    let mut diagnostics = MatchDiagnostics {
        predictions_in: predictions.len(),
        predictions_clean: preds.len(),
        predictions_dropped: predictions.len() - preds.len(),
        ground_truth_in: ground_truth.len(),
        ground_truth_clean: truths.len(),
        ground_truth_dropped: ground_truth.len() - truths.len(),
        untracked_ground_truth: 0,
    };

    let mut candidates: AHashMap<PairKey, Vec<usize>> = AHashMap::new();
    for (idx, truth) in truths.iter().enumerate() {
        if let Some(key) = truth.pair_key() {
            candidates.entry(key).or_default().push(idx);
        }
    }

    let mut consumed = vec![false; truths.len()];
    let mut tracked = AHashSet::new();
    let mut results = Vec::with_capacity(preds.len() + truths.len());

    for pred in preds {
        let (Some(key), Some(tca)) = (pred.pair_key(), pred.tca_utc) else {
            continue;
        };
        tracked.insert(key);

        let mut best: Option<(usize, Duration)> = None;
        for &idx in candidates.get(&key).map(Vec::as_slice).unwrap_or_default() {
            let Some(truth_tca) = truths[idx].tca_utc else {
                continue;
            };
            let dt = (truth_tca - tca).abs();
            if consumed[idx] || dt > params.tca_window {
                continue;
            }
            if best.is_none_or(|(_, best_dt)| dt < best_dt) {
                best = Some((idx, dt));
            }
        }

        let selected = best.map(|(idx, _)| idx).filter(|&idx| {
            match (params.dist_window_km, pred.min_dist_km, truths[idx].miss_distance_km) {
                (Some(tol), Some(d_pred), Some(d_truth)) => (d_pred - d_truth).abs() <= tol,
                _ => true,
            }
        });

        match selected {
            Some(idx) => {
                consumed[idx] = true;
                results.push(MatchResult::true_positive(pred.clone(), truths[idx].clone()));
            }
            None => results.push(MatchResult::false_positive(pred.clone())),
        }
    }

    for (idx, truth) in truths.iter().enumerate() {
        if consumed[idx] {
            continue;
        }
        match truth.pair_key() {
            Some(key) if tracked.contains(&key) => {
                results.push(MatchResult::false_negative((*truth).clone()))
            }
            _ => diagnostics.untracked_ground_truth += 1,
        }
    }

    debug!(
        results = results.len(),
        dropped_predictions = diagnostics.predictions_dropped,
        dropped_ground_truth = diagnostics.ground_truth_dropped,
        untracked = diagnostics.untracked_ground_truth,
        "matching done"
    );

    MatchOutcome {
        results,
        diagnostics,
    }
}

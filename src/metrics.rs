//! # Accuracy metrics
//!
//! Reduces a set of [`MatchResult`]s to a [`MetricsReport`]:
//!
//! * confusion counts and precision / recall / F1,
//! * mean absolute errors over true positives (TCA in seconds, miss distance in km,
//!   closing velocity in km/s),
//! * a precision-recall curve over a risk-score threshold sweep.
//!
//! ## Zero guards
//! -----------------
//! Ratios use `max(1, denominator)`: with no predictions and no ground truth every
//! score is `0`, not `NaN`. This is a convention, not a statistical statement. An MAE
//! with no usable sample is likewise `0`.
//!
//! The reduction is pure and works equally on freshly computed matches and on a match
//! log read back from disk.
use serde::{Deserialize, Serialize};

use crate::{
    constants::{Kilometer, KmPerSecond, Seconds, PR_THRESHOLD_STEP},
    matcher::{MatchResult, MatchType},
};

/// Confusion counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub tp: usize,
    pub fp: usize,
    #[serde(rename = "fn")]
    pub fn_: usize,
}

/// One point of the precision-recall curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrPoint {
    pub thr: f64,
    pub precision: f64,
    pub recall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub counts: Counts,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub mae_seconds_tca: Seconds,
    pub mae_km_distance: Kilometer,
    pub mae_kms_velocity: KmPerSecond,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_curve: Option<Vec<PrPoint>>,
}

fn ratio(num: usize, den: usize) -> f64 {
    num as f64 / den.max(1) as f64
}

fn f1_score(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

#[derive(Default)]
struct Mae {
    sum: f64,
    n: usize,
}

impl Mae {
    fn push(&mut self, a: Option<f64>, b: Option<f64>) {
        if let (Some(a), Some(b)) = (a, b) {
            self.sum += (a - b).abs();
            self.n += 1;
        }
    }

    fn mean(&self) -> f64 {
        if self.n == 0 {
            0.0
        } else {
            self.sum / self.n as f64
        }
    }
}

/// Threshold grid `0.00, 0.05, …, 1.00`.
fn thresholds() -> impl Iterator<Item = f64> {
    let n = (1.0 / PR_THRESHOLD_STEP).round() as usize;
    (0..=n).map(move |i| (i as f64 * PR_THRESHOLD_STEP * 100.0).round() / 100.0)
}

fn pr_curve(results: &[MatchResult], counts: Counts) -> Option<Vec<PrPoint>> {
    let scored: Vec<(MatchType, Option<f64>)> = results
        .iter()
        .filter(|r| r.kind != MatchType::FalseNegative)
        .map(|r| (r.kind, r.pred.as_ref().and_then(|p| p.risk_score)))
        .collect();
    if scored.iter().all(|(_, score)| score.is_none()) {
        return None;
    }
    let scored: Vec<(MatchType, f64)> = scored
        .into_iter()
        .map(|(kind, score)| (kind, score.unwrap_or(0.0)))
        .collect();

    let curve = thresholds()
        .map(|thr| {
            let tp = scored
                .iter()
                .filter(|(k, s)| *k == MatchType::TruePositive && *s >= thr)
                .count();
            let fp = scored
                .iter()
                .filter(|(k, s)| *k == MatchType::FalsePositive && *s >= thr)
                .count();
            PrPoint {
                thr,
                precision: ratio(tp, tp + fp),
                recall: ratio(tp, counts.tp + counts.fn_),
            }
        })
        .collect();
    Some(curve)
}

/// Reduce match results to a [`MetricsReport`].
///
/// Arguments
/// -----------------
/// * `results`: TP/FP/FN records, as produced by
///   [`match_conjunctions`](crate::matcher::match_conjunctions) or read from a match log.
///
/// Return
/// ----------
/// * The report. `pr_curve` is present only when at least one TP/FP prediction carries
///   a risk score; missing scores then count as `0`.
pub fn compute_metrics(results: &[MatchResult]) -> MetricsReport {
    let mut counts = Counts::default();
    let mut mae_time = Mae::default();
    let mut mae_dist = Mae::default();
    let mut mae_vel = Mae::default();

    for r in results {
        match r.kind {
            MatchType::TruePositive => {
                counts.tp += 1;
                if let (Some(pred), Some(cdm)) = (&r.pred, &r.cdm) {
                    let dt = pred
                        .tca_utc
                        .zip(cdm.tca_utc)
                        .map(|(p, c)| (c - p).num_milliseconds() as f64 / 1000.0);
                    mae_time.push(dt, Some(0.0));
                    mae_dist.push(pred.min_dist_km, cdm.miss_distance_km);
                    mae_vel.push(pred.closing_velocity_kms, cdm.rel_speed_kms);
                }
            }
            MatchType::FalsePositive => counts.fp += 1,
            MatchType::FalseNegative => counts.fn_ += 1,
        }
    }

    let precision = ratio(counts.tp, counts.tp + counts.fp);
    let recall = ratio(counts.tp, counts.tp + counts.fn_);

    MetricsReport {
        counts,
        precision,
        recall,
        f1: f1_score(precision, recall),
        mae_seconds_tca: mae_time.mean(),
        mae_km_distance: mae_dist.mean(),
        mae_kms_velocity: mae_vel.mean(),
        pr_curve: pr_curve(results, counts),
    }
}

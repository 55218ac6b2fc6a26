mod common;

use approx::assert_relative_eq;
use conjunctor::{
    conjunction::PredictedConjunction,
    matcher::{match_conjunctions, MatchParams, MatchType},
    metrics::compute_metrics,
};

use crate::common::{prediction, secs, t0, truth};

fn params(tca_window_s: i64) -> MatchParams {
    MatchParams::builder()
        .tca_window_s(tca_window_s)
        .dist_window_km(Some(1.0))
        .build()
        .unwrap()
}

fn kinds(results: &[conjunctor::matcher::MatchResult]) -> Vec<MatchType> {
    results.iter().map(|r| r.kind).collect()
}

#[test]
fn test_single_true_positive_and_errors() {
    let preds = vec![prediction(100, 200, t0(), 0.3)];
    let truths = vec![truth("c1", 100, 200, t0() + secs(90), 0.35)];

    let outcome = match_conjunctions(&preds, &truths, &params(300));
    assert_eq!(kinds(&outcome.results), vec![MatchType::TruePositive]);

    let report = compute_metrics(&outcome.results);
    assert_eq!(report.counts.tp, 1);
    assert_relative_eq!(report.mae_seconds_tca, 90.0);
    assert_relative_eq!(report.mae_km_distance, 0.05, epsilon = 1e-12);
    assert_relative_eq!(report.precision, 1.0);
    assert_relative_eq!(report.recall, 1.0);
    assert_relative_eq!(report.f1, 1.0);
}

#[test]
fn test_outside_time_tolerance_is_fp_and_fn() {
    let preds = vec![prediction(100, 200, t0(), 0.3)];
    let truths = vec![truth("c1", 100, 200, t0() + secs(90), 0.35)];

    let outcome = match_conjunctions(&preds, &truths, &params(60));
    assert_eq!(
        kinds(&outcome.results),
        vec![MatchType::FalsePositive, MatchType::FalseNegative]
    );
    assert_eq!(outcome.diagnostics.untracked_ground_truth, 0);

    let report = compute_metrics(&outcome.results);
    assert_eq!((report.counts.tp, report.counts.fp, report.counts.fn_), (0, 1, 1));
    assert_eq!(report.mae_seconds_tca, 0.0);
}

#[test]
fn test_untracked_pair_is_not_a_false_negative() {
    let preds = vec![prediction(100, 200, t0(), 0.3)];
    let truths = vec![
        truth("c1", 100, 200, t0(), 0.3),
        truth("c2", 300, 400, t0(), 0.1),
    ];

    let outcome = match_conjunctions(&preds, &truths, &params(300));
    assert_eq!(kinds(&outcome.results), vec![MatchType::TruePositive]);
    assert_eq!(outcome.diagnostics.untracked_ground_truth, 1);
    assert_eq!(compute_metrics(&outcome.results).counts.fn_, 0);
}

#[test]
fn test_pair_key_is_order_independent() {
    let preds = vec![prediction(200, 100, t0(), 0.3)];
    let truths = vec![truth("c1", 100, 200, t0() + secs(10), 0.3)];

    let outcome = match_conjunctions(&preds, &truths, &params(300));
    assert_eq!(kinds(&outcome.results), vec![MatchType::TruePositive]);
}

#[test]
fn test_distance_tolerance_demotes_to_false_positive() {
    let preds = vec![prediction(100, 200, t0(), 0.3)];
    let truths = vec![truth("c1", 100, 200, t0(), 5.0)];

    let outcome = match_conjunctions(&preds, &truths, &params(300));
    assert_eq!(
        kinds(&outcome.results),
        vec![MatchType::FalsePositive, MatchType::FalseNegative]
    );

    let lenient = MatchParams::builder()
        .tca_window_s(300)
        .dist_window_km(None)
        .build()
        .unwrap();
    let outcome = match_conjunctions(&preds, &truths, &lenient);
    assert_eq!(kinds(&outcome.results), vec![MatchType::TruePositive]);
}

#[test]
fn test_each_ground_truth_is_consumed_once() {
    let preds = vec![
        prediction(100, 200, t0(), 0.3),
        prediction(100, 200, t0() + secs(30), 0.3),
    ];
    let truths = vec![truth("c1", 100, 200, t0() + secs(20), 0.3)];

    let outcome = match_conjunctions(&preds, &truths, &params(300));
    assert_eq!(
        kinds(&outcome.results),
        vec![MatchType::TruePositive, MatchType::FalsePositive]
    );
    // The earlier prediction is considered first and takes the only report.
    assert_eq!(outcome.results[0].pred.as_ref().unwrap().tca_utc, Some(t0()));
}

#[test]
fn test_nearest_in_time_candidate_wins() {
    let preds = vec![prediction(100, 200, t0(), 0.3)];
    let truths = vec![
        truth("far", 100, 200, t0() + secs(200), 0.3),
        truth("near", 100, 200, t0() - secs(50), 0.3),
    ];

    let outcome = match_conjunctions(&preds, &truths, &params(300));
    let tp = &outcome.results[0];
    assert_eq!(tp.kind, MatchType::TruePositive);
    assert_eq!(tp.cdm.as_ref().unwrap().cdm_id.as_deref(), Some("near"));
    assert_eq!(outcome.results[1].kind, MatchType::FalseNegative);
}

#[test]
fn test_conservation_of_records() {
    let preds = vec![
        prediction(1, 2, t0(), 0.5),
        prediction(1, 3, t0() + secs(600), 2.0),
        prediction(2, 3, t0() + secs(1200), 0.1),
        prediction(4, 4, t0(), 0.1),
    ];
    let truths = vec![
        truth("a", 2, 1, t0() + secs(100), 0.6),
        truth("b", 1, 3, t0() + secs(5000), 2.0),
        truth("c", 7, 8, t0(), 1.0),
    ];

    let outcome = match_conjunctions(&preds, &truths, &params(300));
    let report = compute_metrics(&outcome.results);
    let d = outcome.diagnostics;

    assert_eq!(d.predictions_dropped, 1);
    assert_eq!(report.counts.tp + report.counts.fp, d.predictions_clean);
    assert_eq!(
        report.counts.tp + report.counts.fn_ + d.untracked_ground_truth,
        d.ground_truth_clean
    );
    assert!((0.0..=1.0).contains(&report.precision));
    assert!((0.0..=1.0).contains(&report.recall));
    assert!((0.0..=1.0).contains(&report.f1));
}

#[test]
fn test_result_independent_of_input_order() {
    let mut preds: Vec<PredictedConjunction> = (0..6)
        .map(|i| prediction(10 + i % 3, 20, t0() + secs(40 * i as i64), 0.2 * i as f64))
        .collect();
    let mut truths = vec![
        truth("x", 20, 10, t0() + secs(10), 0.1),
        truth("y", 11, 20, t0() + secs(60), 0.3),
        truth("z", 12, 20, t0() + secs(200), 0.9),
        truth("w", 10, 20, t0() + secs(100), 0.5),
    ];

    let first = match_conjunctions(&preds, &truths, &params(120));
    preds.reverse();
    truths.rotate_left(2);
    let second = match_conjunctions(&preds, &truths, &params(120));

    let encode = |rs: &[conjunctor::matcher::MatchResult]| {
        rs.iter()
            .map(|r| serde_json::to_string(r).unwrap())
            .collect::<Vec<_>>()
            .join("\n")
    };
    assert_eq!(encode(&first.results), encode(&second.results));
    assert_eq!(first.diagnostics, second.diagnostics);
}

#[test]
fn test_empty_inputs() {
    let outcome = match_conjunctions(&[], &[], &MatchParams::default());
    assert!(outcome.results.is_empty());

    let report = compute_metrics(&outcome.results);
    assert_eq!(report.precision, 0.0);
    assert_eq!(report.recall, 0.0);
    assert_eq!(report.f1, 0.0);
    assert!(report.pr_curve.is_none());
}

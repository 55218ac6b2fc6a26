mod common;

use std::{fs, thread, time::Duration as StdDuration};

use approx::assert_relative_eq;
use camino::Utf8PathBuf;
use chrono::{DateTime, Duration, Utc};
use conjunctor::{
    conjunction::PredictedConjunction,
    conjunctor_errors::ConjunctorError,
    ground_truth::{
        DirectoryGroundTruthSource, FetchedGroundTruth, GroundTruthSource, UnavailableGroundTruth,
    },
    matcher::{MatchParams, MatchType},
    risk::RiskScorer,
    storage::{
        read_match_log, ArtifactStore, JsonlPredictionSource, LoadDiagnostics, LoadedPredictions,
        PredictionSource,
    },
    validator::{RunStage, ValidationReport, Validator, ValidatorConfig},
};

use crate::common::{prediction, secs, t0, temp_store};

const CDM_KVN: &str = "\
CCSDS_CDM_VERS = 1.0
MESSAGE_ID = c1
TCA = 2025-11-08T06:01:30
MISS_DISTANCE = 350 [m]
SAT_1_ID = 200
SAT_2_ID = 100

MESSAGE_ID = c2
TCA = 2025-11-08T09:00:00Z
MISS_DISTANCE = 0.2 [km]
SAT_1_ID = 500
SAT_2_ID = 600

MESSAGE_ID = c3
SAT_1_ID = 100
SAT_2_ID = 200
";

fn window() -> (DateTime<Utc>, DateTime<Utc>) {
    (t0(), t0() + Duration::days(1))
}

fn scored_predictions() -> Vec<PredictedConjunction> {
    let scorer = RiskScorer::default();
    scorer.apply(vec![
        prediction(100, 200, t0() + Duration::hours(6), 0.3),
        prediction(300, 400, t0() + Duration::hours(8), 1.0),
        prediction(100, 200, t0() + Duration::days(3), 0.1),
    ])
}

fn cdm_dir() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    fs::write(root.join("cdm.kvn"), CDM_KVN).unwrap();
    fs::write(root.join("truncated.json"), "[{\"CDM_ID\": ").unwrap();
    (dir, root)
}

/// Predictions served from memory, independent of any store.
struct InMemory(Vec<PredictedConjunction>);

impl PredictionSource for InMemory {
    fn load(
        &self,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> Result<LoadedPredictions, ConjunctorError> {
        Ok(LoadedPredictions {
            records: self.0.clone(),
            diagnostics: LoadDiagnostics {
                lines: self.0.len(),
                ..Default::default()
            },
        })
    }
}

/// A feed that answers long after any sensible timeout.
struct SlowSource;

impl GroundTruthSource for SlowSource {
    fn fetch(
        &self,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> Result<FetchedGroundTruth, ConjunctorError> {
        thread::sleep(StdDuration::from_secs(2));
        Ok(FetchedGroundTruth::default())
    }
}

#[test]
fn test_end_to_end_run() {
    let (_guard, store) = temp_store();
    store.write_predictions(&scored_predictions(), t0()).unwrap();
    let (_cdm_guard, cdm_root) = cdm_dir();

    let validator = Validator::new(
        ValidatorConfig::new(store.clone()),
        JsonlPredictionSource::new(store.clone()),
        DirectoryGroundTruthSource::new(&cdm_root),
    );
    let (start, end) = window();
    let report = validator.run(start, end, &MatchParams::default()).unwrap();

    let m = &report.metrics;
    assert_eq!((m.counts.tp, m.counts.fp, m.counts.fn_), (1, 1, 0));
    assert_relative_eq!(m.precision, 0.5);
    assert_relative_eq!(m.recall, 1.0);
    assert_relative_eq!(m.mae_seconds_tca, 90.0);
    assert_relative_eq!(m.mae_km_distance, 0.05, epsilon = 1e-9);
    assert_eq!(m.pr_curve.as_ref().map(Vec::len), Some(21));

    let d = &report.diagnostics;
    assert_eq!(d.predictions.lines, 3);
    assert_eq!(d.predictions.out_of_window, 1);
    assert_eq!(d.ground_truth_fetch.files, 2);
    assert_eq!(d.ground_truth_fetch.unreadable_files, 1);
    assert_eq!(d.ground_truth.received, 3);
    assert_eq!(d.ground_truth.dropped, 1);
    assert_eq!(d.matching.untracked_ground_truth, 1);
    assert!(!d.ground_truth_degraded);
    assert!(report.note.is_none());

    let logs: Vec<_> = fs::read_dir(store.runs_dir()).unwrap().collect();
    assert_eq!(logs.len(), 1);
    let log_path = Utf8PathBuf::from_path_buf(logs[0].as_ref().unwrap().path()).unwrap();
    let matches = read_match_log(&log_path).unwrap();
    assert_eq!(matches.len(), 2);

    let latest: ValidationReport = store.read_latest_summary().unwrap().unwrap();
    assert_eq!(latest, report);
}

#[test]
fn test_degraded_run_without_ground_truth() {
    let (_guard, store) = temp_store();
    store.write_predictions(&scored_predictions(), t0()).unwrap();

    let validator = Validator::new(
        ValidatorConfig::new(store.clone()),
        JsonlPredictionSource::new(store.clone()),
        UnavailableGroundTruth::new("offline"),
    );
    let (start, end) = window();
    let report = validator.run(start, end, &MatchParams::default()).unwrap();

    assert!(report.diagnostics.ground_truth_degraded);
    assert!(report.note.as_deref().unwrap().contains("offline"));
    assert_eq!(report.metrics.counts.fp, 2);
    assert_eq!(report.metrics.counts.tp, 0);
    assert_eq!(report.metrics.recall, 0.0);
    assert!(store.latest_summary_path().is_file());
}

#[test]
fn test_slow_ground_truth_times_out() {
    let (_guard, store) = temp_store();
    let config =
        ValidatorConfig::new(store).with_fetch_timeout(StdDuration::from_millis(50));
    let validator = Validator::new(
        config,
        InMemory(vec![prediction(1, 2, t0() + secs(60), 0.5)]),
        SlowSource,
    );

    let (start, end) = window();
    let report = validator.run(start, end, &MatchParams::default()).unwrap();
    assert!(report.diagnostics.ground_truth_degraded);
    assert!(report.note.as_deref().unwrap().contains("timed out"));
    assert_eq!(report.metrics.counts.fp, 1);
}

#[test]
fn test_consecutive_runs_keep_every_log() {
    let (_guard, store) = temp_store();
    let validator = Validator::new(
        ValidatorConfig::new(store.clone()),
        InMemory(vec![prediction(1, 2, t0() + secs(60), 0.5)]),
        UnavailableGroundTruth::new("offline"),
    );

    let (start, end) = window();
    for _ in 0..3 {
        validator.run(start, end, &MatchParams::default()).unwrap();
    }
    assert_eq!(fs::read_dir(store.runs_dir()).unwrap().count(), 3);

    let summary_dir = store.latest_summary_path();
    let summary_dir = summary_dir.parent().unwrap();
    assert_eq!(fs::read_dir(summary_dir).unwrap().count(), 1);
}

#[test]
fn test_persist_failure_keeps_results() {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().join("not-a-dir")).unwrap();
    fs::write(&root, "occupied").unwrap();

    let validator = Validator::new(
        ValidatorConfig::new(ArtifactStore::new(root)),
        InMemory(vec![prediction(1, 2, t0() + secs(60), 0.5)]),
        UnavailableGroundTruth::new("offline"),
    );

    let (start, end) = window();
    let failure = validator
        .run(start, end, &MatchParams::default())
        .unwrap_err();
    assert_eq!(failure.stage, RunStage::Persist);
    assert!(matches!(failure.source, ConjunctorError::IoError(_)));
    assert_eq!(failure.matches.len(), 1);
    assert_eq!(failure.matches[0].kind, MatchType::FalsePositive);

    let report = failure.report.unwrap();
    assert_eq!(report.metrics.counts.fp, 1);

    // A retry against a writable store needs no recomputation.
    let (_guard, good) = temp_store();
    let retry = Validator::new(
        ValidatorConfig::new(good.clone()),
        InMemory(Vec::new()),
        UnavailableGroundTruth::new("offline"),
    );
    let artifacts = retry.persist(&report, &failure.matches, Utc::now()).unwrap();
    assert!(artifacts.match_log.is_file());
    assert_eq!(artifacts.latest_summary, good.latest_summary_path());
}

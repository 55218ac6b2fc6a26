//! # Validation orchestrator
//!
//! One [`Validator::run`] validates the predictions of a time window against ground
//! truth and persists the outcome. The run is a linear state machine:
//!
//! ```text
//! LoadPredictions → FetchGroundTruth → Match → Aggregate → Persist → Done
//! ```
//!
//! ## Degraded mode
//! -----------------
//! The ground-truth fetch is a blocking collaborator call. It runs on a dedicated worker
//! thread and is abandoned after [`ValidatorConfig::fetch_timeout`]. A fetch error or a
//! timeout is **not** a run failure: matching proceeds with an empty ground-truth set
//! (every prediction becomes a false positive), and the report carries a `note` and
//! [`RunDiagnostics::ground_truth_degraded`] so the caller can tell.
//!
//! ## Failures
//! -----------------
//! A run fails only when predictions cannot be read or when artifacts cannot be
//! written. A persistence failure still hands the computed report and match records
//! back in [`RunFailure`], and [`Validator::persist`] can retry the write without
//! recomputing anything.
use std::{
    fmt,
    sync::{mpsc, Arc},
    thread,
    time::Duration as StdDuration,
};

use camino::Utf8PathBuf;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    constants::DEFAULT_FETCH_TIMEOUT_S,
    conjunctor_errors::ConjunctorError,
    ground_truth::{FetchDiagnostics, FetchedGroundTruth, GroundTruthSource},
    matcher::{match_conjunctions, MatchDiagnostics, MatchParams, MatchResult},
    metrics::{compute_metrics, MetricsReport},
    normalizer::{normalize_all, NormalizeDiagnostics},
    storage::{ArtifactStore, LoadDiagnostics, PredictionSource},
};

/// Where a run is, or where it stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStage {
    LoadPredictions,
    FetchGroundTruth,
    Match,
    Aggregate,
    Persist,
    Done,
}

impl fmt::Display for RunStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunStage::LoadPredictions => "load_predictions",
            RunStage::FetchGroundTruth => "fetch_ground_truth",
            RunStage::Match => "match",
            RunStage::Aggregate => "aggregate",
            RunStage::Persist => "persist",
            RunStage::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    pub store: ArtifactStore,
    pub fetch_timeout: StdDuration,
}

impl ValidatorConfig {
    pub fn new(store: ArtifactStore) -> Self {
        ValidatorConfig {
            store,
            fetch_timeout: StdDuration::from_secs(DEFAULT_FETCH_TIMEOUT_S),
        }
    }

    pub fn with_fetch_timeout(mut self, timeout: StdDuration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// Every counter collected along a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub predictions: LoadDiagnostics,
    pub ground_truth_fetch: FetchDiagnostics,
    pub ground_truth: NormalizeDiagnostics,
    pub matching: MatchDiagnostics,
    pub ground_truth_degraded: bool,
}

/// Outcome of one run; also the content of `latest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(with = "crate::time::iso8601_window")]
    pub window: (DateTime<Utc>, DateTime<Utc>),
    pub metrics: MetricsReport,
    pub diagnostics: RunDiagnostics,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Paths written by a successful persistence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunArtifacts {
    pub match_log: Utf8PathBuf,
    pub latest_summary: Utf8PathBuf,
}

/// A run that could not complete.
///
/// When the failure happens at [`RunStage::Persist`], `report` and `matches` hold the
/// computed results.
#[derive(Error, Debug)]
#[error("validation run failed at stage {stage}: {source}")]
pub struct RunFailure {
    pub stage: RunStage,
    pub report: Option<Box<ValidationReport>>,
    pub matches: Vec<MatchResult>,
    pub source: ConjunctorError,
}

impl RunFailure {
    fn early(stage: RunStage, source: ConjunctorError) -> Self {
        RunFailure {
            stage,
            report: None,
            matches: Vec::new(),
            source,
        }
    }
}

/// Composes prediction loading, ground-truth fetching, matching, metrics and
/// persistence for one window.
pub struct Validator {
    config: ValidatorConfig,
    predictions: Box<dyn PredictionSource>,
    ground_truth: Arc<dyn GroundTruthSource>,
}

impl Validator {
    pub fn new(
        config: ValidatorConfig,
        predictions: impl PredictionSource + 'static,
        ground_truth: impl GroundTruthSource + 'static,
    ) -> Self {
        Validator {
            config,
            predictions: Box::new(predictions),
            ground_truth: Arc::new(ground_truth),
        }
    }

    /// Validate the window `[start, end]`.
    ///
    /// Arguments
    /// -----------------
    /// * `start`, `end`: window bounds (UTC, inclusive).
    /// * `params`: matching tolerances.
    ///
    /// Return
    /// ----------
    /// * The [`ValidationReport`], also written to `latest.json`, with the match records
    ///   written to a new run log.
    /// * A [`RunFailure`] if the window is inverted, predictions cannot be read, or
    ///   artifacts cannot be written.
    pub fn run(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        params: &MatchParams,
    ) -> Result<ValidationReport, RunFailure> {
        info!(stage = %RunStage::LoadPredictions, %start, %end, "validation run");
        if start > end {
            return Err(RunFailure::early(
                RunStage::LoadPredictions,
                ConjunctorError::InvalidParameter(format!("window start {start} after end {end}")),
            ));
        }
        let loaded = self
            .predictions
            .load(start, end)
            .map_err(|e| RunFailure::early(RunStage::LoadPredictions, e))?;

        info!(stage = %RunStage::FetchGroundTruth, predictions = loaded.records.len());
        let (fetched, note) = match self.fetch_ground_truth(start, end) {
            Ok(fetched) => (fetched, None),
            Err(e) => {
                warn!(error = %e, "ground truth unavailable, continuing with predictions only");
                (
                    FetchedGroundTruth::default(),
                    Some(format!(
                        "ground truth unavailable ({e}); metrics computed from predictions only"
                    )),
                )
            }
        };
        let (truths, normalize_diagnostics) =
            normalize_all(&fetched.blocks, self.ground_truth.provider());

        info!(stage = %RunStage::Match, ground_truth = truths.len());
        let outcome = match_conjunctions(&loaded.records, &truths, params);

        info!(stage = %RunStage::Aggregate, results = outcome.results.len());
        let report = ValidationReport {
            window: (start, end),
            metrics: compute_metrics(&outcome.results),
            diagnostics: RunDiagnostics {
                predictions: loaded.diagnostics,
                ground_truth_fetch: fetched.diagnostics,
                ground_truth: normalize_diagnostics,
                matching: outcome.diagnostics,
                ground_truth_degraded: note.is_some(),
            },
            note,
        };

        info!(stage = %RunStage::Persist);
        match self.persist(&report, &outcome.results, Utc::now()) {
            Ok(artifacts) => {
                info!(
                    stage = %RunStage::Done,
                    match_log = %artifacts.match_log,
                    precision = report.metrics.precision,
                    recall = report.metrics.recall,
                );
                Ok(report)
            }
            Err(source) => Err(RunFailure {
                stage: RunStage::Persist,
                report: Some(Box::new(report)),
                matches: outcome.results,
                source,
            }),
        }
    }

    /// Write the run log and replace `latest.json`.
    pub fn persist(
        &self,
        report: &ValidationReport,
        matches: &[MatchResult],
        at: DateTime<Utc>,
    ) -> Result<RunArtifacts, ConjunctorError> {
        let match_log = self.config.store.write_match_log(matches, at)?;
        let latest_summary = self.config.store.write_latest_summary(report)?;
        Ok(RunArtifacts {
            match_log,
            latest_summary,
        })
    }

    fn fetch_ground_truth(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FetchedGroundTruth, ConjunctorError> {
        let (tx, rx) = mpsc::channel();
        let source = Arc::clone(&self.ground_truth);

        thread::Builder::new()
            .name("ground-truth-fetch".into())
            .spawn(move || {
                // The receiver is gone if the fetch outlived its timeout.
                let _ = tx.send(source.fetch(start, end));
            })?;

        match rx.recv_timeout(self.config.fetch_timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                Err(ConjunctorError::GroundTruthTimeout(self.config.fetch_timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(
                ConjunctorError::GroundTruthUnavailable("fetch worker terminated".into()),
            ),
        }
    }
}

#[cfg(test)]
mod validator_test {
    use super::*;
    use crate::{ground_truth::UnavailableGroundTruth, storage::JsonlPredictionSource};
    use chrono::TimeZone;
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 8, 0, 0, 0).unwrap()
    }

    fn report() -> ValidationReport {
        ValidationReport {
            window: (t0(), t0() + chrono::Duration::days(1)),
            metrics: compute_metrics(&[]),
            diagnostics: RunDiagnostics::default(),
            note: None,
        }
    }

    #[test]
    fn test_report_json_shape() {
        let value = serde_json::to_value(report()).unwrap();
        assert_eq!(
            value["window"],
            json!(["2025-11-08T00:00:00Z", "2025-11-09T00:00:00Z"])
        );
        assert!(value.get("note").is_none());
        assert_eq!(value["diagnostics"]["ground_truth_degraded"], false);

        let back: ValidationReport = serde_json::from_value(value).unwrap();
        assert_eq!(back, report());
    }

    #[test]
    fn test_inverted_window_fails_early() {
        let dir = tempfile::tempdir().unwrap();
        let store =
            ArtifactStore::new(Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap());
        let validator = Validator::new(
            ValidatorConfig::new(store.clone()),
            JsonlPredictionSource::new(store),
            UnavailableGroundTruth::new("offline"),
        );

        let err = validator
            .run(t0(), t0() - chrono::Duration::hours(1), &MatchParams::default())
            .unwrap_err();
        assert_eq!(err.stage, RunStage::LoadPredictions);
        assert!(err.report.is_none());
        assert!(matches!(err.source, ConjunctorError::InvalidParameter(_)));
    }

    #[test]
    fn test_stage_names() {
        assert_eq!(RunStage::FetchGroundTruth.to_string(), "fetch_ground_truth");
        assert_eq!(RunStage::Done.to_string(), "done");
    }
}

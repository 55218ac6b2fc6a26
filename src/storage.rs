//! # Artifact store
//!
//! All persisted artifacts live under one storage root, passed explicitly at
//! construction so that concurrent runs and tests can use isolated trees:
//!
//! ```text
//! <root>/predictions/<YYYYMMDDTHHMMSSZ>.jsonl      one PredictedConjunction per line
//! <root>/validation/runs/<YYYYMMDDTHHMMSSZ>.jsonl  one MatchResult per line
//! <root>/validation/summary/latest.json            last validation summary
//! ```
//!
//! ## Concurrency
//! -----------------
//! * Per-run files are **append-only and uniquely named**: they are opened with
//!   `create_new`, and a `-1`, `-2`, … suffix is added when two runs share the same
//!   second. An existing artifact is never rewritten.
//! * `latest.json` is the only overwritten file. It is written to a temporary file in
//!   the same directory and atomically renamed over the previous summary, so a
//!   concurrent reader sees either the old or the new summary, never a partial one.
use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, ErrorKind, Write},
};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::{
    conjunction::PredictedConjunction, conjunctor_errors::ConjunctorError,
    matcher::MatchResult, time::run_stamp,
};

const PREDICTIONS_DIR: &str = "predictions";
const RUNS_DIR: &str = "validation/runs";
const SUMMARY_DIR: &str = "validation/summary";
const LATEST_FILE: &str = "latest.json";
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Filesystem layout of one deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    root: Utf8PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        ArtifactStore { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn predictions_dir(&self) -> Utf8PathBuf {
        self.root.join(PREDICTIONS_DIR)
    }

    pub fn runs_dir(&self) -> Utf8PathBuf {
        self.root.join(RUNS_DIR)
    }

    pub fn latest_summary_path(&self) -> Utf8PathBuf {
        self.root.join(SUMMARY_DIR).join(LATEST_FILE)
    }

    /// Persist a prediction batch as a new partition named after `at`.
    pub fn write_predictions(
        &self,
        records: &[PredictedConjunction],
        at: DateTime<Utc>,
    ) -> Result<Utf8PathBuf, ConjunctorError> {
        write_jsonl(&self.predictions_dir(), &run_stamp(&at), records)
    }

    /// Persist the match records of one validation run.
    pub fn write_match_log(
        &self,
        results: &[MatchResult],
        at: DateTime<Utc>,
    ) -> Result<Utf8PathBuf, ConjunctorError> {
        write_jsonl(&self.runs_dir(), &run_stamp(&at), results)
    }

    /// Atomically replace `latest.json` with `summary`.
    pub fn write_latest_summary<T: Serialize>(
        &self,
        summary: &T,
    ) -> Result<Utf8PathBuf, ConjunctorError> {
        let target = self.latest_summary_path();
        let dir = target
            .parent()
            .ok_or_else(|| ConjunctorError::Utf8PathError(format!("no parent for {target}")))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, summary)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&target).map_err(|e| e.error)?;

        debug!(path = %target, "latest summary replaced");
        Ok(target)
    }

    /// Read back `latest.json`, `None` if no run has completed yet.
    pub fn read_latest_summary<T: DeserializeOwned>(&self) -> Result<Option<T>, ConjunctorError> {
        match fs::read_to_string(self.latest_summary_path()) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Prediction partitions in name order (which is chronological).
    pub fn prediction_partitions(&self) -> Result<Vec<Utf8PathBuf>, ConjunctorError> {
        list_jsonl(&self.predictions_dir())
    }
}

fn create_unique(dir: &Utf8Path, stamp: &str) -> Result<(Utf8PathBuf, File), ConjunctorError> {
    fs::create_dir_all(dir)?;
    for attempt in 0..MAX_NAME_ATTEMPTS {
        let name = match attempt {
            0 => format!("{stamp}.jsonl"),
            n => format!("{stamp}-{n}.jsonl"),
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(ConjunctorError::IoError(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free artifact name for {stamp} in {dir}"),
    )))
}

fn write_jsonl<T: Serialize>(
    dir: &Utf8Path,
    stamp: &str,
    records: &[T],
) -> Result<Utf8PathBuf, ConjunctorError> {
    let (path, file) = create_unique(dir, stamp)?;
    let mut out = BufWriter::new(file);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    out.get_ref().sync_all()?;

    debug!(path = %path, records = records.len(), "artifact written");
    Ok(path)
}

fn list_jsonl(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ConjunctorError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in entries {
        let path = Utf8PathBuf::from_path_buf(entry?.path())
            .map_err(|p| ConjunctorError::Utf8PathError(p.display().to_string()))?;
        if path.extension() == Some("jsonl") && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Read a persisted match log back, e.g. to regenerate a lost summary.
pub fn read_match_log(path: &Utf8Path) -> Result<Vec<MatchResult>, ConjunctorError> {
    let reader = BufReader::new(File::open(path)?);
    let mut results = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        results.push(serde_json::from_str(&line)?);
    }
    Ok(results)
}

/// Reader side of the prediction store.
pub trait PredictionSource: Send + Sync {
    /// Predictions whose TCA lies in `[start, end]`.
    fn load(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<LoadedPredictions, ConjunctorError>;
}

/// Line accounting of a prediction load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadDiagnostics {
    pub files: usize,
    pub lines: usize,
    /// Lines that are not a JSON object of the prediction shape.
    pub malformed: usize,
    /// Records without a usable TCA, which cannot be placed in a window.
    pub missing_tca: usize,
    pub out_of_window: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadedPredictions {
    pub records: Vec<PredictedConjunction>,
    pub diagnostics: LoadDiagnostics,
}

/// Reads every JSONL partition under `<root>/predictions`.
///
/// Malformed lines are skipped and counted; records with bad catalog ids are kept so
/// that the matcher accounts for them.
#[derive(Debug, Clone)]
pub struct JsonlPredictionSource {
    store: ArtifactStore,
}

impl JsonlPredictionSource {
    pub fn new(store: ArtifactStore) -> Self {
        JsonlPredictionSource { store }
    }
}

impl PredictionSource for JsonlPredictionSource {
    fn load(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<LoadedPredictions, ConjunctorError> {
        let mut loaded = LoadedPredictions::default();

        for path in self.store.prediction_partitions()? {
            loaded.diagnostics.files += 1;
            let reader = BufReader::new(File::open(&path)?);

            for raw in reader.split(b'\n') {
                let raw = raw?;
                if raw.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                loaded.diagnostics.lines += 1;

                let line = match String::from_utf8(raw) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(path = %path, error = %e, "skipping non UTF-8 prediction line");
                        loaded.diagnostics.malformed += 1;
                        continue;
                    }
                };
                let record: PredictedConjunction = match serde_json::from_str(&line) {
                    Ok(record) => record,
                    Err(e) => {
                        warn!(path = %path, error = %e, "skipping malformed prediction line");
                        loaded.diagnostics.malformed += 1;
                        continue;
                    }
                };
                let tca = record.tca_utc;
                match tca {
                    None => loaded.diagnostics.missing_tca += 1,
                    Some(tca) if tca < start || tca > end => loaded.diagnostics.out_of_window += 1,
                    Some(_) => loaded.records.push(record),
                }
            }
        }

        debug!(
            files = loaded.diagnostics.files,
            kept = loaded.records.len(),
            malformed = loaded.diagnostics.malformed,
            "predictions loaded"
        );
        Ok(loaded)
    }
}

//! # Ground-truth sources
//!
//! [`GroundTruthSource`] is the collaborator the validator calls to obtain raw
//! conjunction reports for a window. Remote catalogs (and their credentials) stay
//! outside the crate; two local implementations are provided:
//!
//! * [`DirectoryGroundTruthSource`] – CDM files dropped in a directory: `*.kvn` and
//!   `*.txt` as KVN text, `*.json` as a JSON array of CDM objects (or a single object).
//! * [`UnavailableGroundTruth`] – a source that always fails, used when no feed is
//!   configured; the validator then runs in degraded mode.
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    constants::DEFAULT_PROVIDER,
    conjunctor_errors::ConjunctorError,
    normalizer::{parse_kvn_blocks, raw_cdm_from_json, raw_tca, RawCdm},
};

/// Inputs a source had to leave out of a fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchDiagnostics {
    pub files: usize,
    /// Files that could not be read or decoded.
    pub unreadable_files: usize,
    /// Entries of a readable file that are not a CDM object.
    pub skipped_items: usize,
    pub outside_window: usize,
}

/// Raw reports of one fetch, with the accounting of what was skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchedGroundTruth {
    pub blocks: Vec<RawCdm>,
    pub diagnostics: FetchDiagnostics,
}

/// Supplier of raw conjunction reports.
///
/// `fetch` may block; the validator runs it on a worker thread with a timeout.
pub trait GroundTruthSource: Send + Sync {
    fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FetchedGroundTruth, ConjunctorError>;

    /// Provenance tag stored on the normalized records.
    fn provider(&self) -> &str {
        DEFAULT_PROVIDER
    }
}

/// CDM files in a local directory.
///
/// Messages whose TCA parses and falls outside `[start, end]` are skipped; messages
/// with a missing or broken TCA are passed through so that normalization rejects and
/// counts them.
#[derive(Debug, Clone)]
pub struct DirectoryGroundTruthSource {
    dir: Utf8PathBuf,
    provider: String,
}

impl DirectoryGroundTruthSource {
    pub fn new(dir: &Utf8Path) -> Self {
        DirectoryGroundTruthSource {
            dir: dir.to_path_buf(),
            provider: DEFAULT_PROVIDER.to_string(),
        }
    }

    pub fn with_provider(mut self, provider: &str) -> Self {
        self.provider = provider.to_string();
        self
    }

    /// Blocks of one file and the number of non-object entries it held.
    fn read_file(path: &Utf8Path) -> Result<(Vec<RawCdm>, usize), ConjunctorError> {
        let text = fs::read_to_string(path)?;
        match path.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("kvn") | Some("txt") => Ok((parse_kvn_blocks(&text), 0)),
            Some("json") => {
                let value: Value = serde_json::from_str(&text)?;
                let parsed = match &value {
                    Value::Array(items) => {
                        let blocks: Vec<RawCdm> = items
                            .iter()
                            .filter_map(Value::as_object)
                            .map(raw_cdm_from_json)
                            .collect();
                        let skipped = items.len() - blocks.len();
                        (blocks, skipped)
                    }
                    Value::Object(object) => (vec![raw_cdm_from_json(object)], 0),
                    _ => (Vec::new(), 1),
                };
                Ok(parsed)
            }
            _ => Ok((Vec::new(), 0)),
        }
    }
}

fn is_cdm_file(path: &Utf8Path) -> bool {
    matches!(
        path.extension().map(str::to_ascii_lowercase).as_deref(),
        Some("kvn") | Some("txt") | Some("json")
    )
}

impl GroundTruthSource for DirectoryGroundTruthSource {
    fn fetch(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<FetchedGroundTruth, ConjunctorError> {
        if !self.dir.is_dir() {
            return Err(ConjunctorError::GroundTruthUnavailable(format!(
                "{} is not a directory",
                self.dir
            )));
        }

        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = Utf8PathBuf::from_path_buf(entry?.path())
                .map_err(|p| ConjunctorError::Utf8PathError(p.display().to_string()))?;
            if path.is_file() && is_cdm_file(&path) {
                paths.push(path);
            }
        }
        paths.sort();

        let mut fetched = FetchedGroundTruth::default();
        fetched.diagnostics.files = paths.len();
        for path in &paths {
            match Self::read_file(path) {
                Ok((found, skipped)) => {
                    if skipped > 0 {
                        warn!(path = %path, skipped, "skipping non-object CDM entries");
                    }
                    fetched.diagnostics.skipped_items += skipped;
                    fetched.blocks.extend(found);
                }
                Err(e) => {
                    warn!(path = %path, error = %e, "skipping unreadable CDM file");
                    fetched.diagnostics.unreadable_files += 1;
                }
            }
        }

        let before = fetched.blocks.len();
        fetched
            .blocks
            .retain(|block| raw_tca(block).is_none_or(|tca| start <= tca && tca <= end));
        fetched.diagnostics.outside_window = before - fetched.blocks.len();
        debug!(
            files = fetched.diagnostics.files,
            kept = fetched.blocks.len(),
            outside_window = fetched.diagnostics.outside_window,
            "ground truth read from directory"
        );
        Ok(fetched)
    }

    fn provider(&self) -> &str {
        &self.provider
    }
}

/// A source with no backing feed: every fetch fails with the configured reason.
#[derive(Debug, Clone)]
pub struct UnavailableGroundTruth {
    reason: String,
}

impl UnavailableGroundTruth {
    pub fn new(reason: impl Into<String>) -> Self {
        UnavailableGroundTruth {
            reason: reason.into(),
        }
    }
}

impl GroundTruthSource for UnavailableGroundTruth {
    fn fetch(
        &self,
        _: DateTime<Utc>,
        _: DateTime<Utc>,
    ) -> Result<FetchedGroundTruth, ConjunctorError> {
        Err(ConjunctorError::GroundTruthUnavailable(self.reason.clone()))
    }
}

//! # Orbital element sets
//!
//! Ingestion of **two-line element sets** (TLE) into [`OrbitalElementSet`] values, the
//! immutable per-object input of the propagator.
//!
//! ## Formats
//! -----------------
//! * **3-line** groups: a name line (optionally prefixed with `0 `), line 1, line 2.
//! * **2-line** groups: line 1 and line 2 only; the name defaults to the catalog number.
//!
//! The NORAD catalog number is read from columns 3–7 of line 1 and must agree with the
//! one on line 2. The two element lines themselves are kept as opaque strings: checksum
//! and field validation is the propagator's job.
//!
//! ## Sources
//! -----------------
//! [`ElementSource`] is the narrow interface the screening pipeline consumes; the crate
//! ships [`TleFileSource`], which reads a catalog snapshot from disk. Downloading fresh
//! snapshots from a remote catalog is left to the caller.
use camino::{Utf8Path, Utf8PathBuf};
use itertools::Itertools;
use tracing::debug;

use crate::{
    conjunction::lenient_id::catalog_id_from_str, constants::CatalogId,
    conjunctor_errors::ConjunctorError,
};

/// One tracked object's orbital state: catalog id, display name and the two TLE lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrbitalElementSet {
    pub norad_id: CatalogId,
    pub name: String,
    pub line1: String,
    pub line2: String,
}

impl OrbitalElementSet {
    /// Build an element set from its two lines, extracting the catalog number.
    ///
    /// Arguments
    /// -----------------
    /// * `name`: display name; `None` uses the catalog number.
    /// * `line1`, `line2`: the TLE lines.
    ///
    /// Return
    /// ----------
    /// * The element set, or [`ConjunctorError::InvalidElementSet`] when the line numbers,
    ///   the catalog field or the line-1/line-2 agreement are wrong.
    pub fn from_lines(
        name: Option<&str>,
        line1: &str,
        line2: &str,
    ) -> Result<Self, ConjunctorError> {
        let line1 = line1.trim_end();
        let line2 = line2.trim_end();

        if !line1.starts_with("1 ") || !line2.starts_with("2 ") {
            return Err(ConjunctorError::InvalidElementSet(format!(
                "expected TLE line 1 / line 2, got {line1:?} / {line2:?}"
            )));
        }

        let norad_id = catalog_number(line1)?;
        if catalog_number(line2)? != norad_id {
            return Err(ConjunctorError::InvalidElementSet(format!(
                "catalog number mismatch between lines for {norad_id}"
            )));
        }

        let name = name
            .map(|n| n.trim().trim_start_matches("0 ").trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| norad_id.to_string());

        Ok(OrbitalElementSet {
            norad_id,
            name,
            line1: line1.to_string(),
            line2: line2.to_string(),
        })
    }
}

fn catalog_number(line: &str) -> Result<CatalogId, ConjunctorError> {
    line.get(2..7)
        .and_then(catalog_id_from_str)
        .ok_or_else(|| ConjunctorError::InvalidElementSet(format!("bad catalog field in {line:?}")))
}

/// Parse a TLE document made of 3-line and/or 2-line groups.
///
/// Blank lines are ignored. Parsing is fail-fast: the first malformed group aborts with
/// [`ConjunctorError::InvalidElementSet`].
pub fn parse_tle_text(text: &str) -> Result<Vec<OrbitalElementSet>, ConjunctorError> {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();

    let mut sets = Vec::with_capacity(lines.len() / 3);
    let mut i = 0;
    while i < lines.len() {
        let (name, first, width) = if lines[i].starts_with("1 ") {
            (None, i, 2)
        } else {
            (Some(lines[i]), i + 1, 3)
        };

        let (Some(l1), Some(l2)) = (lines.get(first), lines.get(first + 1)) else {
            return Err(ConjunctorError::InvalidElementSet(format!(
                "truncated element set starting at {:?}",
                lines[i]
            )));
        };

        sets.push(OrbitalElementSet::from_lines(name, l1, l2)?);
        i += width;
    }

    Ok(sets)
}

/// Anything able to yield a catalog snapshot.
pub trait ElementSource {
    fn load(&self) -> Result<Vec<OrbitalElementSet>, ConjunctorError>;
}

/// TLE file on disk.
///
/// Duplicated catalog numbers keep their first occurrence. `limit` truncates the
/// snapshot to its first objects, which keeps exploratory runs fast.
#[derive(Debug, Clone)]
pub struct TleFileSource {
    path: Utf8PathBuf,
    limit: Option<usize>,
}

impl TleFileSource {
    pub fn new(path: &Utf8Path) -> Self {
        TleFileSource {
            path: path.to_path_buf(),
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

impl ElementSource for TleFileSource {
    fn load(&self) -> Result<Vec<OrbitalElementSet>, ConjunctorError> {
        let text = std::fs::read_to_string(&self.path)?;
        let parsed = parse_tle_text(&text)?;
        let total = parsed.len();

        let sets: Vec<OrbitalElementSet> = parsed
            .into_iter()
            .unique_by(|set| set.norad_id)
            .take(self.limit.unwrap_or(usize::MAX))
            .collect();

        debug!(path = %self.path, total, kept = sets.len(), "loaded element sets");
        Ok(sets)
    }
}

#![allow(dead_code)]

use camino::Utf8PathBuf;
use chrono::{DateTime, Duration, TimeZone, Utc};
use conjunctor::{
    conjunction::{GroundTruthConjunction, PredictedConjunction},
    constants::CatalogId,
    conjunctor_errors::ConjunctorError,
    elements::OrbitalElementSet,
    propagator::{Position, Propagator},
    storage::ArtifactStore,
};
use nalgebra::Vector3;
use tempfile::TempDir;

pub const ISS_L1: &str = "1 25544U 98067A   20194.88612269 -.00002218  00000-0 -31515-4 0  9992";
pub const ISS_L2: &str = "2 25544  51.6461 221.2784 0001413  89.1723 280.4612 15.49507896236008";
pub const GEO_L1: &str = "1 40000U 14001A   20194.88612269 -.00000100  00000-0  00000-0 0  9990";
pub const GEO_L2: &str = "2 40000   0.0500 221.2784 0001413  89.1723 280.4612  1.00270000 20001";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 11, 8, 0, 0, 0).unwrap()
}

pub fn object(norad_id: CatalogId) -> OrbitalElementSet {
    OrbitalElementSet {
        norad_id,
        name: format!("OBJ-{norad_id}"),
        line1: String::new(),
        line2: String::new(),
    }
}

/// Uniform straight-line motion, `x(t) = x0 + v·(t - t0)`, keyed by catalog id.
pub struct LinearPropagator {
    pub t0: DateTime<Utc>,
    pub tracks: Vec<(CatalogId, Vector3<f64>, Vector3<f64>)>,
}

impl Propagator for LinearPropagator {
    fn position_at(
        &self,
        elements: &OrbitalElementSet,
        instant: DateTime<Utc>,
    ) -> Result<Position, ConjunctorError> {
        let (_, x0, v) = self
            .tracks
            .iter()
            .find(|(id, _, _)| *id == elements.norad_id)
            .ok_or_else(|| ConjunctorError::Propagation {
                norad_id: elements.norad_id,
                reason: "no track".into(),
            })?;
        let dt = (instant - self.t0).num_milliseconds() as f64 / 1000.0;
        Ok(Position::new(x0 + v * dt).with_velocity(*v))
    }
}

pub fn prediction(a: CatalogId, b: CatalogId, tca: DateTime<Utc>, dist: f64) -> PredictedConjunction {
    PredictedConjunction::new(a, b, tca, dist)
}

pub fn truth(
    cdm_id: &str,
    primary: CatalogId,
    secondary: CatalogId,
    tca: DateTime<Utc>,
    miss_km: f64,
) -> GroundTruthConjunction {
    GroundTruthConjunction {
        cdm_id: Some(cdm_id.into()),
        norad_primary: Some(primary),
        norad_secondary: Some(secondary),
        tca_utc: Some(tca),
        miss_distance_km: Some(miss_km),
        rel_speed_kms: None,
        provider: "space-track".into(),
    }
}

pub fn secs(s: i64) -> Duration {
    Duration::seconds(s)
}

/// A store rooted in a fresh temporary directory, dropped with the guard.
pub fn temp_store() -> (TempDir, ArtifactStore) {
    let dir = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    (dir, ArtifactStore::new(root))
}

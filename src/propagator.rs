//! # Orbit propagation
//!
//! The [`Propagator`] trait is the narrow seam between the close-pair finder and
//! whatever orbit model produces positions. It takes an [`OrbitalElementSet`] and a UTC
//! instant and returns a [`Position`] in an Earth-centered inertial frame (km), with an
//! optional velocity (km/s).
//!
//! [`Sgp4Propagator`] is the production implementation: it delegates to the `sgp4`
//! crate (SGP4 for near-Earth objects, SDP4 for deep space), and outputs TEME
//! coordinates. Parsing a TLE and initializing the model constants is much more
//! expensive than a single propagation, so the propagator can be primed with a whole
//! catalog through [`Sgp4Propagator::with_catalog`].
//!
//! Failures never panic: an element set that cannot be initialized, an epoch that
//! cannot be converted, or a model divergence (decayed orbit, negative semi-latus
//! rectum, …) is reported as [`ConjunctorError::Propagation`] and the caller decides
//! what to do with that sample.
use ahash::AHashMap;
use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use sgp4::{Constants, Elements};

use crate::{
    constants::CatalogId, conjunctor_errors::ConjunctorError, elements::OrbitalElementSet,
};

/// State of one object at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    /// Cartesian position (km).
    pub position: Vector3<f64>,
    /// Cartesian velocity (km/s), when the model provides it.
    pub velocity: Option<Vector3<f64>>,
}

impl Position {
    pub fn new(position: Vector3<f64>) -> Self {
        Position {
            position,
            velocity: None,
        }
    }

    pub fn with_velocity(mut self, velocity: Vector3<f64>) -> Self {
        self.velocity = Some(velocity);
        self
    }
}

/// Computes the position of an object at a given instant.
///
/// Implementations must be pure with respect to their inputs and safe to call from
/// several threads at once: the close-pair finder evaluates sampling steps in parallel.
pub trait Propagator: Send + Sync {
    fn position_at(
        &self,
        elements: &OrbitalElementSet,
        at: DateTime<Utc>,
    ) -> Result<Position, ConjunctorError>;
}

struct Sgp4Model {
    line1: String,
    line2: String,
    elements: Elements,
    constants: Constants,
}

impl Sgp4Model {
    fn init(set: &OrbitalElementSet) -> Result<Self, ConjunctorError> {
        let elements = Elements::from_tle(
            Some(set.name.clone()),
            set.line1.as_bytes(),
            set.line2.as_bytes(),
        )
        .map_err(|e| propagation_error(set.norad_id, e))?;
        let constants =
            Constants::from_elements(&elements).map_err(|e| propagation_error(set.norad_id, e))?;

        Ok(Sgp4Model {
            line1: set.line1.clone(),
            line2: set.line2.clone(),
            elements,
            constants,
        })
    }

    fn describes(&self, set: &OrbitalElementSet) -> bool {
        self.line1 == set.line1 && self.line2 == set.line2
    }

    fn propagate(&self, norad_id: CatalogId, at: DateTime<Utc>) -> Result<Position, ConjunctorError> {
        let minutes = self
            .elements
            .datetime_to_minutes_since_epoch(&at.naive_utc())
            .map_err(|e| propagation_error(norad_id, e))?;
        let prediction = self
            .constants
            .propagate(minutes)
            .map_err(|e| propagation_error(norad_id, e))?;

        Ok(Position::new(Vector3::from(prediction.position))
            .with_velocity(Vector3::from(prediction.velocity)))
    }
}

fn propagation_error(norad_id: CatalogId, e: impl std::fmt::Debug) -> ConjunctorError {
    ConjunctorError::Propagation {
        norad_id,
        reason: format!("{e:?}"),
    }
}

/// SGP4/SDP4 propagator backed by the `sgp4` crate.
///
/// Element sets seen by [`Sgp4Propagator::with_catalog`] are initialized once and
/// reused; any other set (or a set whose lines differ from the cached ones) is
/// initialized on the fly for each call.
#[derive(Default)]
pub struct Sgp4Propagator {
    cache: AHashMap<CatalogId, Sgp4Model>,
}

impl Sgp4Propagator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prime the model cache with a catalog.
    ///
    /// Element sets that fail to initialize are skipped here; they will fail again,
    /// with their own error, when propagated.
    pub fn with_catalog(catalog: &[OrbitalElementSet]) -> Self {
        let cache = catalog
            .iter()
            .filter_map(|set| Sgp4Model::init(set).ok().map(|m| (set.norad_id, m)))
            .collect();
        Sgp4Propagator { cache }
    }

    /// Number of element sets with a ready-to-use model.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl Propagator for Sgp4Propagator {
    fn position_at(
        &self,
        elements: &OrbitalElementSet,
        at: DateTime<Utc>,
    ) -> Result<Position, ConjunctorError> {
        match self.cache.get(&elements.norad_id) {
            Some(model) if model.describes(elements) => model.propagate(elements.norad_id, at),
            _ => Sgp4Model::init(elements)?.propagate(elements.norad_id, at),
        }
    }
}

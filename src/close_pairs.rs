//! # Close-pair finder
//!
//! Screens a catalog over a time window and reports, for every pair of objects that
//! came within a proximity radius at some sampling step, **one**
//! [`PredictedConjunction`] carrying the minimum sampled distance and the step at which
//! it occurred (used as the time of closest approach).
//!
//! ## Algorithm
//! -----------------
//! 1. Build the half-open sampling grid `start + k·step < start + duration`
//!    ([`crate::time::step_epochs`]).
//! 2. For each step, in parallel with `rayon`:
//!    * propagate every object; failures drop that object for that step only and are
//!      counted in [`FinderDiagnostics::propagation_failures`],
//!    * query the [`SpatialIndex`] for every pair within `radius_km`.
//! 3. Reduce the per-step candidates to one minimum per pair key.
//!
//! The reduction is commutative and associative: a smaller distance wins, and an exact
//! distance tie goes to the **earlier** step. Parallel scheduling therefore never
//! changes the output, which is sorted by pair key.
//!
//! ## Limitations
//! -----------------
//! There is no interpolation between steps: the reported distance is an upper bound of
//! the true miss distance, and an encounter shorter than the step can be missed
//! entirely. Shrink `step` to trade runtime for resolution.
use std::collections::hash_map::Entry;

use ahash::AHashMap;
use chrono::{DateTime, Duration, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    conjunction::{PairKey, PredictedConjunction},
    constants::{
        Kilometer, KmPerSecond, DEFAULT_RADIUS_KM, DEFAULT_STEP_MINUTES, DEFAULT_WINDOW_HOURS,
    },
    conjunctor_errors::ConjunctorError,
    elements::OrbitalElementSet,
    propagator::Propagator,
    spatial_index::SpatialIndex,
    time::step_epochs,
};

/// Screening window and proximity threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowParams {
    /// First sampled instant.
    pub start: DateTime<Utc>,
    /// Window length; the end instant itself is not sampled.
    pub duration: Duration,
    /// Sampling interval.
    pub step: Duration,
    /// Proximity radius (km).
    pub radius_km: Kilometer,
}

impl WindowParams {
    /// Fluent builder starting from the defaults (12 h, 60 min, 100 km, starting now).
    pub fn builder() -> WindowParamsBuilder {
        WindowParamsBuilder::new()
    }

    /// Instant right after the last sampled step.
    pub fn end(&self) -> DateTime<Utc> {
        self.start + self.duration
    }
}

impl Default for WindowParams {
    fn default() -> Self {
        WindowParams {
            start: Utc::now(),
            duration: Duration::hours(DEFAULT_WINDOW_HOURS),
            step: Duration::minutes(DEFAULT_STEP_MINUTES),
            radius_km: DEFAULT_RADIUS_KM,
        }
    }
}

/// Builder for [`WindowParams`], with validation.
#[derive(Debug, Clone)]
pub struct WindowParamsBuilder {
    params: WindowParams,
}

impl Default for WindowParamsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl WindowParamsBuilder {
    pub fn new() -> Self {
        Self {
            params: WindowParams::default(),
        }
    }

    pub fn start(mut self, v: DateTime<Utc>) -> Self {
        self.params.start = v;
        self
    }
    pub fn duration(mut self, v: Duration) -> Self {
        self.params.duration = v;
        self
    }
    pub fn step(mut self, v: Duration) -> Self {
        self.params.step = v;
        self
    }
    pub fn radius_km(mut self, v: Kilometer) -> Self {
        self.params.radius_km = v;
        self
    }

    /// Finalize the builder.
    ///
    /// Validation rules
    /// -----------------
    /// * `duration > 0` and `step > 0`.
    /// * `radius_km` finite and `> 0`.
    pub fn build(self) -> Result<WindowParams, ConjunctorError> {
        let p = self.params;
        if p.duration <= Duration::zero() {
            return Err(ConjunctorError::InvalidParameter(format!(
                "window duration must be > 0, got {}",
                p.duration
            )));
        }
        if p.step <= Duration::zero() {
            return Err(ConjunctorError::InvalidParameter(format!(
                "sampling step must be > 0, got {}",
                p.step
            )));
        }
        if !(p.radius_km.is_finite() && p.radius_km > 0.0) {
            return Err(ConjunctorError::InvalidParameter(format!(
                "radius_km must be finite and > 0, got {}",
                p.radius_km
            )));
        }
        Ok(p)
    }
}

/// Counters collected during a screening pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinderDiagnostics {
    /// Number of sampled instants.
    pub steps: usize,
    /// Successful (object, step) propagations.
    pub samples: usize,
    /// Failed (object, step) propagations, omitted from the search.
    pub propagation_failures: usize,
}

/// Output of [`find_close_pairs`].
#[derive(Debug, Clone, Default)]
pub struct CloseApproaches {
    /// One record per pair, sorted by pair key.
    pub conjunctions: Vec<PredictedConjunction>,
    pub diagnostics: FinderDiagnostics,
}

#[derive(Debug, Clone, Copy)]
struct Approach {
    distance: Kilometer,
    at: DateTime<Utc>,
    closing_velocity: Option<KmPerSecond>,
}

impl Approach {
    fn improves_on(&self, other: &Approach) -> bool {
        self.distance
            .total_cmp(&other.distance)
            .then(self.at.cmp(&other.at))
            .is_lt()
    }
}

#[derive(Debug, Default)]
struct Accumulator {
    samples: usize,
    failures: usize,
    closest: AHashMap<PairKey, Approach>,
}

impl Accumulator {
    fn offer(&mut self, key: PairKey, approach: Approach) {
        match self.closest.entry(key) {
            Entry::Occupied(mut best) => {
                if approach.improves_on(best.get()) {
                    best.insert(approach);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(approach);
            }
        }
    }

    fn merge(mut self, mut other: Accumulator) -> Accumulator {
        if self.closest.len() < other.closest.len() {
            std::mem::swap(&mut self, &mut other);
        }
        self.samples += other.samples;
        self.failures += other.failures;
        for (key, approach) in other.closest {
            self.offer(key, approach);
        }
        self
    }
}

fn screen_step(
    elements: &[OrbitalElementSet],
    at: DateTime<Utc>,
    radius_km: Kilometer,
    propagator: &dyn Propagator,
    index: &dyn SpatialIndex,
) -> Accumulator {
    let mut acc = Accumulator::default();
    let mut owners = Vec::with_capacity(elements.len());
    let mut points = Vec::with_capacity(elements.len());
    let mut velocities = Vec::with_capacity(elements.len());

    for set in elements {
        match propagator.position_at(set, at) {
            Ok(state) => {
                owners.push(set.norad_id);
                points.push(state.position);
                velocities.push(state.velocity);
            }
            Err(e) => {
                debug!(norad_id = set.norad_id, %at, error = %e, "propagation failed");
                acc.failures += 1;
            }
        }
    }
    acc.samples = points.len();

    for pair in index.query_radius(&points, radius_km) {
        let (a, b) = (owners[pair.i], owners[pair.j]);
        if a == b {
            continue;
        }
        let closing_velocity = match (velocities[pair.i], velocities[pair.j]) {
            (Some(va), Some(vb)) => Some((va - vb).norm()),
            _ => None,
        };
        acc.offer(
            PairKey::new(a, b),
            Approach {
                distance: pair.distance,
                at,
                closing_velocity,
            },
        );
    }
    acc
}

/// Find every pair of objects that came within `params.radius_km` during the window.
///
/// Arguments
/// -----------------
/// * `elements`: the catalog snapshot to screen.
/// * `params`: window, sampling step and proximity radius.
/// * `propagator`: orbit model used at every step.
/// * `index`: fixed-radius neighbor search used at every step.
///
/// Return
/// ----------
/// * A [`CloseApproaches`] with one [`PredictedConjunction`] per pair (sorted by pair key)
///   and the pass diagnostics. Risk fields and names are left empty.
pub fn find_close_pairs(
    elements: &[OrbitalElementSet],
    params: &WindowParams,
    propagator: &dyn Propagator,
    index: &dyn SpatialIndex,
) -> CloseApproaches {
    let epochs = step_epochs(params.start, params.duration, params.step);

    let acc = epochs
        .par_iter()
        .map(|&at| screen_step(elements, at, params.radius_km, propagator, index))
        .reduce(Accumulator::default, Accumulator::merge);

    let mut conjunctions: Vec<PredictedConjunction> = acc
        .closest
        .into_iter()
        .map(|(key, approach)| {
            let mut record = PredictedConjunction::new(key.0, key.1, approach.at, approach.distance);
            record.closing_velocity_kms = approach.closing_velocity;
            record
        })
        .collect();
    conjunctions.sort_by(|x, y| x.canonical_cmp(y));

    let diagnostics = FinderDiagnostics {
        steps: epochs.len(),
        samples: acc.samples,
        propagation_failures: acc.failures,
    };
    info!(
        objects = elements.len(),
        steps = diagnostics.steps,
        failures = diagnostics.propagation_failures,
        pairs = conjunctions.len(),
        "close-pair search done"
    );

    CloseApproaches {
        conjunctions,
        diagnostics,
    }
}

#[cfg(test)]
mod close_pairs_test {
    use super::*;
    use crate::{
        constants::CatalogId,
        propagator::Position,
        spatial_index::{BruteForce, KdTree},
    };
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use nalgebra::Vector3;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 8, 0, 0, 0).unwrap()
    }

    fn object(norad_id: CatalogId) -> OrbitalElementSet {
        OrbitalElementSet {
            norad_id,
            name: format!("OBJ-{norad_id}"),
            line1: String::new(),
            line2: String::new(),
        }
    }

    /// Objects on straight lines along x: `x = x0 + v·hours`. Id 999 always fails.
    struct Lines(Vec<(CatalogId, f64, f64)>);

    impl Propagator for Lines {
        fn position_at(
            &self,
            elements: &OrbitalElementSet,
            at: DateTime<Utc>,
        ) -> Result<Position, ConjunctorError> {
            let hours = (at - t0()).num_seconds() as f64 / 3600.0;
            self.0
                .iter()
                .find(|(id, _, _)| *id == elements.norad_id)
                .map(|&(_, x0, v)| {
                    Position::new(Vector3::new(x0 + v * hours, 0.0, 0.0))
                        .with_velocity(Vector3::new(v / 3600.0, 0.0, 0.0))
                })
                .ok_or(ConjunctorError::Propagation {
                    norad_id: elements.norad_id,
                    reason: "unknown object".into(),
                })
        }
    }

    fn params() -> WindowParams {
        WindowParams::builder().start(t0()).build().unwrap()
    }

    #[test]
    fn test_single_minimum_per_pair() {
        // 100 moves towards 200, closest at t0 + 5 h (10 km), then recedes.
        let prop = Lines(vec![(100, 0.0, 100.0), (200, 510.0, 0.0)]);
        let catalog = vec![object(200), object(100)];

        let out = find_close_pairs(&catalog, &params(), &prop, &KdTree);
        assert_eq!(out.conjunctions.len(), 1);

        let c = &out.conjunctions[0];
        assert_eq!(c.pair_key(), Some(PairKey(100, 200)));
        assert_eq!(c.tca_utc, Some(t0() + Duration::hours(5)));
        assert_relative_eq!(c.min_dist_km.unwrap(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(c.closing_velocity_kms.unwrap(), 100.0 / 3600.0, epsilon = 1e-12);
        assert_eq!(out.diagnostics.steps, 12);
        assert_eq!(out.diagnostics.samples, 24);
    }

    #[test]
    fn test_distance_tie_goes_to_earlier_step() {
        // Exactly 5 km at t0 + 2 h and again at t0 + 3 h.
        let prop = Lines(vec![(1, 0.0, 0.0), (2, -25.0, 10.0)]);
        let out = find_close_pairs(&[object(1), object(2)], &params(), &prop, &BruteForce);

        let c = &out.conjunctions[0];
        assert_relative_eq!(c.min_dist_km.unwrap(), 5.0);
        assert_eq!(c.tca_utc, Some(t0() + Duration::hours(2)));
    }

    #[test]
    fn test_far_objects_and_failures() {
        let prop = Lines(vec![(1, 0.0, 0.0), (2, 500.0, 0.0)]);
        let catalog = vec![object(1), object(2), object(999)];

        let out = find_close_pairs(&catalog, &params(), &prop, &KdTree);
        assert!(out.conjunctions.is_empty());
        assert_eq!(out.diagnostics.propagation_failures, 12);
        assert_eq!(out.diagnostics.samples, 24);
    }

    #[test]
    fn test_duplicate_ids_never_pair_with_themselves() {
        let prop = Lines(vec![(7, 0.0, 0.0)]);
        let out = find_close_pairs(&[object(7), object(7)], &params(), &prop, &KdTree);
        assert!(out.conjunctions.is_empty());
    }

    #[test]
    fn test_builder_validation() {
        assert!(matches!(
            WindowParams::builder().step(Duration::zero()).build(),
            Err(ConjunctorError::InvalidParameter(_))
        ));
        assert!(matches!(
            WindowParams::builder().duration(Duration::minutes(-5)).build(),
            Err(ConjunctorError::InvalidParameter(_))
        ));
        assert!(matches!(
            WindowParams::builder().radius_km(f64::NAN).build(),
            Err(ConjunctorError::InvalidParameter(_))
        ));

        let p = params();
        assert_eq!(p.end(), t0() + Duration::hours(12));
        assert_eq!(p.radius_km, 100.0);
    }
}

//! # Constants and type definitions for Conjunctor
//!
//! This module centralizes the **physical constants**, **default tuning values**, and
//! **common type aliases** used throughout the `conjunctor` library.
//!
//! ## Overview
//!
//! - Unit conversions (meters → kilometers) and the SGP4 Earth radius
//! - Defaults for the screening window, proximity radius and risk scale
//! - Defaults for the validation tolerances
//! - Core type aliases used across the crate
//!
//! The defaults reproduce the baseline screening run: a 12 hour window sampled every
//! 60 minutes, a 100 km proximity radius and a 50 km risk scale.

// -------------------------------------------------------------------------------------------------
// Physical constants and unit conversions
// -------------------------------------------------------------------------------------------------

/// Meters → kilometers
pub const M_TO_KM: f64 = 1.0e-3;

/// Earth equatorial radius in kilometers (WGS72, the SGP4 reference ellipsoid)
pub const EARTH_RADIUS_KM: f64 = 6_378.135;

// -------------------------------------------------------------------------------------------------
// Screening defaults
// -------------------------------------------------------------------------------------------------

/// Default screening window length (hours)
pub const DEFAULT_WINDOW_HOURS: i64 = 12;

/// Default sampling step (minutes)
pub const DEFAULT_STEP_MINUTES: i64 = 60;

/// Default proximity radius for the close-pair search (km)
pub const DEFAULT_RADIUS_KM: Kilometer = 100.0;

/// Default distance scale of the exponential risk score (km)
pub const DEFAULT_RISK_SCALE_KM: Kilometer = 50.0;

/// A pair is flagged `risk_class = 1` below this fraction of the risk scale
pub const RISK_CLASS_FRACTION: f64 = 0.2;

// -------------------------------------------------------------------------------------------------
// Validation defaults
// -------------------------------------------------------------------------------------------------

/// Default TCA tolerance between a prediction and a ground-truth report (seconds)
pub const DEFAULT_TCA_WINDOW_S: i64 = 300;

/// Default miss-distance tolerance (km)
pub const DEFAULT_DIST_WINDOW_KM: Kilometer = 1.0;

/// Step of the risk threshold grid used by the precision-recall curve
pub const PR_THRESHOLD_STEP: f64 = 0.05;

/// Default timeout of the ground-truth fetch (seconds)
pub const DEFAULT_FETCH_TIMEOUT_S: u64 = 60;

/// Provenance tag attached to normalized CDM records
pub const DEFAULT_PROVIDER: &str = "space-track";

// -------------------------------------------------------------------------------------------------
// Type aliases
// -------------------------------------------------------------------------------------------------

/// NORAD catalog number of a tracked object
pub type CatalogId = u32;
/// Distance in kilometers
pub type Kilometer = f64;
/// Speed in kilometers per second
pub type KmPerSecond = f64;
/// Duration in seconds
pub type Seconds = f64;

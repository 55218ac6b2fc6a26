//! Conjunction screening and validation.
//!
//! Propagates a catalog of two-line element sets over a time window, finds the object
//! pairs that come close, scores their collision risk, and validates those predictions
//! against authoritative conjunction reports (CDM) with precision / recall / F1, error
//! statistics and a precision-recall curve.
pub mod close_pairs;
pub mod conjunction;
pub mod conjunctor_errors;
pub mod constants;
pub mod elements;
pub mod ground_truth;
pub mod matcher;
pub mod metrics;
pub mod normalizer;
pub mod propagator;
pub mod risk;
pub mod screening;
pub mod spatial_index;
pub mod storage;
pub mod time;
pub mod validator;

pub use conjunctor_errors::ConjunctorError;

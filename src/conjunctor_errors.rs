use thiserror::Error;

use crate::constants::CatalogId;

#[derive(Error, Debug)]
pub enum ConjunctorError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid element set: {0}")]
    InvalidElementSet(String),

    #[error("Propagation failed for object {norad_id}: {reason}")]
    Propagation { norad_id: CatalogId, reason: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Ground-truth source unavailable: {0}")]
    GroundTruthUnavailable(String),

    #[error("Ground-truth fetch timed out after {0:?}")]
    GroundTruthTimeout(std::time::Duration),

    #[error("Unable to perform file operation: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON (de)serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("UTF-8 Path error: {0}")]
    Utf8PathError(String),
}

impl PartialEq for ConjunctorError {
    fn eq(&self, other: &Self) -> bool {
        use ConjunctorError::*;
        match (self, other) {
            (InvalidParameter(a), InvalidParameter(b)) => a == b,
            (InvalidElementSet(a), InvalidElementSet(b)) => a == b,
            (
                Propagation {
                    norad_id: a,
                    reason: ra,
                },
                Propagation {
                    norad_id: b,
                    reason: rb,
                },
            ) => a == b && ra == rb,
            (InvalidTimestamp(a), InvalidTimestamp(b)) => a == b,
            (GroundTruthUnavailable(a), GroundTruthUnavailable(b)) => a == b,
            (GroundTruthTimeout(a), GroundTruthTimeout(b)) => a == b,
            (Utf8PathError(a), Utf8PathError(b)) => a == b,

            // Not comparable: equal when the variant matches
            (IoError(_), IoError(_)) => true,
            (JsonError(_), JsonError(_)) => true,

            _ => false,
        }
    }
}

use thiserror::Error;

use crate::types::SensorKind;

/// Filter error types
///
/// None of these are recoverable for the instance that produced them: the
/// belief may already have been advanced by the prediction step.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("Augmented covariance is not positive definite (check process noise)")]
    NotPositiveDefinite,

    #[error("Innovation covariance is singular for {kind} update")]
    SingularInnovation { kind: SensorKind },

    #[error("Radar projection undefined at range {rho:e} m")]
    DegenerateRange { rho: f64 },

    #[error("Update requested before any prediction")]
    UpdateWithoutPrediction,

    #[error("Invalid {kind} observation: expected {expected} values, got {got}")]
    InvalidObservation {
        kind: SensorKind,
        expected: usize,
        got: usize,
    },
}

/// Result type for filter operations
pub type FilterResult<T> = Result<T, FilterError>;

//! Linear algebra type system for the CTRV tracker
//!
//! Provides compile-time dimension checking and clean type aliases
//! for the unscented filter and its measurement models.

use nalgebra::{SMatrix, SVector};

// ===== State Dimensions =====
pub const STATE_DIM: usize = 5; // (px, py, v, yaw, yaw_rate)
pub const AUG_STATE_DIM: usize = 7; // state + (nu_a, nu_yawdd)

/// Index of the heading angle inside the state vector
pub const YAW_INDEX: usize = 3;

// ===== Measurement Dimensions =====
pub const MEASURE_DIM_LIDAR: usize = 2; // (px, py)
pub const MEASURE_DIM_RADAR: usize = 3; // (rho, phi, rho_dot)

// ===== State Types =====
pub type StateVec = SVector<f64, STATE_DIM>;
pub type StateMat = SMatrix<f64, STATE_DIM, STATE_DIM>;

pub type AugStateVec = SVector<f64, AUG_STATE_DIM>;
pub type AugStateMat = SMatrix<f64, AUG_STATE_DIM, AUG_STATE_DIM>;

// ===== Measurement Types =====
pub type LidarVec = SVector<f64, MEASURE_DIM_LIDAR>;
pub type LidarNoise = SMatrix<f64, MEASURE_DIM_LIDAR, MEASURE_DIM_LIDAR>;
pub type RadarVec = SVector<f64, MEASURE_DIM_RADAR>;
pub type RadarNoise = SMatrix<f64, MEASURE_DIM_RADAR, MEASURE_DIM_RADAR>;

// ===== Sigma Point Types =====
pub const SIGMA_COUNT: usize = 2 * AUG_STATE_DIM + 1; // 15

/// Augmented sigma points, one per column (7×15)
pub type AugSigmaPoints = SMatrix<f64, AUG_STATE_DIM, SIGMA_COUNT>;

/// Sigma points after the process model, noise rows dropped (5×15)
pub type PredSigmaPoints = SMatrix<f64, STATE_DIM, SIGMA_COUNT>;

/// Sigma points mapped into an M-dimensional measurement space
pub type MeasurementSigmaPoints<const M: usize> = SMatrix<f64, M, SIGMA_COUNT>;

pub type SigmaWeights = SVector<f64, SIGMA_COUNT>;

/// Cross-correlation between state and an M-dimensional measurement
pub type CrossCovariance<const M: usize> = SMatrix<f64, STATE_DIM, M>;

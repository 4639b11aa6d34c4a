//! Augmented unscented transform for the CTRV filter
//!
//! Sigma points are spread with `lambda = 3 - n_x` (taken on the *state*
//! dimension, not the augmented one) and weighted with
//! `w0 = lambda / (lambda + n_aug)`, `wi = 0.5 / (lambda + n_aug)`.
//! No alpha/beta scaling: mean and covariance share one weight set.

use std::f64::consts::{PI, TAU};

use nalgebra::{SMatrix, SVector};

use crate::error::{FilterError, FilterResult};
use crate::types::{
    AugSigmaPoints, AugStateMat, AugStateVec, PredSigmaPoints, SigmaWeights, StateMat, StateVec,
    AUG_STATE_DIM, SIGMA_COUNT, STATE_DIM, YAW_INDEX,
};

/// Sigma point spreading parameter
pub const LAMBDA: f64 = 3.0 - STATE_DIM as f64;

/// Wrap an angle into (-pi, pi]
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle % TAU;
    if wrapped > PI {
        wrapped - TAU
    } else if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Sigma point weights. They depend only on constants, so the filter
/// builds them once.
pub fn sigma_weights() -> SigmaWeights {
    let denom = LAMBDA + AUG_STATE_DIM as f64;
    let mut weights = SigmaWeights::from_element(0.5 / denom);
    weights[0] = LAMBDA / denom;
    weights
}

/// Build the augmented mean and covariance from the current belief
pub fn augment(
    state: &StateVec,
    covariance: &StateMat,
    std_a: f64,
    std_yawdd: f64,
) -> (AugStateVec, AugStateMat) {
    let mut x_aug = AugStateVec::zeros();
    x_aug.fixed_rows_mut::<STATE_DIM>(0).copy_from(state);

    let mut p_aug = AugStateMat::zeros();
    p_aug
        .fixed_view_mut::<STATE_DIM, STATE_DIM>(0, 0)
        .copy_from(covariance);
    p_aug[(STATE_DIM, STATE_DIM)] = std_a * std_a;
    p_aug[(STATE_DIM + 1, STATE_DIM + 1)] = std_yawdd * std_yawdd;

    (x_aug, p_aug)
}

/// Generate the 15 augmented sigma points for the current belief
pub fn generate_augmented_sigma_points(
    state: &StateVec,
    covariance: &StateMat,
    std_a: f64,
    std_yawdd: f64,
) -> FilterResult<AugSigmaPoints> {
    let (x_aug, p_aug) = augment(state, covariance, std_a, std_yawdd);
    sigma_points_from_moments(&x_aug, &p_aug)
}

/// Deterministic sigma points for an augmented mean/covariance pair
pub fn sigma_points_from_moments(
    x_aug: &AugStateVec,
    p_aug: &AugStateMat,
) -> FilterResult<AugSigmaPoints> {
    // Lower-triangular square root P_aug = L * L^T
    let l = p_aug
        .cholesky()
        .ok_or(FilterError::NotPositiveDefinite)?
        .l();

    let scale = (LAMBDA + AUG_STATE_DIM as f64).sqrt();

    let mut sigma = AugSigmaPoints::zeros();
    sigma.set_column(0, x_aug);
    for i in 0..AUG_STATE_DIM {
        let offset = l.column(i) * scale;
        sigma.set_column(i + 1, &(x_aug + offset));
        sigma.set_column(i + 1 + AUG_STATE_DIM, &(x_aug - offset));
    }

    log::trace!("augmented sigma points: {}", sigma);
    Ok(sigma)
}

/// Weighted mean of a set of sigma points
pub fn weighted_mean<const R: usize>(
    points: &SMatrix<f64, R, SIGMA_COUNT>,
    weights: &SigmaWeights,
) -> SVector<f64, R> {
    let mut mean = SVector::<f64, R>::zeros();
    for (i, column) in points.column_iter().enumerate() {
        mean += column * weights[i];
    }
    mean
}

/// Residual of one sigma point against a mean, with the angular
/// component (if any) wrapped into (-pi, pi]
pub fn residual<const R: usize>(
    points: &SMatrix<f64, R, SIGMA_COUNT>,
    index: usize,
    mean: &SVector<f64, R>,
    angle_index: Option<usize>,
) -> SVector<f64, R> {
    let mut diff: SVector<f64, R> = points.column(index) - mean;
    if let Some(a) = angle_index {
        diff[a] = normalize_angle(diff[a]);
    }
    diff
}

/// Weighted covariance of a set of sigma points around `mean`
pub fn weighted_covariance<const R: usize>(
    points: &SMatrix<f64, R, SIGMA_COUNT>,
    mean: &SVector<f64, R>,
    weights: &SigmaWeights,
    angle_index: Option<usize>,
) -> SMatrix<f64, R, R> {
    let mut covariance = SMatrix::<f64, R, R>::zeros();
    for i in 0..SIGMA_COUNT {
        let diff = residual(points, i, mean, angle_index);
        covariance += diff * diff.transpose() * weights[i];
    }
    covariance
}

/// Recombine predicted sigma points into the predicted belief
pub fn recombine(sigma: &PredSigmaPoints, weights: &SigmaWeights) -> (StateVec, StateMat) {
    let state = weighted_mean(sigma, weights);
    let covariance = weighted_covariance(sigma, &state, weights, Some(YAW_INDEX));
    (state, covariance)
}

//! Constant Turn-Rate and Velocity (CTRV) process model
//!
//! State: [px, py, v, yaw, yaw_rate]. Augmented sigma points carry two extra
//! rows, longitudinal acceleration noise `nu_a` and yaw acceleration noise
//! `nu_yawdd`, which are applied nonlinearly here.

use crate::types::{AugSigmaPoints, AugStateVec, PredSigmaPoints, StateVec};

/// Below this turn rate the straight-line form is used
pub const MIN_YAW_RATE: f64 = 1e-3;

/// Propagate a single augmented sigma point over `dt` seconds
pub fn predict_sigma_point(aug: &AugStateVec, dt: f64) -> StateVec {
    let p_x = aug[0];
    let p_y = aug[1];
    let v = aug[2];
    let yaw = aug[3];
    let yawd = aug[4];
    let nu_a = aug[5];
    let nu_yawdd = aug[6];

    let (mut px_p, mut py_p) = if yawd.abs() > MIN_YAW_RATE {
        (
            p_x + v / yawd * ((yaw + yawd * dt).sin() - yaw.sin()),
            p_y + v / yawd * (yaw.cos() - (yaw + yawd * dt).cos()),
        )
    } else {
        (p_x + v * dt * yaw.cos(), p_y + v * dt * yaw.sin())
    };

    let mut v_p = v;
    let mut yaw_p = yaw + yawd * dt;
    let mut yawd_p = yawd;

    // Process noise
    let dt2 = dt * dt;
    px_p += 0.5 * nu_a * dt2 * yaw.cos();
    py_p += 0.5 * nu_a * dt2 * yaw.sin();
    v_p += nu_a * dt;

    yaw_p += 0.5 * nu_yawdd * dt2;
    yawd_p += nu_yawdd * dt;

    StateVec::new(px_p, py_p, v_p, yaw_p, yawd_p)
}

/// Propagate every augmented sigma point, dropping the noise rows
pub fn predict_sigma_points(sigma: &AugSigmaPoints, dt: f64) -> PredSigmaPoints {
    let mut predicted = PredSigmaPoints::zeros();
    for (i, column) in sigma.column_iter().enumerate() {
        let aug: AugStateVec = column.into_owned();
        predicted.set_column(i, &predict_sigma_point(&aug, dt));
    }
    predicted
}

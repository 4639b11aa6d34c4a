//! Deterministic synthetic scenarios
//!
//! A single object follows an exact CTRV trajectory; lidar and radar take
//! turns observing it at a fixed period. Observations are noise-free, which
//! makes convergence properties easy to assert.

use serde::{Deserialize, Serialize};

use crate::evaluation::GroundTruth;
use crate::filters::ctrv::predict_sigma_point;
use crate::ingest::LogRecord;
use crate::types::{AugStateVec, Observation, StateVec, STATE_DIM};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    /// Initial [px, py, v, yaw, yaw_rate]
    pub initial: [f64; 5],
    pub start_us: i64,
    pub period_us: i64,
    pub steps: usize,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            initial: [2.0, 1.0, 5.0, 0.3, 0.1],
            start_us: 1_477_010_443_000_000,
            period_us: 50_000,
            steps: 200,
        }
    }
}

impl Scenario {
    /// Straight constant-velocity path
    pub fn straight(px: f64, py: f64, vx: f64, vy: f64, steps: usize) -> Self {
        Self {
            initial: [px, py, (vx * vx + vy * vy).sqrt(), vy.atan2(vx), 0.0],
            steps,
            ..Self::default()
        }
    }

    /// True state `t` seconds after the start
    pub fn truth_at(&self, t: f64) -> StateVec {
        let mut aug = AugStateVec::zeros();
        aug.fixed_rows_mut::<STATE_DIM>(0)
            .copy_from(&StateVec::from_column_slice(&self.initial));
        predict_sigma_point(&aug, t)
    }

    /// Alternating lidar/radar records, lidar first
    pub fn generate(&self) -> Vec<LogRecord> {
        (0..self.steps)
            .map(|k| {
                let offset_us = k as i64 * self.period_us;
                let truth = self.truth_at(offset_us as f64 * 1e-6);
                let (px, py, v, yaw) = (truth[0], truth[1], truth[2], truth[3]);
                let (vx, vy) = (v * yaw.cos(), v * yaw.sin());
                let timestamp_us = self.start_us + offset_us;

                let observation = if k % 2 == 0 {
                    Observation::lidar(timestamp_us, px, py)
                } else {
                    let rho = (px * px + py * py).sqrt();
                    Observation::radar(timestamp_us, rho, py.atan2(px), (px * vx + py * vy) / rho)
                };

                LogRecord {
                    observation,
                    ground_truth: Some(GroundTruth { px, py, vx, vy }),
                }
            })
            .collect()
    }
}

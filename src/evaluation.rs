//! Accuracy evaluation against ground truth
//!
//! RMSE is computed per Cartesian component `[px, py, vx, vy]`.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Reference trajectory sample
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub px: f64,
    pub py: f64,
    pub vx: f64,
    pub vy: f64,
}

impl GroundTruth {
    pub fn as_array(&self) -> [f64; 4] {
        [self.px, self.py, self.vx, self.vy]
    }
}

/// Streaming RMSE over `[px, py, vx, vy]`
#[derive(Clone, Debug, Default)]
pub struct RmseAccumulator {
    sum_sq: [f64; 4],
    count: usize,
}

impl RmseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, estimate: &[f64; 4], truth: &GroundTruth) {
        for (acc, (e, t)) in self.sum_sq.iter_mut().zip(estimate.iter().zip(truth.as_array())) {
            *acc += (e - t).powi(2);
        }
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Current RMSE, or `None` before the first sample
    pub fn rmse(&self) -> Option<[f64; 4]> {
        if self.count == 0 {
            return None;
        }
        let n = self.count as f64;
        Some(self.sum_sq.map(|s| (s / n).sqrt()))
    }
}

/// RMSE of paired estimate / ground-truth sequences
pub fn calculate_rmse(estimations: &[[f64; 4]], ground_truth: &[GroundTruth]) -> Result<[f64; 4]> {
    if estimations.is_empty() {
        bail!("no estimations to evaluate");
    }
    if estimations.len() != ground_truth.len() {
        bail!(
            "estimation/ground-truth length mismatch: {} vs {}",
            estimations.len(),
            ground_truth.len()
        );
    }

    let mut acc = RmseAccumulator::new();
    for (est, gt) in estimations.iter().zip(ground_truth) {
        acc.add(est, gt);
    }
    acc.rmse()
        .ok_or_else(|| anyhow::anyhow!("no samples accumulated"))
}

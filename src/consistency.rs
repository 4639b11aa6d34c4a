//! Filter consistency checks based on the Normalized Innovation Squared
//!
//! For a consistent filter the NIS of an M-dimensional measurement follows a
//! chi-square distribution with M degrees of freedom, so about 5% of updates
//! should land above the 95% quantile.

use serde::{Deserialize, Serialize};

use crate::types::SensorKind;

/// 95% chi-square quantile, 2 degrees of freedom
pub const CHI2_95_2DOF: f64 = 5.991;
/// 95% chi-square quantile, 3 degrees of freedom
pub const CHI2_95_3DOF: f64 = 7.815;

/// 95% NIS threshold for a sensor kind
pub fn nis_threshold(kind: SensorKind) -> f64 {
    match kind {
        SensorKind::Lidar => CHI2_95_2DOF,
        SensorKind::Radar => CHI2_95_3DOF,
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NisSummary {
    pub kind: SensorKind,
    pub count: u64,
    pub mean: f64,
    pub last: Option<f64>,
    /// Fraction of updates above the 95% threshold
    pub fraction_above: f64,
    pub threshold: f64,
}

/// Running NIS statistics for one sensor
#[derive(Clone, Debug)]
pub struct NisMonitor {
    kind: SensorKind,
    count: u64,
    sum: f64,
    above: u64,
    last: Option<f64>,
}

impl NisMonitor {
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            count: 0,
            sum: 0.0,
            above: 0,
            last: None,
        }
    }

    pub fn record(&mut self, nis: f64) {
        self.count += 1;
        self.sum += nis;
        if nis > nis_threshold(self.kind) {
            self.above += 1;
        }
        self.last = Some(nis);
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    pub fn fraction_above(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.above as f64 / self.count as f64
        }
    }

    pub fn summary(&self) -> NisSummary {
        NisSummary {
            kind: self.kind,
            count: self.count,
            mean: self.mean(),
            last: self.last,
            fraction_above: self.fraction_above(),
            threshold: nis_threshold(self.kind),
        }
    }
}

pub mod linalg;

pub use linalg::*;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::FilterError;

/// Which sensor produced an observation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// Position-only Cartesian sensor
    Lidar,
    /// Polar sensor reporting range, bearing and range-rate
    Radar,
}

impl SensorKind {
    /// Number of raw values an observation of this kind carries
    pub fn measurement_dim(self) -> usize {
        match self {
            SensorKind::Lidar => MEASURE_DIM_LIDAR,
            SensorKind::Radar => MEASURE_DIM_RADAR,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorKind::Lidar => write!(f, "lidar"),
            SensorKind::Radar => write!(f, "radar"),
        }
    }
}

/// Raw sensor values, tagged by sensor kind
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor", rename_all = "lowercase")]
pub enum Measurement {
    Lidar {
        px: f64,
        py: f64,
    },
    Radar {
        /// Range [m]
        rho: f64,
        /// Bearing [rad]
        phi: f64,
        /// Range-rate [m/s]
        rho_dot: f64,
    },
}

impl Measurement {
    pub fn kind(&self) -> SensorKind {
        match self {
            Measurement::Lidar { .. } => SensorKind::Lidar,
            Measurement::Radar { .. } => SensorKind::Radar,
        }
    }

    /// Cartesian position implied by the raw values
    pub fn position(&self) -> (f64, f64) {
        match *self {
            Measurement::Lidar { px, py } => (px, py),
            Measurement::Radar { rho, phi, .. } => (rho * phi.cos(), rho * phi.sin()),
        }
    }

    pub fn lidar_vec(px: f64, py: f64) -> LidarVec {
        LidarVec::new(px, py)
    }

    pub fn radar_vec(rho: f64, phi: f64, rho_dot: f64) -> RadarVec {
        RadarVec::new(rho, phi, rho_dot)
    }
}

/// A timestamped observation as delivered by the ingestion layer
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Timestamp [microseconds]
    pub timestamp_us: i64,
    pub measurement: Measurement,
}

impl Observation {
    pub fn lidar(timestamp_us: i64, px: f64, py: f64) -> Self {
        Self {
            timestamp_us,
            measurement: Measurement::Lidar { px, py },
        }
    }

    pub fn radar(timestamp_us: i64, rho: f64, phi: f64, rho_dot: f64) -> Self {
        Self {
            timestamp_us,
            measurement: Measurement::Radar { rho, phi, rho_dot },
        }
    }

    /// Build an observation from an untyped raw value slice
    pub fn from_raw(kind: SensorKind, raw: &[f64], timestamp_us: i64) -> Result<Self, FilterError> {
        let expected = kind.measurement_dim();
        if raw.len() != expected {
            return Err(FilterError::InvalidObservation {
                kind,
                expected,
                got: raw.len(),
            });
        }
        Ok(match kind {
            SensorKind::Lidar => Self::lidar(timestamp_us, raw[0], raw[1]),
            SensorKind::Radar => Self::radar(timestamp_us, raw[0], raw[1], raw[2]),
        })
    }

    pub fn kind(&self) -> SensorKind {
        self.measurement.kind()
    }
}

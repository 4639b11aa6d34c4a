//! Single-object tracking with an augmented unscented Kalman filter over the
//! CTRV motion model, fusing lidar (Cartesian) and radar (polar) observations.

pub mod consistency;
pub mod error;
pub mod evaluation;
pub mod filters;
pub mod ingest;
pub mod simulation;
pub mod tracker;
pub mod types;

pub use error::{FilterError, FilterResult};
pub use filters::ukf_ctrv::{CtrvState, CtrvUkf, ProcessNoise, SensorNoise};
pub use tracker::{Tracker, TrackerConfig, TrackerEvent, TrackerSnapshot};
pub use types::{Measurement, Observation, SensorKind};

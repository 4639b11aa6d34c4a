use serde::{Deserialize, Serialize};

use super::ctrv::predict_sigma_points;
use super::measurement::{predict_measurement, LidarModel, PredictedMeasurement, RadarModel};
use super::unscented::{generate_augmented_sigma_points, recombine, sigma_weights};
use crate::error::{FilterError, FilterResult};
use crate::types::{
    Measurement, PredSigmaPoints, SensorKind, SigmaWeights, StateMat, StateVec, MEASURE_DIM_LIDAR,
    MEASURE_DIM_RADAR,
};

/// Initial variances for [px, py, v, yaw, yaw_rate]
pub const PRIOR_VARIANCE: [f64; 5] = [1.0, 1.0, 1.0, 0.0225, 0.0225];

/// Process noise standard deviations
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessNoise {
    /// Longitudinal acceleration [m/s²]
    pub std_a: f64,
    /// Yaw acceleration [rad/s²]
    pub std_yawdd: f64,
}

impl Default for ProcessNoise {
    fn default() -> Self {
        Self {
            std_a: 0.85,
            std_yawdd: 0.3,
        }
    }
}

/// Sensor noise standard deviations (manufacturer values, not tuned)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorNoise {
    /// Lidar x position [m]
    pub std_laspx: f64,
    /// Lidar y position [m]
    pub std_laspy: f64,
    /// Radar range [m]
    pub std_radr: f64,
    /// Radar bearing [rad]
    pub std_radphi: f64,
    /// Radar range-rate [m/s]
    pub std_radrd: f64,
}

impl Default for SensorNoise {
    fn default() -> Self {
        Self {
            std_laspx: 0.15,
            std_laspy: 0.15,
            std_radr: 0.3,
            std_radphi: 0.03,
            std_radrd: 0.3,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CtrvState {
    /// Position [m]
    pub px: f64,
    pub py: f64,

    /// Speed along the heading [m/s]
    pub v: f64,

    /// Heading [rad], not wrapped
    pub yaw: f64,

    /// Turn rate [rad/s]
    pub yaw_rate: f64,

    /// Covariance trace for uncertainty
    pub covariance_trace: f64,

    /// Update counters
    pub predictions: u64,
    pub lidar_updates: u64,
    pub radar_updates: u64,
}

impl CtrvState {
    /// Cartesian view `[px, py, vx, vy]` for comparison with ground truth
    pub fn to_cartesian(&self) -> [f64; 4] {
        [
            self.px,
            self.py,
            self.v * self.yaw.cos(),
            self.v * self.yaw.sin(),
        ]
    }
}

/// Augmented-state UKF over the CTRV model
///
/// Owns the belief and the predicted sigma points that link a `predict` to
/// the following `update`.
#[derive(Clone, Debug)]
pub struct CtrvUkf {
    /// State vector [px, py, v, yaw, yaw_rate]
    pub state: StateVec,

    /// Covariance matrix [5x5]
    pub covariance: StateMat,

    std_a: f64,
    std_yawdd: f64,

    lidar: LidarModel,
    radar: RadarModel,

    /// Weights for sigma points
    weights: SigmaWeights,

    /// Output of the last prediction
    predicted_sigma_points: Option<PredSigmaPoints>,

    /// Update counters
    predictions: u64,
    lidar_updates: u64,
    radar_updates: u64,
}

impl CtrvUkf {
    pub fn new(process: &ProcessNoise, sensors: &SensorNoise) -> Self {
        Self {
            state: StateVec::zeros(),
            covariance: StateMat::from_diagonal(&StateVec::from_column_slice(&PRIOR_VARIANCE)),
            std_a: process.std_a,
            std_yawdd: process.std_yawdd,
            lidar: LidarModel::new(sensors.std_laspx, sensors.std_laspy),
            radar: RadarModel::new(sensors.std_radr, sensors.std_radphi, sensors.std_radrd),
            weights: sigma_weights(),
            predicted_sigma_points: None,
            predictions: 0,
            lidar_updates: 0,
            radar_updates: 0,
        }
    }

    /// Reset the belief from a first observation: position from the sensor,
    /// everything else zero, and the fixed prior covariance
    pub fn initialize(&mut self, measurement: &Measurement) {
        let (px, py) = measurement.position();
        self.state = StateVec::new(px, py, 0.0, 0.0, 0.0);
        self.covariance = StateMat::from_diagonal(&StateVec::from_column_slice(&PRIOR_VARIANCE));
        self.predicted_sigma_points = None;
    }

    /// Advance the belief by `dt` seconds
    pub fn predict(&mut self, dt: f64) -> FilterResult<()> {
        let aug_sigma =
            generate_augmented_sigma_points(&self.state, &self.covariance, self.std_a, self.std_yawdd)?;
        let predicted = predict_sigma_points(&aug_sigma, dt);

        let (state, covariance) = recombine(&predicted, &self.weights);
        self.state = state;
        self.covariance = covariance;
        self.predicted_sigma_points = Some(predicted);
        self.predictions += 1;
        Ok(())
    }

    fn predicted(&self) -> FilterResult<&PredSigmaPoints> {
        self.predicted_sigma_points
            .as_ref()
            .ok_or(FilterError::UpdateWithoutPrediction)
    }

    /// Map the last predicted sigma points into `kind`'s measurement space
    pub fn predict_measurement(&self, kind: SensorKind) -> FilterResult<PredictedMeasurement> {
        let sigma = self.predicted()?;
        let prediction = match kind {
            SensorKind::Lidar => PredictedMeasurement::Lidar(
                predict_measurement::<MEASURE_DIM_LIDAR, _>(&self.lidar, sigma, &self.weights)?,
            ),
            SensorKind::Radar => PredictedMeasurement::Radar(
                predict_measurement::<MEASURE_DIM_RADAR, _>(&self.radar, sigma, &self.weights)?,
            ),
        };
        Ok(prediction)
    }

    /// Fuse one measurement into the predicted belief. Returns its NIS.
    pub fn update(&mut self, measurement: &Measurement) -> FilterResult<f64> {
        let prediction = self.predict_measurement(measurement.kind())?;
        let sigma = self.predicted()?.clone();

        let nis = prediction.correct(
            &mut self.state,
            &mut self.covariance,
            &sigma,
            &self.weights,
            measurement,
        )?;
        match prediction.kind() {
            SensorKind::Lidar => self.lidar_updates += 1,
            SensorKind::Radar => self.radar_updates += 1,
        }

        log::debug!(
            "{} update: NIS={:.3}, trace(P)={:.4}",
            measurement.kind(),
            nis,
            self.covariance.trace()
        );
        Ok(nis)
    }

    pub fn weights(&self) -> &SigmaWeights {
        &self.weights
    }

    pub fn predicted_sigma_points(&self) -> Option<&PredSigmaPoints> {
        self.predicted_sigma_points.as_ref()
    }

    /// Get current state
    pub fn get_state(&self) -> CtrvState {
        CtrvState {
            px: self.state[0],
            py: self.state[1],
            v: self.state[2],
            yaw: self.state[3],
            yaw_rate: self.state[4],
            covariance_trace: self.covariance.trace(),
            predictions: self.predictions,
            lidar_updates: self.lidar_updates,
            radar_updates: self.radar_updates,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::FRAC_PI_2;

    fn filter() -> CtrvUkf {
        CtrvUkf::new(&ProcessNoise::default(), &SensorNoise::default())
    }

    #[test]
    fn test_ukf_creation() {
        let ukf = filter();
        let state = ukf.get_state();
        assert_eq!(state.px, 0.0);
        assert_eq!(state.predictions, 0);
        assert_abs_diff_eq!(state.covariance_trace, 3.045, epsilon = 1e-12);
        assert_abs_diff_eq!(ukf.weights()[0], -0.4, epsilon = 1e-12);
        assert!(ukf.predicted_sigma_points().is_none());
    }

    #[test]
    fn test_update_before_predict_fails() {
        let mut ukf = filter();
        ukf.initialize(&Measurement::Lidar { px: 1.0, py: 1.0 });
        let err = ukf.update(&Measurement::Lidar { px: 1.0, py: 1.0 }).unwrap_err();
        assert_eq!(err, FilterError::UpdateWithoutPrediction);
    }

    #[test]
    fn test_initialize_from_radar() {
        let mut ukf = filter();
        ukf.initialize(&Measurement::Radar { rho: 5.0, phi: 0.0, rho_dot: 0.0 });
        assert_abs_diff_eq!(ukf.state, StateVec::new(5.0, 0.0, 0.0, 0.0, 0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_zero_dt_prediction_keeps_belief() {
        let mut ukf = filter();
        ukf.initialize(&Measurement::Lidar { px: 3.0, py: 4.0 });
        ukf.state[2] = 2.0;
        ukf.state[3] = 0.4;
        ukf.state[4] = 0.1;
        let before_x = ukf.state;
        let before_p = ukf.covariance;

        ukf.predict(0.0).unwrap();

        assert_abs_diff_eq!(ukf.state, before_x, epsilon = 1e-9);
        assert_abs_diff_eq!(ukf.covariance, before_p, epsilon = 1e-9);
        assert!(ukf.predicted_sigma_points().is_some());
        assert_eq!(ukf.get_state().predictions, 1);
    }

    #[test]
    fn test_prediction_grows_uncertainty() {
        let mut ukf = filter();
        ukf.initialize(&Measurement::Lidar { px: 3.0, py: 4.0 });
        let before = ukf.covariance.trace();
        ukf.predict(0.1).unwrap();
        assert!(ukf.covariance.trace() > before);
    }

    #[test]
    fn test_lidar_update_counts_and_pulls() {
        let mut ukf = filter();
        ukf.initialize(&Measurement::Lidar { px: 3.0, py: 4.0 });
        ukf.predict(0.05).unwrap();

        let nis = ukf.update(&Measurement::Lidar { px: 3.5, py: 4.0 }).unwrap();
        assert!(nis > 0.0);
        assert!(ukf.state[0] > 3.0 && ukf.state[0] < 3.5);

        let state = ukf.get_state();
        assert_eq!(state.lidar_updates, 1);
        assert_eq!(state.radar_updates, 0);
    }

    #[test]
    fn test_radar_update_counts() {
        let mut ukf = filter();
        ukf.initialize(&Measurement::Radar { rho: 5.0, phi: 0.3, rho_dot: 0.0 });
        ukf.predict(0.05).unwrap();
        let trace = ukf.covariance.trace();

        ukf.update(&Measurement::Radar { rho: 5.1, phi: 0.31, rho_dot: 0.5 }).unwrap();
        assert!(ukf.covariance.trace() < trace);
        assert_eq!(ukf.get_state().radar_updates, 1);
    }

    #[test]
    fn test_radar_at_origin_is_degenerate() {
        let mut ukf = filter();
        ukf.initialize(&Measurement::Lidar { px: 0.0, py: 0.0 });
        ukf.predict(0.1).unwrap();
        let err = ukf.update(&Measurement::Radar { rho: 0.1, phi: 0.0, rho_dot: 0.0 }).unwrap_err();
        assert!(matches!(err, FilterError::DegenerateRange { .. }));
    }

    #[test]
    fn test_predict_measurement_kind() {
        let mut ukf = filter();
        ukf.initialize(&Measurement::Lidar { px: 3.0, py: 4.0 });
        ukf.predict(0.1).unwrap();
        assert_eq!(ukf.predict_measurement(SensorKind::Radar).unwrap().kind(), SensorKind::Radar);
        assert_eq!(ukf.predict_measurement(SensorKind::Lidar).unwrap().kind(), SensorKind::Lidar);
    }

    #[test]
    fn test_to_cartesian() {
        let mut ukf = filter();
        ukf.state = StateVec::new(1.0, 2.0, 2.0, FRAC_PI_2, 0.0);
        let c = ukf.get_state().to_cartesian();
        assert_eq!(c[0], 1.0);
        assert_eq!(c[1], 2.0);
        assert_abs_diff_eq!(c[2], 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(c[3], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_update_goes_through_tagged_prediction() {
        let mut ukf = filter();
        ukf.initialize(&Measurement::Radar { rho: 5.0, phi: 0.3, rho_dot: 0.0 });
        ukf.predict(0.05).unwrap();

        let radar = Measurement::Radar { rho: 5.1, phi: 0.31, rho_dot: 0.5 };
        let prediction = ukf.predict_measurement(radar.kind()).unwrap();
        let sigma = ukf.predicted_sigma_points().unwrap().clone();
        let (mut x, mut p) = (ukf.state, ukf.covariance);
        let expected = prediction
            .correct(&mut x, &mut p, &sigma, ukf.weights(), &radar)
            .unwrap();

        let nis = ukf.update(&radar).unwrap();
        assert_eq!(nis, expected);
        assert_eq!(ukf.state, x);
        assert_eq!(ukf.covariance, p);
    }
}

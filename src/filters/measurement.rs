//! Measurement models and the unscented correction step
//!
//! Each sensor maps predicted state sigma points into its own measurement
//! space. The per-cycle results live in a [`MeasurementPrediction`] returned
//! to the caller; nothing is kept between cycles.

use nalgebra::{SMatrix, SVector};

use super::unscented::{normalize_angle, residual, weighted_covariance, weighted_mean};
use crate::error::{FilterError, FilterResult};
use crate::types::{
    CrossCovariance, LidarNoise, Measurement, LidarVec, MeasurementSigmaPoints, PredSigmaPoints, RadarNoise,
    RadarVec, SensorKind, SigmaWeights, StateMat, StateVec, MEASURE_DIM_LIDAR, MEASURE_DIM_RADAR,
    SIGMA_COUNT, YAW_INDEX,
};

/// Smallest range the radar projection accepts
pub const MIN_RADAR_RANGE: f64 = 1e-9;

/// Mapping from state space into an M-dimensional measurement space
pub trait MeasurementModel<const M: usize> {
    /// Sensor this model describes
    const KIND: SensorKind;

    /// Component of the measurement that is an angle, if any
    const ANGLE_INDEX: Option<usize>;

    /// Project one state into measurement space
    fn project(&self, state: &StateVec) -> FilterResult<SVector<f64, M>>;

    /// Additive sensor noise covariance
    fn noise(&self) -> SMatrix<f64, M, M>;
}

/// Position-only sensor: observes (px, py) directly
#[derive(Clone, Debug)]
pub struct LidarModel {
    noise: LidarNoise,
}

impl LidarModel {
    pub fn new(std_px: f64, std_py: f64) -> Self {
        Self {
            noise: LidarNoise::new(std_px * std_px, 0.0, 0.0, std_py * std_py),
        }
    }
}

impl MeasurementModel<MEASURE_DIM_LIDAR> for LidarModel {
    const KIND: SensorKind = SensorKind::Lidar;
    const ANGLE_INDEX: Option<usize> = None;

    fn project(&self, state: &StateVec) -> FilterResult<LidarVec> {
        Ok(LidarVec::new(state[0], state[1]))
    }

    fn noise(&self) -> LidarNoise {
        self.noise
    }
}

/// Polar sensor: observes range, bearing and range-rate
#[derive(Clone, Debug)]
pub struct RadarModel {
    noise: RadarNoise,
}

impl RadarModel {
    pub fn new(std_rho: f64, std_phi: f64, std_rho_dot: f64) -> Self {
        Self {
            noise: RadarNoise::from_diagonal(&RadarVec::new(
                std_rho * std_rho,
                std_phi * std_phi,
                std_rho_dot * std_rho_dot,
            )),
        }
    }
}

impl MeasurementModel<MEASURE_DIM_RADAR> for RadarModel {
    const KIND: SensorKind = SensorKind::Radar;
    const ANGLE_INDEX: Option<usize> = Some(1);

    fn project(&self, state: &StateVec) -> FilterResult<RadarVec> {
        let p_x = state[0];
        let p_y = state[1];
        let v = state[2];
        let yaw = state[3];

        let rho = (p_x * p_x + p_y * p_y).sqrt();
        // No clamp: an object at the sensor origin has no defined bearing
        if rho < MIN_RADAR_RANGE {
            return Err(FilterError::DegenerateRange { rho });
        }

        let v1 = yaw.cos() * v;
        let v2 = yaw.sin() * v;

        Ok(RadarVec::new(rho, p_y.atan2(p_x), (p_x * v1 + p_y * v2) / rho))
    }

    fn noise(&self) -> RadarNoise {
        self.noise
    }
}

/// Predicted measurement moments for one update cycle
#[derive(Clone, Debug)]
pub struct MeasurementPrediction<const M: usize> {
    pub kind: SensorKind,
    /// Predicted sigma points mapped into measurement space
    pub sigma_points: MeasurementSigmaPoints<M>,
    /// Predicted measurement mean
    pub mean: SVector<f64, M>,
    /// Innovation covariance S (sensor noise included)
    pub innovation_covariance: SMatrix<f64, M, M>,
    angle_index: Option<usize>,
}

/// Map predicted sigma points through `model` and collect their moments
pub fn predict_measurement<const M: usize, Model: MeasurementModel<M>>(
    model: &Model,
    sigma: &PredSigmaPoints,
    weights: &SigmaWeights,
) -> FilterResult<MeasurementPrediction<M>> {
    let mut z_sigma = MeasurementSigmaPoints::<M>::zeros();
    for i in 0..SIGMA_COUNT {
        let state: StateVec = sigma.column(i).into_owned();
        z_sigma.set_column(i, &model.project(&state)?);
    }

    let angle_index = <Model as MeasurementModel<M>>::ANGLE_INDEX;
    let mean = weighted_mean(&z_sigma, weights);
    let innovation_covariance =
        weighted_covariance(&z_sigma, &mean, weights, angle_index) + model.noise();

    Ok(MeasurementPrediction {
        kind: <Model as MeasurementModel<M>>::KIND,
        sigma_points: z_sigma,
        mean,
        innovation_covariance,
        angle_index,
    })
}

impl<const M: usize> MeasurementPrediction<M> {
    /// Innovation `z - z_pred`, bearing wrapped when the sensor has one
    pub fn innovation(&self, z: &SVector<f64, M>) -> SVector<f64, M> {
        let mut y = z - self.mean;
        if let Some(a) = self.angle_index {
            y[a] = normalize_angle(y[a]);
        }
        y
    }

    /// Cross-correlation between state and measurement sigma points
    pub fn cross_covariance(
        &self,
        state: &StateVec,
        sigma: &PredSigmaPoints,
        weights: &SigmaWeights,
    ) -> CrossCovariance<M> {
        let mut tc = CrossCovariance::<M>::zeros();
        for i in 0..SIGMA_COUNT {
            let z_diff = residual(&self.sigma_points, i, &self.mean, self.angle_index);
            let x_diff = residual(sigma, i, state, Some(YAW_INDEX));
            tc += x_diff * z_diff.transpose() * weights[i];
        }
        tc
    }

    /// Normalized Innovation Squared for measurement `z`
    pub fn nis(&self, z: &SVector<f64, M>) -> FilterResult<f64> {
        let s_inv = self.inverse_innovation_covariance()?;
        let y = self.innovation(z);
        Ok((y.transpose() * s_inv * y)[0])
    }

    fn inverse_innovation_covariance(&self) -> FilterResult<SMatrix<f64, M, M>> {
        self.innovation_covariance
            .try_inverse()
            .ok_or(FilterError::SingularInnovation { kind: self.kind })
    }

    /// Fuse `z` into the predicted belief in place and return its NIS
    pub fn correct(
        &self,
        state: &mut StateVec,
        covariance: &mut StateMat,
        sigma: &PredSigmaPoints,
        weights: &SigmaWeights,
        z: &SVector<f64, M>,
    ) -> FilterResult<f64> {
        let tc = self.cross_covariance(state, sigma, weights);
        let s_inv = self.inverse_innovation_covariance()?;

        // Kalman gain
        let k = tc * s_inv;

        let y = self.innovation(z);

        *state += k * y;
        *covariance -= k * self.innovation_covariance * k.transpose();

        Ok((y.transpose() * s_inv * y)[0])
    }
}

/// Measurement prediction tagged by sensor kind
#[derive(Clone, Debug)]
pub enum PredictedMeasurement {
    Lidar(MeasurementPrediction<MEASURE_DIM_LIDAR>),
    Radar(MeasurementPrediction<MEASURE_DIM_RADAR>),
}

impl PredictedMeasurement {
    pub fn kind(&self) -> SensorKind {
        match self {
            PredictedMeasurement::Lidar(_) => SensorKind::Lidar,
            PredictedMeasurement::Radar(_) => SensorKind::Radar,
        }
    }

    /// Fuse the raw values of `measurement` through the matching prediction
    ///
    /// A measurement from the other sensor is rejected without touching the
    /// belief.
    pub fn correct(
        &self,
        state: &mut StateVec,
        covariance: &mut StateMat,
        sigma: &PredSigmaPoints,
        weights: &SigmaWeights,
        measurement: &Measurement,
    ) -> FilterResult<f64> {
        match (self, *measurement) {
            (PredictedMeasurement::Lidar(pred), Measurement::Lidar { px, py }) => {
                pred.correct(state, covariance, sigma, weights, &Measurement::lidar_vec(px, py))
            }
            (PredictedMeasurement::Radar(pred), Measurement::Radar { rho, phi, rho_dot }) => {
                let z = Measurement::radar_vec(rho, phi, rho_dot);
                pred.correct(state, covariance, sigma, weights, &z)
            }
            _ => Err(FilterError::InvalidObservation {
                kind: self.kind(),
                expected: self.kind().measurement_dim(),
                got: measurement.kind().measurement_dim(),
            }),
        }
    }
}

// tracker.rs: observation-driven orchestration of the CTRV filter
//
// Takes timestamped lidar/radar observations in, produces a belief and events out.
// Owns the elapsed-time bookkeeping, the sensor enable flags and the NIS statistics;
// the numerical work lives in filters::ukf_ctrv.

use serde::{Deserialize, Serialize};

use crate::consistency::{NisMonitor, NisSummary};
use crate::error::FilterError;
use crate::filters::ukf_ctrv::{CtrvState, CtrvUkf, ProcessNoise, SensorNoise};
use crate::types::{Observation, SensorKind, StateMat, StateVec};

/// Longest single prediction before the interval is split [s]
pub const MAX_PREDICTION_STEP: f64 = 0.1;
/// Sub-step used while splitting a long interval [s]
pub const SUB_STEP: f64 = 0.05;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // ── Feature flags ──
    pub use_lidar: bool,
    pub use_radar: bool,

    // ── Filter tuning ──
    pub process_noise: ProcessNoise,
    pub sensor_noise: SensorNoise,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            use_lidar: true,
            use_radar: true,
            process_noise: ProcessNoise::default(),
            sensor_noise: SensorNoise::default(),
        }
    }
}

impl TrackerConfig {
    pub fn sensor_enabled(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::Lidar => self.use_lidar,
            SensorKind::Radar => self.use_radar,
        }
    }
}

// ─── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq)]
pub enum TrackerEvent {
    Initialized { kind: SensorKind, px: f64, py: f64 },
    Ignored { kind: SensorKind },
    SubStepped { steps: usize, dt: f64 },
    Updated { kind: SensorKind, nis: f64 },
}

// ─── Snapshot ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub timestamp_us: Option<i64>,
    pub state: CtrvState,
    pub lidar_nis: NisSummary,
    pub radar_nis: NisSummary,
}

// ─── Interval splitting ──────────────────────────────────────────────────────

/// Prediction steps covering `dt` seconds
///
/// Long gaps are walked in fixed sub-steps so the CTRV linearization error
/// stays bounded: while more than [`MAX_PREDICTION_STEP`] remains, yield a
/// [`SUB_STEP`]; the remainder is the final step. Steps are produced lazily.
pub fn split_interval(dt: f64) -> IntervalSteps {
    IntervalSteps {
        remaining: dt,
        done: false,
    }
}

#[derive(Clone, Debug)]
pub struct IntervalSteps {
    remaining: f64,
    done: bool,
}

impl Iterator for IntervalSteps {
    type Item = f64;

    fn next(&mut self) -> Option<f64> {
        if self.done {
            return None;
        }
        if self.remaining > MAX_PREDICTION_STEP {
            self.remaining -= SUB_STEP;
            Some(SUB_STEP)
        } else {
            self.done = true;
            Some(self.remaining)
        }
    }
}

// ─── The tracker ─────────────────────────────────────────────────────────────

pub struct Tracker {
    config: TrackerConfig,
    ukf: CtrvUkf,

    /// None until the first accepted observation
    last_timestamp_us: Option<i64>,

    lidar_nis: NisMonitor,
    radar_nis: NisMonitor,
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        let ukf = CtrvUkf::new(&config.process_noise, &config.sensor_noise);
        Self {
            config,
            ukf,
            last_timestamp_us: None,
            lidar_nis: NisMonitor::new(SensorKind::Lidar),
            radar_nis: NisMonitor::new(SensorKind::Radar),
        }
    }

    /// Run one predict/update cycle for `obs`
    ///
    /// On error the belief may already have been advanced by the prediction;
    /// the tracker should be discarded.
    pub fn process(&mut self, obs: &Observation) -> Result<Vec<TrackerEvent>, FilterError> {
        let mut events = Vec::new();
        let kind = obs.kind();

        // Disabled sensors are dropped before they can initialize anything
        if !self.config.sensor_enabled(kind) {
            log::trace!("ignoring {} observation at {}", kind, obs.timestamp_us);
            events.push(TrackerEvent::Ignored { kind });
            return Ok(events);
        }

        let Some(prev_ts) = self.last_timestamp_us else {
            self.ukf.initialize(&obs.measurement);
            self.last_timestamp_us = Some(obs.timestamp_us);
            let (px, py) = obs.measurement.position();
            log::info!("initialized from {} at ({:.3}, {:.3})", kind, px, py);
            events.push(TrackerEvent::Initialized { kind, px, py });
            return Ok(events);
        };

        let dt = (obs.timestamp_us - prev_ts) as f64 * 1e-6;
        self.last_timestamp_us = Some(obs.timestamp_us);
        if dt < 0.0 {
            log::warn!("timestamp went backwards by {:.6} s, predicting backwards", -dt);
        }

        let mut steps = 0;
        for step in split_interval(dt) {
            self.ukf.predict(step)?;
            steps += 1;
        }
        if steps > 1 {
            log::debug!("split {:.3} s gap into {} steps", dt, steps);
            events.push(TrackerEvent::SubStepped { steps, dt });
        }

        let nis = self.ukf.update(&obs.measurement)?;
        self.nis_monitor_mut(kind).record(nis);
        events.push(TrackerEvent::Updated { kind, nis });

        Ok(events)
    }

    fn nis_monitor_mut(&mut self, kind: SensorKind) -> &mut NisMonitor {
        match kind {
            SensorKind::Lidar => &mut self.lidar_nis,
            SensorKind::Radar => &mut self.radar_nis,
        }
    }

    pub fn state(&self) -> &StateVec {
        &self.ukf.state
    }

    pub fn covariance(&self) -> &StateMat {
        &self.ukf.covariance
    }

    pub fn is_initialized(&self) -> bool {
        self.last_timestamp_us.is_some()
    }

    pub fn last_timestamp(&self) -> Option<i64> {
        self.last_timestamp_us
    }

    /// NIS of the most recent update from `kind`
    pub fn nis(&self, kind: SensorKind) -> Option<f64> {
        self.nis_monitor(kind).last()
    }

    pub fn nis_monitor(&self, kind: SensorKind) -> &NisMonitor {
        match kind {
            SensorKind::Lidar => &self.lidar_nis,
            SensorKind::Radar => &self.radar_nis,
        }
    }

    pub fn filter(&self) -> &CtrvUkf {
        &self.ukf
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn get_snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            timestamp_us: self.last_timestamp_us,
            state: self.ukf.get_state(),
            lidar_nis: self.lidar_nis.summary(),
            radar_nis: self.radar_nis.summary(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::unscented::normalize_angle;
    use crate::types::Measurement;
    use approx::assert_abs_diff_eq;

    fn prior() -> StateMat {
        StateMat::from_diagonal(&StateVec::new(1.0, 1.0, 1.0, 0.0225, 0.0225))
    }

    #[test]
    fn test_radar_initialization() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        let events = tracker.process(&Observation::radar(1_000, 5.0, 0.0, 0.0)).unwrap();

        assert!(matches!(events[..], [TrackerEvent::Initialized { kind: SensorKind::Radar, .. }]));
        assert_abs_diff_eq!(*tracker.state(), StateVec::new(5.0, 0.0, 0.0, 0.0, 0.0), epsilon = 1e-12);
        assert_eq!(tracker.last_timestamp(), Some(1_000));
    }

    #[test]
    fn test_lidar_initialization() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.process(&Observation::lidar(0, 3.0, 4.0)).unwrap();

        assert!(tracker.is_initialized());
        assert_eq!(*tracker.state(), StateVec::new(3.0, 4.0, 0.0, 0.0, 0.0));
        assert_eq!(*tracker.covariance(), prior());
        // Initialization does not predict or update
        assert_eq!(tracker.filter().get_state().predictions, 0);
        assert!(tracker.nis(SensorKind::Lidar).is_none());
    }

    #[test]
    fn test_disabled_sensor_never_initializes() {
        let config = TrackerConfig {
            use_lidar: false,
            ..TrackerConfig::default()
        };
        let mut tracker = Tracker::new(config);

        let events = tracker.process(&Observation::lidar(0, 3.0, 4.0)).unwrap();
        assert_eq!(events, vec![TrackerEvent::Ignored { kind: SensorKind::Lidar }]);
        assert!(!tracker.is_initialized());
        assert_eq!(*tracker.state(), StateVec::zeros());

        tracker.process(&Observation::radar(50_000, 5.0, 0.0, 0.0)).unwrap();
        assert!(tracker.is_initialized());

        // Still ignored once running, and the clock does not move
        let events = tracker.process(&Observation::lidar(100_000, 5.0, 0.0)).unwrap();
        assert_eq!(events, vec![TrackerEvent::Ignored { kind: SensorKind::Lidar }]);
        assert_eq!(tracker.last_timestamp(), Some(50_000));
    }

    #[test]
    fn test_split_interval() {
        let steps: Vec<f64> = split_interval(0.37).collect();
        assert_eq!(steps.len(), 7);
        for step in &steps[..6] {
            assert_eq!(*step, SUB_STEP);
        }
        assert_abs_diff_eq!(steps[6], 0.07, epsilon = 1e-9);

        assert_eq!(split_interval(0.1).collect::<Vec<_>>(), vec![0.1]);
        assert_eq!(split_interval(0.0).collect::<Vec<_>>(), vec![0.0]);
        assert_eq!(split_interval(-0.2).collect::<Vec<_>>(), vec![-0.2]);
    }

    #[test]
    fn test_split_interval_is_lazy_for_long_gaps() {
        // 30.02 s gap: 599 sub-steps plus a 0.07 s remainder, walked without collecting
        let mut steps = split_interval(30.02);
        assert_eq!(steps.next(), Some(SUB_STEP));
        assert_eq!(steps.count(), 599);

        let total: f64 = split_interval(30.02).sum();
        assert_abs_diff_eq!(total, 30.02, epsilon = 1e-9);

        let last = split_interval(30.02).last().unwrap();
        assert_abs_diff_eq!(last, 0.07, epsilon = 1e-9);
    }

    #[test]
    fn test_long_gap_reports_step_count() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.process(&Observation::lidar(0, 3.0, 4.0)).unwrap();
        let events = tracker.process(&Observation::lidar(2_020_000, 3.0, 4.0)).unwrap();
        assert!(matches!(events[0], TrackerEvent::SubStepped { steps: 40, .. }));
        assert_eq!(tracker.filter().get_state().predictions, 40);
    }

    #[test]
    fn test_long_gap_matches_manual_substeps() {
        let config = TrackerConfig::default();
        let mut tracker = Tracker::new(config.clone());
        tracker.process(&Observation::lidar(0, 3.0, 4.0)).unwrap();
        let events = tracker.process(&Observation::lidar(370_000, 3.3, 4.1)).unwrap();
        assert!(matches!(events[0], TrackerEvent::SubStepped { steps: 7, .. }));
        assert!(matches!(events[1], TrackerEvent::Updated { kind: SensorKind::Lidar, .. }));

        let mut manual = CtrvUkf::new(&config.process_noise, &config.sensor_noise);
        manual.initialize(&Measurement::Lidar { px: 3.0, py: 4.0 });
        // Six fixed 0.05 s steps, then whatever is left of the 0.37 s gap
        let mut remainder = 370_000_f64 * 1e-6;
        for _ in 0..6 {
            manual.predict(0.05).unwrap();
            remainder -= 0.05;
        }
        assert_abs_diff_eq!(remainder, 0.37 - 6.0 * 0.05, epsilon = 1e-12);
        manual.predict(remainder).unwrap();
        manual.update(&Measurement::Lidar { px: 3.3, py: 4.1 }).unwrap();

        assert_eq!(*tracker.state(), manual.state);
        assert_eq!(*tracker.covariance(), manual.covariance);
    }

    #[test]
    fn test_duplicate_timestamp_keeps_mean() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.process(&Observation::lidar(0, 3.0, 4.0)).unwrap();
        let mut ukf = tracker.filter().clone();

        ukf.predict(0.0).unwrap();
        assert_abs_diff_eq!(ukf.state, *tracker.state(), epsilon = 1e-9);

        // Same timestamp through the tracker: zero-length prediction, then the update
        let events = tracker.process(&Observation::lidar(0, 3.0, 4.0)).unwrap();
        assert_eq!(events.len(), 1);
        assert_abs_diff_eq!(tracker.state()[0], 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(tracker.state()[1], 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_backwards_timestamp_is_processed() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.process(&Observation::lidar(100_000, 3.0, 4.0)).unwrap();
        let events = tracker.process(&Observation::lidar(50_000, 3.0, 4.0)).unwrap();
        assert!(matches!(events[..], [TrackerEvent::Updated { .. }]));
        assert_eq!(tracker.last_timestamp(), Some(50_000));
    }

    #[test]
    fn test_nis_recorded_per_sensor() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.process(&Observation::lidar(0, 5.0, 1.0)).unwrap();
        tracker.process(&Observation::lidar(50_000, 5.1, 1.0)).unwrap();
        assert!(tracker.nis(SensorKind::Lidar).is_some());
        assert!(tracker.nis(SensorKind::Radar).is_none());

        tracker.process(&Observation::radar(100_000, 5.2, 0.19, 1.0)).unwrap();
        assert_eq!(tracker.nis_monitor(SensorKind::Radar).count(), 1);
        assert_eq!(tracker.nis_monitor(SensorKind::Lidar).count(), 1);

        let snapshot = tracker.get_snapshot();
        assert_eq!(snapshot.timestamp_us, Some(100_000));
        assert_eq!(snapshot.state.lidar_updates, 1);
        assert_eq!(snapshot.state.radar_updates, 1);
    }

    #[test]
    fn test_degenerate_radar_surfaces_error() {
        let mut tracker = Tracker::new(TrackerConfig::default());
        tracker.process(&Observation::lidar(0, 0.0, 0.0)).unwrap();
        let err = tracker.process(&Observation::radar(50_000, 0.1, 0.0, 0.0)).unwrap_err();
        assert!(matches!(err, FilterError::DegenerateRange { .. }));
    }

    #[test]
    fn test_converges_on_straight_line() {
        let (vx, vy): (f64, f64) = (3.0, 0.5);
        let truth = |t: f64| (5.0 + vx * t, 2.0 + vy * t);
        let dt_us = 50_000;

        let mut tracker = Tracker::new(TrackerConfig::default());
        let mut traces = Vec::new();
        for k in 0..200 {
            let ts = k as i64 * dt_us;
            let (px, py) = truth(ts as f64 * 1e-6);
            let obs = if k % 2 == 0 {
                Observation::lidar(ts, px, py)
            } else {
                let rho = (px * px + py * py).sqrt();
                Observation::radar(ts, rho, py.atan2(px), (px * vx + py * vy) / rho)
            };
            tracker.process(&obs).unwrap();
            traces.push(tracker.covariance().trace());
        }

        let (px, py) = truth(199.0 * 0.05);
        let x = tracker.state();
        let speed: f64 = (vx * vx + vy * vy).sqrt();
        let heading = vy.atan2(vx);

        assert!(((x[0] - px).powi(2) + (x[1] - py).powi(2)).sqrt() < 0.3);
        assert!((x[2] - speed).abs() < 0.4, "speed {}", x[2]);
        assert!(normalize_angle(x[3] - heading).abs() < 0.15, "heading {}", x[3]);

        let early: f64 = traces[2..12].iter().sum::<f64>() / 10.0;
        let late: f64 = traces[180..].iter().sum::<f64>() / 20.0;
        assert!(late < early, "late {} vs early {}", late, early);

        // After the transient, lidar-to-lidar the trace does not grow; the slack
        // covers the slowly widening radar cross-range as the target recedes
        let lidar_traces: Vec<f64> = traces.iter().copied().step_by(2).skip(50).collect();
        for pair in lidar_traces.windows(2) {
            assert!(pair[1] <= pair[0] * (1.0 + 1e-3), "trace grew {} -> {}", pair[0], pair[1]);
        }
    }
}

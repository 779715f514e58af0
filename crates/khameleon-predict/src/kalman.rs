//! Constant-acceleration Kalman filter over pointer traces

use khameleon_core::{
    DistModel, Layout, PredictorConfig, SessionContext, TracePoint,
};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use crate::{
    top_k_regions, Distribution, Gaussian, Gaussian2D, Input, Mat6, PointModel, PredictError,
    Prediction, PredictionData, Predictor, Result, TraceLogger, Vec6,
};

/// Filtered state: position, velocity and acceleration with covariance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KalmanState {
    pub x: Vec6,
    pub p: Mat6,
}

/// Six-state filter `[x, y, vx, vy, ax, ay]` with an identity measurement model
#[derive(Debug, Clone)]
pub struct KalmanFilter {
    decay: f64,
    r: Mat6,
    q: Mat6,
    velocity_gain: f64,
    sigma: f64,
}

impl KalmanFilter {
    /// Filter tuned from predictor configuration
    pub fn from_config(config: &PredictorConfig) -> Self {
        Self {
            decay: config.decay,
            r: Mat6::diagonal(config.measurement_noise),
            q: Mat6::diagonal([config.process_noise; 6]),
            velocity_gain: config.velocity_gain,
            sigma: config.sigma,
        }
    }

    fn transition(dt: f64) -> Mat6 {
        let dt2 = dt * dt;
        Mat6([
            [1.0, 0.0, dt, 0.0, dt2, 0.0],
            [0.0, 1.0, 0.0, dt, 0.0, dt2],
            [0.0, 0.0, 1.0, 0.0, dt, 0.0],
            [0.0, 0.0, 0.0, 1.0, 0.0, dt],
            [0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
        ])
    }

    fn projection(&self, delta: f64) -> Mat6 {
        let g = self.velocity_gain * delta;
        Mat6([
            [1.0, 0.0, g, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, g, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0, delta, 0.0],
            [0.0, 0.0, 0.0, 1.0, 0.0, delta],
            [0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// Run the filter across a trace.
    ///
    /// Starts at the first sample with zero velocity and identity covariance.
    /// Measurement updates begin at the third sample, the first with enough
    /// history for finite-difference acceleration. Steps with a non-positive
    /// time gap are skipped.
    pub fn filter(&self, trace: &[TracePoint]) -> Result<Option<KalmanState>> {
        let Some(first) = trace.first() else {
            return Ok(None);
        };
        let mut x: Vec6 = [first.x, first.y, 0.0, 0.0, 0.0, 0.0];
        let mut p = Mat6::identity();
        let identity = Mat6::identity();

        let elapsed: Vec<f64> = trace.windows(2).map(|w| w[1].t - w[0].t).collect();

        for i in 2..trace.len() {
            let dt = elapsed[i - 1];
            let dt_prev = elapsed[i - 2];
            if dt <= 0.0 || dt_prev <= 0.0 {
                debug!(step = i, dt, dt_prev, "Skipping sample with no elapsed time");
                continue;
            }
            let f = Self::transition(dt);

            p = p.scale(1.0 + self.decay * dt);

            let (cur, prev, prev2) = (&trace[i], &trace[i - 1], &trace[i - 2]);
            let vx = (cur.x - prev.x) / dt;
            let vy = (cur.y - prev.y) / dt;
            let vxp = (prev.x - prev2.x) / dt_prev;
            let vyp = (prev.y - prev2.y) / dt_prev;
            let ax = (vx - vxp) * 2.0 / (dt + dt_prev);
            let ay = (vy - vyp) * 2.0 / (dt + dt_prev);
            let z: Vec6 = [cur.x, cur.y, vx, vy, ax, ay];

            // predict
            x = f.mul_vec(&x);
            p = f.sandwich(&p) + self.q;

            // update (H = I)
            let s = p + self.r;
            let s_inv = s.inverse().ok_or(PredictError::SingularMatrix { step: i })?;
            let k = p * s_inv;
            let hx = x;
            let innovation: Vec6 = std::array::from_fn(|j| z[j] - hx[j]);
            let correction = k.mul_vec(&innovation);
            for j in 0..6 {
                x[j] += correction[j];
            }
            p = (identity - k) * p;
        }

        Ok(Some(KalmanState { x, p }))
    }

    /// Project a filtered state `delta` milliseconds ahead
    pub fn project(&self, state: &KalmanState, delta: f64) -> Gaussian2D {
        let f = self.projection(delta);
        let p = f.sandwich(&state.p.scale(1.0 + self.decay * delta)) + self.q;
        let x = f.mul_vec(&state.x);

        let variance = |v: f64| {
            if v < 1.0 {
                1.0
            } else {
                (v * 1000.0).round() / 1000.0 * self.sigma
            }
        };
        Gaussian2D::new(
            Gaussian::new(x[0], variance(p.get(0, 0))),
            Gaussian::new(x[1], variance(p.get(1, 1))),
        )
    }

    /// Filter a trace and project it to every offset
    pub fn predict(
        &self,
        trace: &[TracePoint],
        time_range: &[u64],
    ) -> Result<BTreeMap<u64, Gaussian2D>> {
        let Some(state) = self.filter(trace)? else {
            return Ok(BTreeMap::new());
        };
        Ok(time_range
            .iter()
            .map(|&delta| (delta, self.project(&state, delta as f64)))
            .collect())
    }
}

/// Motion predictor driven by the pointer trace
#[derive(Debug)]
pub struct KalmanPredictor {
    config: PredictorConfig,
    filter: KalmanFilter,
    tracker: TraceLogger,
    state: BTreeMap<u64, Gaussian2D>,
    layout: Layout,
    layout_changed: bool,
    /// Pending until the next serialize
    app_state: Option<Value>,
    ctx: std::sync::Arc<SessionContext>,
}

impl KalmanPredictor {
    /// Predictor configured from the session
    pub fn new(ctx: std::sync::Arc<SessionContext>) -> Self {
        let config = ctx.config().predictor.clone();
        let mut tracker = TraceLogger::new(config.trace.clone(), ctx.clock().clone());
        if ctx.config().log_trace {
            tracker = tracker.with_telemetry(ctx.telemetry().clone());
        }
        Self {
            filter: KalmanFilter::from_config(&config),
            config,
            tracker,
            state: BTreeMap::new(),
            layout: Layout::new(),
            layout_changed: false,
            app_state: None,
            ctx,
        }
    }

    /// Pointer trace source
    pub fn tracker(&self) -> &TraceLogger {
        &self.tracker
    }

    /// Mutable pointer trace source
    pub fn tracker_mut(&mut self) -> &mut TraceLogger {
        &mut self.tracker
    }

    /// Current per-offset projections
    pub fn state(&self) -> &BTreeMap<u64, Gaussian2D> {
        &self.state
    }

    /// Confidence that the pointer has settled at its last position
    pub fn point_model(&self) -> PointModel {
        let (x, y) = self
            .tracker
            .last_point()
            .map(|p| (p.x, p.y))
            .unwrap_or((0.0, 0.0));
        PointModel::from_linger(x, y, self.tracker.stop_delta(), &self.config)
    }

    fn gaussian_wire(&self) -> BTreeMap<u64, crate::GaussianParams> {
        self.state
            .iter()
            .filter_map(|(t, d)| d.to_wire().map(|w| (*t, w)))
            .collect()
    }
}

impl Predictor for KalmanPredictor {
    fn model(&self) -> DistModel {
        self.config.model
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.config.min_interval_ms)
    }

    fn observe(&mut self, input: Input) {
        if let Input::Pointer { x, y, action } = input {
            self.tracker.record(x, y, action);
        }
    }

    fn update_state(&mut self) -> Result<bool> {
        let Some(trace) = self.tracker.trace() else {
            return Ok(false);
        };
        match self.filter.predict(&trace, &self.config.time_range) {
            Ok(state) => {
                self.state = state;
                Ok(true)
            }
            Err(PredictError::SingularMatrix { step }) => {
                debug!(step, "Innovation covariance not invertible, keeping previous state");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn serialize(&mut self) -> Option<Prediction> {
        if self.state.is_empty() {
            return None;
        }
        let dist = match self.config.model {
            DistModel::Gaussian => Distribution::Gaussian(self.gaussian_wire()),
            DistModel::LinearGaussianPoint => Distribution::LinearGaussianPoint {
                g: self.gaussian_wire(),
                p: self.point_model(),
            },
            DistModel::Dictionary => return None,
        };

        let layout = if self.layout_changed {
            self.layout_changed = false;
            Some(self.layout.clone())
        } else {
            None
        };

        Some(Prediction {
            model: self.config.model,
            data: PredictionData {
                layout,
                dist,
                state: self.app_state.take(),
            },
        })
    }

    fn top_k(&self, k: usize, layout: &Layout) -> Vec<String> {
        let Some(nearest) = self
            .config
            .time_range
            .first()
            .and_then(|t| self.state.get(t))
        else {
            return Vec::new();
        };
        top_k_regions(nearest, k, layout)
    }

    fn on_layout(&mut self, layout: Layout) {
        if self.ctx.config().log_trace {
            self.ctx.telemetry().add_session_event(
                "layout",
                json!({ "data": &layout, "time": self.ctx.now() }),
            );
        }
        self.layout = layout;
        self.layout_changed = true;
    }

    fn on_app_state(&mut self, state: Value) {
        if self.ctx.config().log_trace {
            self.ctx.telemetry().add_session_event(
                "state",
                json!({ "data": &state, "time": self.ctx.now() }),
            );
        }
        self.app_state = Some(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use khameleon_core::{Action, Bounds, ManualClock, SessionConfig};
    use std::sync::Arc;

    fn line(n: usize, step_ms: f64, vx: f64, vy: f64) -> Vec<TracePoint> {
        (0..n)
            .map(|i| {
                let t = i as f64 * step_ms;
                TracePoint::new(100.0 + vx * t, 50.0 + vy * t, 1_000.0 + t, Action::Move)
            })
            .collect()
    }

    #[test]
    fn test_empty_trace_yields_nothing() {
        let filter = KalmanFilter::from_config(&PredictorConfig::default());
        assert!(filter.predict(&[], &[100]).unwrap().is_empty());
    }

    #[test]
    fn test_short_trace_projects_initial_state() {
        let filter = KalmanFilter::from_config(&PredictorConfig::default());
        let trace = line(2, 20.0, 1.0, 1.0);
        let dists = filter.predict(&trace, &[100, 200]).unwrap();

        assert_eq!(dists.len(), 2);
        for d in dists.values() {
            assert_eq!(d.x.mean, 100.0);
            assert_eq!(d.y.mean, 50.0);
        }
    }

    #[test]
    fn test_converges_to_linear_extrapolation() {
        let config = PredictorConfig::default()
            .with_measurement_noise([1e-9; 6])
            .with_velocity_gain(1.0);
        let filter = KalmanFilter::from_config(&config);
        let (vx, vy) = (0.5, -0.25);
        let trace = line(8, 20.0, vx, vy);
        let last = trace[trace.len() - 1];

        for (delta, d) in filter.predict(&trace, &[100, 200, 500]).unwrap() {
            let expect_x = last.x + vx * delta as f64;
            let expect_y = last.y + vy * delta as f64;
            assert!((d.x.mean - expect_x).abs() < 1e-3, "x at {delta}: {}", d.x.mean);
            assert!((d.y.mean - expect_y).abs() < 1e-3, "y at {delta}: {}", d.y.mean);
        }
    }

    #[test]
    fn test_default_gain_damps_velocity() {
        let config = PredictorConfig::default().with_measurement_noise([1e-9; 6]);
        let filter = KalmanFilter::from_config(&config);
        let trace = line(8, 20.0, 1.0, 0.0);
        let last = trace[trace.len() - 1];

        let d = filter.predict(&trace, &[100]).unwrap()[&100];
        assert!((d.x.mean - (last.x + 0.6 * 100.0)).abs() < 1e-3);
    }

    #[test]
    fn test_uncertainty_grows_with_offset() {
        let filter = KalmanFilter::from_config(&PredictorConfig::default());
        let trace = line(10, 20.0, 0.3, 0.1);
        let dists = filter.predict(&trace, &[100, 200, 500]).unwrap();
        assert!(dists[&100].x.variance <= dists[&500].x.variance);
        assert!(dists.values().all(|d| d.x.variance >= 1.0 && d.y.variance >= 1.0));
    }

    #[test]
    fn test_duplicate_timestamps_skipped() {
        let filter = KalmanFilter::from_config(&PredictorConfig::default());
        let mut trace = line(4, 20.0, 1.0, 0.0);
        let dup = trace[3];
        trace.push(dup);
        let dists = filter.predict(&trace, &[100]).unwrap();
        assert!(dists[&100].x.mean.is_finite());
    }

    fn predictor(config: SessionConfig) -> (KalmanPredictor, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(0));
        let ctx = SessionContext::new(config).with_clock(clock.clone()).into_shared();
        (KalmanPredictor::new(ctx), clock)
    }

    #[test]
    fn test_serialize_lgp_with_one_shot_layout() {
        let (mut p, clock) = predictor(SessionConfig::default());
        assert!(p.serialize().is_none());

        for i in 0..5 {
            p.observe(Input::Pointer {
                x: 10.0 * i as f64,
                y: 0.0,
                action: Action::Move,
            });
            clock.advance(20);
        }
        let mut layout = Layout::new();
        layout.insert("tile".into(), Bounds::new(0.0, 0.0, 10.0, 10.0));
        p.on_layout(layout);
        p.on_app_state(json!({"page": 2}));
        assert!(p.update_state().unwrap());

        let first = p.serialize().unwrap().to_json().unwrap();
        assert_eq!(first["model"], "LGP");
        assert!(first["data"]["layout"]["tile"].is_object());
        assert_eq!(first["data"]["state"]["page"], 2);
        assert!(first["data"]["dist"]["g"]["100"]["xmu"].is_number());
        assert!(first["data"]["dist"]["p"]["a"].is_number());

        let second = p.serialize().unwrap().to_json().unwrap();
        assert!(second["data"].get("layout").is_none());
        assert!(second["data"].get("state").is_none());

        p.on_app_state(json!({"page": 3}));
        let third = p.serialize().unwrap().to_json().unwrap();
        assert!(third["data"].get("layout").is_none());
        assert_eq!(third["data"]["state"]["page"], 3);
    }

    #[test]
    fn test_gaussian_model_has_no_point() {
        let config = SessionConfig::default()
            .with_predictor(PredictorConfig::default().with_model(DistModel::Gaussian));
        let (mut p, clock) = predictor(config);
        p.observe(Input::Pointer { x: 1.0, y: 1.0, action: Action::Move });
        clock.advance(20);
        assert!(p.update_state().unwrap());

        let json = p.serialize().unwrap().to_json().unwrap();
        assert_eq!(json["model"], "GM");
        assert!(json["data"]["dist"]["100"]["ysigma"].is_number());
    }

    #[test]
    fn test_point_model_decays_when_still() {
        let (mut p, clock) = predictor(SessionConfig::default());
        p.observe(Input::Pointer { x: 4.0, y: 5.0, action: Action::Move });
        assert_eq!(p.point_model().alpha, 1.0);

        clock.advance(252);
        let model = p.point_model();
        assert!(model.alpha < 0.51 && model.alpha > 0.49);
        assert_eq!((model.x, model.y), (4.0, 5.0));
    }

    #[test]
    fn test_top_k_uses_nearest_offset() {
        let (mut p, clock) = predictor(SessionConfig::default());
        let mut layout = Layout::new();
        layout.insert("here".into(), Bounds::new(-50.0, -50.0, 100.0, 100.0));
        layout.insert("there".into(), Bounds::new(900.0, 900.0, 10.0, 10.0));
        assert!(p.top_k(1, &layout).is_empty());

        p.observe(Input::Pointer { x: 0.0, y: 0.0, action: Action::Move });
        clock.advance(20);
        p.update_state().unwrap();
        assert_eq!(p.top_k(1, &layout), vec!["here"]);
    }
}

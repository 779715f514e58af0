//! # Khameleon Predict
//!
//! Forward-looking distributions over what the user will ask for next.
//!
//! Two interchangeable [`Predictor`]s:
//!
//! - [`KalmanPredictor`]: a constant-acceleration Kalman filter over the
//!   pointer trace kept by [`TraceLogger`], projected to several future
//!   offsets as independent 2D Gaussians, plus a [`PointModel`] expressing
//!   how likely it is that the pointer has come to rest
//! - [`MarkovPredictor`]: a running transition matrix over a fixed action
//!   alphabet
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  trace   ┌──────────────┐ Gaussian/offset ┌──────────────┐
//! │ TraceLogger  │ ───────► │ KalmanFilter │ ──────────────► │  Prediction  │
//! │ (pointer in) │          │  6-state CA  │   PointModel    │ (tagged JSON)│
//! └──────────────┘          └──────────────┘ ──────────────► └──────────────┘
//!                                                                   ▲
//! ┌──────────────┐  action  ┌──────────────┐ transition matrix      │
//! │ action input │ ───────► │    Markov    │ ───────────────────────┘
//! └──────────────┘          └──────────────┘
//! ```

mod distribution;
mod error;
mod gaussian;
mod kalman;
mod linalg;
mod markov;
mod point;
mod predictor;
mod trace;

pub use distribution::{Distribution, Prediction, PredictionData};
pub use error::{PredictError, Result};
pub use gaussian::{top_k_regions, Gaussian, Gaussian2D, GaussianParams};
pub use kalman::{KalmanFilter, KalmanPredictor, KalmanState};
pub use linalg::{Mat6, Vec6};
pub use markov::{Markov, MarkovPredictor};
pub use point::PointModel;
pub use predictor::{Input, Predictor};
pub use trace::TraceLogger;

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        Distribution, Input, KalmanPredictor, MarkovPredictor, Prediction, Predictor, Result,
        TraceLogger,
    };
}

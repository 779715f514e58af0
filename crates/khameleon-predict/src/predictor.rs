//! Predictor seam shared by the motion and action models

use khameleon_core::{Action, DistModel, Layout};
use serde_json::Value;
use std::time::Duration;

use crate::{Prediction, Result};

/// User input fed to a predictor
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input {
    /// Pointer sample
    Pointer { x: f64, y: f64, action: Action },
    /// Discrete action index
    Action(usize),
}

/// Produces forward-looking distributions from observed input.
///
/// A session ticks its predictor every [`Predictor::interval`]: `update`
/// refits the model, then `serialize` yields the tagged distribution sent
/// to the server. Each implementation ignores input it has no use for.
pub trait Predictor: Send {
    /// Distribution model emitted
    fn model(&self) -> DistModel;

    /// Tick period
    fn interval(&self) -> Duration;

    /// Feed one input
    fn observe(&mut self, input: Input);

    /// Refit; `Ok(false)` when nothing changed
    fn update_state(&mut self) -> Result<bool>;

    /// Current distribution, `None` when there is nothing to send
    fn serialize(&mut self) -> Option<Prediction>;

    /// Up to `k` layout regions most likely to be requested next
    fn top_k(&self, _k: usize, _layout: &Layout) -> Vec<String> {
        Vec::new()
    }

    /// Application layout changed
    fn on_layout(&mut self, _layout: Layout) {}

    /// Application state changed
    fn on_app_state(&mut self, _state: Value) {}
}

//! Running first-order transition statistics over a fixed action alphabet

use khameleon_core::{DistModel, PredictorConfig};
use std::time::Duration;
use tracing::debug;

use crate::{
    Distribution, Input, PredictError, Prediction, PredictionData, Predictor, Result,
};

/// Transition counts normalized per destination action.
///
/// `tmatrix[i][j] = counts[i][j] / margins[j]`, so every column sums to
/// one once `margins[j]` equals the column total of `counts`.
#[derive(Debug, Clone, PartialEq)]
pub struct Markov {
    nactions: usize,
    tmatrix: Vec<Vec<f64>>,
    counts: Vec<Vec<f64>>,
    margins: Vec<f64>,
}

impl Markov {
    /// Uniform model seeded with `prior` in every cell
    pub fn with_prior(nactions: usize, prior: f64) -> Self {
        let counts = vec![vec![prior; nactions]; nactions];
        let margins = vec![prior * nactions as f64; nactions];
        let mut model = Self {
            nactions,
            tmatrix: vec![vec![0.0; nactions]; nactions],
            counts,
            margins,
        };
        model.recompute();
        model
    }

    /// Model from explicit counts and margins
    pub fn from_parts(counts: Vec<Vec<f64>>, margins: Vec<f64>) -> Result<Self> {
        let nactions = margins.len();
        if counts.len() != nactions {
            return Err(PredictError::DimensionMismatch {
                expected: nactions,
                actual: counts.len(),
            });
        }
        if let Some(row) = counts.iter().find(|row| row.len() != nactions) {
            return Err(PredictError::DimensionMismatch {
                expected: nactions,
                actual: row.len(),
            });
        }
        let mut model = Self {
            nactions,
            tmatrix: vec![vec![0.0; nactions]; nactions],
            counts,
            margins,
        };
        model.recompute();
        Ok(model)
    }

    /// Size of the action alphabet
    pub fn nactions(&self) -> usize {
        self.nactions
    }

    pub fn counts(&self) -> &[Vec<f64>] {
        &self.counts
    }

    pub fn margins(&self) -> &[f64] {
        &self.margins
    }

    /// Record a transition from `prev` to `action`
    pub fn updatestate(&mut self, action: usize, prev: usize) -> Result<()> {
        for a in [action, prev] {
            if a >= self.nactions {
                return Err(PredictError::ActionOutOfRange {
                    action: a,
                    nactions: self.nactions,
                });
            }
        }
        self.counts[prev][action] += 1.0;
        self.margins[action] += 1.0;
        self.recompute();
        Ok(())
    }

    /// Current transition matrix
    pub fn distribution(&self) -> &[Vec<f64>] {
        &self.tmatrix
    }

    fn recompute(&mut self) {
        for (i, row) in self.tmatrix.iter_mut().enumerate() {
            for (j, cell) in row.iter_mut().enumerate() {
                *cell = if self.margins[j] > 0.0 {
                    self.counts[i][j] / self.margins[j]
                } else {
                    0.0
                };
            }
        }
    }
}

/// Discrete action predictor
#[derive(Debug)]
pub struct MarkovPredictor {
    model: Markov,
    prev: Option<usize>,
    interval: Duration,
    dirty: bool,
}

impl MarkovPredictor {
    /// Uniform model over `nactions` with a unit prior
    pub fn new(nactions: usize, config: &PredictorConfig) -> Self {
        Self::from_model(Markov::with_prior(nactions, 1.0), config)
    }

    /// Wrap an existing model
    pub fn from_model(model: Markov, config: &PredictorConfig) -> Self {
        Self {
            model,
            prev: None,
            interval: Duration::from_millis(config.min_interval_ms),
            dirty: false,
        }
    }

    pub fn markov(&self) -> &Markov {
        &self.model
    }

    /// Last observed action
    pub fn last_action(&self) -> Option<usize> {
        self.prev
    }
}

impl Predictor for MarkovPredictor {
    fn model(&self) -> DistModel {
        DistModel::Dictionary
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn observe(&mut self, input: Input) {
        let Input::Action(action) = input else {
            return;
        };
        if action >= self.model.nactions() {
            debug!(action, nactions = self.model.nactions(), "Ignoring unknown action");
            return;
        }
        if let Some(prev) = self.prev {
            if self.model.updatestate(action, prev).is_ok() {
                self.dirty = true;
            }
        }
        self.prev = Some(action);
    }

    fn update_state(&mut self) -> Result<bool> {
        Ok(std::mem::take(&mut self.dirty))
    }

    fn serialize(&mut self) -> Option<Prediction> {
        Some(Prediction {
            model: DistModel::Dictionary,
            data: PredictionData {
                layout: None,
                dist: Distribution::TransitionMatrix(self.model.distribution().to_vec()),
                state: None,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(model: &Markov, j: usize) -> Vec<f64> {
        model.distribution().iter().map(|row| row[j]).collect()
    }

    #[test]
    fn test_uniform_prior() {
        let model = Markov::with_prior(2, 1.0);
        assert_eq!(model.distribution(), &[vec![0.5, 0.5], vec![0.5, 0.5]]);
        assert_eq!(model.margins(), &[2.0, 2.0]);
    }

    #[test]
    fn test_update_normalizes_destination_column() {
        let mut model =
            Markov::from_parts(vec![vec![1.0, 1.0], vec![1.0, 1.0]], vec![2.0, 2.0]).unwrap();
        model.updatestate(0, 1).unwrap();

        assert_eq!(model.counts()[1][0], 2.0);
        assert_eq!(model.margins(), &[3.0, 2.0]);
        let col = column(&model, 0);
        assert!((col[0] - 1.0 / 3.0).abs() < 1e-12);
        assert!((col[1] - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(column(&model, 1), vec![0.5, 0.5]);
    }

    #[test]
    fn test_out_of_range_action() {
        let mut model = Markov::with_prior(3, 0.1);
        assert!(matches!(
            model.updatestate(3, 0),
            Err(PredictError::ActionOutOfRange { action: 3, nactions: 3 })
        ));
        assert!(model.updatestate(0, 7).is_err());
    }

    #[test]
    fn test_ragged_counts_rejected() {
        let err = Markov::from_parts(vec![vec![1.0], vec![1.0, 1.0]], vec![1.0, 1.0]);
        assert!(matches!(err, Err(PredictError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_predictor_tracks_previous_action() {
        let mut predictor = MarkovPredictor::new(2, &PredictorConfig::default());
        predictor.observe(Input::Action(1));
        assert!(!predictor.update_state().unwrap());

        predictor.observe(Input::Action(0));
        assert!(predictor.update_state().unwrap());
        assert!(!predictor.update_state().unwrap());
        assert_eq!(predictor.markov().counts()[1][0], 2.0);
        assert_eq!(predictor.last_action(), Some(0));
    }

    #[test]
    fn test_predictor_serializes_matrix() {
        let mut predictor = MarkovPredictor::new(2, &PredictorConfig::default());
        predictor.observe(Input::Pointer {
            x: 1.0,
            y: 1.0,
            action: khameleon_core::Action::Move,
        });
        let json = predictor.serialize().unwrap().to_json().unwrap();
        assert_eq!(json["model"], "DM");
        assert_eq!(json["data"]["dist"], serde_json::json!([[0.5, 0.5], [0.5, 0.5]]));
    }
}

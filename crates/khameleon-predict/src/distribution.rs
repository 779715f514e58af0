//! Serialized distributions

use khameleon_core::{DistModel, Layout};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::{GaussianParams, PointModel, Result};

/// Distribution body; the variant is implied by the model tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Distribution {
    /// Gaussians per offset plus point confidence
    LinearGaussianPoint {
        g: BTreeMap<u64, GaussianParams>,
        p: PointModel,
    },
    /// Gaussians per offset
    Gaussian(BTreeMap<u64, GaussianParams>),
    /// Row-major action transition matrix
    TransitionMatrix(Vec<Vec<f64>>),
}

/// Payload accompanying the model tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionData {
    /// Layout, sent once after it changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<Layout>,
    pub dist: Distribution,
    /// Opaque application state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
}

/// A tagged distribution ready for the control channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub model: DistModel,
    pub data: PredictionData,
}

impl Prediction {
    /// JSON document posted to the server
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_matrix_document() {
        let prediction = Prediction {
            model: DistModel::Dictionary,
            data: PredictionData {
                layout: None,
                dist: Distribution::TransitionMatrix(vec![vec![0.5, 0.5], vec![0.5, 0.5]]),
                state: None,
            },
        };
        assert_eq!(
            prediction.to_json().unwrap(),
            json!({"model": "DM", "data": {"dist": [[0.5, 0.5], [0.5, 0.5]]}})
        );
    }

    #[test]
    fn test_gaussian_document_keys_are_offsets() {
        let mut g = BTreeMap::new();
        g.insert(
            50,
            GaussianParams { xmu: 1.0, xsigma: 2.0, ymu: 3.0, ysigma: 4.0 },
        );
        let prediction = Prediction {
            model: DistModel::Gaussian,
            data: PredictionData {
                layout: Some(Layout::new()),
                dist: Distribution::Gaussian(g),
                state: Some(json!("s")),
            },
        };
        let json = prediction.to_json().unwrap();
        assert_eq!(json["model"], "GM");
        assert_eq!(json["data"]["dist"]["50"]["ysigma"], 4.0);
        assert_eq!(json["data"]["layout"], json!({}));
        assert_eq!(json["data"]["state"], "s");
    }
}

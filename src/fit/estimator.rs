//! Point estimators that map a normalized waveform directly to PSP parameters.
//!
//! A regressor is trained offline on synthetic examples; here it is only
//! evaluated. There is no iterative convergence on this path.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Regression surface from a normalized waveform to `[yoffset, amp, rise_time, decay_tau]`
/// in normalized units.
pub trait WaveformRegressor: Send + Sync + std::fmt::Debug {
    /// Number of samples the regressor expects.
    fn input_len(&self) -> usize;

    /// Predict normalized parameters for one waveform of length `input_len()`.
    fn predict(&self, normalized: &[f64]) -> [f64; 4];
}

/// Activation applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    /// `max(0, x)`
    Relu,
    /// Identity
    Linear,
}

/// Fully connected layer: `out = act(W · in + b)`, `W` stored row-major
/// with one row per output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weight rows, one per output unit.
    pub weights: Vec<Vec<f64>>,
    /// Bias per output unit.
    pub bias: Vec<f64>,
    /// Activation function.
    pub activation: Activation,
}

impl DenseLayer {
    fn forward(&self, input: &[f64]) -> Vec<f64> {
        self.weights
            .iter()
            .zip(&self.bias)
            .map(|(row, b)| {
                let z = row.iter().zip(input).map(|(w, x)| w * x).sum::<f64>() + b;
                match self.activation {
                    Activation::Relu => z.max(0.0),
                    Activation::Linear => z,
                }
            })
            .collect()
    }
}

/// Feed-forward network of dense layers ending in four outputs.
///
/// Deserialization goes through [`DenseRegressor::new`], so a loaded model
/// always has consistent shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawRegressor")]
pub struct DenseRegressor {
    layers: Vec<DenseLayer>,
}

/// Unchecked wire form of [`DenseRegressor`].
#[derive(Deserialize)]
struct RawRegressor {
    layers: Vec<DenseLayer>,
}

impl TryFrom<RawRegressor> for DenseRegressor {
    type Error = Error;

    fn try_from(raw: RawRegressor) -> Result<Self> {
        Self::new(raw.layers)
    }
}

impl DenseRegressor {
    /// Build a regressor, checking that layer shapes chain and end in 4 outputs.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if there are no layers, a layer has
    /// ragged weights, consecutive layers disagree on width, or the final
    /// layer does not produce exactly 4 outputs.
    pub fn new(layers: Vec<DenseLayer>) -> Result<Self> {
        let Some(first) = layers.first() else {
            return Err(Error::InvalidInput("regressor has no layers".to_string()));
        };
        let mut width = first.weights.first().map_or(0, Vec::len);
        if width == 0 {
            return Err(Error::InvalidInput("first layer has no inputs".to_string()));
        }
        for (i, layer) in layers.iter().enumerate() {
            if layer.weights.len() != layer.bias.len() {
                return Err(Error::InvalidInput(format!(
                    "layer {i}: {} weight rows but {} biases",
                    layer.weights.len(),
                    layer.bias.len()
                )));
            }
            if layer.weights.iter().any(|row| row.len() != width) {
                return Err(Error::InvalidInput(format!(
                    "layer {i}: expected {width} inputs per row"
                )));
            }
            width = layer.weights.len();
        }
        if width != 4 {
            return Err(Error::InvalidInput(format!(
                "final layer must produce 4 outputs, got {width}"
            )));
        }
        Ok(Self { layers })
    }

    /// Load layer weights from a JSON file (`{"layers": [...]}`).
    ///
    /// # Errors
    ///
    /// Returns an IO/JSON error if the file cannot be read, or
    /// `Error::InvalidInput` if the shapes are inconsistent.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl WaveformRegressor for DenseRegressor {
    fn input_len(&self) -> usize {
        self.layers[0].weights[0].len()
    }

    fn predict(&self, normalized: &[f64]) -> [f64; 4] {
        let out = self
            .layers
            .iter()
            .fold(normalized.to_vec(), |acc, layer| layer.forward(&acc));
        [out[0], out[1], out[2], out[3]]
    }
}

/// Normalize a waveform: subtract the final value and divide by the
/// population standard deviation. Returns `(normalized, offset, scale)`.
#[must_use]
pub fn normalize(values: &[f64]) -> (Vec<f64>, f64, f64) {
    let offset = values[values.len() - 1];
    #[allow(clippy::cast_precision_loss)]
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    let scale = if var > 0.0 { var.sqrt() } else { 1.0 };
    let normalized = values.iter().map(|v| (v - offset) / scale).collect();
    (normalized, offset, scale)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_tail(n: usize) -> DenseRegressor {
        // Output k copies input k
        let weights = (0..4)
            .map(|k| (0..n).map(|j| if j == k { 1.0 } else { 0.0 }).collect())
            .collect();
        DenseRegressor::new(vec![DenseLayer {
            weights,
            bias: vec![0.0; 4],
            activation: Activation::Linear,
        }])
        .unwrap()
    }

    #[test]
    fn test_dense_forward() {
        let reg = identity_tail(6);
        assert_eq!(reg.input_len(), 6);
        assert_eq!(reg.predict(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]), [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_relu_clamps_negative() {
        let layer = DenseLayer {
            weights: vec![vec![1.0], vec![-1.0], vec![2.0], vec![0.0]],
            bias: vec![0.0; 4],
            activation: Activation::Relu,
        };
        let reg = DenseRegressor::new(vec![layer]).unwrap();
        assert_eq!(reg.predict(&[3.0]), [3.0, 0.0, 6.0, 0.0]);
    }

    #[test]
    fn test_rejects_wrong_output_width() {
        let layer = DenseLayer {
            weights: vec![vec![1.0, 1.0]; 3],
            bias: vec![0.0; 3],
            activation: Activation::Linear,
        };
        assert!(DenseRegressor::new(vec![layer]).is_err());
        assert!(DenseRegressor::new(vec![]).is_err());
    }

    #[test]
    fn test_normalize_constant_signal() {
        let (norm, offset, scale) = normalize(&[2.0, 2.0, 2.0]);
        assert!((offset - 2.0).abs() < f64::EPSILON);
        assert!((scale - 1.0).abs() < f64::EPSILON);
        assert!(norm.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_json_layers_roundtrip() {
        let reg = identity_tail(4);
        let json = serde_json::to_string(&reg).unwrap();
        assert!(json.contains("\"linear\""));
        let back: DenseRegressor = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reg);
    }

    #[test]
    fn test_deserialize_validates_shapes() {
        let empty = serde_json::from_str::<DenseRegressor>(r#"{"layers": []}"#);
        assert!(empty.unwrap_err().to_string().contains("no layers"));

        let narrow = r#"{"layers": [{"weights": [[1.0], [1.0], [1.0]], "bias": [0.0, 0.0, 0.0], "activation": "linear"}]}"#;
        let err = serde_json::from_str::<DenseRegressor>(narrow).unwrap_err();
        assert!(err.to_string().contains("4 outputs"));

        let ragged = r#"{"layers": [{"weights": [[1.0], [1.0, 2.0], [1.0], [1.0]], "bias": [0.0, 0.0, 0.0, 0.0], "activation": "relu"}]}"#;
        assert!(serde_json::from_str::<DenseRegressor>(ragged).is_err());
    }

    #[test]
    fn test_json_file_with_bad_shape_is_invalid_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, r#"{"layers": []}"#).unwrap();
        assert!(DenseRegressor::from_json_file(&path).is_err());
    }
}

//! Stacked-LSTM failure scorer.
//!
//! Mirrors the recurrent network used at training time: `num_layers` LSTM
//! layers (gate order input, forget, cell, output), zero initial state, a
//! linear head on the last time step and a sigmoid. Weights come from the
//! exported state dict.

use crate::error::InferenceError;
use crate::model::{check_width, sigmoid, SequenceModel};
use serde::{Deserialize, Serialize};

/// Weights of one LSTM layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LstmLayer {
    pub weight_ih: Vec<Vec<f64>>, // [4 * hidden][input]
    pub weight_hh: Vec<Vec<f64>>, // [4 * hidden][hidden]
    pub bias_ih: Vec<f64>,        // [4 * hidden]
    pub bias_hh: Vec<f64>,        // [4 * hidden]
}

impl LstmLayer {
    fn zeros(input: usize, hidden: usize) -> Self {
        Self {
            weight_ih: vec![vec![0.0; input]; 4 * hidden],
            weight_hh: vec![vec![0.0; hidden]; 4 * hidden],
            bias_ih: vec![0.0; 4 * hidden],
            bias_hh: vec![0.0; 4 * hidden],
        }
    }

    fn validate(&self, input: usize, hidden: usize) -> Result<(), String> {
        let gates = 4 * hidden;
        let shape_ok = |m: &Vec<Vec<f64>>, cols: usize| m.len() == gates && m.iter().all(|r| r.len() == cols);
        if !shape_ok(&self.weight_ih, input) {
            return Err(format!("weight_ih must be {gates}x{input}"));
        }
        if !shape_ok(&self.weight_hh, hidden) {
            return Err(format!("weight_hh must be {gates}x{hidden}"));
        }
        if self.bias_ih.len() != gates || self.bias_hh.len() != gates {
            return Err(format!("biases must have {gates} entries"));
        }
        Ok(())
    }

    /// Run the layer over the whole sequence, returning every hidden state.
    fn forward(&self, inputs: &[Vec<f64>], hidden: usize) -> Vec<Vec<f64>> {
        let mut h = vec![0.0; hidden];
        let mut c = vec![0.0; hidden];
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let gates: Vec<f64> = (0..4 * hidden)
                .map(|g| {
                    let wx: f64 = self.weight_ih[g].iter().zip(x).map(|(w, v)| w * v).sum();
                    let wh: f64 = self.weight_hh[g].iter().zip(&h).map(|(w, v)| w * v).sum();
                    wx + wh + self.bias_ih[g] + self.bias_hh[g]
                })
                .collect();

            for j in 0..hidden {
                let i_gate = sigmoid(gates[j]);
                let f_gate = sigmoid(gates[hidden + j]);
                let g_gate = gates[2 * hidden + j].tanh();
                let o_gate = sigmoid(gates[3 * hidden + j]);
                c[j] = f_gate * c[j] + i_gate * g_gate;
                h[j] = o_gate * c[j].tanh();
            }
            outputs.push(h.clone());
        }
        outputs
    }
}

fn loaded() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictiveRnn {
    pub input_size: usize,
    pub hidden_size: usize,
    pub layers: Vec<LstmLayer>,
    pub fc_weight: Vec<f64>, // [hidden]
    pub fc_bias: f64,
    #[serde(skip_serializing, default = "loaded")]
    trained: bool,
}

impl PredictiveRnn {
    /// A network with all-zero parameters. Every gate sits at its midpoint,
    /// the hidden state stays zero and the output is exactly 0.5: an
    /// uninformative answer rather than an error.
    pub fn untrained(input_size: usize, hidden_size: usize, num_layers: usize) -> Self {
        let layers = (0..num_layers.max(1))
            .map(|l| LstmLayer::zeros(if l == 0 { input_size } else { hidden_size }, hidden_size))
            .collect();
        Self {
            input_size,
            hidden_size,
            layers,
            fc_weight: vec![0.0; hidden_size],
            fc_bias: 0.0,
            trained: false,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.input_size == 0 || self.hidden_size == 0 {
            return Err("input_size and hidden_size must be positive".into());
        }
        if self.layers.is_empty() {
            return Err("network has no LSTM layers".into());
        }
        for (l, layer) in self.layers.iter().enumerate() {
            let input = if l == 0 { self.input_size } else { self.hidden_size };
            layer
                .validate(input, self.hidden_size)
                .map_err(|e| format!("layer {l}: {e}"))?;
        }
        if self.fc_weight.len() != self.hidden_size {
            return Err(format!("fc_weight must have {} entries", self.hidden_size));
        }
        Ok(())
    }
}

impl SequenceModel for PredictiveRnn {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn is_trained(&self) -> bool {
        self.trained
    }

    fn infer(&self, window: &[Vec<f64>]) -> Result<f64, InferenceError> {
        for row in window {
            check_width("sequence model", self.input_size, row.len())?;
        }
        let mut sequence = window.to_vec();
        for layer in &self.layers {
            sequence = layer.forward(&sequence, self.hidden_size);
        }
        let last = sequence.last().cloned().unwrap_or_else(|| vec![0.0; self.hidden_size]);
        let logit: f64 = self
            .fc_weight
            .iter()
            .zip(&last)
            .map(|(w, h)| w * h)
            .sum::<f64>()
            + self.fc_bias;
        Ok(sigmoid(logit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(rows: usize, width: usize, value: f64) -> Vec<Vec<f64>> {
        vec![vec![value; width]; rows]
    }

    #[test]
    fn test_untrained_returns_half() {
        let model = PredictiveRnn::untrained(5, 8, 2);
        assert!(!model.is_trained());
        assert!(model.validate().is_ok());
        let p = model.infer(&window(10, 5, 3.0)).unwrap();
        assert_eq!(p, 0.5);
    }

    #[test]
    fn test_deserialized_model_is_trained() {
        let mut model = PredictiveRnn::untrained(1, 1, 1);
        model.fc_bias = 1.0;
        let json = serde_json::to_string(&model).unwrap();
        let loaded: PredictiveRnn = serde_json::from_str(&json).unwrap();
        assert!(loaded.is_trained());
        assert!((loaded.infer(&window(3, 1, 0.0)).unwrap() - sigmoid(1.0)).abs() < 1e-12);
    }

    #[test]
    fn test_single_unit_recurrence() {
        // One hidden unit whose cell integrates the input through the
        // input gate; a positive head weight makes larger inputs score higher.
        let mut model = PredictiveRnn::untrained(1, 1, 1);
        model.layers[0].weight_ih = vec![vec![0.0], vec![0.0], vec![1.0], vec![0.0]];
        model.fc_weight = vec![4.0];
        model.trained = true;
        assert!(model.validate().is_ok());

        let low = model.infer(&window(10, 1, 0.1)).unwrap();
        let high = model.infer(&window(10, 1, 2.0)).unwrap();
        assert!(high > low, "high={high} low={low}");
        assert!(low > 0.5);
    }

    #[test]
    fn test_width_mismatch() {
        let model = PredictiveRnn::untrained(3, 2, 1);
        assert!(model.infer(&window(4, 2, 0.0)).is_err());
    }

    #[test]
    fn test_validate_shapes() {
        let mut model = PredictiveRnn::untrained(3, 2, 2);
        model.layers[1].weight_ih = vec![vec![0.0; 3]; 8];
        assert!(model.validate().is_err());
    }
}

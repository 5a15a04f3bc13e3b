//! Softmax regression used by `earlybird train`.

use earlybird_core::{Classifier, Device, Labels, Mode, Prediction, Snapshot, TrainError};
use serde::{Deserialize, Serialize};

const EPS: f64 = 1e-12;

/// Persisted form of the model, stored as the checkpoint snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearState {
    pub classes: usize,
    pub features: usize,
    /// Row-major `classes x features`.
    pub weights: Vec<f64>,
    pub bias: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct SoftmaxClassifier {
    name: String,
    device: Device,
    mode: Mode,
    learning_rate: f64,
    state: LinearState,
}

impl SoftmaxClassifier {
    pub fn new(
        name: &str,
        classes: usize,
        features: usize,
        learning_rate: f64,
        device: Device,
    ) -> Self {
        Self {
            name: name.to_string(),
            device,
            mode: Mode::Train,
            learning_rate,
            state: LinearState {
                classes,
                features,
                weights: vec![0.0; classes * features],
                bias: vec![0.0; classes],
            },
        }
    }

    /// Restore a model from a checkpoint snapshot. The weights and bias must
    /// match the declared class and feature counts.
    pub fn from_state(
        name: &str,
        state: LinearState,
        learning_rate: f64,
        device: Device,
    ) -> Result<Self, TrainError> {
        let expected = state.classes.checked_mul(state.features);
        if state.classes == 0 || expected != Some(state.weights.len()) {
            return Err(TrainError::model(format!(
                "checkpoint has {} weights for {} classes x {} features",
                state.weights.len(),
                state.classes,
                state.features
            )));
        }
        if state.bias.len() != state.classes {
            return Err(TrainError::model(format!(
                "checkpoint has {} biases for {} classes",
                state.bias.len(),
                state.classes
            )));
        }
        Ok(Self {
            name: name.to_string(),
            device,
            mode: Mode::Eval,
            learning_rate,
            state,
        })
    }

    fn check_row(&self, row: &[f64]) -> Result<(), TrainError> {
        if row.len() != self.state.features {
            return Err(TrainError::model(format!(
                "expected {} features, got {}",
                self.state.features,
                row.len()
            )));
        }
        Ok(())
    }

    fn probabilities(&self, row: &[f64]) -> Vec<f64> {
        let features = self.state.features;
        let logits: Vec<f64> = (0..self.state.classes)
            .map(|c| {
                let w = &self.state.weights[c * features..(c + 1) * features];
                self.state.bias[c] + w.iter().zip(row).map(|(w, x)| w * x).sum::<f64>()
            })
            .collect();
        softmax(&logits)
    }
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}

fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |(best_i, best_v), (i, &v)| {
            if v > best_v { (i, v) } else { (best_i, best_v) }
        })
        .0
}

fn cross_entropy(probs: &[Vec<f64>], targets: &[i64]) -> Result<f64, TrainError> {
    if probs.is_empty() {
        return Err(TrainError::model("cross entropy over an empty batch"));
    }
    if probs.len() != targets.len() {
        return Err(TrainError::model(format!(
            "{} outputs for {} targets",
            probs.len(),
            targets.len()
        )));
    }
    let mut total = 0.0;
    for (p, &t) in probs.iter().zip(targets) {
        let p_t = usize::try_from(t)
            .ok()
            .and_then(|t| p.get(t))
            .ok_or_else(|| TrainError::model(format!("label {t} out of range")))?;
        total -= (p_t + EPS).ln();
    }
    Ok(total / probs.len() as f64)
}

impl Classifier for SoftmaxClassifier {
    type Input = Vec<Vec<f64>>;
    /// Class probabilities per row.
    type Output = Vec<Vec<f64>>;

    fn name(&self) -> &str {
        &self.name
    }

    fn device(&self) -> Device {
        self.device
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn optimize_parameters(
        &mut self,
        inputs: &Vec<Vec<f64>>,
        targets: &[u32],
    ) -> Result<f64, TrainError> {
        if self.mode != Mode::Train {
            return Err(TrainError::model("optimize_parameters called in eval mode"));
        }
        if inputs.len() != targets.len() {
            return Err(TrainError::model(format!(
                "{} rows for {} targets",
                inputs.len(),
                targets.len()
            )));
        }
        for row in inputs {
            self.check_row(row)?;
        }

        let probs: Vec<Vec<f64>> = inputs.iter().map(|row| self.probabilities(row)).collect();
        let labels: Vec<i64> = targets.iter().map(|&t| i64::from(t)).collect();
        let loss = cross_entropy(&probs, &labels)?;

        let n = inputs.len() as f64;
        let features = self.state.features;
        let mut grad_w = vec![0.0; self.state.weights.len()];
        let mut grad_b = vec![0.0; self.state.classes];
        for ((row, p), &t) in inputs.iter().zip(&probs).zip(targets) {
            for (c, &p_c) in p.iter().enumerate() {
                let delta = p_c - if c == t as usize { 1.0 } else { 0.0 };
                grad_b[c] += delta / n;
                for (j, x) in row.iter().enumerate() {
                    grad_w[c * features + j] += delta * x / n;
                }
            }
        }

        let lr = self.learning_rate;
        for (w, g) in self.state.weights.iter_mut().zip(&grad_w) {
            *w -= lr * g;
        }
        for (b, g) in self.state.bias.iter_mut().zip(&grad_b) {
            *b -= lr * g;
        }
        Ok(loss)
    }

    fn predict(&self, inputs: &Vec<Vec<f64>>) -> Result<Prediction<Vec<Vec<f64>>>, TrainError> {
        for row in inputs {
            self.check_row(row)?;
        }
        let output: Vec<Vec<f64>> = inputs.iter().map(|row| self.probabilities(row)).collect();
        let labels = output.iter().map(|p| argmax(p) as i64).collect();
        Ok(Prediction { output, labels })
    }

    fn criterion(&self, output: &Vec<Vec<f64>>, targets: &Labels) -> Result<f64, TrainError> {
        if targets.device() != self.device {
            return Err(TrainError::model(format!(
                "labels on {} but model on {}",
                targets.device(),
                self.device
            )));
        }
        cross_entropy(output, targets.values())
    }

    fn make_state(&self) -> Result<Snapshot, TrainError> {
        Ok(Snapshot::from_bytes(serde_json::to_vec(&self.state)?))
    }
}

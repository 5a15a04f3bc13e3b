//! Model capability contract consumed by the epoch procedures.
//!
//! The orchestrator never looks inside a model: it switches modes, asks for
//! an optimization step or a prediction, scores predictions with the model's
//! own criterion, and takes opaque snapshots of its state.

use crate::error::TrainError;
use serde::{Deserialize, Serialize};

/// Where a model's tensors live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    #[default]
    Cpu,
    Accelerator,
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Accelerator => write!(f, "accelerator"),
        }
    }
}

/// Training mode switch. `Eval` disables gradient bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Eval,
}

/// Integer-encoded target labels placed on a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    device: Device,
    values: Vec<i64>,
}

impl Labels {
    /// Encode raw class indices as `i64` labels on `device`.
    pub fn encode(targets: &[u32], device: Device) -> Self {
        Self {
            device,
            values: targets.iter().map(|&t| i64::from(t)).collect(),
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Raw model output together with the discrete labels derived from it.
#[derive(Debug, Clone)]
pub struct Prediction<O> {
    pub output: O,
    pub labels: Vec<i64>,
}

/// Opaque serialized model state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot(Vec<u8>);

impl Snapshot {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capabilities a classifier exposes to the training loop.
pub trait Classifier {
    /// One batch of inputs, in whatever layout the model consumes.
    type Input;
    /// Raw forward-pass output consumed by [`Classifier::criterion`].
    type Output;

    /// Name used for metric tags and checkpoint destinations.
    fn name(&self) -> &str;

    fn device(&self) -> Device;

    fn set_mode(&mut self, mode: Mode);

    /// Run one optimization step on a batch and return its scalar loss.
    fn optimize_parameters(
        &mut self,
        inputs: &Self::Input,
        targets: &[u32],
    ) -> Result<f64, TrainError>;

    /// Forward pass without parameter updates.
    fn predict(&self, inputs: &Self::Input) -> Result<Prediction<Self::Output>, TrainError>;

    /// Scalar loss of `output` against `targets`.
    fn criterion(&self, output: &Self::Output, targets: &Labels) -> Result<f64, TrainError>;

    fn make_state(&self) -> Result<Snapshot, TrainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_labels_encode() {
        let labels = Labels::encode(&[0, 3, 7], Device::Accelerator);
        assert_eq!(labels.values(), &[0i64, 3, 7]);
        assert_eq!(labels.device(), Device::Accelerator);
        assert_eq!(labels.len(), 3);
    }

    #[test]
    fn test_device_serde() {
        let json = serde_json::to_string(&Device::Accelerator).unwrap();
        assert_eq!(json, "\"accelerator\"");
        let parsed: Device = serde_json::from_str("\"cpu\"").unwrap();
        assert_eq!(parsed, Device::Cpu);
    }

    #[test]
    fn test_snapshot_bytes() {
        let snap = Snapshot::from_bytes(vec![1, 2, 3]);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.as_bytes(), &[1, 2, 3]);
        assert_eq!(snap.into_bytes(), vec![1, 2, 3]);
    }
}

//! Validation metric aggregation and per-run training history.

use crate::error::TrainError;
use serde::{Deserialize, Serialize};

/// Loss and accuracy of one validation epoch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub mean_loss: f64,
    /// Fraction of correct predictions, in `[0, 1]`.
    pub accuracy: f64,
}

/// Fraction of positions where `predicted` matches `truth`.
pub fn accuracy(predicted: &[i64], truth: &[i64]) -> Result<f64, TrainError> {
    if predicted.len() != truth.len() {
        return Err(TrainError::model(format!(
            "{} predictions for {} labels",
            predicted.len(),
            truth.len()
        )));
    }
    if truth.is_empty() {
        return Err(TrainError::config("accuracy requested over an empty label set"));
    }
    let correct = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
    Ok(correct as f64 / truth.len() as f64)
}

/// Arithmetic mean, `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Running collections for one validation epoch.
///
/// Build a fresh accumulator before every epoch; it starts empty.
#[derive(Debug, Default)]
pub struct ValidationAccumulator {
    predicted: Vec<i64>,
    truth: Vec<i64>,
    losses: Vec<f64>,
}

impl ValidationAccumulator {
    pub fn new() -> Self {
        Self {
            predicted: Vec::new(),
            truth: Vec::new(),
            losses: Vec::new(),
        }
    }

    /// Append one batch's predictions, true labels, and loss.
    pub fn push_batch(
        &mut self,
        predicted: &[i64],
        truth: &[i64],
        loss: f64,
    ) -> Result<(), TrainError> {
        if predicted.len() != truth.len() {
            return Err(TrainError::model(format!(
                "batch produced {} predictions for {} labels",
                predicted.len(),
                truth.len()
            )));
        }
        self.predicted.extend_from_slice(predicted);
        self.truth.extend_from_slice(truth);
        self.losses.push(loss);
        Ok(())
    }

    pub fn samples(&self) -> usize {
        self.truth.len()
    }

    pub fn batches(&self) -> usize {
        self.losses.len()
    }

    /// Reduce to epoch metrics. An epoch with no samples is a configuration error.
    pub fn finish(self) -> Result<EpochMetrics, TrainError> {
        if self.truth.is_empty() {
            return Err(TrainError::config(
                "validation epoch produced no samples; check the validation data source",
            ));
        }
        let accuracy = accuracy(&self.predicted, &self.truth)?;
        let mean_loss = mean(&self.losses)
            .ok_or_else(|| TrainError::config("validation epoch produced no batches"))?;
        Ok(EpochMetrics {
            mean_loss,
            accuracy,
        })
    }
}

/// One row of the training history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    /// 1-based epoch number.
    pub epoch: u64,
    pub batches_processed: u64,
    /// Mean optimization loss; `None` when the training pass had no batches.
    pub train_loss: Option<f64>,
    pub val_loss: f64,
    pub val_accuracy: f64,
    pub is_best: bool,
}

/// Summary of a finished training run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub model_name: String,
    pub epochs_completed: u64,
    pub batches_processed: u64,
    pub epochs: Vec<EpochRecord>,
    pub best_epoch: Option<u64>,
    pub best_accuracy: Option<f64>,
    pub stopped_early: bool,
    pub total_training_time_secs: f64,
}

impl TrainingHistory {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            ..Self::default()
        }
    }

    pub fn record_epoch(&mut self, record: EpochRecord) {
        if record.is_best {
            self.best_epoch = Some(record.epoch);
            self.best_accuracy = Some(record.val_accuracy);
        }
        self.epochs.push(record);
    }

    pub fn accuracy_history(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.val_accuracy).collect()
    }

    pub fn val_loss_history(&self) -> Vec<f64> {
        self.epochs.iter().map(|e| e.val_loss).collect()
    }
}

//! Training and validation epoch procedures.

use crate::callbacks::{EarlyStopping, Objective};
use crate::data::DataSource;
use crate::error::TrainError;
use crate::metrics::{self, EpochMetrics, ValidationAccumulator};
use crate::model::{Classifier, Labels, Mode};
use crate::sink::ScalarLogger;
use crate::status::StatusLine;
use serde::{Deserialize, Serialize};

/// Progress counters. Only the epoch procedures advance them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub epochs_completed: u64,
    pub batches_processed: u64,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn training_loss_tag(model: &str) -> String {
    format!("Training_loss_{model}")
}

pub fn validation_loss_tag(model: &str) -> String {
    format!("Validation_loss_{model}")
}

pub fn validation_accuracy_tag(model: &str) -> String {
    format!("Validation_acc_{model}")
}

/// Result of one validation pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub metrics: EpochMetrics,
    pub is_best: bool,
    pub status: StatusLine,
}

/// One optimization pass over `source`.
///
/// Every batch advances `batches_processed` and emits its loss keyed by the
/// new count; `epochs_completed` advances once, after the last batch. Returns
/// the mean batch loss, or `None` for an empty pass.
pub fn run_training_epoch<M, D>(
    model: &mut M,
    source: &mut D,
    counters: &mut Counters,
    logger: &mut ScalarLogger,
) -> Result<Option<f64>, TrainError>
where
    M: Classifier,
    D: DataSource<Input = M::Input>,
{
    model.set_mode(Mode::Train);
    let tag = training_loss_tag(model.name());
    let mut losses = Vec::new();

    for batch in source.batches() {
        let batch = batch?;
        let loss = model.optimize_parameters(&batch.inputs, &batch.targets)?;
        counters.batches_processed += 1;
        logger.emit(&tag, loss, counters.batches_processed)?;
        tracing::trace!(step = counters.batches_processed, loss, "Training batch");
        losses.push(loss);
    }

    counters.epochs_completed += 1;
    let mean_loss = metrics::mean(&losses);
    if losses.is_empty() {
        tracing::warn!(
            epoch = counters.epochs_completed,
            "Training source produced no batches"
        );
    } else {
        tracing::debug!(
            epoch = counters.epochs_completed,
            batches = losses.len(),
            loss = mean_loss,
            "Training epoch finished"
        );
    }
    Ok(mean_loss)
}

/// One evaluation pass over `source`, followed by the early-stopping decision.
pub fn run_validation_epoch<M, D>(
    model: &mut M,
    source: &mut D,
    counters: &Counters,
    logger: &mut ScalarLogger,
    early_stopping: &mut EarlyStopping,
) -> Result<ValidationOutcome, TrainError>
where
    M: Classifier,
    D: DataSource<Input = M::Input>,
{
    model.set_mode(Mode::Eval);
    let mut accumulator = ValidationAccumulator::new();

    for batch in source.batches() {
        let batch = batch?;
        let labels = Labels::encode(&batch.targets, model.device());
        let prediction = model.predict(&batch.inputs)?;
        let loss = model.criterion(&prediction.output, &labels)?;
        accumulator.push_batch(&prediction.labels, labels.values(), loss)?;
    }

    let metrics = accumulator.finish()?;
    let snapshot = model.make_state()?;
    let name = model.name().to_string();
    let step = counters.batches_processed;

    logger.emit(&validation_loss_tag(&name), metrics.mean_loss, step)?;
    logger.emit(&validation_accuracy_tag(&name), metrics.accuracy, step)?;

    let is_best = early_stopping.observe(metrics.accuracy, snapshot, &name, Objective::Maximize)?;
    tracing::info!(
        model = %name,
        epoch = counters.epochs_completed,
        loss = metrics.mean_loss,
        accuracy = metrics.accuracy,
        is_best,
        "Validation finished"
    );

    Ok(ValidationOutcome {
        metrics,
        is_best,
        status: StatusLine::new(
            metrics.mean_loss,
            metrics.accuracy,
            counters.epochs_completed,
            is_best,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::MemoryCheckpointStore;
    use crate::data::{Batch, InMemorySource};
    use crate::model::{Device, Prediction, Snapshot};
    use crate::sink::MemorySink;

    /// Predicts the first feature rounded to a class; loss is the input mean.
    struct Echo {
        mode: Option<Mode>,
        steps: usize,
    }

    impl Classifier for Echo {
        type Input = Vec<f64>;
        type Output = Vec<f64>;

        fn name(&self) -> &str {
            "echo"
        }

        fn device(&self) -> Device {
            Device::Cpu
        }

        fn set_mode(&mut self, mode: Mode) {
            self.mode = Some(mode);
        }

        fn optimize_parameters(&mut self, inputs: &Vec<f64>, _: &[u32]) -> Result<f64, TrainError> {
            self.steps += 1;
            Ok(inputs.iter().sum::<f64>() / inputs.len() as f64)
        }

        fn predict(&self, inputs: &Vec<f64>) -> Result<Prediction<Vec<f64>>, TrainError> {
            Ok(Prediction {
                output: inputs.clone(),
                labels: inputs.iter().map(|x| x.round() as i64).collect(),
            })
        }

        fn criterion(&self, output: &Vec<f64>, _: &Labels) -> Result<f64, TrainError> {
            Ok(output.iter().sum::<f64>() / output.len() as f64)
        }

        fn make_state(&self) -> Result<Snapshot, TrainError> {
            Ok(Snapshot::from_bytes(vec![self.steps as u8]))
        }
    }

    fn echo() -> Echo {
        Echo {
            mode: None,
            steps: 0,
        }
    }

    #[test]
    fn test_training_epoch_counts_and_tags() {
        let mut model = echo();
        let mut source = InMemorySource::new(vec![
            Batch::new(vec![1.0, 3.0], vec![0, 1]),
            Batch::new(vec![4.0], vec![1]),
        ]);
        let mut counters = Counters::new();
        let sink = MemorySink::new();
        let mut logger = ScalarLogger::new(Box::new(sink.clone()));

        let loss = run_training_epoch(&mut model, &mut source, &mut counters, &mut logger).unwrap();

        assert_eq!(model.mode, Some(Mode::Train));
        assert_eq!(counters, Counters { epochs_completed: 1, batches_processed: 2 });
        assert_eq!(loss, Some(3.0));
        assert_eq!(sink.series("Training_loss_echo"), vec![(1, 2.0), (2, 4.0)]);
    }

    #[test]
    fn test_empty_training_epoch_still_counts() {
        let mut counters = Counters::new();
        let loss = run_training_epoch(
            &mut echo(),
            &mut InMemorySource::<Vec<f64>>::new(vec![]),
            &mut counters,
            &mut ScalarLogger::disabled(),
        )
        .unwrap();
        assert_eq!(loss, None);
        assert_eq!(counters.epochs_completed, 1);
        assert_eq!(counters.batches_processed, 0);
    }

    #[test]
    fn test_validation_epoch_reports_and_checkpoints() {
        let mut model = echo();
        let mut source = InMemorySource::new(vec![
            Batch::new(vec![1.0, 0.0], vec![1, 1]),
            Batch::new(vec![2.0, 2.0], vec![2, 2]),
        ]);
        let counters = Counters {
            epochs_completed: 4,
            batches_processed: 12,
        };
        let sink = MemorySink::new();
        let mut logger = ScalarLogger::new(Box::new(sink.clone()));
        let store = MemoryCheckpointStore::new();
        let mut es = EarlyStopping::for_accuracy(2, Box::new(store.clone()));
        es.prepare("echo").unwrap();

        let outcome =
            run_validation_epoch(&mut model, &mut source, &counters, &mut logger, &mut es).unwrap();

        assert_eq!(model.mode, Some(Mode::Eval));
        assert_eq!(outcome.metrics.accuracy, 0.75);
        assert_eq!(outcome.metrics.mean_loss, 1.25);
        assert!(outcome.is_best);
        assert!(outcome.status.render().starts_with("VALIDATION RESULTS, EPOCH 4"));
        assert_eq!(sink.series("Validation_acc_echo"), vec![(12, 0.75)]);
        assert_eq!(sink.series("Validation_loss_echo"), vec![(12, 1.25)]);
        assert_eq!(store.save_count("echo"), 1);
    }

    #[test]
    fn test_empty_validation_is_config_error() {
        let mut es = EarlyStopping::for_accuracy(2, Box::new(MemoryCheckpointStore::new()));
        es.prepare("echo").unwrap();
        let err = run_validation_epoch(
            &mut echo(),
            &mut InMemorySource::<Vec<f64>>::new(vec![]),
            &Counters::new(),
            &mut ScalarLogger::disabled(),
            &mut es,
        )
        .unwrap_err();
        assert!(err.is_config());
        assert_eq!(es.patience_counter(), 0);
    }
}

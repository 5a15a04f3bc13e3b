//! Training orchestrator — alternates training and validation epochs until
//! the epoch budget runs out or early stopping fires.

use crate::callbacks::EarlyStopping;
use crate::data::DataSource;
use crate::epoch::{self, Counters};
use crate::error::TrainError;
use crate::metrics::{EpochRecord, TrainingHistory};
use crate::model::Classifier;
use crate::sink::ScalarLogger;
use std::io::Write;
use std::time::Instant;

/// Knobs the orchestrator itself needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrainerOptions {
    /// Maximum number of training epochs.
    pub epochs: u64,
}

pub struct Trainer<M, T, V> {
    model: M,
    train_source: T,
    val_source: V,
    early_stopping: EarlyStopping,
    logger: ScalarLogger,
    counters: Counters,
    options: TrainerOptions,
    console: Box<dyn Write>,
}

impl<M, T, V> Trainer<M, T, V>
where
    M: Classifier,
    T: DataSource<Input = M::Input>,
    V: DataSource<Input = M::Input>,
{
    pub fn new(
        model: M,
        train_source: T,
        val_source: V,
        early_stopping: EarlyStopping,
        logger: ScalarLogger,
        options: TrainerOptions,
    ) -> Self {
        Self {
            model,
            train_source,
            val_source,
            early_stopping,
            logger,
            counters: Counters::new(),
            options,
            console: Box::new(std::io::stdout()),
        }
    }

    /// Send status lines somewhere other than stdout.
    pub fn with_console(mut self, console: Box<dyn Write>) -> Self {
        self.console = console;
        self
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn early_stopping(&self) -> &EarlyStopping {
        &self.early_stopping
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Run to completion. The metrics sink is closed on every exit path.
    pub fn run(mut self) -> Result<TrainingHistory, TrainError> {
        let started = Instant::now();
        let mut history = TrainingHistory::new(self.model.name());

        let result = self.run_epochs(&mut history);
        let closed = self.logger.close();

        history.epochs_completed = self.counters.epochs_completed;
        history.batches_processed = self.counters.batches_processed;
        history.total_training_time_secs = started.elapsed().as_secs_f64();

        if let Err(e) = &result {
            tracing::error!(
                model = %history.model_name,
                epoch = self.counters.epochs_completed,
                error = %e,
                "Training aborted"
            );
        }
        result?;
        closed?;

        tracing::info!(
            model = %history.model_name,
            epochs = history.epochs_completed,
            batches = history.batches_processed,
            best_epoch = history.best_epoch,
            stopped_early = history.stopped_early,
            "Training finished"
        );
        Ok(history)
    }

    fn run_epochs(&mut self, history: &mut TrainingHistory) -> Result<(), TrainError> {
        self.early_stopping.prepare(self.model.name())?;
        tracing::info!(
            model = self.model.name(),
            device = %self.model.device(),
            epochs = self.options.epochs,
            "Begin training"
        );

        while self.counters.epochs_completed < self.options.epochs {
            let train_loss = epoch::run_training_epoch(
                &mut self.model,
                &mut self.train_source,
                &mut self.counters,
                &mut self.logger,
            )?;
            let outcome = epoch::run_validation_epoch(
                &mut self.model,
                &mut self.val_source,
                &self.counters,
                &mut self.logger,
                &mut self.early_stopping,
            )?;

            writeln!(self.console, "{}", outcome.status.render())?;

            history.record_epoch(EpochRecord {
                epoch: self.counters.epochs_completed,
                batches_processed: self.counters.batches_processed,
                train_loss,
                val_loss: outcome.metrics.mean_loss,
                val_accuracy: outcome.metrics.accuracy,
                is_best: outcome.is_best,
            });

            if self.early_stopping.should_stop() {
                // A stop on the last budgeted epoch is not an early one.
                if self.counters.epochs_completed < self.options.epochs {
                    history.stopped_early = true;
                    tracing::info!(
                        epoch = self.counters.epochs_completed,
                        budget = self.options.epochs,
                        "Stopping before epoch budget"
                    );
                }
                break;
            }
        }
        Ok(())
    }
}

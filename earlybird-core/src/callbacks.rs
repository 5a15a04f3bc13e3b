//! Early stopping with best-checkpoint selection.

use crate::checkpoint::{CheckpointRecord, CheckpointStore};
use crate::error::TrainError;
use crate::model::Snapshot;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Direction in which a metric improves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Objective {
    Minimize,
    Maximize,
}

impl Objective {
    /// The value every real metric beats.
    pub fn worst(self) -> f64 {
        match self {
            Objective::Minimize => f64::INFINITY,
            Objective::Maximize => f64::NEG_INFINITY,
        }
    }

    /// Strict improvement. NaN never improves.
    pub fn is_improvement(self, candidate: f64, best: f64) -> bool {
        match self {
            Objective::Minimize => candidate < best,
            Objective::Maximize => candidate > best,
        }
    }
}

/// Where the policy stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Improving,
    Plateauing,
    /// Terminal.
    Stopped,
}

/// Serializable view of the policy, without the snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingState {
    pub objective: Objective,
    pub patience: usize,
    /// `None` until some metric has beaten the seed value.
    pub best_value: Option<f64>,
    pub patience_counter: usize,
    pub observations: u64,
    pub phase: Phase,
    pub stop: bool,
}

/// Stops training after `patience` consecutive non-improving observations and
/// persists every new best snapshot through a [`CheckpointStore`].
pub struct EarlyStopping {
    patience: usize,
    objective: Objective,
    best_value: f64,
    counter: usize,
    observations: u64,
    best_snapshot: Option<Snapshot>,
    phase: Phase,
    stop: bool,
    prepared: HashSet<String>,
    store: Box<dyn CheckpointStore>,
}

impl std::fmt::Debug for EarlyStopping {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EarlyStopping")
            .field("patience", &self.patience)
            .field("objective", &self.objective)
            .field("best_value", &self.best_value)
            .field("counter", &self.counter)
            .field("phase", &self.phase)
            .field("stop", &self.stop)
            .finish_non_exhaustive()
    }
}

impl EarlyStopping {
    pub fn new(patience: usize, objective: Objective, store: Box<dyn CheckpointStore>) -> Self {
        Self {
            patience,
            objective,
            best_value: objective.worst(),
            counter: 0,
            observations: 0,
            best_snapshot: None,
            phase: Phase::Improving,
            stop: false,
            prepared: HashSet::new(),
            store,
        }
    }

    /// Early stopping on validation accuracy.
    pub fn for_accuracy(patience: usize, store: Box<dyn CheckpointStore>) -> Self {
        Self::new(patience, Objective::Maximize, store)
    }

    /// Set up the checkpoint destination for `name`. Must run before the first
    /// [`EarlyStopping::observe`] for that name.
    pub fn prepare(&mut self, name: &str) -> Result<(), TrainError> {
        self.store.prepare(name)?;
        self.prepared.insert(name.to_string());
        Ok(())
    }

    /// Feed one validation result. Returns `true` when `value` is a new best,
    /// in which case `snapshot` has been persisted for `name`.
    pub fn observe(
        &mut self,
        value: f64,
        snapshot: Snapshot,
        name: &str,
        objective: Objective,
    ) -> Result<bool, TrainError> {
        if self.stop {
            tracing::debug!(model = name, value, "Early stopping already triggered; ignoring");
            return Ok(false);
        }
        if objective != self.objective {
            return Err(TrainError::config(format!(
                "early stopping configured to {:?} but asked to {:?} for '{name}'",
                self.objective, objective
            )));
        }
        if !self.prepared.contains(name) {
            return Err(TrainError::config(format!(
                "no checkpoint destination prepared for '{name}'"
            )));
        }

        self.observations += 1;

        if self.objective.is_improvement(value, self.best_value) {
            let record = CheckpointRecord {
                epoch: self.observations,
                metric: value,
                objective: self.objective,
            };
            self.store.save(name, &record, &snapshot)?;
            tracing::info!(
                model = name,
                previous = self.best_value,
                best = value,
                "Validation metric improved; checkpoint saved"
            );
            self.best_value = value;
            self.best_snapshot = Some(snapshot);
            self.counter = 0;
            self.phase = Phase::Improving;
            return Ok(true);
        }

        self.counter += 1;
        if self.counter >= self.patience {
            self.stop = true;
            self.phase = Phase::Stopped;
            tracing::info!(
                model = name,
                patience = self.patience,
                best = self.best_value,
                "Early stopping triggered"
            );
        } else {
            self.phase = Phase::Plateauing;
            tracing::debug!(
                model = name,
                counter = self.counter,
                patience = self.patience,
                "No improvement"
            );
        }
        Ok(false)
    }

    pub fn should_stop(&self) -> bool {
        self.stop
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn objective(&self) -> Objective {
        self.objective
    }

    pub fn best_value(&self) -> f64 {
        self.best_value
    }

    pub fn patience_counter(&self) -> usize {
        self.counter
    }

    pub fn best_snapshot(&self) -> Option<&Snapshot> {
        self.best_snapshot.as_ref()
    }

    pub fn state(&self) -> EarlyStoppingState {
        EarlyStoppingState {
            objective: self.objective,
            patience: self.patience,
            best_value: self.best_value.is_finite().then_some(self.best_value),
            patience_counter: self.counter,
            observations: self.observations,
            phase: self.phase,
            stop: self.stop,
        }
    }
}

//! # earlybird-core — supervised classifier training orchestration
//!
//! Runs alternating training and validation epochs over opaque model and
//! data collaborators, reduces validation batches to loss and accuracy, and
//! decides when to stop and which snapshot to keep.
//!
//! ```text
//! Trainer ──► run_training_epoch ──► Classifier::optimize_parameters
//!    │
//!    └──────► run_validation_epoch ─► ValidationAccumulator ─► EarlyStopping ─► CheckpointStore
//! ```

pub mod callbacks;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod epoch;
pub mod error;
pub mod metrics;
pub mod model;
pub mod persistence;
pub mod sink;
pub mod status;
pub mod trainer;

pub use callbacks::{EarlyStopping, EarlyStoppingState, Objective, Phase};
pub use checkpoint::{
    Checkpoint, CheckpointRecord, CheckpointStore, FsCheckpointStore, MemoryCheckpointStore,
};
pub use config::{ConfigOverrides, MetricsConfig, TrainingConfig, load_config};
pub use data::{Batch, DataSource, InMemorySource};
pub use epoch::{Counters, ValidationOutcome, run_training_epoch, run_validation_epoch};
pub use error::TrainError;
pub use metrics::{EpochMetrics, EpochRecord, TrainingHistory, ValidationAccumulator};
pub use model::{Classifier, Device, Labels, Mode, Prediction, Snapshot};
pub use sink::{JsonlSink, MemorySink, MetricsSink, ScalarLogger, ScalarRecord};
pub use status::{StatusLine, format_status};
pub use trainer::{Trainer, TrainerOptions};

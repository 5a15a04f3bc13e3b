//! Subcommand handlers.

use crate::Commands;
use crate::dataset::{BatchLoader, ClassFolderDataset};
use crate::linear::{LinearState, SoftmaxClassifier};
use anyhow::{Context, bail};
use earlybird_core::persistence::atomic_write_json;
use earlybird_core::{
    Classifier, ConfigOverrides, DataSource, EarlyStopping, FsCheckpointStore, JsonlSink, Labels,
    Mode, ScalarLogger, Trainer, TrainerOptions, TrainingConfig, ValidationAccumulator,
    load_config,
};
use std::path::Path;

pub fn handle_command(
    command: Commands,
    workspace: &Path,
    config_file: Option<&Path>,
) -> anyhow::Result<()> {
    match command {
        Commands::Train {
            train_dir,
            val_dir,
            epochs,
            batch_size,
            patience,
            learning_rate,
            name,
            no_metrics,
        } => {
            let overrides = ConfigOverrides {
                epochs,
                patience,
                batch_size,
                learning_rate,
                model_name: name,
                ..ConfigOverrides::default()
            };
            let mut config = load(workspace, config_file, Some(&overrides))?;
            if no_metrics {
                config.metrics.enabled = false;
            }
            train(&config, workspace, &train_dir, &val_dir)
        }
        Commands::Config => {
            let config = load(workspace, config_file, None)?;
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Checkpoints { name } => {
            let config = load(workspace, config_file, None)?;
            let name = name.unwrap_or(config.model_name.clone());
            list_checkpoints(&config, workspace, &name)
        }
        Commands::Evaluate { val_dir, name } => {
            let config = load(workspace, config_file, None)?;
            let name = name.unwrap_or(config.model_name.clone());
            evaluate(&config, workspace, &val_dir, &name)
        }
    }
}

fn load(
    workspace: &Path,
    config_file: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> anyhow::Result<TrainingConfig> {
    load_config(Some(workspace), config_file, overrides)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

fn train(
    config: &TrainingConfig,
    workspace: &Path,
    train_dir: &Path,
    val_dir: &Path,
) -> anyhow::Result<()> {
    let train_set = ClassFolderDataset::load(&train_dir.join("train"))
        .context("loading training split")?;
    let val_set =
        ClassFolderDataset::load(&val_dir.join("val")).context("loading validation split")?;

    if val_set.classes() != train_set.classes() {
        bail!(
            "validation classes {:?} do not match training classes {:?}",
            val_set.classes(),
            train_set.classes()
        );
    }
    if val_set.feature_dim() != train_set.feature_dim() {
        bail!(
            "validation rows have {} features, training rows have {}",
            val_set.feature_dim(),
            train_set.feature_dim()
        );
    }

    let num_classes = train_set.classes().len();
    println!(
        "  Training '{}' on {} samples ({} classes, {} features), validating on {}",
        config.model_name,
        train_set.len(),
        num_classes,
        train_set.feature_dim(),
        val_set.len()
    );

    let model = SoftmaxClassifier::new(
        &config.model_name,
        num_classes,
        train_set.feature_dim(),
        config.learning_rate,
        config.device,
    );
    let train_loader = BatchLoader::new(train_set, config.batch_size, config.shuffle, config.seed);
    let val_loader = BatchLoader::new(val_set, config.batch_size, false, config.seed);
    tracing::debug!(
        train_batches = train_loader.num_batches(),
        val_batches = val_loader.num_batches(),
        "Loaders ready"
    );

    let checkpoint_root = config.checkpoint_root(workspace);
    let store = FsCheckpointStore::new(checkpoint_root.clone(), config.max_checkpoints);
    let early_stopping = EarlyStopping::for_accuracy(config.patience, Box::new(store.clone()));

    let logger = if config.metrics.enabled {
        let path = config.metrics_file(workspace);
        tracing::info!(path = %path.display(), "Writing scalar metrics");
        ScalarLogger::new(Box::new(JsonlSink::create(&path)?))
    } else {
        ScalarLogger::disabled()
    };

    let history = Trainer::new(
        model,
        train_loader,
        val_loader,
        early_stopping,
        logger,
        TrainerOptions {
            epochs: config.epochs,
        },
    )
    .run()?;

    let history_path = checkpoint_root
        .join(&config.model_name)
        .join("history.json");
    atomic_write_json(&history_path, &history)
        .with_context(|| format!("writing {}", history_path.display()))?;

    println!();
    println!(
        "  Finished after {} epoch(s), {} batches{}",
        history.epochs_completed,
        history.batches_processed,
        if history.stopped_early {
            " (early stop)"
        } else {
            ""
        }
    );
    if let (Some(epoch), Some(accuracy)) = (history.best_epoch, history.best_accuracy) {
        println!("  Best accuracy {accuracy} at epoch {epoch}");
        println!(
            "  Checkpoint: {}",
            store.snapshot_path(&config.model_name).display()
        );
    }
    println!("  History:    {}", history_path.display());
    Ok(())
}

fn list_checkpoints(config: &TrainingConfig, workspace: &Path, name: &str) -> anyhow::Result<()> {
    let store = FsCheckpointStore::new(config.checkpoint_root(workspace), config.max_checkpoints);
    let checkpoints = store.list(name)?;
    if checkpoints.is_empty() {
        println!("  No checkpoints for '{name}'.");
        return Ok(());
    }
    let best_id = store.best(name)?.map(|c| c.id);
    for c in &checkpoints {
        let marker = if Some(&c.id) == best_id.as_ref() { "*" } else { " " };
        println!(
            "{marker} epoch {:>4}  metric {:<10.6}  {:>8} bytes  {}  {}",
            c.epoch,
            c.metric,
            c.size_bytes,
            &c.hash[..12.min(c.hash.len())],
            c.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn evaluate(
    config: &TrainingConfig,
    workspace: &Path,
    val_dir: &Path,
    name: &str,
) -> anyhow::Result<()> {
    let store = FsCheckpointStore::new(config.checkpoint_root(workspace), config.max_checkpoints);
    let snapshot = store.load_best(name)?;
    let state: LinearState =
        serde_json::from_slice(snapshot.as_bytes()).context("decoding checkpoint")?;
    let mut model =
        SoftmaxClassifier::from_state(name, state, config.learning_rate, config.device)?;
    model.set_mode(Mode::Eval);

    let val_set =
        ClassFolderDataset::load(&val_dir.join("val")).context("loading validation split")?;
    let mut loader = BatchLoader::new(val_set, config.batch_size, false, config.seed);

    let mut accumulator = ValidationAccumulator::new();
    for batch in loader.batches() {
        let batch = batch?;
        let labels = Labels::encode(&batch.targets, model.device());
        let prediction = model.predict(&batch.inputs)?;
        let loss = model.criterion(&prediction.output, &labels)?;
        accumulator.push_batch(&prediction.labels, labels.values(), loss)?;
    }
    let metrics = accumulator.finish()?;
    println!(
        "  '{name}' best checkpoint: Loss {} | Accuracy {}",
        metrics.mean_loss, metrics.accuracy
    );
    Ok(())
}

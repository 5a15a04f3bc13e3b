//! Configuration for training runs.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit file -> environment -> overrides.

use crate::error::TrainError;
use crate::model::Device;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Epoch budget.
    #[serde(default = "default_epochs")]
    pub epochs: u64,
    /// Consecutive non-improving validation epochs tolerated before stopping.
    #[serde(default = "default_patience")]
    pub patience: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    /// Seed for shuffling and initialization.
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default)]
    pub device: Device,
    /// Reshuffle the training set every epoch.
    #[serde(default = "default_true")]
    pub shuffle: bool,
    /// Name used for metric tags and the checkpoint directory.
    #[serde(default = "default_model_name")]
    pub model_name: String,
    /// Checkpoint root, relative to the workspace unless absolute.
    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
    /// How many manifest entries to keep per model.
    #[serde(default = "default_max_checkpoints")]
    pub max_checkpoints: usize,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            patience: default_patience(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            seed: default_seed(),
            device: Device::default(),
            shuffle: true,
            model_name: default_model_name(),
            checkpoint_dir: default_checkpoint_dir(),
            max_checkpoints: default_max_checkpoints(),
            metrics: MetricsConfig::default(),
        }
    }
}

/// Scalar metrics output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// JSON-lines file, relative to the workspace unless absolute.
    #[serde(default = "default_metrics_path")]
    pub path: PathBuf,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: default_metrics_path(),
        }
    }
}

fn default_epochs() -> u64 {
    10
}

fn default_patience() -> usize {
    5
}

fn default_batch_size() -> usize {
    32
}

fn default_learning_rate() -> f64 {
    0.1
}

fn default_seed() -> u64 {
    42
}

fn default_true() -> bool {
    true
}

fn default_model_name() -> String {
    "classifier".to_string()
}

fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from(".earlybird/checkpoints")
}

fn default_max_checkpoints() -> usize {
    5
}

fn default_metrics_path() -> PathBuf {
    PathBuf::from(".earlybird/metrics/scalars.jsonl")
}

impl TrainingConfig {
    /// Reject settings the orchestrator cannot run with.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.epochs == 0 {
            return Err(TrainError::config("epochs must be at least 1"));
        }
        if self.patience == 0 {
            return Err(TrainError::config("patience must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(TrainError::config("batch_size must be at least 1"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(TrainError::config(format!(
                "learning_rate must be a positive number, got {}",
                self.learning_rate
            )));
        }
        crate::checkpoint::validate_name(&self.model_name)?;
        Ok(())
    }

    /// Checkpoint root resolved against `workspace`.
    pub fn checkpoint_root(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.checkpoint_dir)
    }

    /// Metrics file resolved against `workspace`.
    pub fn metrics_file(&self, workspace: &Path) -> PathBuf {
        workspace.join(&self.metrics.path)
    }
}

/// Command-line overrides. Only fields that are set take effect.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epochs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patience: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learning_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<Device>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_name: Option<String>,
}

/// Path of the user-level config file, if the platform has one.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "earlybird", "earlybird")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".earlybird").join("config.toml")
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Explicit overrides
/// 2. Environment variables (`EARLYBIRD_EPOCHS`, `EARLYBIRD_METRICS__PATH`, ...)
/// 3. `config_file`, when given
/// 4. Workspace config (`.earlybird/config.toml`)
/// 5. User config (`~/.config/earlybird/config.toml`)
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    config_file: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<TrainingConfig, TrainError> {
    let mut figment = Figment::from(Serialized::defaults(TrainingConfig::default()));

    if let Some(user_config) = user_config_path() {
        if user_config.exists() {
            figment = figment.merge(Toml::file(&user_config));
        }
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(file) = config_file {
        if !file.exists() {
            return Err(TrainError::config(format!(
                "config file {} does not exist",
                file.display()
            )));
        }
        figment = figment.merge(Toml::file(file));
    }

    figment = figment.merge(Env::prefixed("EARLYBIRD_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    let config: TrainingConfig = figment.extract().map_err(Box::new)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = TrainingConfig::default();
        config.validate().unwrap();
        assert_eq!(config.epochs, 10);
        assert_eq!(config.patience, 5);
        assert!(config.metrics.enabled);
    }

    #[test]
    fn test_validate_rejects_zeroes() {
        let mut config = TrainingConfig {
            patience: 0,
            ..TrainingConfig::default()
        };
        assert!(config.validate().unwrap_err().is_config());

        config.patience = 3;
        config.learning_rate = f64::NAN;
        assert!(config.validate().is_err());

        config.learning_rate = 0.1;
        config.model_name = "a/b".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: TrainingConfig = toml::from_str("epochs = 3\n[metrics]\nenabled = false\n")
            .unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(config.epochs, 3);
        assert_eq!(config.batch_size, 32);
        assert!(!config.metrics.enabled);
        assert_eq!(config.metrics.path, default_metrics_path());
    }

    #[test]
    fn test_workspace_file_and_overrides() {
        let dir = TempDir::new().unwrap();
        let cfg_dir = dir.path().join(".earlybird");
        std::fs::create_dir_all(&cfg_dir).unwrap();
        std::fs::write(
            cfg_dir.join("config.toml"),
            "batch_size = 8\nmodel_name = \"cats\"\ndevice = \"accelerator\"\n",
        )
        .unwrap();

        let overrides = ConfigOverrides {
            model_name: Some("dogs".into()),
            ..ConfigOverrides::default()
        };
        let config = load_config(Some(dir.path()), None, Some(&overrides)).unwrap();
        assert_eq!(config.batch_size, 8);
        assert_eq!(config.device, Device::Accelerator);
        assert_eq!(config.model_name, "dogs");
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = TempDir::new().unwrap();
        let err = load_config(None, Some(&dir.path().join("nope.toml")), None).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_invalid_file_value_is_config_error() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("bad.toml");
        std::fs::write(&file, "epochs = 0\n").unwrap();
        assert!(load_config(None, Some(&file), None).unwrap_err().is_config());
    }

    #[test]
    fn test_paths_resolve_against_workspace() {
        let config = TrainingConfig::default();
        let ws = Path::new("/tmp/ws");
        assert_eq!(
            config.checkpoint_root(ws),
            PathBuf::from("/tmp/ws/.earlybird/checkpoints")
        );
        assert_eq!(
            config.metrics_file(ws),
            PathBuf::from("/tmp/ws/.earlybird/metrics/scalars.jsonl")
        );
    }
}

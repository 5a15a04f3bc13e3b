//! earlybird CLI — train a classifier with validation-driven early stopping.

mod commands;
mod dataset;
mod linear;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// earlybird: train until validation accuracy stops improving
#[derive(Parser, Debug)]
#[command(name = "earlybird", version, about, long_about = None)]
struct Cli {
    /// Workspace directory
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Train a softmax classifier on class-folder CSV data
    Train {
        /// Directory containing the `train/` split
        #[arg(long)]
        train_dir: PathBuf,
        /// Directory containing the `val/` split
        #[arg(long)]
        val_dir: PathBuf,
        /// Maximum number of epochs
        #[arg(long)]
        epochs: Option<u64>,
        #[arg(long)]
        batch_size: Option<usize>,
        /// Non-improving validations tolerated before stopping
        #[arg(long)]
        patience: Option<usize>,
        #[arg(long)]
        learning_rate: Option<f64>,
        /// Model name, used as the checkpoint directory
        #[arg(long)]
        name: Option<String>,
        /// Do not write scalar metrics
        #[arg(long)]
        no_metrics: bool,
    },
    /// Print the effective configuration as TOML
    Config,
    /// List saved checkpoints for a model
    Checkpoints {
        /// Model name (defaults to the configured one)
        name: Option<String>,
    },
    /// Score the best checkpoint against a validation split
    Evaluate {
        #[arg(long)]
        val_dir: PathBuf,
        #[arg(long)]
        name: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::new(filter));

    let log_dir = directories::ProjectDirs::from("dev", "earlybird", "earlybird")
        .map(|d| d.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("."));
    let _ = std::fs::create_dir_all(&log_dir);
    let file_appender = tracing_appender::rolling::daily(&log_dir, "earlybird.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let json_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking)
        .with_filter(EnvFilter::new("debug"));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let workspace = cli
        .workspace
        .canonicalize()
        .unwrap_or_else(|_| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    commands::handle_command(cli.command, &workspace, cli.config.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_flags() {
        let cli = Cli::try_parse_from([
            "earlybird",
            "-vv",
            "train",
            "--train-dir",
            "data",
            "--val-dir",
            "data",
            "--patience",
            "3",
            "--no-metrics",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Train {
                patience,
                epochs,
                no_metrics,
                ..
            } => {
                assert_eq!(patience, Some(3));
                assert_eq!(epochs, None);
                assert!(no_metrics);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_train_requires_split_dirs() {
        assert!(Cli::try_parse_from(["earlybird", "train", "--val-dir", "v"]).is_err());
    }

    #[test]
    fn test_checkpoints_name_is_optional() {
        let cli = Cli::try_parse_from(["earlybird", "checkpoints"]).unwrap();
        assert!(matches!(cli.command, Commands::Checkpoints { name: None }));
    }
}

//! Scalar metrics sinks.
//!
//! [`ScalarLogger`] wraps an optional [`MetricsSink`] so call sites never
//! check for presence: with no sink every call is a no-op. The wrapped sink
//! is closed exactly once, either explicitly or when the logger is dropped.

use crate::error::TrainError;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Append-only scalar endpoint keyed by tag and step.
pub trait MetricsSink: Send {
    fn emit_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), TrainError>;

    fn close(&mut self) -> Result<(), TrainError>;
}

/// One emitted scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalarRecord {
    pub tag: String,
    pub value: f64,
    pub step: u64,
    /// Seconds since the Unix epoch.
    pub wall_time: f64,
}

impl ScalarRecord {
    fn now(tag: &str, value: f64, step: u64) -> Self {
        Self {
            tag: tag.to_string(),
            value,
            step,
            wall_time: chrono::Utc::now().timestamp_millis() as f64 / 1000.0,
        }
    }
}

/// Optional sink with close-once semantics.
pub struct ScalarLogger {
    sink: Option<Box<dyn MetricsSink>>,
    closed: bool,
}

impl ScalarLogger {
    pub fn new(sink: Box<dyn MetricsSink>) -> Self {
        Self {
            sink: Some(sink),
            closed: false,
        }
    }

    /// A logger that drops every scalar.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            closed: false,
        }
    }

    pub fn from_option(sink: Option<Box<dyn MetricsSink>>) -> Self {
        match sink {
            Some(sink) => Self::new(sink),
            None => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn emit(&mut self, tag: &str, value: f64, step: u64) -> Result<(), TrainError> {
        let Some(sink) = self.sink.as_mut() else {
            return Ok(());
        };
        if self.closed {
            return Err(TrainError::sink(format!("emit '{tag}' after close")));
        }
        sink.emit_scalar(tag, value, step)
    }

    /// Close the wrapped sink. Later calls are no-ops.
    pub fn close(&mut self) -> Result<(), TrainError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        match self.sink.as_mut() {
            Some(sink) => sink.close(),
            None => Ok(()),
        }
    }
}

impl Drop for ScalarLogger {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "Failed to close metrics sink");
        }
    }
}

impl std::fmt::Debug for ScalarLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScalarLogger")
            .field("enabled", &self.is_enabled())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Writes one JSON object per scalar to a file.
pub struct JsonlSink {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonlSink {
    /// Create (or truncate) the file at `path`, making parent directories.
    pub fn create(path: &Path) -> Result<Self, TrainError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = File::create(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MetricsSink for JsonlSink {
    fn emit_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), TrainError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| TrainError::sink(format!("{} is closed", self.path.display())))?;
        serde_json::to_writer(&mut *writer, &ScalarRecord::now(tag, value, step))
            .map_err(|e| TrainError::sink(format!("{}: {e}", self.path.display())))?;
        writer
            .write_all(b"\n")
            .map_err(|e| TrainError::sink(format!("{}: {e}", self.path.display())))
    }

    fn close(&mut self) -> Result<(), TrainError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| TrainError::sink(format!("{}: {e}", self.path.display())))?;
            writer.get_ref().sync_all()?;
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemorySinkLog {
    records: Vec<ScalarRecord>,
    closes: usize,
}

/// Keeps scalars in memory. Clones share the same log, so a clone kept by
/// the caller can inspect what a trainer emitted.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    log: Arc<Mutex<MemorySinkLog>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemorySinkLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn records(&self) -> Vec<ScalarRecord> {
        self.lock().records.clone()
    }

    /// Scalars for one tag as `(step, value)` pairs.
    pub fn series(&self, tag: &str) -> Vec<(u64, f64)> {
        self.lock()
            .records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| (r.step, r.value))
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.lock().closes
    }
}

impl MetricsSink for MemorySink {
    fn emit_scalar(&mut self, tag: &str, value: f64, step: u64) -> Result<(), TrainError> {
        self.lock().records.push(ScalarRecord::now(tag, value, step));
        Ok(())
    }

    fn close(&mut self) -> Result<(), TrainError> {
        self.lock().closes += 1;
        Ok(())
    }
}

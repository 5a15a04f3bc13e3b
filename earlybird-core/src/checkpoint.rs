//! Best-checkpoint persistence.
//!
//! The early-stopping policy decides *when* a snapshot is worth keeping; a
//! [`CheckpointStore`] decides *how* it is kept.

use crate::callbacks::Objective;
use crate::error::TrainError;
use crate::model::Snapshot;
use crate::persistence;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

const SNAPSHOT_FILE: &str = "best.ckpt";
const MANIFEST_FILE: &str = "checkpoints.json";

/// What the policy knows about a snapshot at the moment it is saved.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    /// 1-based index of the validation epoch that produced the snapshot.
    pub epoch: u64,
    pub metric: f64,
    pub objective: Objective,
}

/// A persisted checkpoint entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub name: String,
    pub epoch: u64,
    pub metric: f64,
    pub objective: Objective,
    pub hash: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    fn new(name: &str, record: &CheckpointRecord, snapshot: &Snapshot) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(snapshot.as_bytes());
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.to_string(),
            epoch: record.epoch,
            metric: record.metric,
            objective: record.objective,
            hash: format!("{:x}", hasher.finalize()),
            size_bytes: snapshot.len() as u64,
            created_at: Utc::now(),
        }
    }
}

/// Destination for best-so-far snapshots, keyed by model name.
pub trait CheckpointStore: Send {
    /// Make sure a destination exists for `name`. Called before training starts.
    fn prepare(&mut self, name: &str) -> Result<(), TrainError>;

    /// Persist `snapshot` as the best state for `name`, replacing any previous one.
    fn save(
        &mut self,
        name: &str,
        record: &CheckpointRecord,
        snapshot: &Snapshot,
    ) -> Result<Checkpoint, TrainError>;
}

/// Model names double as directory names, so they must be a single path component.
pub fn validate_name(name: &str) -> Result<(), TrainError> {
    if name.trim().is_empty() {
        return Err(TrainError::config("model name is empty"));
    }
    if name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(TrainError::config(format!(
            "model name '{name}' cannot be used as a checkpoint destination"
        )));
    }
    Ok(())
}

/// Filesystem store: `<base>/<name>/best.ckpt` plus a `checkpoints.json` manifest.
#[derive(Debug, Clone)]
pub struct FsCheckpointStore {
    base_dir: PathBuf,
    max_checkpoints: usize,
}

impl FsCheckpointStore {
    pub fn new(base_dir: PathBuf, max_checkpoints: usize) -> Self {
        Self {
            base_dir,
            max_checkpoints: max_checkpoints.max(1),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn snapshot_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name).join(SNAPSHOT_FILE)
    }

    fn manifest_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name).join(MANIFEST_FILE)
    }

    /// List manifest entries for `name`, oldest first.
    pub fn list(&self, name: &str) -> Result<Vec<Checkpoint>, TrainError> {
        validate_name(name)?;
        Ok(persistence::load_json(&self.manifest_path(name))?.unwrap_or_default())
    }

    /// The best manifest entry according to each entry's objective.
    pub fn best(&self, name: &str) -> Result<Option<Checkpoint>, TrainError> {
        let checkpoints = self.list(name)?;
        Ok(checkpoints.into_iter().reduce(|best, candidate| {
            if candidate.objective.is_improvement(candidate.metric, best.metric) {
                candidate
            } else {
                best
            }
        }))
    }

    /// Read back the persisted best snapshot.
    pub fn load_best(&self, name: &str) -> Result<Snapshot, TrainError> {
        validate_name(name)?;
        let path = self.snapshot_path(name);
        if !path.exists() {
            return Err(TrainError::not_found(format!("checkpoint for '{name}'")));
        }
        Ok(Snapshot::from_bytes(std::fs::read(path)?))
    }
}

impl CheckpointStore for FsCheckpointStore {
    fn prepare(&mut self, name: &str) -> Result<(), TrainError> {
        validate_name(name)?;
        let dir = self.base_dir.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| {
            TrainError::config(format!(
                "no checkpoint destination for '{name}' at {}: {e}",
                dir.display()
            ))
        })?;
        tracing::debug!(model = name, dir = %dir.display(), "Checkpoint destination ready");
        Ok(())
    }

    fn save(
        &mut self,
        name: &str,
        record: &CheckpointRecord,
        snapshot: &Snapshot,
    ) -> Result<Checkpoint, TrainError> {
        validate_name(name)?;
        let path = self.snapshot_path(name);
        persistence::atomic_write(&path, snapshot.as_bytes())
            .map_err(|e| TrainError::checkpoint(format!("{}: {e}", path.display())))?;

        let checkpoint = Checkpoint::new(name, record, snapshot);
        let mut checkpoints = self.list(name)?;
        checkpoints.push(checkpoint.clone());
        if checkpoints.len() > self.max_checkpoints {
            let excess = checkpoints.len() - self.max_checkpoints;
            checkpoints.drain(..excess);
        }
        persistence::atomic_write_json(&self.manifest_path(name), &checkpoints)?;

        tracing::debug!(
            model = name,
            epoch = record.epoch,
            metric = record.metric,
            hash = %checkpoint.hash,
            "Checkpoint written"
        );
        Ok(checkpoint)
    }
}

#[derive(Debug, Default)]
struct MemoryStoreInner {
    prepared: HashSet<String>,
    saved: HashMap<String, Vec<(Checkpoint, Snapshot)>>,
}

/// In-memory store. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    inner: Arc<Mutex<MemoryStoreInner>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_prepared(&self, name: &str) -> bool {
        self.lock().prepared.contains(name)
    }

    /// Number of saves recorded for `name`.
    pub fn save_count(&self, name: &str) -> usize {
        self.lock().saved.get(name).map_or(0, Vec::len)
    }

    /// Latest checkpoint and snapshot saved for `name`.
    pub fn latest(&self, name: &str) -> Option<(Checkpoint, Snapshot)> {
        self.lock().saved.get(name).and_then(|v| v.last().cloned())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn prepare(&mut self, name: &str) -> Result<(), TrainError> {
        validate_name(name)?;
        self.lock().prepared.insert(name.to_string());
        Ok(())
    }

    fn save(
        &mut self,
        name: &str,
        record: &CheckpointRecord,
        snapshot: &Snapshot,
    ) -> Result<Checkpoint, TrainError> {
        let mut inner = self.lock();
        if !inner.prepared.contains(name) {
            return Err(TrainError::config(format!(
                "no checkpoint destination for '{name}'"
            )));
        }
        let checkpoint = Checkpoint::new(name, record, snapshot);
        inner
            .saved
            .entry(name.to_string())
            .or_default()
            .push((checkpoint.clone(), snapshot.clone()));
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(epoch: u64, metric: f64) -> CheckpointRecord {
        CheckpointRecord {
            epoch,
            metric,
            objective: Objective::Maximize,
        }
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("resnet18").is_ok());
        assert!(validate_name("").unwrap_err().is_config());
        assert!(validate_name("..").unwrap_err().is_config());
        assert!(validate_name("a/b").unwrap_err().is_config());
    }

    #[test]
    fn test_fs_save_and_load() {
        let dir = TempDir::new().unwrap();
        let mut store = FsCheckpointStore::new(dir.path().to_path_buf(), 5);
        store.prepare("clf").unwrap();

        let snap = Snapshot::from_bytes(b"weights-v1".to_vec());
        let saved = store.save("clf", &record(1, 0.6), &snap).unwrap();
        assert_eq!(saved.size_bytes, 10);
        assert_eq!(saved.hash.len(), 64);

        assert_eq!(store.load_best("clf").unwrap(), snap);
        assert_eq!(store.list("clf").unwrap().len(), 1);
    }

    #[test]
    fn test_fs_overwrites_snapshot_and_trims_manifest() {
        let dir = TempDir::new().unwrap();
        let mut store = FsCheckpointStore::new(dir.path().to_path_buf(), 2);
        store.prepare("clf").unwrap();

        for (epoch, metric) in [(1, 0.5), (2, 0.6), (3, 0.8)] {
            let snap = Snapshot::from_bytes(format!("epoch-{epoch}").into_bytes());
            store.save("clf", &record(epoch, metric), &snap).unwrap();
        }

        let listed = store.list("clf").unwrap();
        assert_eq!(listed.iter().map(|c| c.epoch).collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(store.best("clf").unwrap().unwrap().epoch, 3);
        assert_eq!(store.load_best("clf").unwrap().as_bytes(), b"epoch-3");
    }

    #[test]
    fn test_fs_best_respects_objective() {
        let dir = TempDir::new().unwrap();
        let mut store = FsCheckpointStore::new(dir.path().to_path_buf(), 5);
        store.prepare("reg").unwrap();
        for (epoch, loss) in [(1, 0.9), (2, 0.4), (3, 0.7)] {
            let rec = CheckpointRecord {
                epoch,
                metric: loss,
                objective: Objective::Minimize,
            };
            store
                .save("reg", &rec, &Snapshot::from_bytes(vec![epoch as u8]))
                .unwrap();
        }
        assert_eq!(store.best("reg").unwrap().unwrap().epoch, 2);
    }

    #[test]
    fn test_fs_prepare_fails_when_base_is_a_file() {
        let dir = TempDir::new().unwrap();
        let base = dir.path().join("not-a-dir");
        std::fs::write(&base, "x").unwrap();

        let mut store = FsCheckpointStore::new(base, 5);
        assert!(store.prepare("clf").unwrap_err().is_config());
    }

    #[test]
    fn test_fs_load_best_missing() {
        let dir = TempDir::new().unwrap();
        let store = FsCheckpointStore::new(dir.path().to_path_buf(), 5);
        assert!(matches!(
            store.load_best("ghost"),
            Err(TrainError::NotFound(_))
        ));
        assert!(store.list("ghost").unwrap().is_empty());
    }

    #[test]
    fn test_memory_store_requires_prepare() {
        let mut store = MemoryCheckpointStore::new();
        let snap = Snapshot::from_bytes(vec![1]);
        assert!(store.save("clf", &record(1, 0.1), &snap).unwrap_err().is_config());

        store.prepare("clf").unwrap();
        store.save("clf", &record(1, 0.1), &snap).unwrap();
        assert_eq!(store.save_count("clf"), 1);
        assert_eq!(store.latest("clf").unwrap().1, snap);
    }
}

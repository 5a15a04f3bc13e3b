//! Atomic file writes and JSON loading shared by the checkpoint store and
//! the training history writer.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Sibling path used while a write is in flight: `best.ckpt` -> `best.ckpt.tmp`.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Atomically write raw bytes to a file.
///
/// The bytes are written and synced to a staging sibling, then renamed over
/// the target, so readers see either the old or the new content. Parent
/// directories are created on demand.
pub fn atomic_write(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let staging = staging_path(path);
    {
        let mut file = File::create(&staging)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    std::fs::rename(&staging, path)
}

/// Atomically write pretty-printed JSON to a file.
pub fn atomic_write_json<T: serde::Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_vec_pretty(data).map_err(io::Error::other)?;
    atomic_write(path, &json)
}

/// Load and deserialize JSON from a file.
///
/// Returns `Ok(None)` when the file does not exist.
pub fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> io::Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    let value =
        serde_json::from_slice(&data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

// JSON snapshot persistence for the in-memory record store
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use atomicwrites::{AllowOverwrite, AtomicFile};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use taxonorm_core::{Error, Record, Result};
use tracing::{debug, info};

/// Every collection of a store at one point in time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotData {
    pub saved_at: DateTime<Utc>,
    pub collections: BTreeMap<String, Vec<Record>>,
}

impl SnapshotData {
    pub fn new(collections: BTreeMap<String, Vec<Record>>) -> Self {
        Self {
            saved_at: Utc::now(),
            collections,
        }
    }

    pub fn record_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// Snapshot file contents: either a full snapshot, or a bare map of
/// collection name -> records as exported from another store
#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Full(SnapshotData),
    Collections(BTreeMap<String, Vec<Record>>),
}

/// Load a snapshot from disk. A missing file is not an error.
pub fn load_snapshot(path: &Path) -> Result<Option<SnapshotData>> {
    if !path.exists() {
        debug!(path = %path.display(), "no snapshot on disk");
        return Ok(None);
    }

    let data = fs::read(path)?;
    let snapshot = match serde_json::from_slice::<SnapshotFile>(&data)
        .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))?
    {
        SnapshotFile::Full(snapshot) => snapshot,
        SnapshotFile::Collections(collections) => SnapshotData::new(collections),
    };

    info!(
        path = %path.display(),
        collections = snapshot.collections.len(),
        records = snapshot.record_count(),
        "snapshot loaded"
    );
    Ok(Some(snapshot))
}

/// Write a snapshot atomically
pub fn save_snapshot(path: &Path, snapshot: &SnapshotData) -> Result<()> {
    write_json_atomic(path, snapshot)?;
    info!(
        path = %path.display(),
        records = snapshot.record_count(),
        "snapshot saved"
    );
    Ok(())
}

/// Serialize `value` as pretty JSON and replace `path` in one rename
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let data = serde_json::to_vec_pretty(value)?;
    AtomicFile::new(path, AllowOverwrite)
        .write(|f| f.write_all(&data))
        .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))
}

/// Read and deserialize a JSON file, `None` when it does not exist
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = fs::read(path)?;
    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| Error::Persistence(format!("{}: {}", path.display(), e)))
}

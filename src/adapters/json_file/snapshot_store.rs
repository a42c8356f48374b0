use crate::ports::snapshot_store::{Result, Snapshot, SnapshotStore as SnapshotStoreTrait};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

/// JSON file implementation of SnapshotStore
///
/// The whole library is written as one pretty-printed JSON document.
/// Saves go to `<file>.tmp` first, are fsynced, then renamed over the snapshot,
/// so a crash mid-write leaves the last known-good snapshot in place.
/// The containing directory is fsynced after the rename so the new entry is durable.
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Create a store that reads and writes `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Create a store for `library.json` inside `data_dir`
    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::new(data_dir.as_ref().join("library.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Location of the in-progress write
    pub fn temp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Directory holding the snapshot (`.` for a bare file name)
    fn dir(&self) -> &Path {
        self.path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
    }
}

/// Flush a directory entry change (rename) to disk
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    File::open(dir)?.sync_all()
}

/// No-op where directories cannot be opened as files
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

impl SnapshotStoreTrait for SnapshotStore {
    /// Load the last completed snapshot
    ///
    /// A leftover temp file means a previous save never reached the rename step.
    /// It is discarded and the snapshot it would have replaced is used.
    fn load(&self) -> Result<Option<Snapshot>> {
        let temp_path = self.temp_path();
        if temp_path.exists() {
            tracing::warn!(
                "Discarding incomplete snapshot write at {}",
                temp_path.display()
            );
            fs::remove_file(&temp_path)?;
        }

        if !self.path.exists() {
            tracing::info!("No snapshot at {}, starting empty", self.path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(&self.path)?;
        let snapshot: Snapshot = serde_json::from_str(&content)?;

        tracing::info!(
            books = snapshot.books.len(),
            members = snapshot.members.len(),
            transactions = snapshot.transactions.len(),
            "Loaded snapshot from {}",
            self.path.display()
        );

        Ok(Some(snapshot))
    }

    /// Write the snapshot atomically via temp file + rename, then sync the directory
    fn save(&self, snapshot: &Snapshot) -> Result<()> {
        let dir = self.dir();
        fs::create_dir_all(dir)?;

        let mut bytes = serde_json::to_vec_pretty(snapshot)?;
        bytes.push(b'\n');

        let temp_path = self.temp_path();
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        drop(file);

        fs::rename(&temp_path, &self.path)?;
        sync_dir(dir)?;

        tracing::debug!(bytes = bytes.len(), "Snapshot written to {}", self.path.display());
        Ok(())
    }
}

//! Durable key/blob persistence for pipeline state.
//!
//! Every stage reads its inputs from, and writes its outputs to, a
//! [`CheckpointStore`]. Blobs are YAML so a cache directory can be diffed
//! and inspected by hand.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{HarvesterError, Result};

/// Enumerated collection keys.
pub const COLLECTION_KEYS: &str = "collection_keys";

/// Item descriptors per collection key.
pub const COURSE_LIST: &str = "course_list";

/// Course records per collection key.
pub const COURSE_DATA: &str = "course_data";

/// Completion set.
pub const COURSES_WITH_DATA: &str = "courses_with_data";

/// Identity index used by the cross-listing resolver.
pub const IDENTITY_INDEX: &str = "identity_index";

/// Persistence boundary shared by every stage.
///
/// `save_blob` must be atomic: a reader never observes a partially written
/// blob, even if the process dies mid-write.
pub trait CheckpointStore {
    /// Load a blob, or `None` if it was never saved.
    fn load_blob(&self, name: &str) -> Result<Option<Vec<u8>>>;

    /// Overwrite a blob.
    fn save_blob(&mut self, name: &str, blob: &[u8]) -> Result<()>;

    /// Load and decode a typed blob.
    fn load<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>>
    where
        Self: Sized,
    {
        let Some(bytes) = self.load_blob(name)? else {
            return Ok(None);
        };
        serde_yaml_ng::from_slice(&bytes)
            .map(Some)
            .map_err(|e| HarvesterError::Checkpoint {
                name: name.to_string(),
                reason: e.to_string(),
            })
    }

    /// Encode and save a typed blob.
    fn save<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()>
    where
        Self: Sized,
    {
        let yaml = serde_yaml_ng::to_string(value)?;
        self.save_blob(name, format!("---\n{yaml}").as_bytes())
    }
}

/// Stores each blob as `<dir>/<name>.yaml`.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    /// Open (and create if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the blobs.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.yaml"))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load_blob(&self, name: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.blob_path(name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_blob(&mut self, name: &str, blob: &[u8]) -> Result<()> {
        write_atomic(&self.blob_path(name), blob)?;
        tracing::debug!(blob = name, bytes = blob.len(), "Checkpoint saved");
        Ok(())
    }
}

/// Write a file atomically.
///
/// Writes to a hidden temp file next to `target`, syncs it to disk, then
/// renames it over `target`, so a crash never leaves a partial file behind.
pub fn write_atomic(target: &Path, contents: &[u8]) -> Result<()> {
    let dir = target.parent().unwrap_or(Path::new("."));
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_file = dir.join(format!(".{file_name}.tmp"));

    {
        let mut file = File::create(&temp_file)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }

    // On Windows, rename fails if the destination already exists
    #[cfg(target_os = "windows")]
    if target.exists() {
        fs::remove_file(target)?;
    }

    fs::rename(&temp_file, target)?;
    Ok(())
}

/// In-process store for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    blobs: HashMap<String, Vec<u8>>,
    saves: usize,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a blob with this name has been saved.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.blobs.contains_key(name)
    }

    /// Total number of `save_blob` calls.
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load_blob(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.get(name).cloned())
    }

    fn save_blob(&mut self, name: &str, blob: &[u8]) -> Result<()> {
        self.blobs.insert(name.to_string(), blob.to_vec());
        self.saves += 1;
        Ok(())
    }
}

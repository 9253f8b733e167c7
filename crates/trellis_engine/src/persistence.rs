//! Fact handle checkpoints using `MessagePack`.
//!
//! A checkpoint is the `(id, counter)` pair of a
//! [`FactHandleFactory`](crate::FactHandleFactory). Values are stored signed so that a corrupt
//! or hand-edited checkpoint surfaces as a recovery error instead of a
//! silent wrap-around.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind as IoErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use trellis_foundation::{Error, ErrorKind, Result};

/// Persisted state of a fact handle factory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactHandleCheckpoint {
    /// Factory id.
    pub id: i64,
    /// Last value issued.
    pub counter: i64,
}

/// Serializes a checkpoint to bytes using `MessagePack` format.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn to_bytes(checkpoint: &FactHandleCheckpoint) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(checkpoint)
        .map_err(|e| Error::new(ErrorKind::CheckpointWrite(e.to_string())))
}

/// Deserializes a checkpoint from `MessagePack` bytes.
///
/// # Errors
///
/// Returns an error if deserialization fails.
pub fn from_bytes(bytes: &[u8]) -> Result<FactHandleCheckpoint> {
    rmp_serde::from_slice(bytes).map_err(|e| Error::unreadable_checkpoint(e.to_string()))
}

/// Saves a checkpoint to a file, replacing any previous content.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written to.
pub fn save_to_file<P: AsRef<Path>>(checkpoint: &FactHandleCheckpoint, path: P) -> Result<()> {
    let path = path.as_ref();
    let write_error = |e: std::io::Error| {
        Error::new(ErrorKind::CheckpointWrite(format!(
            "failed to write '{}': {e}",
            path.display()
        )))
    };

    let bytes = to_bytes(checkpoint)?;
    let file = File::create(path).map_err(write_error)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes).map_err(write_error)?;
    writer.flush().map_err(write_error)?;
    Ok(())
}

/// Loads a checkpoint from a file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or decoded.
pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<FactHandleCheckpoint> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        Error::unreadable_checkpoint(format!("failed to open '{}': {e}", path.display()))
    })?;

    let mut bytes = Vec::new();
    BufReader::new(file).read_to_end(&mut bytes).map_err(|e| {
        Error::unreadable_checkpoint(format!("failed to read '{}': {e}", path.display()))
    })?;

    from_bytes(&bytes)
}

// =============================================================================
// Stores
// =============================================================================

/// Where checkpoints are kept between runs.
pub trait CheckpointStore: Send + Sync {
    /// Loads the stored checkpoint, if any.
    ///
    /// # Errors
    /// Returns [`ErrorKind::UnreadableCheckpoint`] if stored data cannot be
    /// read or decoded.
    fn load(&self) -> Result<Option<FactHandleCheckpoint>>;

    /// Replaces the stored checkpoint.
    ///
    /// # Errors
    /// Returns [`ErrorKind::CheckpointWrite`] if the data cannot be written.
    fn store(&self, checkpoint: &FactHandleCheckpoint) -> Result<()>;
}

/// Keeps an encoded checkpoint in memory.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    bytes: Mutex<Option<Vec<u8>>>,
}

impl MemoryCheckpointStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding raw bytes, which may not be a valid checkpoint.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(Some(bytes)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn bytes(&self) -> Option<Vec<u8>> {
        self.bytes.lock().clone()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn load(&self) -> Result<Option<FactHandleCheckpoint>> {
        self.bytes.lock().as_deref().map(from_bytes).transpose()
    }

    fn store(&self, checkpoint: &FactHandleCheckpoint) -> Result<()> {
        let bytes = to_bytes(checkpoint)?;
        *self.bytes.lock() = Some(bytes);
        Ok(())
    }
}

/// Keeps a checkpoint in a file.
#[derive(Clone, Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store backed by `path`. The file need not exist yet.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<FactHandleCheckpoint>> {
        match std::fs::metadata(&self.path) {
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
            _ => load_from_file(&self.path).map(Some),
        }
    }

    fn store(&self, checkpoint: &FactHandleCheckpoint) -> Result<()> {
        save_to_file(checkpoint, &self.path)
    }
}

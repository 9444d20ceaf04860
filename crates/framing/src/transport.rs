//! Blob transports between the holder and the analyzer
//!
//! A blob staged under a name is received at most once.

use shared::{HeStatsError, HeStatsResult};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Carries serialized blobs across the role boundary
pub trait BlobTransport {
    fn name(&self) -> &'static str;

    /// Stage a blob under `stage`
    fn send(&mut self, stage: &str, blob: Vec<u8>) -> HeStatsResult<()>;

    /// Take the blob staged under `stage`
    fn receive(&mut self, stage: &str) -> HeStatsResult<Vec<u8>>;

    /// Total bytes staged so far
    fn bytes_sent(&self) -> usize;
}

fn already_staged(stage: &str) -> HeStatsError {
    HeStatsError::protocol(format!("a blob is already staged for {stage}"))
}

fn nothing_staged(stage: &str) -> HeStatsError {
    HeStatsError::protocol(format!("no blob staged for {stage}"))
}

/// In-process transport
#[derive(Debug, Default)]
pub struct MemoryTransport {
    staged: HashMap<String, Vec<u8>>,
    bytes_sent: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BlobTransport for MemoryTransport {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn send(&mut self, stage: &str, blob: Vec<u8>) -> HeStatsResult<()> {
        if self.staged.contains_key(stage) {
            return Err(already_staged(stage));
        }
        self.bytes_sent += blob.len();
        debug!(stage, bytes = blob.len(), "blob staged in memory");
        self.staged.insert(stage.to_string(), blob);
        Ok(())
    }

    fn receive(&mut self, stage: &str) -> HeStatsResult<Vec<u8>> {
        self.staged.remove(stage).ok_or_else(|| nothing_staged(stage))
    }

    fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }
}

/// Transport writing one `<stage>.blob` file per stage into a directory
///
/// Files written by the transport are removed on drop unless [`keep`] was
/// called.
///
/// [`keep`]: FileTransport::keep
#[derive(Debug)]
pub struct FileTransport {
    dir: PathBuf,
    written: Vec<PathBuf>,
    received: HashSet<String>,
    bytes_sent: usize,
    keep: bool,
}

impl FileTransport {
    pub fn new(dir: impl AsRef<Path>) -> HeStatsResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: Vec::new(),
            received: HashSet::new(),
            bytes_sent: 0,
            keep: false,
        })
    }

    /// Leave the blob files in place when the transport is dropped
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stage: &str) -> PathBuf {
        self.dir.join(format!("{stage}.blob"))
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl BlobTransport for FileTransport {
    fn name(&self) -> &'static str {
        "file"
    }

    fn send(&mut self, stage: &str, blob: Vec<u8>) -> HeStatsResult<()> {
        let path = self.path_for(stage);
        if self.written.contains(&path) {
            return Err(already_staged(stage));
        }
        fs::write(&path, &blob)?;
        self.bytes_sent += blob.len();
        debug!(stage, bytes = blob.len(), path = %path.display(), "blob written");
        self.written.push(path);
        Ok(())
    }

    fn receive(&mut self, stage: &str) -> HeStatsResult<Vec<u8>> {
        let path = self.path_for(stage);
        if self.received.contains(stage) || !path.exists() {
            return Err(nothing_staged(stage));
        }
        let blob = fs::read(&path)?;
        self.received.insert(stage.to_string());
        Ok(blob)
    }

    fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }
}

impl Drop for FileTransport {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        for path in &self.written {
            if let Err(e) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %e, "failed to remove blob file");
            }
        }
    }
}

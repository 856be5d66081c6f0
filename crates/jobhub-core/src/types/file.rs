//! File storage value types.

use std::fmt;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;

/// Boxed async reader accepted by [`FileSource::Stream`].
pub type FileReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where the content of a saved file comes from.
pub enum FileSource {
    /// An in-memory buffer, written directly.
    Bytes(Bytes),
    /// An existing file, copied chunk by chunk.
    Path(PathBuf),
    /// An already-open reader, streamed chunk by chunk.
    Stream(FileReader),
}

impl FileSource {
    /// Wrap an async reader.
    pub fn stream<R>(reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::Stream(Box::new(reader))
    }

    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Path(_) => "path",
            Self::Stream(_) => "stream",
        }
    }
}

impl fmt::Debug for FileSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Self::Path(p) => f.debug_tuple("Path").field(p).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

impl From<Bytes> for FileSource {
    fn from(value: Bytes) -> Self {
        Self::Bytes(value)
    }
}

impl From<Vec<u8>> for FileSource {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(value))
    }
}

impl From<PathBuf> for FileSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

/// Result of a successful save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedFile {
    /// Path relative to the job root.
    pub relative_path: String,
    /// Bytes written.
    pub size: u64,
    /// Lowercase SHA-256 hex digest of the bytes written.
    pub hash: String,
}

/// Outcome of a retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Job directories removed.
    pub deleted_count: u64,
    /// Bytes reclaimed.
    pub freed_bytes: u64,
}

/// Disk usage of the job tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    /// Total bytes of regular files under `jobs/`.
    pub total_bytes: u64,
    /// Number of job directories.
    pub job_count: u64,
}

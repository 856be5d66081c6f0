//! Incremental SHA-256 over the bytes actually written.

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Bounded transfer chunk size.
pub const CHUNK_SIZE: usize = 1024 * 1024;

/// Writes through to a sink while feeding every byte to a hasher.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: AsyncWrite + Unpin> HashingWriter<W> {
    /// Wrap a sink.
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    /// Write a buffer in bounded chunks.
    pub async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        for chunk in data.chunks(CHUNK_SIZE) {
            self.inner.write_all(chunk).await?;
            self.hasher.update(chunk);
            self.written += chunk.len() as u64;
        }
        Ok(())
    }

    /// Copy a reader to the sink one chunk at a time.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> std::io::Result<u64>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        let mut copied = 0u64;
        loop {
            let n = reader.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            self.inner.write_all(&buf[..n]).await?;
            self.hasher.update(&buf[..n]);
            self.written += n as u64;
            copied += n as u64;
        }
        Ok(copied)
    }

    /// Flush the sink and return `(size, hex digest)`.
    pub async fn finish(mut self) -> std::io::Result<(u64, String)> {
        self.inner.flush().await?;
        Ok((self.written, hex::encode(self.hasher.finalize())))
    }
}

/// SHA-256 hex digest of an in-memory buffer.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

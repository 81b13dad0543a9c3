//! Chunked artifact transfer.
//!
//! Large artifacts are split into fixed-size chunks that are pushed to the
//! remote host one at a time, so peak memory stays at one chunk no matter how
//! big the file is. The whole-file SHA-256 digest is computed over the same
//! reads and returned for independent verification; reassembly on the remote
//! side is left to the caller.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use crate::errors::TransferError;
use crate::transport::Transport;

/// Default chunk size: 500 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 500 * 1024 * 1024;

/// File name prefix of every pushed chunk.
pub const CHUNK_PREFIX: &str = "split_src_";

/// Number of chunks needed for `file_size` bytes.
pub fn total_parts(file_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    file_size.div_ceil(chunk_size)
}

/// Remote file name for chunk `index`.
pub fn chunk_file_name(index: u64) -> String {
    format!("{CHUNK_PREFIX}{index}")
}

/// Join a destination folder and a file name without doubling slashes.
pub fn remote_join(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        return name.to_string();
    }
    let trimmed = folder.trim_end_matches('/');
    if trimmed.is_empty() {
        format!("/{name}")
    } else {
        format!("{trimmed}/{name}")
    }
}

/// One chunk of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Zero-based chunk index.
    pub index: u64,
    /// Offset of the chunk's first byte in the source file.
    pub offset: u64,
    /// Number of bytes in the chunk.
    pub len: u64,
}

impl ChunkDescriptor {
    pub fn remote_file_name(&self) -> String {
        chunk_file_name(self.index)
    }

    pub fn remote_path(&self, destination_folder: &str) -> String {
        remote_join(destination_folder, &self.remote_file_name())
    }
}

/// Lazily yields the chunks of a file, in order.
#[derive(Debug, Clone)]
pub struct ChunkPlan {
    file_size: u64,
    chunk_size: u64,
    next_index: u64,
}

impl ChunkPlan {
    pub fn new(file_size: u64, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize);
        }
        Ok(Self {
            file_size,
            chunk_size,
            next_index: 0,
        })
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn total_parts(&self) -> u64 {
        total_parts(self.file_size, self.chunk_size)
    }
}

impl Iterator for ChunkPlan {
    type Item = ChunkDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index >= self.total_parts() {
            return None;
        }
        let index = self.next_index;
        let offset = index * self.chunk_size;
        let len = self.chunk_size.min(self.file_size - offset);
        self.next_index += 1;
        Some(ChunkDescriptor { index, offset, len })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total_parts().saturating_sub(self.next_index);
        let remaining = usize::try_from(remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

/// A completed (or in-progress) transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferJob {
    pub source: PathBuf,
    pub destination_folder: String,
    pub file_size: u64,
    pub chunk_size: u64,
    /// Fixed when the job starts.
    pub total_parts: u64,
    /// Lower-case hex SHA-256 of the whole file, set once every chunk is sent.
    pub digest: Option<String>,
}

/// Pushes files to the remote host in fixed-size chunks.
#[derive(Debug, Clone)]
pub struct ChunkedTransfer<T> {
    transport: T,
    chunk_size: u64,
}

impl<T: Transport> ChunkedTransfer<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Result<Self, TransferError> {
        if chunk_size == 0 {
            return Err(TransferError::InvalidChunkSize);
        }
        self.chunk_size = chunk_size;
        Ok(self)
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Push `source` to `destination_folder` and return its hex digest.
    pub async fn transfer(
        &self,
        source: &Path,
        destination_folder: &str,
        mode: u32,
    ) -> Result<String, TransferError> {
        let job = self.transfer_job(source, destination_folder, mode).await?;
        Ok(job.digest.unwrap_or_default())
    }

    /// Push `source` and return the full job record.
    ///
    /// Stops at the first failing chunk; chunks already pushed stay on the
    /// remote host.
    pub async fn transfer_job(
        &self,
        source: &Path,
        destination_folder: &str,
        mode: u32,
    ) -> Result<TransferJob, TransferError> {
        let open_err = |source_err| TransferError::Open {
            path: source.to_path_buf(),
            source: source_err,
        };
        let mut file = File::open(source).await.map_err(open_err)?;
        let file_size = file.metadata().await.map_err(open_err)?.len();

        let plan = ChunkPlan::new(file_size, self.chunk_size)?;
        let mut job = TransferJob {
            source: source.to_path_buf(),
            destination_folder: destination_folder.to_string(),
            file_size,
            chunk_size: self.chunk_size,
            total_parts: plan.total_parts(),
            digest: None,
        };

        info!(
            source = %source.display(),
            destination = destination_folder,
            bytes = file_size,
            total_parts = job.total_parts,
            "Starting chunked transfer"
        );

        let mut hasher = Sha256::new();
        for chunk in plan {
            let len = usize::try_from(chunk.len).map_err(|_| TransferError::Read {
                path: source.to_path_buf(),
                index: chunk.index,
                source: std::io::Error::other("chunk does not fit in memory"),
            })?;
            let mut buf = vec![0u8; len];
            file.read_exact(&mut buf)
                .await
                .map_err(|e| TransferError::Read {
                    path: source.to_path_buf(),
                    index: chunk.index,
                    source: e,
                })?;
            hasher.update(&buf);

            let remote_path = chunk.remote_path(destination_folder);
            debug!(
                chunk = chunk.index,
                total_parts = job.total_parts,
                offset = chunk.offset,
                bytes = chunk.len,
                remote_path = %remote_path,
                "Copying chunk"
            );
            self.transport
                .push(&remote_path, mode, &buf)
                .await
                .map_err(|e| TransferError::Push {
                    index: chunk.index,
                    remote_path: remote_path.clone(),
                    source: e,
                })?;
            info!(
                chunk = chunk.index + 1,
                total_parts = job.total_parts,
                "Chunk copied to {}",
                remote_path
            );
        }

        let digest = format!("{:x}", hasher.finalize());
        info!(digest = %digest, "Chunked transfer complete");
        job.digest = Some(digest);
        Ok(job)
    }
}

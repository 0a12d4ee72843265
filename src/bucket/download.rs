use std::sync::Arc;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{GridError, StorageError};
use crate::storage::validation::check_chunk;
use crate::storage::{read_chunks_in_order, ChunkReader, ChunkStore, MetadataStore};
use crate::{FileRecord, Result};

/// Lazy reader over a stored file, one chunk at a time.
///
/// Each chunk is checked against the sizes the file record implies. Once the
/// last chunk has been handed out the download counter is bumped, if the
/// bucket keeps one.
pub struct DownloadStream {
    record: FileRecord,
    reader: Option<ChunkReader>,
    expected_chunks: u32,
    position: u64,
    counter: Option<Arc<dyn MetadataStore>>,
    finished: bool,
}

impl DownloadStream {
    pub(crate) async fn open(
        record: FileRecord,
        chunks: Arc<dyn ChunkStore>,
        counter: Option<Arc<dyn MetadataStore>>,
    ) -> Result<Self> {
        let reader = if record.length == 0 {
            None
        } else {
            match read_chunks_in_order(chunks, &record.id).await {
                Ok(reader) => Some(reader),
                Err(StorageError::NotFound(_)) => {
                    return Err(GridError::Integrity(format!(
                        "file {} has no stored chunks",
                        record.id
                    )))
                }
                Err(e) => return Err(GridError::from_read("open download", e)),
            }
        };
        Ok(Self {
            expected_chunks: record.chunk_count(),
            record,
            reader,
            position: 0,
            counter,
            finished: false,
        })
    }

    pub fn file(&self) -> &FileRecord {
        &self.record
    }

    /// Bytes handed out so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.finished {
            return Ok(None);
        }
        let Some(reader) = self.reader.as_mut() else {
            self.complete().await;
            return Ok(None);
        };
        if reader.position() >= self.expected_chunks {
            self.complete().await;
            return Ok(None);
        }

        let n = reader.position();
        let chunk = reader
            .next()
            .await
            .map_err(|e| GridError::from_read("read chunk", e))?
            .ok_or_else(|| {
                GridError::Integrity(format!("chunk {} of file {} is missing", n, self.record.id))
            })?;
        check_chunk(&self.record, chunk.n, chunk.data.len())?;
        self.position += chunk.data.len() as u64;
        Ok(Some(chunk.data))
    }

    /// Read the rest of the file into memory.
    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.record.length as usize);
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Stream the rest of the file into `writer`, returning the bytes copied.
    pub async fn copy_to<W>(mut self, writer: &mut W) -> Result<u64>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut copied = 0u64;
        while let Some(chunk) = self.next_chunk().await? {
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| GridError::Write(format!("copy {}: {}", self.record.id, e)))?;
            copied += chunk.len() as u64;
        }
        writer
            .flush()
            .await
            .map_err(|e| GridError::Write(format!("copy {}: {}", self.record.id, e)))?;
        Ok(copied)
    }

    async fn complete(&mut self) {
        self.finished = true;
        debug!(id = %self.record.id, bytes = self.position, "download complete");
        if let Some(files) = self.counter.take() {
            if let Err(e) = files.increment_download_counter(&self.record.id).await {
                warn!(id = %self.record.id, error = %e, "failed to bump download counter");
            }
        }
    }
}

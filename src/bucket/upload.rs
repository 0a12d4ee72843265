use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use tracing::{debug, info, warn};

use crate::chunk::ChunkBuffer;
use crate::error::{GridError, StorageError};
use crate::storage::{ChunkStore, MetadataStore};
use crate::{merge_metadata, ContentTypeDetector, FileId, FileRecord, Metadata, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadState {
    Open,
    /// The record insert is in flight; the chunks may already be referenced.
    Committing,
    Closed,
}

/// Incremental writer for one file.
///
/// Bytes are cut into chunks as they arrive and each full chunk is stored
/// immediately, so at most one chunk is held in memory. The file record is
/// only written by [`finish`](Self::finish). Dropping an unfinished stream
/// discards its chunks in the background, unless the record insert had
/// already started.
pub struct UploadStream {
    id: FileId,
    filename: String,
    content_type: Option<String>,
    metadata: Option<Metadata>,
    auto_metadata: bool,
    chunk_size: u32,
    buffer: ChunkBuffer,
    files: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
    state: UploadState,
}

pub(crate) struct UploadParts {
    pub id: FileId,
    pub filename: String,
    pub content_type: Option<String>,
    pub metadata: Option<Metadata>,
    pub auto_metadata: bool,
    pub chunk_size: u32,
    pub files: Arc<dyn MetadataStore>,
    pub chunks: Arc<dyn ChunkStore>,
}

impl UploadStream {
    pub(crate) fn new(parts: UploadParts) -> Result<Self> {
        Ok(Self {
            buffer: ChunkBuffer::new(parts.chunk_size)?,
            id: parts.id,
            filename: parts.filename,
            content_type: parts.content_type,
            metadata: parts.metadata,
            auto_metadata: parts.auto_metadata,
            chunk_size: parts.chunk_size,
            files: parts.files,
            chunks: parts.chunks,
            state: UploadState::Open,
        })
    }

    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.buffer.total()
    }

    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        let mut rest = data;
        while !rest.is_empty() {
            let used = self.buffer.fill(rest);
            rest = &rest[used..];
            if self.buffer.is_full() {
                self.flush_chunk().await?;
            }
        }
        Ok(())
    }

    /// Store the trailing chunk and write the file record.
    pub async fn finish(mut self) -> Result<FileRecord> {
        self.ensure_open()?;
        self.flush_chunk().await?;

        // stored dates carry microseconds
        let now = Utc::now().trunc_subsecs(6);
        let record = FileRecord {
            id: self.id,
            filename: self.filename.clone(),
            length: self.buffer.total(),
            chunk_size: self.chunk_size,
            upload_date: now,
            content_type: self
                .content_type
                .take()
                .unwrap_or_else(|| ContentTypeDetector::detect(&[])),
            metadata: merge_metadata(self.auto_metadata, now, self.metadata.take()),
        };

        self.state = UploadState::Committing;
        match self.files.insert(record.clone()).await {
            Ok(_) => {
                self.state = UploadState::Closed;
                info!(
                    id = %record.id,
                    filename = %record.filename,
                    length = record.length,
                    chunks = record.chunk_count(),
                    "stored file"
                );
                Ok(record)
            }
            // The chunks under a colliding id may belong to the existing file.
            Err(StorageError::DuplicateKey(key)) => {
                self.state = UploadState::Closed;
                Err(GridError::from_write(
                    "insert file record",
                    StorageError::DuplicateKey(key),
                ))
            }
            Err(e) => {
                self.discard().await;
                Err(GridError::from_write("insert file record", e))
            }
        }
    }

    /// Drop the upload and delete every chunk written so far.
    pub async fn abort(mut self) -> Result<()> {
        self.ensure_open()?;
        self.state = UploadState::Closed;
        let removed = self
            .chunks
            .delete_chunks(&self.id)
            .await
            .map_err(|e| GridError::from_write("abort upload", e))?;
        debug!(id = %self.id, removed, "aborted upload");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        match self.state {
            UploadState::Open => Ok(()),
            UploadState::Committing | UploadState::Closed => Err(GridError::Write(format!(
                "upload stream for {} is closed",
                self.id
            ))),
        }
    }

    async fn flush_chunk(&mut self) -> Result<()> {
        let Some((n, data)) = self.buffer.take() else {
            return Ok(());
        };
        if n == 0 && self.content_type.is_none() {
            self.content_type = Some(ContentTypeDetector::detect(&data));
        }
        match self.chunks.write_chunk(&self.id, n, &data).await {
            Ok(()) => {
                debug!(id = %self.id, n, size = data.len(), "wrote chunk");
                Ok(())
            }
            Err(e) => {
                let err = GridError::from_write(&format!("write chunk {}", n), e);
                self.discard().await;
                Err(match err {
                    GridError::Write(_) => err,
                    other => GridError::Write(other.to_string()),
                })
            }
        }
    }

    /// Best-effort removal of this upload's chunks; closes the stream.
    async fn discard(&mut self) {
        self.state = UploadState::Closed;
        discard_chunks(self.chunks.as_ref(), &self.id).await;
    }
}

async fn discard_chunks(chunks: &dyn ChunkStore, id: &FileId) {
    match chunks.delete_chunks(id).await {
        Ok(removed) => debug!(%id, removed, "discarded partial upload"),
        Err(e) => warn!(%id, error = %e, "failed to discard partial upload"),
    }
}

impl Drop for UploadStream {
    fn drop(&mut self) {
        if self.state == UploadState::Committing {
            warn!(id = %self.id, "upload cancelled while committing, chunks kept");
            return;
        }
        if self.state != UploadState::Open || self.buffer.emitted() == 0 {
            return;
        }
        let chunks = Arc::clone(&self.chunks);
        let id = self.id;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(%id, "upload cancelled, discarding chunks");
                handle.spawn(async move { discard_chunks(chunks.as_ref(), &id).await });
            }
            Err(_) => warn!(%id, "upload cancelled outside a runtime, chunks left behind"),
        }
    }
}

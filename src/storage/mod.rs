//! Backing store seams: a files collection, a chunks collection, and the
//! backend that hands both out per bucket prefix.

pub mod disk;
pub mod memory;
pub mod query;
pub mod validation;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{StorageError, StorageResult};
use crate::{ChunkRecord, FileId, FileRecord};
use query::{Cursor, Filter, FindOptions};

pub fn files_collection_name(prefix: &str) -> String {
    format!("{}.files", prefix)
}

pub fn chunks_collection_name(prefix: &str) -> String {
    format!("{}.chunks", prefix)
}

/// A database holding any number of bucket collections.
pub trait Backend: Send + Sync {
    fn database_name(&self) -> &str;
    fn files_collection(&self, prefix: &str) -> Arc<dyn MetadataStore>;
    fn chunks_collection(&self, prefix: &str) -> Arc<dyn ChunkStore>;
}

/// One record per logical file.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Collection name, e.g. `fs.files`.
    fn namespace(&self) -> &str;

    /// Persist a new record. Fails with `DuplicateKey` if the id is taken.
    async fn insert(&self, record: FileRecord) -> StorageResult<FileId>;

    async fn find(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Cursor>;

    async fn find_one(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> StorageResult<Option<FileRecord>> {
        let options = FindOptions {
            limit: Some(1),
            ..options.clone()
        };
        Ok(self.find(filter, &options).await?.next())
    }

    async fn update_filename(&self, id: &FileId, filename: &str) -> StorageResult<FileRecord>;

    /// Bump `metadata.downloads`. Fails with `NotFound` for unknown ids.
    async fn increment_download_counter(&self, id: &FileId) -> StorageResult<()>;

    async fn delete_one(&self, id: &FileId) -> StorageResult<bool>;

    /// Remove every record in this collection.
    async fn delete_all(&self) -> StorageResult<u64>;
}

/// One record per (file id, chunk index).
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Collection name, e.g. `fs.chunks`.
    fn namespace(&self) -> &str;

    /// Store chunk `n` of a file. Rewriting an index already written is
    /// unspecified; uploads never do it.
    async fn write_chunk(&self, files_id: &FileId, n: u32, data: &[u8]) -> StorageResult<()>;

    async fn read_chunk(&self, files_id: &FileId, n: u32) -> StorageResult<Option<Vec<u8>>>;

    async fn chunk_count(&self, files_id: &FileId) -> StorageResult<u32>;

    async fn delete_chunks(&self, files_id: &FileId) -> StorageResult<u64>;

    async fn delete_all(&self) -> StorageResult<u64>;
}

/// Chunks of a file yielded one at a time in index order.
pub struct ChunkReader {
    store: Arc<dyn ChunkStore>,
    files_id: FileId,
    next_n: u32,
    done: bool,
}

impl ChunkReader {
    pub fn files_id(&self) -> &FileId {
        &self.files_id
    }

    /// Index of the next chunk to be read.
    pub fn position(&self) -> u32 {
        self.next_n
    }

    /// Next chunk, or `None` once the first missing index is reached.
    pub async fn next(&mut self) -> StorageResult<Option<ChunkRecord>> {
        if self.done {
            return Ok(None);
        }
        match self.store.read_chunk(&self.files_id, self.next_n).await? {
            Some(data) => {
                let record = ChunkRecord {
                    files_id: self.files_id,
                    n: self.next_n,
                    data,
                };
                self.next_n += 1;
                Ok(Some(record))
            }
            None => {
                self.done = true;
                Ok(None)
            }
        }
    }
}

/// Open a lazy in-order reader over a file's chunks.
///
/// Fails with `NotFound` when the file has no chunks at all.
pub async fn read_chunks_in_order(
    store: Arc<dyn ChunkStore>,
    files_id: &FileId,
) -> StorageResult<ChunkReader> {
    if store.chunk_count(files_id).await? == 0 {
        return Err(StorageError::NotFound(format!(
            "no chunks for file {} in {}",
            files_id,
            store.namespace()
        )));
    }
    Ok(ChunkReader {
        store,
        files_id: *files_id,
        next_n: 0,
        done: false,
    })
}

//! The bucket façade: a files collection and a chunks collection sharing a
//! prefix and a chunk-size policy.

mod download;
mod revision;
mod upload;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::io::AsyncRead;
use tracing::{info, warn};

use crate::chunk::read_chunk;
use crate::config::{BucketOptions, ReadConcern, ReadPreference};
use crate::error::GridError;
use crate::storage::query::{Cursor, Filter, FindOptions};
use crate::storage::validation::{ValidationManager, ValidationReport};
use crate::storage::{Backend, ChunkStore, MetadataStore};
use crate::{FileId, FileRecord, Metadata, Result};

pub use download::DownloadStream;
pub use revision::{resolve, revision_order, Revision};
pub use upload::UploadStream;

/// Per-upload overrides.
#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Explicit id; generated when absent
    pub id: Option<FileId>,
    /// Overrides the bucket's chunk size for this file only
    pub chunk_size_bytes: Option<u32>,
    /// Sniffed from the first chunk when absent
    pub content_type: Option<String>,
    pub metadata: Option<Metadata>,
}

impl UploadOptions {
    pub fn with_id(mut self, id: FileId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size_bytes: u32) -> Self {
        self.chunk_size_bytes = Some(chunk_size_bytes);
        self
    }

    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Where upload bytes come from.
#[derive(Debug, Clone)]
pub enum UploadSource {
    Bytes(Vec<u8>),
    /// A pre-staged file, optionally removed once the upload succeeded
    Path { path: PathBuf, remove_after: bool },
}

pub struct Bucket {
    options: BucketOptions,
    database: String,
    files: Arc<dyn MetadataStore>,
    chunks: Arc<dyn ChunkStore>,
}

impl Bucket {
    pub fn new(backend: &dyn Backend, options: BucketOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            files: backend.files_collection(&options.bucket_name),
            chunks: backend.chunks_collection(&options.bucket_name),
            database: backend.database_name().to_string(),
            options,
        })
    }

    pub fn bucket_name(&self) -> &str {
        &self.options.bucket_name
    }

    pub fn chunk_size_bytes(&self) -> u32 {
        self.options.chunk_size_bytes
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    pub fn files_collection(&self) -> &Arc<dyn MetadataStore> {
        &self.files
    }

    pub fn chunks_collection(&self) -> &Arc<dyn ChunkStore> {
        &self.chunks
    }

    pub fn read_preference(&self) -> ReadPreference {
        self.options.read_preference
    }

    pub fn read_concern(&self) -> ReadConcern {
        self.options.read_concern
    }

    pub fn options(&self) -> &BucketOptions {
        &self.options
    }

    pub async fn open_upload_stream(
        &self,
        filename: &str,
        options: UploadOptions,
    ) -> Result<UploadStream> {
        validate_filename(filename)?;
        let chunk_size = options.chunk_size_bytes.unwrap_or(self.options.chunk_size_bytes);
        crate::chunk::validate_chunk_size(chunk_size)?;

        let id = match options.id {
            Some(id) => {
                // Chunks are keyed by file id, so a taken id must be refused
                // before anything is written under it.
                if self.find_one(&Filter::by_id(&id), &FindOptions::default()).await?.is_some() {
                    warn!(%id, "upload refused, id already in use");
                    return Err(GridError::DuplicateKey(id.to_string()));
                }
                id
            }
            None => FileId::new(),
        };

        UploadStream::new(upload::UploadParts {
            id,
            filename: filename.to_string(),
            content_type: options.content_type,
            metadata: options.metadata,
            auto_metadata: self.options.add_auto_metadata,
            chunk_size,
            files: Arc::clone(&self.files),
            chunks: Arc::clone(&self.chunks),
        })
    }

    /// Upload everything `source` yields, one chunk in memory at a time.
    pub async fn upload_from_stream<R>(
        &self,
        filename: &str,
        mut source: R,
        options: UploadOptions,
    ) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut stream = self.open_upload_stream(filename, options).await?;
        let chunk_size = stream.chunk_size();
        loop {
            match read_chunk(&mut source, chunk_size).await {
                Ok(Some(data)) => stream.write(&data).await?,
                Ok(None) => break,
                Err(e) => {
                    warn!(filename, error = %e, "upload source failed");
                    if let Err(cleanup) = stream.abort().await {
                        warn!(filename, error = %cleanup, "cleanup after failed upload failed");
                    }
                    return Err(GridError::Write(format!("reading upload source: {}", e)));
                }
            }
        }
        stream.finish().await
    }

    pub async fn upload(
        &self,
        filename: &str,
        source: UploadSource,
        options: UploadOptions,
    ) -> Result<FileRecord> {
        match source {
            UploadSource::Bytes(data) => {
                self.upload_from_stream(filename, data.as_slice(), options).await
            }
            UploadSource::Path { path, remove_after } => {
                let file = fs::File::open(&path).await.map_err(|e| {
                    GridError::Validation(format!("cannot open {}: {}", path.display(), e))
                })?;
                let record = self.upload_from_stream(filename, file, options).await?;
                if remove_after {
                    if let Err(e) = fs::remove_file(&path).await {
                        warn!(path = %path.display(), error = %e, "failed to remove staged file");
                    }
                }
                Ok(record)
            }
        }
    }

    pub async fn open_download_stream(&self, id: &FileId) -> Result<DownloadStream> {
        let record = self.get_file(id).await?;
        self.stream_record(record).await
    }

    pub async fn open_download_stream_by_name(
        &self,
        filename: &str,
        revision: Revision,
    ) -> Result<DownloadStream> {
        let record = resolve(self.files.as_ref(), filename, revision).await?;
        self.stream_record(record).await
    }

    async fn stream_record(&self, record: FileRecord) -> Result<DownloadStream> {
        let counter = self
            .options
            .add_auto_metadata
            .then(|| Arc::clone(&self.files));
        DownloadStream::open(record, Arc::clone(&self.chunks), counter).await
    }

    pub async fn get_file_content(&self, id: &FileId) -> Result<Vec<u8>> {
        self.open_download_stream(id).await?.read_to_end().await
    }

    pub async fn get_file_content_by_name(
        &self,
        filename: &str,
        revision: Revision,
    ) -> Result<Vec<u8>> {
        self.open_download_stream_by_name(filename, revision)
            .await?
            .read_to_end()
            .await
    }

    /// Write a stored file to `directory/<filename>`.
    pub async fn download_to_path(&self, id: &FileId, directory: &Path) -> Result<PathBuf> {
        let stream = self.open_download_stream(id).await?;
        write_into(stream, directory).await
    }

    pub async fn download_to_path_by_name(
        &self,
        filename: &str,
        revision: Revision,
        directory: &Path,
    ) -> Result<PathBuf> {
        let stream = self.open_download_stream_by_name(filename, revision).await?;
        write_into(stream, directory).await
    }

    pub async fn find_one(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Option<FileRecord>> {
        self.files
            .find_one(filter, options)
            .await
            .map_err(|e| GridError::from_read("find_one", e))
    }

    pub async fn find(&self, filter: &Filter, options: &FindOptions) -> Result<Cursor> {
        self.files
            .find(filter, options)
            .await
            .map_err(|e| GridError::from_read("find", e))
    }

    pub async fn get_file(&self, id: &FileId) -> Result<FileRecord> {
        self.find_one(&Filter::by_id(id), &FindOptions::default())
            .await?
            .ok_or_else(|| GridError::NotFound(format!("file {}", id)))
    }

    /// Latest revision stored under `filename`.
    pub async fn get_file_by_name(&self, filename: &str) -> Result<FileRecord> {
        resolve(self.files.as_ref(), filename, Revision::LATEST).await
    }

    pub async fn rename(&self, id: &FileId, new_filename: &str) -> Result<FileRecord> {
        validate_filename(new_filename)?;
        let record = self
            .files
            .update_filename(id, new_filename)
            .await
            .map_err(|e| match e {
                crate::StorageError::NotFound(_) => GridError::NotFound(format!("file {}", id)),
                other => GridError::from_write("rename", other),
            })?;
        info!(%id, filename = new_filename, "renamed file");
        Ok(record)
    }

    /// Delete a file and its chunks. Returns `false` if no record existed.
    pub async fn delete(&self, id: &FileId) -> Result<bool> {
        let chunks = self
            .chunks
            .delete_chunks(id)
            .await
            .map_err(|e| GridError::from_write("delete chunks", e))?;
        let existed = self
            .files
            .delete_one(id)
            .await
            .map_err(|e| GridError::from_write("delete file record", e))?;
        if existed {
            info!(%id, chunks, "deleted file");
        } else {
            warn!(%id, chunks, "delete found no file record");
        }
        Ok(existed)
    }

    /// Remove every file and chunk under this bucket's prefix.
    pub async fn drop_bucket(&self) -> Result<()> {
        let files = self
            .files
            .delete_all()
            .await
            .map_err(|e| GridError::from_write("drop files collection", e))?;
        let chunks = self
            .chunks
            .delete_all()
            .await
            .map_err(|e| GridError::from_write("drop chunks collection", e))?;
        info!(bucket = %self.options.bucket_name, files, chunks, "dropped bucket");
        Ok(())
    }

    /// Best-effort bump of `metadata.downloads`; failures are only logged.
    pub async fn increment_download(&self, id: &FileId) {
        if let Err(e) = self.files.increment_download_counter(id).await {
            warn!(%id, error = %e, "failed to bump download counter");
        }
    }

    /// Check that the stored chunks agree with the file record.
    pub async fn validate(&self, id: &FileId) -> Result<ValidationReport> {
        let record = self.get_file(id).await?;
        ValidationManager::new(Arc::clone(&self.chunks))
            .validate_file(&record)
            .await
    }
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(GridError::Validation("filename must not be empty".to_string()));
    }
    Ok(())
}

async fn write_into(stream: DownloadStream, directory: &Path) -> Result<PathBuf> {
    let name = Path::new(&stream.file().filename)
        .file_name()
        .map(|n| n.to_owned())
        .ok_or_else(|| {
            GridError::Validation(format!(
                "filename {:?} cannot be written to disk",
                stream.file().filename
            ))
        })?;
    let destination = directory.join(name);
    let mut file = fs::File::create(&destination).await.map_err(|e| {
        GridError::Write(format!("cannot create {}: {}", destination.display(), e))
    })?;
    let bytes = stream.copy_to(&mut file).await?;
    info!(path = %destination.display(), bytes, "downloaded file");
    Ok(destination)
}

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use uuid::Uuid;

use super::query::{self, Cursor, Filter, FindOptions};
use super::{chunks_collection_name, files_collection_name, Backend, ChunkStore, MetadataStore};
use crate::error::{StorageError, StorageResult};
use crate::{FileId, FileRecord, DOWNLOADS_KEY};

/// Filesystem backend.
///
/// Layout under `root/<database>/`:
/// - `<prefix>.files/<id>.json` holds one file record
/// - `<prefix>.chunks/<files_id>/<n>` holds the raw bytes of chunk `n`
#[derive(Clone)]
pub struct DiskStorage {
    database: String,
    base_path: PathBuf,
    files: Arc<Mutex<HashMap<String, Arc<DiskFiles>>>>,
    chunks: Arc<Mutex<HashMap<String, Arc<DiskChunks>>>>,
}

impl DiskStorage {
    pub async fn new<P: AsRef<Path>>(root: P, database: &str) -> StorageResult<Self> {
        if database.is_empty() || database.contains(&['/', '\\'][..]) || database.starts_with('.') {
            return Err(StorageError::Unavailable(format!(
                "invalid database name {:?}",
                database
            )));
        }
        let base_path = root.as_ref().join(database);
        fs::create_dir_all(&base_path).await?;
        tracing::debug!(path = %base_path.display(), "opened disk storage");

        Ok(Self {
            database: database.to_string(),
            base_path,
            files: Arc::default(),
            chunks: Arc::default(),
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}

impl Backend for DiskStorage {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn files_collection(&self, prefix: &str) -> Arc<dyn MetadataStore> {
        let name = files_collection_name(prefix);
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let collection = files.entry(name.clone()).or_insert_with(|| {
            Arc::new(DiskFiles {
                metadata_path: self.base_path.join(&name),
                name,
                update_lock: tokio::sync::Mutex::new(()),
            })
        });
        Arc::clone(collection) as Arc<dyn MetadataStore>
    }

    fn chunks_collection(&self, prefix: &str) -> Arc<dyn ChunkStore> {
        let name = chunks_collection_name(prefix);
        let mut chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        let collection = chunks.entry(name.clone()).or_insert_with(|| {
            Arc::new(DiskChunks {
                chunks_path: self.base_path.join(&name),
                name,
            })
        });
        Arc::clone(collection) as Arc<dyn ChunkStore>
    }
}

fn temp_path(dir: &Path) -> PathBuf {
    dir.join(format!(".{}.tmp", Uuid::new_v4()))
}

/// Write through a temporary file and rename, so readers never see a torn file.
async fn write_replace(dir: &Path, path: &Path, data: &[u8]) -> StorageResult<()> {
    let tmp = temp_path(dir);
    fs::write(&tmp, data).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

pub struct DiskFiles {
    name: String,
    metadata_path: PathBuf,
    update_lock: tokio::sync::Mutex<()>,
}

impl DiskFiles {
    fn get_metadata_path(&self, id: &FileId) -> PathBuf {
        self.metadata_path.join(format!("{}.json", id))
    }

    async fn read_record(&self, path: &Path) -> StorageResult<Option<FileRecord>> {
        match fs::read(path).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_records(&self) -> StorageResult<Vec<FileRecord>> {
        let mut records = Vec::new();
        let mut entries = match fs::read_dir(&self.metadata_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match self.read_record(&path).await {
                Ok(Some(record)) => records.push(record),
                // removed between listing and reading
                Ok(None) => {}
                Err(StorageError::Serialization(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(records)
    }

    async fn modify<F>(&self, id: &FileId, change: F) -> StorageResult<FileRecord>
    where
        F: FnOnce(&mut FileRecord) + Send,
    {
        let _guard = self.update_lock.lock().await;
        let path = self.get_metadata_path(id);
        let mut record = self
            .read_record(&path)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        change(&mut record);
        let json = serde_json::to_vec(&record)?;
        write_replace(&self.metadata_path, &path, &json).await?;
        Ok(record)
    }
}

#[async_trait]
impl MetadataStore for DiskFiles {
    fn namespace(&self) -> &str {
        &self.name
    }

    async fn insert(&self, record: FileRecord) -> StorageResult<FileId> {
        fs::create_dir_all(&self.metadata_path).await?;
        let path = self.get_metadata_path(&record.id);
        let json = serde_json::to_vec(&record)?;

        // hard_link refuses to replace an existing record, which makes the
        // insert exclusive without a lock.
        let tmp = temp_path(&self.metadata_path);
        fs::write(&tmp, &json).await?;
        let linked = fs::hard_link(&tmp, &path).await;
        let _ = fs::remove_file(&tmp).await;
        match linked {
            Ok(()) => Ok(record.id),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(StorageError::DuplicateKey(record.id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Cursor> {
        let found = match filter.id_eq() {
            Some(id) => {
                let record = self.read_record(&self.get_metadata_path(&id)).await?;
                query::apply(record, filter, options)
            }
            None => query::apply(self.list_records().await?, filter, options),
        };
        Ok(Cursor::new(found))
    }

    async fn update_filename(&self, id: &FileId, filename: &str) -> StorageResult<FileRecord> {
        let filename = filename.to_string();
        self.modify(id, move |record| record.filename = filename).await
    }

    async fn increment_download_counter(&self, id: &FileId) -> StorageResult<()> {
        self.modify(id, |record| {
            let downloads = record.downloads() + 1;
            record
                .metadata
                .insert(DOWNLOADS_KEY.to_string(), Value::from(downloads));
        })
        .await
        .map(|_| ())
    }

    async fn delete_one(&self, id: &FileId) -> StorageResult<bool> {
        match fs::remove_file(self.get_metadata_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self) -> StorageResult<u64> {
        let count = self.list_records().await?.len() as u64;
        match fs::remove_dir_all(&self.metadata_path).await {
            Ok(()) => Ok(count),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }
}

pub struct DiskChunks {
    name: String,
    chunks_path: PathBuf,
}

impl DiskChunks {
    fn file_dir(&self, files_id: &FileId) -> PathBuf {
        self.chunks_path.join(files_id.to_string())
    }

    fn get_chunk_path(&self, files_id: &FileId, n: u32) -> PathBuf {
        self.file_dir(files_id).join(n.to_string())
    }

    async fn count_in(dir: &Path) -> StorageResult<u32> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_str().is_some_and(|name| name.parse::<u32>().is_ok()) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[async_trait]
impl ChunkStore for DiskChunks {
    fn namespace(&self) -> &str {
        &self.name
    }

    async fn write_chunk(&self, files_id: &FileId, n: u32, data: &[u8]) -> StorageResult<()> {
        let dir = self.file_dir(files_id);
        fs::create_dir_all(&dir).await?;
        write_replace(&dir, &self.get_chunk_path(files_id, n), data).await
    }

    async fn read_chunk(&self, files_id: &FileId, n: u32) -> StorageResult<Option<Vec<u8>>> {
        match fs::read(self.get_chunk_path(files_id, n)).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn chunk_count(&self, files_id: &FileId) -> StorageResult<u32> {
        Self::count_in(&self.file_dir(files_id)).await
    }

    async fn delete_chunks(&self, files_id: &FileId) -> StorageResult<u64> {
        let dir = self.file_dir(files_id);
        let count = Self::count_in(&dir).await?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(count as u64),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete_all(&self) -> StorageResult<u64> {
        let mut total = 0u64;
        let mut entries = match fs::read_dir(&self.chunks_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                total += Self::count_in(&entry.path()).await? as u64;
            }
        }
        fs::remove_dir_all(&self.chunks_path).await?;
        Ok(total)
    }
}

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use super::query::{self, Cursor, Filter, FindOptions};
use super::{chunks_collection_name, files_collection_name, Backend, ChunkStore, MetadataStore};
use crate::error::{StorageError, StorageResult};
use crate::{FileId, FileRecord, DOWNLOADS_KEY};

/// In-process backend. Handles for the same prefix share their data, so two
/// buckets built over one `MemoryBackend` behave like two clients of one
/// database.
#[derive(Clone)]
pub struct MemoryBackend {
    database: String,
    files: Arc<Mutex<HashMap<String, Arc<MemoryFiles>>>>,
    chunks: Arc<Mutex<HashMap<String, Arc<MemoryChunks>>>>,
}

impl MemoryBackend {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            files: Arc::default(),
            chunks: Arc::default(),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl Backend for MemoryBackend {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn files_collection(&self, prefix: &str) -> Arc<dyn MetadataStore> {
        let name = files_collection_name(prefix);
        let mut files = self.files.lock().unwrap_or_else(|e| e.into_inner());
        let collection = files
            .entry(name.clone())
            .or_insert_with(|| Arc::new(MemoryFiles::new(name)));
        Arc::clone(collection) as Arc<dyn MetadataStore>
    }

    fn chunks_collection(&self, prefix: &str) -> Arc<dyn ChunkStore> {
        let name = chunks_collection_name(prefix);
        let mut chunks = self.chunks.lock().unwrap_or_else(|e| e.into_inner());
        let collection = chunks
            .entry(name.clone())
            .or_insert_with(|| Arc::new(MemoryChunks::new(name)));
        Arc::clone(collection) as Arc<dyn ChunkStore>
    }
}

pub struct MemoryFiles {
    name: String,
    records: RwLock<BTreeMap<FileId, FileRecord>>,
}

impl MemoryFiles {
    fn new(name: String) -> Self {
        Self {
            name,
            records: RwLock::new(BTreeMap::new()),
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryFiles {
    fn namespace(&self) -> &str {
        &self.name
    }

    async fn insert(&self, record: FileRecord) -> StorageResult<FileId> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.id) {
            return Err(StorageError::DuplicateKey(record.id.to_string()));
        }
        let id = record.id;
        records.insert(id, record);
        Ok(id)
    }

    async fn find(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Cursor> {
        let records = self.records.read().await;
        let found = match filter.id_eq() {
            Some(id) => query::apply(records.get(&id).cloned(), filter, options),
            None => query::apply(records.values().cloned(), filter, options),
        };
        Ok(Cursor::new(found))
    }

    async fn update_filename(&self, id: &FileId, filename: &str) -> StorageResult<FileRecord> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        record.filename = filename.to_string();
        Ok(record.clone())
    }

    async fn increment_download_counter(&self, id: &FileId) -> StorageResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        let downloads = record.downloads() + 1;
        record
            .metadata
            .insert(DOWNLOADS_KEY.to_string(), Value::from(downloads));
        Ok(())
    }

    async fn delete_one(&self, id: &FileId) -> StorageResult<bool> {
        Ok(self.records.write().await.remove(id).is_some())
    }

    async fn delete_all(&self) -> StorageResult<u64> {
        let mut records = self.records.write().await;
        let count = records.len() as u64;
        records.clear();
        Ok(count)
    }
}

pub struct MemoryChunks {
    name: String,
    chunks: RwLock<HashMap<FileId, BTreeMap<u32, Vec<u8>>>>,
}

impl MemoryChunks {
    fn new(name: String) -> Self {
        Self {
            name,
            chunks: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ChunkStore for MemoryChunks {
    fn namespace(&self) -> &str {
        &self.name
    }

    async fn write_chunk(&self, files_id: &FileId, n: u32, data: &[u8]) -> StorageResult<()> {
        self.chunks
            .write()
            .await
            .entry(*files_id)
            .or_default()
            .insert(n, data.to_vec());
        Ok(())
    }

    async fn read_chunk(&self, files_id: &FileId, n: u32) -> StorageResult<Option<Vec<u8>>> {
        let chunks = self.chunks.read().await;
        Ok(chunks.get(files_id).and_then(|file| file.get(&n)).cloned())
    }

    async fn chunk_count(&self, files_id: &FileId) -> StorageResult<u32> {
        let chunks = self.chunks.read().await;
        Ok(chunks.get(files_id).map_or(0, |file| file.len() as u32))
    }

    async fn delete_chunks(&self, files_id: &FileId) -> StorageResult<u64> {
        let removed = self.chunks.write().await.remove(files_id);
        Ok(removed.map_or(0, |file| file.len() as u64))
    }

    async fn delete_all(&self) -> StorageResult<u64> {
        let mut chunks = self.chunks.write().await;
        let count = chunks.values().map(|file| file.len() as u64).sum();
        chunks.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Metadata;
    use chrono::Utc;

    fn record(name: &str) -> FileRecord {
        FileRecord {
            id: FileId::new(),
            filename: name.to_string(),
            length: 0,
            chunk_size: 8,
            upload_date: Utc::now(),
            content_type: "text/plain".into(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn handles_for_one_prefix_share_data() {
        let backend = MemoryBackend::default();
        let a = backend.files_collection("fs");
        let b = backend.files_collection("fs");
        let other = backend.files_collection("images");

        a.insert(record("x")).await.unwrap();
        assert_eq!(b.find(&Filter::new(), &FindOptions::default()).await.unwrap().count(), 1);
        assert_eq!(other.find(&Filter::new(), &FindOptions::default()).await.unwrap().count(), 0);
        assert_eq!(other.namespace(), "images.files");
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let files = MemoryBackend::default().files_collection("fs");
        let r = record("x");
        files.insert(r.clone()).await.unwrap();
        assert!(matches!(files.insert(r).await, Err(StorageError::DuplicateKey(_))));
    }

    #[tokio::test]
    async fn download_counter_starts_from_missing_key() {
        let files = MemoryBackend::default().files_collection("fs");
        let id = files.insert(record("x")).await.unwrap();
        files.increment_download_counter(&id).await.unwrap();
        files.increment_download_counter(&id).await.unwrap();
        let found = files
            .find_one(&Filter::by_id(&id), &FindOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.downloads(), 2);
        assert!(matches!(
            files.increment_download_counter(&FileId::new()).await,
            Err(StorageError::NotFound(_))
        ));
    }
}

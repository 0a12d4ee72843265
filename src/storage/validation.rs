use std::sync::Arc;

use crate::chunk::expected_chunk_len;
use crate::error::GridError;
use crate::storage::ChunkStore;
use crate::{FileRecord, Result};

/// Summary of a successful integrity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub chunks: u32,
    pub bytes: u64,
}

/// Checks stored chunks against the file record that owns them.
pub struct ValidationManager {
    chunks: Arc<dyn ChunkStore>,
}

impl ValidationManager {
    pub fn new(chunks: Arc<dyn ChunkStore>) -> Self {
        Self { chunks }
    }

    pub async fn validate_file(&self, record: &FileRecord) -> Result<ValidationReport> {
        let expected = record.chunk_count();
        let stored = self
            .chunks
            .chunk_count(&record.id)
            .await
            .map_err(|e| GridError::from_read("count chunks", e))?;
        if stored != expected {
            return Err(GridError::Integrity(format!(
                "file {} expects {} chunks, found {}",
                record.id, expected, stored
            )));
        }

        let mut total_size = 0u64;
        for n in 0..expected {
            let data = self
                .chunks
                .read_chunk(&record.id, n)
                .await
                .map_err(|e| GridError::from_read("read chunk", e))?
                .ok_or_else(|| {
                    GridError::Integrity(format!("chunk {} of file {} is missing", n, record.id))
                })?;
            check_chunk(record, n, data.len())?;
            total_size += data.len() as u64;
        }

        if total_size != record.length {
            return Err(GridError::Integrity(format!(
                "file size mismatch. Expected: {}, Got: {}",
                record.length, total_size
            )));
        }

        Ok(ValidationReport {
            chunks: expected,
            bytes: total_size,
        })
    }
}

/// Verify chunk `n` has the size the record's length and chunk size imply.
pub fn check_chunk(record: &FileRecord, n: u32, actual: usize) -> Result<()> {
    match expected_chunk_len(record.length, record.chunk_size, n) {
        Some(expected) if expected == actual => Ok(()),
        Some(expected) => Err(GridError::Integrity(format!(
            "chunk {} of file {} has {} bytes, expected {}",
            n, record.id, actual, expected
        ))),
        None => Err(GridError::Integrity(format!(
            "file {} has an unexpected chunk {}",
            record.id, n
        ))),
    }
}

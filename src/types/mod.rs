mod metadata;
mod chunk;
mod file;

pub use chunk::ChunkRecord;
pub use file::{ContentTypeDetector, DEFAULT_CONTENT_TYPE};
pub use metadata::{
    merge_metadata, FileId, FileRecord, Metadata, CREATED_AT_KEY, DOWNLOADS_KEY, UPDATED_AT_KEY,
    UUID_KEY,
};

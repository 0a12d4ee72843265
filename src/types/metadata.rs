use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Free-form nested metadata attached to a file.
pub type Metadata = Map<String, Value>;

/// Identifier of a stored file.
///
/// Freshly generated ids are time-ordered (UUIDv7), so sorting by id follows
/// creation order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct FileId(pub Uuid);

impl FileId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for FileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(FileId)
    }
}

/// One logical upload, stored in the `<prefix>.files` collection.
///
/// Field names follow the GridFS files-collection layout so records stay
/// readable by other chunked-store tooling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    #[serde(rename = "_id")]
    pub id: FileId,
    pub filename: String,
    pub length: u64,
    pub chunk_size: u32,
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub upload_date: DateTime<Utc>,
    pub content_type: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl FileRecord {
    /// Number of chunks the file is split into.
    pub fn chunk_count(&self) -> u32 {
        crate::chunk::chunk_count(self.length, self.chunk_size)
    }

    /// Value of the `metadata.downloads` counter, zero when absent.
    pub fn downloads(&self) -> u64 {
        self.metadata
            .get(DOWNLOADS_KEY)
            .and_then(Value::as_u64)
            .unwrap_or(0)
    }
}

pub const UUID_KEY: &str = "uuid";
pub const CREATED_AT_KEY: &str = "created_at";
pub const UPDATED_AT_KEY: &str = "updated_at";
pub const DOWNLOADS_KEY: &str = "downloads";

/// Build the metadata map for a new upload.
///
/// With `auto` set, `uuid`, `created_at`, `updated_at` and `downloads` are
/// populated first and then overwritten by any caller-supplied key.
pub fn merge_metadata(auto: bool, now: DateTime<Utc>, supplied: Option<Metadata>) -> Metadata {
    let mut merged = Metadata::new();
    if auto {
        let stamp = Value::String(now.to_rfc3339());
        merged.insert(UUID_KEY.to_string(), Value::String(Uuid::new_v4().to_string()));
        merged.insert(CREATED_AT_KEY.to_string(), stamp.clone());
        merged.insert(UPDATED_AT_KEY.to_string(), stamp);
        merged.insert(DOWNLOADS_KEY.to_string(), Value::from(0u64));
    }
    if let Some(supplied) = supplied {
        merged.extend(supplied);
    }
    merged
}

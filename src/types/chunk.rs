use serde::{Deserialize, Serialize};

use super::FileId;

/// One fragment of a file, stored in the `<prefix>.chunks` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkRecord {
    pub files_id: FileId,
    pub n: u32,
    pub data: Vec<u8>,
}

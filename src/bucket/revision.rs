use std::fmt;

use crate::error::GridError;
use crate::storage::query::{Filter, FindOptions, SortOrder};
use crate::storage::MetadataStore;
use crate::{FileRecord, Result};

/// Which upload of a filename to serve.
///
/// Non-negative values count from the first upload (`0` is the original);
/// negative values count back from the newest (`-1` is the latest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Revision(pub i64);

impl Revision {
    pub const ORIGINAL: Revision = Revision(0);
    pub const LATEST: Revision = Revision(-1);

    /// Position among `count` uploads, if this revision exists.
    pub fn index_for(self, count: usize) -> Option<usize> {
        let count = i64::try_from(count).ok()?;
        let index = if self.0 >= 0 { self.0 } else { count + self.0 };
        (0..count).contains(&index).then_some(index as usize)
    }
}

impl Default for Revision {
    fn default() -> Self {
        Revision::LATEST
    }
}

impl From<i64> for Revision {
    fn from(value: i64) -> Self {
        Revision(value)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Upload order: by `uploadDate`, ties broken by id.
pub fn revision_order() -> FindOptions {
    FindOptions::default()
        .sort_by("uploadDate", SortOrder::Ascending)
        .sort_by("_id", SortOrder::Ascending)
}

/// Pick the record for `revision` among all uploads named `filename`.
pub async fn resolve(
    files: &dyn MetadataStore,
    filename: &str,
    revision: Revision,
) -> Result<FileRecord> {
    let mut history: Vec<FileRecord> = files
        .find(&Filter::by_filename(filename), &revision_order())
        .await
        .map_err(|e| GridError::from_read("resolve revision", e))?
        .collect();

    if history.is_empty() {
        return Err(GridError::NotFound(format!("no file named {:?}", filename)));
    }

    let count = history.len();
    let index = revision.index_for(count).ok_or_else(|| {
        GridError::NotFound(format!(
            "revision {} of {:?} does not exist ({} revisions)",
            revision, filename, count
        ))
    })?;
    tracing::debug!(filename, %revision, index, count, "resolved revision");
    Ok(history.swap_remove(index))
}

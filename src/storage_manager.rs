use std::sync::Arc;

use gridstore::storage::disk::DiskStorage;
use gridstore::{Bucket, BucketRegistry, Config, GridError, Result};

/// Composition root for the command line: one disk database and the
/// buckets opened on it.
pub struct StorageManager {
    registry: BucketRegistry,
}

impl StorageManager {
    pub async fn new(config: &Config) -> Result<Self> {
        let storage = DiskStorage::new(&config.database.root, &config.database.name)
            .await
            .map_err(|e| {
                GridError::Connection(format!(
                    "cannot open {}: {}",
                    config.database.root.display(),
                    e
                ))
            })?;
        let registry = BucketRegistry::new(Arc::new(storage), config.bucket.clone())?;
        Ok(Self { registry })
    }

    pub fn bucket(&self) -> Result<Arc<Bucket>> {
        self.registry.default_bucket()
    }
}

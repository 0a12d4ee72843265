use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::bucket::Bucket;
use crate::config::BucketOptions;
use crate::storage::Backend;
use crate::Result;

/// Explicit map from prefix to bucket, owned by whoever composes the
/// application. Buckets requested for a new prefix inherit the default
/// options with only the prefix swapped.
pub struct BucketRegistry {
    backend: Arc<dyn Backend>,
    defaults: BucketOptions,
    buckets: RwLock<HashMap<String, Arc<Bucket>>>,
}

impl BucketRegistry {
    pub fn new(backend: Arc<dyn Backend>, defaults: BucketOptions) -> Result<Self> {
        defaults.validate()?;
        Ok(Self {
            backend,
            defaults,
            buckets: RwLock::new(HashMap::new()),
        })
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    pub fn default_bucket(&self) -> Result<Arc<Bucket>> {
        self.bucket(&self.defaults.bucket_name)
    }

    pub fn bucket(&self, prefix: &str) -> Result<Arc<Bucket>> {
        if let Some(bucket) = self
            .buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(prefix)
        {
            return Ok(Arc::clone(bucket));
        }
        self.register(self.defaults.clone().with_prefix(prefix))
    }

    /// Build a bucket with its own options, replacing any cached one for the prefix.
    pub fn register(&self, options: BucketOptions) -> Result<Arc<Bucket>> {
        let prefix = options.bucket_name.clone();
        let bucket = Arc::new(Bucket::new(self.backend.as_ref(), options)?);
        self.buckets
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(prefix.clone(), Arc::clone(&bucket));
        tracing::debug!(%prefix, "registered bucket");
        Ok(bucket)
    }

    pub fn prefixes(&self) -> Vec<String> {
        let mut prefixes: Vec<String> = self
            .buckets
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        prefixes.sort();
        prefixes
    }
}

//! Configuration for buckets and the database they live in

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::chunk::DEFAULT_CHUNK_SIZE;
use crate::{GridError, Result};

/// Default storage directory
pub fn default_storage_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gridstore")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadPreference {
    Primary,
    #[default]
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReadConcern {
    Local,
    #[default]
    Available,
    Majority,
    Linearizable,
    Snapshot,
}

/// Per-bucket policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketOptions {
    /// Collection prefix; files live in `<prefix>.files`, chunks in `<prefix>.chunks`
    #[serde(default = "default_prefix", alias = "prefix", alias = "bucketName")]
    pub bucket_name: String,

    /// Chunk size for new uploads; existing files keep their own
    #[serde(default = "default_chunk_size", alias = "chunkSizeBytes")]
    pub chunk_size_bytes: u32,

    /// Passed through to the backend untouched
    #[serde(default, alias = "readPreference")]
    pub read_preference: ReadPreference,

    /// Passed through to the backend untouched
    #[serde(default, alias = "readConcern")]
    pub read_concern: ReadConcern,

    /// Populate `uuid`, `created_at`, `updated_at` and `downloads` on upload
    #[serde(default = "default_true", alias = "add_meta", alias = "addAutoMetadata")]
    pub add_auto_metadata: bool,
}

fn default_prefix() -> String {
    "fs".to_string()
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_true() -> bool {
    true
}

impl Default for BucketOptions {
    fn default() -> Self {
        Self {
            bucket_name: default_prefix(),
            chunk_size_bytes: DEFAULT_CHUNK_SIZE,
            read_preference: ReadPreference::default(),
            read_concern: ReadConcern::default(),
            add_auto_metadata: true,
        }
    }
}

impl BucketOptions {
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.bucket_name = prefix.to_string();
        self
    }

    pub fn with_chunk_size(mut self, chunk_size_bytes: u32) -> Self {
        self.chunk_size_bytes = chunk_size_bytes;
        self
    }

    pub fn with_auto_metadata(mut self, enabled: bool) -> Self {
        self.add_auto_metadata = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        validate_prefix(&self.bucket_name)?;
        crate::chunk::validate_chunk_size(self.chunk_size_bytes)
    }
}

/// Prefixes become collection names, so they must be path-safe.
pub fn validate_prefix(prefix: &str) -> Result<()> {
    if prefix.is_empty() {
        return Err(GridError::Validation("bucket prefix must not be empty".into()));
    }
    if prefix.starts_with('.') || prefix.contains(&['/', '\\', '\0'][..]) {
        return Err(GridError::Validation(format!(
            "bucket prefix {:?} is not a valid collection name",
            prefix
        )));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database")]
    pub name: String,

    /// Directory holding one subdirectory per database
    #[serde(default = "default_storage_dir")]
    pub root: PathBuf,
}

fn default_database() -> String {
    "gridstore".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_database(),
            root: default_storage_dir(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub bucket: BucketOptions,
}

impl Config {
    /// Read an optional JSON file, then apply `GRIDSTORE_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    GridError::Validation(format!("cannot read config {}: {}", path.display(), e))
                })?;
                serde_json::from_str(&content).map_err(|e| {
                    GridError::Validation(format!("invalid config {}: {}", path.display(), e))
                })?
            }
            None => Config::default(),
        };
        config.apply_env(|key| env::var(key).ok())?;
        config.bucket.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = var("GRIDSTORE_DATABASE") {
            self.database.name = name;
        }
        if let Some(root) = var("GRIDSTORE_ROOT") {
            self.database.root = PathBuf::from(root);
        }
        if let Some(prefix) = var("GRIDSTORE_PREFIX") {
            self.bucket.bucket_name = prefix;
        }
        if let Some(size) = var("GRIDSTORE_CHUNK_SIZE") {
            self.bucket.chunk_size_bytes = size.parse().map_err(|_| {
                GridError::Validation(format!("GRIDSTORE_CHUNK_SIZE {:?} is not a number", size))
            })?;
        }
        if let Some(flag) = var("GRIDSTORE_AUTO_METADATA") {
            self.bucket.add_auto_metadata = matches!(flag.as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(())
    }
}

pub mod bucket;
pub mod chunk;
pub mod config;
pub mod error;
pub mod registry;
pub mod storage;

mod types;

pub use bucket::{Bucket, DownloadStream, Revision, UploadOptions, UploadSource, UploadStream};
pub use config::{BucketOptions, Config};
pub use error::{GridError, Result, StorageError};
pub use registry::BucketRegistry;
pub use storage::query::{Filter, FindOptions, SortOrder};
pub use types::*;

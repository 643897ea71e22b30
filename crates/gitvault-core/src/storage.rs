//! Object storage abstraction the engine runs against.
//!
//! Real deployments use the S3 backend from `gitvault-storage`; tests use
//! [`crate::testutil::MemoryStorage`]. Listing is part of the interface for
//! administrative cleanup only: the sync pipeline and the retention engine
//! must never enumerate the bucket.

use std::path::Path;

use crate::error::Result;

pub trait ObjectStorage: Send + Sync {
    /// Read a UTF-8 object. Returns `None` when the key does not exist.
    fn get_text(&self, key: &str) -> Result<Option<String>>;

    /// Write a UTF-8 object, overwriting any existing content.
    fn put_text(&self, key: &str, body: &str) -> Result<()>;

    /// Pack the contents of `local_path` (no base directory) into a `tar.gz`
    /// stream and store it at `key`. Implementations may suppress the upload
    /// when the remote already holds an archive with a matching content
    /// hash; they still report success in that case.
    fn upload_dir_as_tar_gz(&self, local_path: &Path, key: &str) -> Result<()>;

    /// Delete objects by exact key. Batches of up to 1000; deleting a key
    /// that does not exist is not an error.
    fn delete_objects(&self, keys: &[String]) -> Result<()>;

    /// Delete every object under a prefix. Explicit cleanup paths only.
    fn delete_prefix(&self, prefix: &str) -> Result<()>;

    /// List keys under a prefix. Administrative use only.
    fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;
}

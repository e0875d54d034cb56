//! Backup storage backend abstraction
//!
//! Every remote target a backup can be shipped to (WebDAV today) exposes
//! the same narrow set of file operations, addressed by `/`-separated
//! remote paths.

use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;

pub mod webdav;

pub use webdav::WebDavBackend;

/// Core storage backend trait that all backup targets implement
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Top-level containers of the account. Backends without such a notion
    /// return an empty list.
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Copy the local file `src` to the remote path `target`, creating
    /// missing parent directories
    async fn upload(&self, src: &Path, target: &str) -> Result<()>;

    /// Copy the remote path `src` to the local file `target`
    async fn download(&self, src: &str, target: &Path) -> Result<()>;

    async fn exist(&self, path: &str) -> Result<bool>;

    /// Size in bytes of the remote file
    async fn size(&self, path: &str) -> Result<i64>;

    /// Remove a remote file or directory tree; a missing path is not an error
    async fn delete(&self, path: &str) -> Result<()>;

    /// Names of the entries directly under `prefix`
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;

    /// Get a human-readable identifier for this storage backend type
    fn storage_type(&self) -> &'static str;
}

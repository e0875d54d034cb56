//! WebDAV storage backend implementation

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tracing::{debug, info};

use crate::config::DavConfig;
use crate::services::webdav::common::join;
use crate::services::webdav::WebDavClient;

use super::StorageBackend;

/// Backup target on a WebDAV share. Every path is resolved below the
/// configured bucket directory.
#[derive(Clone)]
pub struct WebDavBackend {
    client: WebDavClient,
    bucket: String,
}

impl WebDavBackend {
    /// Builds the client and probes the server; an unreachable or
    /// unauthorized server fails construction.
    pub async fn new(config: &DavConfig) -> Result<Self> {
        let client = WebDavClient::from_config(config)
            .with_context(|| format!("Invalid WebDAV configuration for {}", config.address))?;
        client
            .connect()
            .await
            .with_context(|| format!("Failed to connect to WebDAV server {}", config.address))?;

        info!("✅ WebDAV storage backend ready at {} (bucket '{}')", client.root(), config.bucket);
        Ok(Self::with_client(client, config.bucket.clone()))
    }

    /// Builds from a backup account's variable map
    pub async fn from_vars(vars: &HashMap<String, Value>) -> Result<Self> {
        let config = DavConfig::from_vars(vars).context("Invalid WebDAV account variables")?;
        Self::new(&config).await
    }

    /// Wraps an existing client without probing it
    pub fn with_client(client: WebDavClient, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    pub fn client(&self) -> &WebDavClient {
        &self.client
    }

    pub fn remote_path(&self, path: &str) -> String {
        join(&self.bucket, path)
    }
}

#[async_trait]
impl StorageBackend for WebDavBackend {
    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn upload(&self, src: &Path, target: &str) -> Result<()> {
        let remote = self.remote_path(target);
        let file = fs::File::open(src)
            .await
            .with_context(|| format!("Failed to open {}", src.display()))?;

        self.client
            .write_file(&remote, file)
            .await
            .with_context(|| format!("Failed to upload {} to {}", src.display(), remote))?;
        info!("📤 Uploaded {} to {}", src.display(), remote);
        Ok(())
    }

    async fn download(&self, src: &str, target: &Path) -> Result<()> {
        let remote = self.remote_path(src);
        let info = self
            .client
            .stat(&remote)
            .await
            .with_context(|| format!("Failed to stat {}", remote))?;

        if let Ok(local) = fs::metadata(target).await {
            if local.is_file() && local.len() as i64 == info.size {
                debug!("Skipping download of {}: {} already has {} bytes", remote, target.display(), info.size);
                return Ok(());
            }
        }

        let mut reader = self
            .client
            .read_stream(&remote)
            .await
            .with_context(|| format!("Failed to read {}", remote))?;
        let mut file = fs::File::create(target)
            .await
            .with_context(|| format!("Failed to create {}", target.display()))?;
        let copied = tokio::io::copy(&mut reader, &mut file)
            .await
            .with_context(|| format!("Failed to download {} to {}", remote, target.display()))?;

        info!("📥 Downloaded {} ({} bytes) to {}", remote, copied, target.display());
        Ok(())
    }

    async fn exist(&self, path: &str) -> Result<bool> {
        match self.client.stat(&self.remote_path(path)).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn size(&self, path: &str) -> Result<i64> {
        let remote = self.remote_path(path);
        let info = self
            .client
            .stat(&remote)
            .await
            .with_context(|| format!("Failed to stat {}", remote))?;
        Ok(info.size)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let remote = self.remote_path(path);
        self.client
            .remove_all(&remote)
            .await
            .with_context(|| format!("Failed to delete {}", remote))?;
        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let remote = self.remote_path(prefix);
        let files = self
            .client
            .read_dir(&remote)
            .await
            .with_context(|| format!("Failed to list {}", remote))?;
        Ok(files.into_iter().map(|f| f.name).collect())
    }

    fn storage_type(&self) -> &'static str {
        "webdav"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend(bucket: &str) -> WebDavBackend {
        let client = WebDavClient::new("http://dav.example.com/dav/", "u", "p").expect("client");
        WebDavBackend::with_client(client, bucket)
    }

    #[test]
    fn test_remote_path_joins_bucket() {
        assert_eq!(backend("panel").remote_path("db/backup.sql.gz"), "panel/db/backup.sql.gz");
        assert_eq!(backend("/panel/").remote_path("/db/"), "/panel/db/");
        assert_eq!(backend("").remote_path("a.tar"), "/a.tar");
    }

    #[tokio::test]
    async fn test_list_buckets_is_empty() {
        let b = backend("panel");
        assert!(b.list_buckets().await.expect("buckets").is_empty());
        assert_eq!(b.storage_type(), "webdav");
    }
}

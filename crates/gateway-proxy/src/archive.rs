//! Optional archival of fetched node files to object storage.
//!
//! The storage client itself lives outside this crate; the service only needs
//! to configure it from module settings and hand it finished files.

use async_trait::async_trait;
use std::path::Path;

/// Connection settings taken from `wpBlobConnectionString` and
/// `wpBlobContainerName`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOptions {
    pub connection_string: String,
    pub container_name: String,
}

impl ArchiveOptions {
    /// Both values set, or nothing to configure.
    pub fn from_settings(connection_string: &str, container_name: &str) -> Option<Self> {
        if connection_string.is_empty() || container_name.is_empty() {
            return None;
        }
        Some(Self {
            connection_string: connection_string.to_string(),
            container_name: container_name.to_string(),
        })
    }
}

/// Object storage that fetched files are copied into.
#[async_trait]
pub trait ArchiveStore: Send + Sync {
    async fn configure(&self, options: &ArchiveOptions) -> anyhow::Result<()>;

    /// Store the file under `blob_name` and return its URL.
    async fn put_file(
        &self,
        local_path: &Path,
        blob_name: &str,
        content_type: &str,
    ) -> anyhow::Result<String>;
}

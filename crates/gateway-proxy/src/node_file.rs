//! Fetched node files: one JSON array written page by page.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

/// `fetchNodes-<yyyyMMdd-HHmmss>.json` for the given UTC time.
pub fn fetched_nodes_filename(at: DateTime<Utc>) -> String {
    format!("fetchNodes-{}.json", at.format("%Y%m%d-%H%M%S"))
}

/// Streams nodes into a JSON array file without holding them in memory.
pub struct NodeFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    nodes_written: usize,
}

impl NodeFileWriter {
    /// Create the file (and its directory) and open the array.
    pub async fn create(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        let file = File::create(&path)
            .await
            .with_context(|| format!("creating {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        writer.write_all(b"[").await?;

        Ok(Self {
            path,
            writer,
            nodes_written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn nodes_written(&self) -> usize {
        self.nodes_written
    }

    /// Append one page of nodes.
    pub async fn append(&mut self, nodes: &[Value]) -> anyhow::Result<()> {
        for node in nodes {
            if self.nodes_written > 0 {
                self.writer.write_all(b",").await?;
            }
            let encoded = serde_json::to_vec(node)?;
            self.writer
                .write_all(&encoded)
                .await
                .with_context(|| format!("writing {}", self.path.display()))?;
            self.nodes_written += 1;
        }
        Ok(())
    }

    /// Close the array and flush to disk.
    pub async fn finish(mut self) -> anyhow::Result<PathBuf> {
        self.writer.write_all(b"]").await?;
        self.writer
            .flush()
            .await
            .with_context(|| format!("flushing {}", self.path.display()))?;
        Ok(self.path)
    }
}

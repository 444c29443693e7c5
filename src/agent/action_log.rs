//! Persistent action log
//!
//! Appending is fire-and-forget for the run loop: a failed write is logged
//! and never stops an objective.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::core::{ActionResult, Result};

#[async_trait]
pub trait ActionLog: Send + Sync {
    async fn append(&self, result: &ActionResult) -> Result<()>;
}

/// One JSON object per line
#[derive(Debug, Clone)]
pub struct JsonlActionLog {
    path: PathBuf,
}

impl JsonlActionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ActionLog for JsonlActionLog {
    async fn append(&self, result: &ActionResult) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_string(result)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

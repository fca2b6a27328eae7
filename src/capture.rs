use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Append-only record of captured character names, one timestamped line each
#[derive(Debug, Clone)]
pub struct CaptureLog {
    path: PathBuf,
}

impl CaptureLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `name` and return how many captures the file now holds.
    ///
    /// Only a failed write is an error. If the line is written but the file
    /// cannot be counted afterwards, the total is `None`.
    pub async fn append(&self, name: &str) -> Result<Option<usize>> {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let line = format!("[{}] {}\n", timestamp, name);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("Failed to open capture log: {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .await
            .with_context(|| format!("Failed to write capture log: {}", self.path.display()))?;
        file.flush().await?;

        match self.count().await {
            Ok(total) => {
                info!("Total collected characters: {}", total);
                Ok(Some(total))
            }
            Err(e) => {
                warn!("Could not count collected characters: {:#}", e);
                Ok(None)
            }
        }
    }

    /// Non-empty lines, ignoring `#` comments.
    pub async fn count(&self) -> Result<usize> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to read capture log: {}", self.path.display())
                })
            }
        };
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty() && !line.starts_with('#'))
            .count())
    }
}

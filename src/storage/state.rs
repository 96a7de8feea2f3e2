//! Persisted last-processed identifier of one source.
//!
//! The file holds a single line. Reads never fail: a missing, empty or
//! unreadable file means "no prior state". Writes replace the file
//! atomically and surface failures as [`AppError::Persistence`].

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::storage::local::write_atomic;

#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last processed id, if any.
    pub async fn load(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content
                .lines()
                .next()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                log::warn!(
                    "State file {} unreadable ({e}); treating as first run",
                    self.path.display()
                );
                None
            }
        }
    }

    /// Persist `id` as the last processed id.
    pub async fn store(&self, id: &str) -> Result<()> {
        write_atomic(&self.path, id.as_bytes())
            .await
            .map_err(|e| AppError::persistence(format!("{}: {e}", self.path.display())))
    }
}

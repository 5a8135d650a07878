use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Discovery progress persisted between runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    #[serde(default)]
    pub clicks_completed: u64,
}

/// JSON file holding the [`Checkpoint`], replaced atomically on save.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint. A missing file is a fresh start; an unreadable
    /// or malformed one is logged and also treated as a fresh start.
    pub async fn load(&self) -> Checkpoint {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Checkpoint::default(),
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not read collector state, starting fresh"
                );
                return Checkpoint::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Could not parse collector state, starting fresh"
                );
                Checkpoint::default()
            }
        }
    }

    /// Write to a sibling temp file, then rename it over the target so
    /// readers never observe a partial document.
    pub async fn save(&self, checkpoint: &Checkpoint) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec(checkpoint)?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, payload).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

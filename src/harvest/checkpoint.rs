use super::models::ResumeCheckpoint;
use crate::utils::write_atomic;
use crate::{HarvestError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub trait CheckpointStore: Send + Sync {
    fn load(&self) -> Result<Option<ResumeCheckpoint>>;

    /// Replaces the stored checkpoint. A crash mid-save leaves the previous
    /// value readable.
    fn save(&self, checkpoint: &ResumeCheckpoint) -> Result<()>;
}

pub struct FileCheckpointStore {
    path: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn load(&self) -> Result<Option<ResumeCheckpoint>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(HarvestError::resource("checkpoint", e)),
        };

        let checkpoint = serde_json::from_str(&content).map_err(|e| {
            HarvestError::resource(
                "checkpoint",
                std::io::Error::new(ErrorKind::InvalidData, e),
            )
        })?;

        tracing::debug!("Loaded checkpoint {:?}", checkpoint);
        Ok(Some(checkpoint))
    }

    fn save(&self, checkpoint: &ResumeCheckpoint) -> Result<()> {
        let json = serde_json::to_vec(checkpoint)?;
        write_atomic(&self.path, &json).map_err(|e| HarvestError::resource("checkpoint", e))?;
        tracing::debug!(
            "Checkpoint saved: page {} {}",
            checkpoint.page_number,
            checkpoint.item_url
        );
        Ok(())
    }
}

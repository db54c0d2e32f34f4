use super::models::{AssetIdentity, MetadataRecord, SavedArtifact};
use crate::utils::write_atomic;
use crate::{HarvestError, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub trait ArtifactStore: Send + Sync {
    fn exists(&self, identity: &AssetIdentity) -> Result<bool>;

    /// Callers check [`ArtifactStore::exists`] first; `put` does not dedup.
    fn put(&self, identity: &AssetIdentity, artifact: &SavedArtifact) -> Result<()>;
}

/// Assets in one directory, JSON metadata sidecars in another, both named
/// after the asset's base name.
///
/// The asset directory is listed once, on the first `exists`, and the
/// resulting set of base names is kept in step with `put` afterwards.
/// Files dropped into the directory by another process after that first
/// listing are not seen until a new store is built.
pub struct FsArtifactStore {
    asset_dir: PathBuf,
    metadata_dir: PathBuf,
    stems: Mutex<Option<HashSet<String>>>,
}

impl FsArtifactStore {
    pub fn new(asset_dir: impl Into<PathBuf>, metadata_dir: impl Into<PathBuf>) -> Self {
        Self {
            asset_dir: asset_dir.into(),
            metadata_dir: metadata_dir.into(),
            stems: Mutex::new(None),
        }
    }

    pub fn asset_dir(&self) -> &Path {
        &self.asset_dir
    }

    pub fn metadata_dir(&self) -> &Path {
        &self.metadata_dir
    }

    pub fn metadata_path(&self, identity: &AssetIdentity) -> PathBuf {
        self.metadata_dir
            .join(format!("{}.json", identity.base_name()))
    }

    /// Number of stored assets.
    pub fn count(&self) -> Result<usize> {
        if !self.asset_dir.exists() {
            return Ok(0);
        }

        Ok(std::fs::read_dir(&self.asset_dir)
            .map_err(|e| HarvestError::resource("asset directory", e))?
            .flatten()
            .filter(|entry| entry.path().is_file() && !is_partial(&entry.path()))
            .count())
    }

    fn scan_stems(&self) -> Result<HashSet<String>> {
        if !self.asset_dir.exists() {
            return Ok(HashSet::new());
        }

        let entries = std::fs::read_dir(&self.asset_dir)
            .map_err(|e| HarvestError::resource("asset directory", e))?;

        let stems: HashSet<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| !is_partial(path))
            .filter_map(|path| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();

        tracing::debug!(
            "Indexed {} stored assets in {}",
            stems.len(),
            self.asset_dir.display()
        );
        Ok(stems)
    }
}

fn is_partial(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "tmp")
}

impl ArtifactStore for FsArtifactStore {
    fn exists(&self, identity: &AssetIdentity) -> Result<bool> {
        let mut stems = self.stems.lock().unwrap_or_else(PoisonError::into_inner);
        if stems.is_none() {
            *stems = Some(self.scan_stems()?);
        }
        Ok(stems
            .as_ref()
            .is_some_and(|stems| stems.contains(&identity.base_name())))
    }

    fn put(&self, identity: &AssetIdentity, artifact: &SavedArtifact) -> Result<()> {
        // Metadata goes first so that a present asset always has its sidecar.
        let record = MetadataRecord::from(artifact);
        let json = serde_json::to_vec_pretty(&record)?;
        write_atomic(&self.metadata_path(identity), &json)
            .map_err(|e| HarvestError::resource(format!("metadata for {}", identity), e))?;

        let asset_path = self.asset_dir.join(&artifact.file_name);
        write_atomic(&asset_path, &artifact.bytes)
            .map_err(|e| HarvestError::resource(format!("asset {}", artifact.file_name), e))?;

        let mut stems = self.stems.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(stems) = stems.as_mut()
            && let Some(stem) = asset_path.file_stem()
        {
            stems.insert(stem.to_string_lossy().into_owned());
        }

        tracing::info!(
            "Saved {} ({} bytes)",
            artifact.file_name,
            artifact.bytes.len()
        );
        Ok(())
    }
}

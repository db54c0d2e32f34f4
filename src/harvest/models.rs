use crate::chrome::ElementHandle;
use crate::{HarvestError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

static ASSET_FILE_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)_p(\d+)\.([A-Za-z0-9]+)").expect("static regex"));
static ITEM_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("static regex"));

/// Last item whose assets were fully saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeCheckpoint {
    #[serde(rename = "bookmarkPageNum")]
    pub page_number: u32,
    #[serde(rename = "url")]
    pub item_url: String,
}

impl ResumeCheckpoint {
    pub fn new(page_number: u32, item_url: impl Into<String>) -> Self {
        Self {
            page_number,
            item_url: item_url.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Animated items have no single downloadable asset.
    Unsupported,
    Single,
    Multi(u32),
}

impl Variant {
    pub fn asset_count(&self) -> u32 {
        match self {
            Self::Unsupported => 0,
            Self::Single => 1,
            Self::Multi(count) => *count,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "unsupported"),
            Self::Single => write!(f, "single"),
            Self::Multi(count) => write!(f, "multi({})", count),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectionItem {
    pub url: String,
    pub variant: Variant,
    pub handle: ElementHandle,
}

#[derive(Debug, Clone)]
pub struct CollectionPage {
    pub page_number: u32,
    pub items: Vec<CollectionItem>,
}

impl CollectionPage {
    pub fn contains(&self, item_url: &str) -> bool {
        self.items.iter().any(|item| item.url == item_url)
    }
}

/// Dedup key of one saved sub-asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetIdentity {
    pub item_id: String,
    pub sub_index: u32,
}

impl AssetIdentity {
    /// Identity predicted from the item page URL, before any asset is fetched.
    pub fn from_item_url(item_url: &str, sub_index: u32) -> Result<Self> {
        let item_id = ITEM_ID
            .find(item_url)
            .ok_or_else(|| {
                HarvestError::StructuralDrift(format!("No item id in URL {}", item_url))
            })?
            .as_str()
            .to_string();

        Ok(Self { item_id, sub_index })
    }

    /// Identity and file name taken from a full-resolution asset URL.
    pub fn from_asset_url(asset_url: &str) -> Result<(Self, String)> {
        let file_part = asset_url
            .split(['?', '#'])
            .next()
            .unwrap_or(asset_url)
            .rsplit('/')
            .next()
            .unwrap_or(asset_url);

        let caps = ASSET_FILE_NAME.captures(file_part).ok_or_else(|| {
            HarvestError::StructuralDrift(format!("Unexpected asset URL {}", asset_url))
        })?;

        let sub_index = caps[2].parse().map_err(|_| {
            HarvestError::StructuralDrift(format!("Sub-asset index out of range in {}", asset_url))
        })?;

        Ok((
            Self {
                item_id: caps[1].to_string(),
                sub_index,
            },
            caps[0].to_string(),
        ))
    }

    /// `<itemID>_p<subIndex>`, shared by the asset file and its metadata record.
    pub fn base_name(&self) -> String {
        format!("{}_p{}", self.item_id, self.sub_index)
    }
}

impl fmt::Display for AssetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub title: String,
    pub author: String,
    pub author_page: String,
    pub posting_date: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SavedArtifact {
    pub file_name: String,
    pub item_url: String,
    pub bytes: Vec<u8>,
    pub metadata: ArtifactMetadata,
}

/// On-disk shape of the metadata sidecar.
#[derive(Debug, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub url: String,
    #[serde(flatten)]
    pub metadata: ArtifactMetadata,
    #[serde(rename = "tagsNum")]
    pub tag_count: usize,
    pub file_name: String,
}

impl From<&SavedArtifact> for MetadataRecord {
    fn from(artifact: &SavedArtifact) -> Self {
        Self {
            url: artifact.item_url.clone(),
            tag_count: artifact.metadata.tags.len(),
            metadata: artifact.metadata.clone(),
            file_name: artifact.file_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HarvestSummary {
    pub pages_walked: u32,
    pub items_seen: u32,
    pub items_skipped_unsupported: u32,
    pub assets_saved: u32,
    pub assets_already_present: u32,
}

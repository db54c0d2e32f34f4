//! The resumable harvest engine.
//!
//! [`CollectionDriver`] resolves where to start, walks the collection from
//! the oldest unsaved page towards page 1 and hands every item to the
//! [`ItemExtractor`]. Durable state lives behind [`CheckpointStore`] and
//! [`ArtifactStore`].

pub mod artifacts;
pub mod checkpoint;
pub mod classifier;
pub mod driver;
pub mod extractor;
pub mod metadata;
pub mod models;
pub mod paginator;
pub mod retry;

pub use artifacts::{ArtifactStore, FsArtifactStore};
pub use checkpoint::{CheckpointStore, FileCheckpointStore};
pub use classifier::ItemClassifier;
pub use driver::{Collaborators, CollectionDriver, DriverState, HarvestFailure, Position};
pub use extractor::{ExtractOutcome, ItemExtractor};
pub use models::{
    ArtifactMetadata, AssetIdentity, CollectionItem, CollectionPage, HarvestSummary,
    ResumeCheckpoint, SavedArtifact, Variant,
};
pub use paginator::CollectionPaginator;
pub use retry::{Backoff, PollOutcome, RetryPolicy};

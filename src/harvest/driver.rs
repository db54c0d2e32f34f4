use super::artifacts::ArtifactStore;
use super::checkpoint::CheckpointStore;
use super::extractor::ItemExtractor;
use super::models::HarvestSummary;
use super::paginator::CollectionPaginator;
use crate::chrome::{BrowserSurfaces, PageClient, SessionStore};
use crate::run_log::RunLog;
use crate::{Config, HarvestError, Result};
use std::fmt;
use thiserror::Error;

/// Walk cursor, reported with every fatal error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    pub page_number: u32,
    pub item_index: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.page_number, self.item_index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Resolving,
    Walking(u32),
    ProcessingItem { page: u32, index: u32 },
    Finished,
    Fatal,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolving => write!(f, "resolving start page"),
            Self::Walking(page) => write!(f, "walking page {}", page),
            Self::ProcessingItem { page, index } => {
                write!(f, "processing item {} of page {}", index, page)
            }
            Self::Finished => write!(f, "finishing"),
            Self::Fatal => write!(f, "failed"),
        }
    }
}

#[derive(Debug, Error)]
#[error("[{position}] {error} (while {state})")]
pub struct HarvestFailure {
    pub position: Position,
    pub state: DriverState,
    #[source]
    pub error: HarvestError,
}

/// Everything the driver talks to, borrowed for the length of one run.
pub struct Collaborators<'a, L: PageClient + ?Sized, S: BrowserSurfaces + ?Sized> {
    pub listing: &'a L,
    pub surfaces: &'a S,
    pub artifacts: &'a dyn ArtifactStore,
    pub checkpoints: &'a dyn CheckpointStore,
    pub sessions: &'a SessionStore,
    pub run_log: &'a RunLog,
}

/// Resolves the start page, then walks the collection down to page 1.
pub struct CollectionDriver<'a, L: PageClient + ?Sized, S: BrowserSurfaces + ?Sized> {
    deps: Collaborators<'a, L, S>,
    config: &'a Config,
    position: Position,
    state: DriverState,
}

impl<'a, L: PageClient + ?Sized, S: BrowserSurfaces + ?Sized> CollectionDriver<'a, L, S> {
    pub fn new(deps: Collaborators<'a, L, S>, config: &'a Config) -> Self {
        Self {
            deps,
            config,
            position: Position::default(),
            state: DriverState::Resolving,
        }
    }

    pub async fn run(mut self) -> std::result::Result<HarvestSummary, HarvestFailure> {
        match self.walk().await {
            Ok(summary) => Ok(summary),
            Err(error) => Err(self.fail(error)),
        }
    }

    async fn walk(&mut self) -> Result<HarvestSummary> {
        let listing = self.deps.listing;
        let config = self.config;

        self.state = DriverState::Resolving;
        let saved_cookies = self.deps.sessions.load()?;
        tracing::info!("Restoring {} session cookies", saved_cookies.len());
        listing.set_cookies(&saved_cookies).await?;

        let paginator = CollectionPaginator::discover(listing, config).await?;
        let checkpoint = self.deps.checkpoints.load()?;
        let start = paginator.resolve_start(checkpoint.as_ref()).await?;

        // Item contexts start from whatever session the listing ended up with.
        let cookies = listing.cookies().await?;

        let extractor = ItemExtractor::new(
            self.deps.surfaces,
            self.deps.artifacts,
            self.deps.checkpoints,
            &config.selectors,
            &config.retry,
        );

        let mut summary = HarvestSummary::default();
        let mut next_page = start;
        let mut on_page = true;

        while next_page > 0 {
            self.state = DriverState::Walking(next_page);
            if !on_page {
                paginator.goto_page(next_page).await?;
            }
            on_page = false;

            let page_number = paginator.current_page_number().await?;
            self.position = Position {
                page_number,
                item_index: 0,
            };
            self.deps
                .run_log
                .append(&format!("[{}] {}", page_number, listing.current_url().await?))?;

            let page = paginator.decode_current(page_number).await?;
            tracing::info!("Page {}: {} items", page_number, page.items.len());

            for (offset, item) in page.items.iter().enumerate() {
                let index = offset as u32 + 1;
                self.state = DriverState::ProcessingItem {
                    page: page_number,
                    index,
                };
                self.position.item_index = index;

                listing.focus(item.handle).await?;
                self.deps
                    .run_log
                    .append(&format!("[{}] {}", self.position, item.url))?;
                tracing::info!(
                    "[{}/{}] {} ({})",
                    self.position,
                    page.items.len(),
                    item.url,
                    item.variant
                );

                let outcome = extractor.extract(page_number, item, &cookies).await?;
                summary.items_seen += 1;
                summary.assets_saved += outcome.saved;
                summary.assets_already_present += outcome.already_present;
                if outcome.skipped_unsupported {
                    summary.items_skipped_unsupported += 1;
                }
            }

            summary.pages_walked += 1;
            next_page = page_number - 1;
        }

        self.state = DriverState::Finished;
        self.refresh_session().await?;

        tracing::info!(
            "Harvest complete: {} pages, {} assets saved",
            summary.pages_walked,
            summary.assets_saved
        );
        Ok(summary)
    }

    async fn refresh_session(&self) -> Result<()> {
        let listing = self.deps.listing;
        listing.navigate(&self.config.collection.base_url).await?;
        let cookies = listing.cookies().await?;
        let written = self.deps.sessions.save(&cookies)?;
        tracing::info!("Refreshed {} session cookies", written);
        Ok(())
    }

    fn fail(&mut self, error: HarvestError) -> HarvestFailure {
        let origin = self.state;
        self.state = DriverState::Fatal;

        tracing::error!("[{}] {} while {}", self.position, error, origin);

        let record = format!(
            "[{}] Harvest failed\nError: {}: {}\nOrigin: {}",
            self.position,
            error.kind(),
            error,
            origin
        );
        if let Err(e) = self.deps.run_log.append(&record) {
            tracing::error!("Could not write failure record: {}", e);
        }

        HarvestFailure {
            position: self.position,
            state: origin,
            error,
        }
    }
}

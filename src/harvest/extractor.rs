use super::artifacts::ArtifactStore;
use super::checkpoint::CheckpointStore;
use super::metadata::read_metadata;
use super::models::{
    ArtifactMetadata, AssetIdentity, CollectionItem, ResumeCheckpoint, SavedArtifact, Variant,
};
use super::retry::{PollOutcome, poll_until, retry_transient};
use crate::chrome::{
    BrowserSurfaces, ClickOptions, ClickTarget, InteractionContext, PageClient, SessionCookie,
};
use crate::config::{RetryConfig, SelectorConfig};
use crate::{HarvestError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub saved: u32,
    pub already_present: u32,
    pub skipped_unsupported: bool,
}

/// Downloads the full-resolution assets of one item through a dedicated
/// interaction context.
pub struct ItemExtractor<'a, S: BrowserSurfaces + ?Sized> {
    surfaces: &'a S,
    artifacts: &'a dyn ArtifactStore,
    checkpoints: &'a dyn CheckpointStore,
    selectors: &'a SelectorConfig,
    retry: &'a RetryConfig,
}

impl<'a, S: BrowserSurfaces + ?Sized> ItemExtractor<'a, S> {
    pub fn new(
        surfaces: &'a S,
        artifacts: &'a dyn ArtifactStore,
        checkpoints: &'a dyn CheckpointStore,
        selectors: &'a SelectorConfig,
        retry: &'a RetryConfig,
    ) -> Self {
        Self {
            surfaces,
            artifacts,
            checkpoints,
            selectors,
            retry,
        }
    }

    pub async fn extract(
        &self,
        page_number: u32,
        item: &CollectionItem,
        cookies: &[SessionCookie],
    ) -> Result<ExtractOutcome> {
        let mut outcome = ExtractOutcome::default();

        if item.variant == Variant::Unsupported {
            tracing::info!("Skipping unsupported item {}", item.url);
            outcome.skipped_unsupported = true;
            return Ok(outcome);
        }

        let mut pending = Vec::new();
        for sub_index in 0..item.variant.asset_count() {
            let identity = AssetIdentity::from_item_url(&item.url, sub_index)?;
            if self.artifacts.exists(&identity)? {
                tracing::debug!("{} already saved", identity);
                outcome.already_present += 1;
            } else {
                pending.push(sub_index);
            }
        }

        if pending.is_empty() {
            tracing::info!(
                "All {} assets of {} already saved",
                outcome.already_present,
                item.url
            );
            return Ok(outcome);
        }

        tracing::info!(
            "Extracting {} ({}, {} pending)",
            item.url,
            item.variant,
            pending.len()
        );

        let context = self.surfaces.open_context(cookies).await?;
        let extracted = self
            .extract_in(&context, page_number, item, &pending, &mut outcome)
            .await;

        if let Err(e) = context.close().await {
            tracing::warn!("Failed to close item context: {}", e);
        }

        extracted.map(|_| outcome)
    }

    async fn extract_in<C: InteractionContext>(
        &self,
        context: &C,
        page_number: u32,
        item: &CollectionItem,
        pending: &[u32],
        outcome: &mut ExtractOutcome,
    ) -> Result<()> {
        let primary = context.primary();
        primary.navigate(&item.url).await?;

        let metadata = read_metadata(primary, self.selectors).await;
        self.reveal_content(primary).await?;

        if item.variant.is_multi() {
            primary
                .click(
                    ClickTarget::Selector(&self.selectors.asset_anchor),
                    ClickOptions::default(),
                )
                .await?;
            tracing::debug!("Opened gallery of {}", item.url);
        }

        for &sub_index in pending {
            let identity = AssetIdentity::from_item_url(&item.url, sub_index)?;
            if self.artifacts.exists(&identity)? {
                outcome.already_present += 1;
                continue;
            }

            let selector = if item.variant.is_multi() {
                self.selectors.sub_asset_anchor(sub_index + 1)
            } else {
                self.selectors.asset_anchor.clone()
            };

            let saved = self
                .save_sub_asset(context, item, &selector, &identity, &metadata)
                .await?;

            if saved {
                outcome.saved += 1;
                self.checkpoints
                    .save(&ResumeCheckpoint::new(page_number, item.url.clone()))?;
            } else {
                outcome.already_present += 1;
            }
        }

        Ok(())
    }

    /// Opens one sub-asset in a popup and stores its bytes. Returns false when
    /// the asset turned out to be stored already.
    async fn save_sub_asset<C: InteractionContext>(
        &self,
        context: &C,
        item: &CollectionItem,
        selector: &str,
        expected: &AssetIdentity,
        metadata: &ArtifactMetadata,
    ) -> Result<bool> {
        let primary = context.primary();

        if let PollOutcome::GaveUp { attempts } = self.wait_for(primary, selector).await? {
            tracing::debug!("{} not present after {} polls", selector, attempts);
        }

        retry_transient(
            &self.retry.popup_policy(),
            "Open full-resolution view",
            move |_| async move {
                primary
                    .click(ClickTarget::Selector(selector), ClickOptions::middle())
                    .await
                    .map_err(HarvestError::transient)
            },
        )
        .await?;

        let popup = context.wait_for_popup().await?;
        let saved = self.capture(&popup, item, expected, metadata).await;

        if let Err(e) = context.close_surface(popup).await {
            tracing::warn!("Failed to close popup: {}", e);
        }

        saved
    }

    async fn capture<P: PageClient>(
        &self,
        popup: &P,
        item: &CollectionItem,
        expected: &AssetIdentity,
        metadata: &ArtifactMetadata,
    ) -> Result<bool> {
        if let PollOutcome::GaveUp { attempts } =
            self.wait_for(popup, &self.selectors.full_image).await?
        {
            tracing::debug!("Full-resolution image not seen after {} polls", attempts);
        }

        let response = popup.reload().await?;
        let current = popup.current_url().await?;
        if response.url != current {
            return Err(HarvestError::Consistency(format!(
                "Response {} does not match view {}",
                response.url, current
            )));
        }

        let (identity, file_name) = AssetIdentity::from_asset_url(&response.url)?;
        if identity != *expected {
            return Err(HarvestError::Consistency(format!(
                "Requested {} but the view shows {}",
                expected, identity
            )));
        }

        if self.artifacts.exists(&identity)? {
            tracing::info!("{} already saved, discarding download", file_name);
            return Ok(false);
        }

        let artifact = SavedArtifact {
            file_name,
            item_url: item.url.clone(),
            bytes: response.body,
            metadata: metadata.clone(),
        };
        self.artifacts.put(&identity, &artifact)?;
        Ok(true)
    }

    /// Clicks through a content warning if the asset is hidden behind one.
    async fn reveal_content<P: PageClient>(&self, page: &P) -> Result<()> {
        if let PollOutcome::Ready(()) = self.wait_for(page, &self.selectors.asset_anchor).await? {
            return Ok(());
        }

        let Some(button) = page
            .query_one(&self.selectors.content_warning_button)
            .await?
        else {
            tracing::warn!("Asset anchor missing and no content warning shown");
            return Ok(());
        };

        let label = page.read_text(button).await?.unwrap_or_default();
        if label.contains(&self.selectors.content_warning_label) {
            tracing::info!("Revealing content behind warning");
            page.click(ClickTarget::Element(button), ClickOptions::default())
                .await?;
        }

        Ok(())
    }

    async fn wait_for<P: PageClient>(&self, page: &P, selector: &str) -> Result<PollOutcome<()>> {
        poll_until(&self.retry.selector_policy(), move |_| async move {
            Ok(page.query_one(selector).await?.map(|_| ()))
        })
        .await
    }
}

use super::classifier::ItemClassifier;
use super::models::{CollectionItem, CollectionPage, ResumeCheckpoint};
use super::retry::{PollOutcome, poll_until};
use crate::chrome::{ElementHandle, PageClient};
use crate::config::{CollectionConfig, Config, RetryConfig, SelectorConfig};
use crate::{HarvestError, Result};
use url::Url;

/// Finds where a run starts and loads collection pages for the listing
/// surface.
pub struct CollectionPaginator<'a, P: PageClient + ?Sized> {
    page: &'a P,
    collection: &'a CollectionConfig,
    selectors: &'a SelectorConfig,
    retry: &'a RetryConfig,
    base_url: Url,
}

impl<'a, P: PageClient + ?Sized> CollectionPaginator<'a, P> {
    /// The collection URL carries the account id, so it is taken from where
    /// the id-less legacy URL redirects to.
    pub async fn discover(page: &'a P, config: &'a Config) -> Result<Self> {
        page.navigate(&config.collection.legacy_bookmark_url).await?;
        let landed = page.current_url().await?;

        let mut base_url = Url::parse(&landed)
            .map_err(|e| HarvestError::InvalidUrl(format!("{}: {}", landed, e)))?;
        base_url.set_query(None);
        base_url.set_fragment(None);

        tracing::info!("Collection URL: {}", base_url);

        Ok(Self::with_base_url(page, config, base_url))
    }

    pub fn with_base_url(page: &'a P, config: &'a Config, base_url: Url) -> Self {
        Self {
            page,
            collection: &config.collection,
            selectors: &config.selectors,
            retry: &config.retry,
            base_url,
        }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn page_url(&self, page_number: u32) -> String {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .clear()
            .append_pair(&self.collection.page_query_param, &page_number.to_string());
        url.to_string()
    }

    /// Page to start walking from; 0 means the collection is empty.
    ///
    /// Without a checkpoint the walk starts at the oldest page. With one, it
    /// starts at the first page from the recorded one onwards that still lists
    /// the recorded item.
    pub async fn resolve_start(&self, checkpoint: Option<&ResumeCheckpoint>) -> Result<u32> {
        match checkpoint {
            None => self.resolve_oldest().await,
            Some(checkpoint) => self.resolve_checkpoint(checkpoint).await,
        }
    }

    async fn resolve_oldest(&self) -> Result<u32> {
        let total = self.read_total_count().await?;
        let last_page = total.div_ceil(self.collection.items_per_page);

        tracing::info!(
            "Collection holds {} items over {} pages",
            total,
            last_page
        );

        if last_page > 0 {
            self.goto_page(last_page).await?;
        }

        Ok(last_page)
    }

    async fn resolve_checkpoint(&self, checkpoint: &ResumeCheckpoint) -> Result<u32> {
        let mut page_number = checkpoint.page_number.max(1);

        loop {
            tracing::info!(
                "Looking for {} on page {}",
                checkpoint.item_url,
                page_number
            );
            self.goto_page(page_number).await?;

            if self
                .page
                .query_one(&self.selectors.collection_marker)
                .await?
                .is_none()
            {
                return Err(HarvestError::Resolution(format!(
                    "{} not found up to page {}",
                    checkpoint.item_url,
                    page_number - 1
                )));
            }

            let anchors = match self.stabilize().await? {
                PollOutcome::Ready(anchors) => anchors,
                PollOutcome::GaveUp { attempts } => {
                    return Err(HarvestError::Resolution(format!(
                        "Page {} did not stabilize after {} attempts",
                        page_number, attempts
                    )));
                }
            };

            let listed = self.decode(page_number, anchors).await?;
            if listed.contains(&checkpoint.item_url) {
                tracing::info!("Resuming on page {}", page_number);
                return Ok(page_number);
            }

            page_number += 1;
        }
    }

    async fn read_total_count(&self) -> Result<u32> {
        let label = self
            .page
            .query_one(&self.selectors.total_count)
            .await?
            .ok_or_else(|| {
                HarvestError::StructuralDrift(format!(
                    "Total count label not found ({})",
                    self.selectors.total_count
                ))
            })?;

        let text = self.page.read_text(label).await?.unwrap_or_default();
        parse_total_count(&text)
    }

    pub async fn goto_page(&self, page_number: u32) -> Result<()> {
        self.page.navigate(&self.page_url(page_number)).await
    }

    /// Decodes whatever collection page the listing surface is showing.
    pub async fn decode_current(&self, page_number: u32) -> Result<CollectionPage> {
        match self.stabilize().await? {
            PollOutcome::Ready(anchors) => self.decode(page_number, anchors).await,
            PollOutcome::GaveUp { attempts } => Err(HarvestError::PageUnstable {
                page: page_number,
                attempts,
            }),
        }
    }

    pub async fn current_page_number(&self) -> Result<u32> {
        let current = self.page.current_url().await?;
        Ok(page_number_from_url(
            &current,
            &self.collection.page_query_param,
        ))
    }

    /// Re-reads the item tiles until every anchor has rendered its image.
    async fn stabilize(&self) -> Result<PollOutcome<Vec<ElementHandle>>> {
        let page = self.page;
        let selectors = self.selectors;

        poll_until(&self.retry.stabilize_policy(), move |attempt| async move {
            let anchors = page.query(&selectors.item_anchor).await?;
            for anchor in &anchors {
                page.focus(*anchor).await?;
            }
            let images = page.query(&selectors.item_image).await?;

            if !anchors.is_empty() && anchors.len() == images.len() {
                Ok(Some(anchors))
            } else {
                tracing::debug!(
                    "Listing not settled (attempt {}): {} anchors, {} images",
                    attempt,
                    anchors.len(),
                    images.len()
                );
                Ok(None)
            }
        })
        .await
    }

    async fn decode(
        &self,
        page_number: u32,
        anchors: Vec<ElementHandle>,
    ) -> Result<CollectionPage> {
        let classifier = ItemClassifier::new(self.selectors);
        let current = self.page.current_url().await?;
        let mut items = Vec::with_capacity(anchors.len());

        for handle in anchors {
            let href = self
                .page
                .read_attribute(handle, "href")
                .await?
                .ok_or_else(|| {
                    HarvestError::StructuralDrift("Item anchor without href".to_string())
                })?;

            let url = resolve_href(&current, &href)?;
            let variant = classifier.classify(self.page, handle).await?;
            items.push(CollectionItem {
                url,
                variant,
                handle,
            });
        }

        tracing::debug!("Page {} lists {} items", page_number, items.len());
        Ok(CollectionPage { page_number, items })
    }
}

pub fn parse_total_count(label: &str) -> Result<u32> {
    let digits: String = label.trim().chars().filter(|c| *c != ',').collect();
    digits.parse().map_err(|_| {
        HarvestError::StructuralDrift(format!("Unparsable total count label {:?}", label))
    })
}

pub fn page_number_from_url(url: &str, param: &str) -> u32 {
    Url::parse(url)
        .ok()
        .and_then(|url| {
            url.query_pairs()
                .find(|(key, _)| key == param)
                .and_then(|(_, value)| value.parse::<u32>().ok())
        })
        .filter(|page| *page > 0)
        .unwrap_or(1)
}

fn resolve_href(page_url: &str, href: &str) -> Result<String> {
    if let Ok(absolute) = Url::parse(href) {
        return Ok(absolute.to_string());
    }

    Url::parse(page_url)
        .and_then(|base| base.join(href))
        .map(|url| url.to_string())
        .map_err(|e| HarvestError::InvalidUrl(format!("{}: {}", href, e)))
}

//! Best-effort metadata extraction from an item page.
//!
//! Every field is read independently and a failure only empties that field.

use super::models::ArtifactMetadata;
use crate::Result;
use crate::chrome::PageClient;
use crate::config::{FieldSpec, SelectorConfig};

pub async fn extract_field<P: PageClient + ?Sized>(page: &P, spec: &FieldSpec) -> String {
    match read_field(page, spec).await {
        Ok(Some(value)) => value.trim().to_string(),
        Ok(None) => {
            tracing::debug!("Field {} not present", spec.selector);
            String::new()
        }
        Err(e) => {
            tracing::debug!("Field {} unreadable: {}", spec.selector, e);
            String::new()
        }
    }
}

async fn read_field<P: PageClient + ?Sized>(page: &P, spec: &FieldSpec) -> Result<Option<String>> {
    let Some(element) = page.query_one(&spec.selector).await? else {
        return Ok(None);
    };

    match &spec.attribute {
        Some(name) => page.read_attribute(element, name).await,
        None => page.read_text(element).await,
    }
}

/// Tag texts in page order. The list's last entry is the "add tag" control
/// and is never a tag.
pub async fn extract_tags<P: PageClient + ?Sized>(
    page: &P,
    selectors: &SelectorConfig,
) -> Vec<String> {
    let entries = match page.query(&selectors.tag_list).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("Tag list unreadable: {}", e);
            return Vec::new();
        }
    };

    let tag_entries = entries.len().saturating_sub(1);
    let mut tags = Vec::with_capacity(tag_entries);

    for entry in entries.into_iter().take(tag_entries) {
        let text = match page.query_one_within(entry, &selectors.tag_text).await {
            Ok(Some(link)) => page.read_text(link).await.ok().flatten(),
            _ => None,
        };
        if let Some(text) = text {
            tags.push(text.trim().to_string());
        }
    }

    tags
}

pub async fn read_metadata<P: PageClient + ?Sized>(
    page: &P,
    selectors: &SelectorConfig,
) -> ArtifactMetadata {
    ArtifactMetadata {
        title: extract_field(page, &selectors.title).await,
        author: extract_field(page, &selectors.author).await,
        author_page: extract_field(page, &selectors.author_page).await,
        posting_date: extract_field(page, &selectors.posting_date).await,
        description: extract_field(page, &selectors.description).await,
        tags: extract_tags(page, selectors).await,
    }
}

use super::models::Variant;
use crate::chrome::{ElementHandle, PageClient};
use crate::config::SelectorConfig;
use crate::{HarvestError, Result};

/// What the listing tile says about an item, before interpretation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TileSignals {
    pub thumbnail_alt: String,
    pub has_multi_marker: bool,
    pub count_label: Option<String>,
}

pub struct ItemClassifier<'a> {
    selectors: &'a SelectorConfig,
}

impl<'a> ItemClassifier<'a> {
    pub fn new(selectors: &'a SelectorConfig) -> Self {
        Self { selectors }
    }

    pub async fn classify<P: PageClient + ?Sized>(
        &self,
        page: &P,
        tile: ElementHandle,
    ) -> Result<Variant> {
        let signals = self.read_signals(page, tile).await?;
        classify_signals(&signals, &self.selectors.animated_marker)
    }

    async fn read_signals<P: PageClient + ?Sized>(
        &self,
        page: &P,
        tile: ElementHandle,
    ) -> Result<TileSignals> {
        let thumbnail = page
            .query_one_within(tile, &self.selectors.item_thumbnail)
            .await?
            .ok_or_else(|| {
                HarvestError::StructuralDrift(format!(
                    "Item tile has no thumbnail ({})",
                    self.selectors.item_thumbnail
                ))
            })?;
        let thumbnail_alt = page
            .read_attribute(thumbnail, "alt")
            .await?
            .unwrap_or_default();

        let has_multi_marker = page
            .query_one_within(tile, &self.selectors.multi_marker)
            .await?
            .is_some();

        let count_label = if has_multi_marker {
            match page
                .query_one_within(tile, &self.selectors.multi_count)
                .await?
            {
                Some(label) => page.read_text(label).await?,
                None => None,
            }
        } else {
            None
        };

        Ok(TileSignals {
            thumbnail_alt,
            has_multi_marker,
            count_label,
        })
    }
}

pub fn classify_signals(signals: &TileSignals, animated_marker: &str) -> Result<Variant> {
    if signals.thumbnail_alt.trim_end().ends_with(animated_marker) {
        return Ok(Variant::Unsupported);
    }

    if !signals.has_multi_marker {
        return Ok(Variant::Single);
    }

    let label = signals.count_label.as_deref().ok_or_else(|| {
        HarvestError::StructuralDrift("Multi-asset marker without a count label".to_string())
    })?;

    match parse_count(label)? {
        1 => Ok(Variant::Single),
        count => Ok(Variant::Multi(count)),
    }
}

pub fn parse_count(label: &str) -> Result<u32> {
    let digits: String = label.trim().chars().filter(|c| *c != ',').collect();

    match digits.parse::<u32>() {
        Ok(0) | Err(_) => Err(HarvestError::StructuralDrift(format!(
            "Unparsable asset count label {:?}",
            label
        ))),
        Ok(count) => Ok(count),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANIMATED: &str = "うごイラ";

    fn signals(alt: &str, marker: bool, label: Option<&str>) -> TileSignals {
        TileSignals {
            thumbnail_alt: alt.to_string(),
            has_multi_marker: marker,
            count_label: label.map(str::to_string),
        }
    }

    #[test]
    fn test_animated_alt_is_unsupported() {
        let variant = classify_signals(&signals("夕焼け - うごイラ", true, Some("3")), ANIMATED);
        assert_eq!(variant.unwrap(), Variant::Unsupported);
    }

    #[test]
    fn test_marker_only_in_middle_of_alt_is_not_animated() {
        let variant = classify_signals(&signals("うごイラ風の絵", false, None), ANIMATED);
        assert_eq!(variant.unwrap(), Variant::Single);
    }

    #[test]
    fn test_multi_with_count() {
        let variant = classify_signals(&signals("sunset", true, Some("12")), ANIMATED);
        assert_eq!(variant.unwrap(), Variant::Multi(12));
    }

    #[test]
    fn test_single_without_marker() {
        let variant = classify_signals(&signals("sunset", false, None), ANIMATED);
        assert_eq!(variant.unwrap(), Variant::Single);
    }

    #[test]
    fn test_count_of_one_is_single() {
        let variant = classify_signals(&signals("sunset", true, Some("1")), ANIMATED);
        assert_eq!(variant.unwrap(), Variant::Single);
    }

    #[test]
    fn test_unparsable_count_is_drift() {
        let err = classify_signals(&signals("sunset", true, Some("many")), ANIMATED).unwrap_err();
        assert!(matches!(err, HarvestError::StructuralDrift(_)));
    }

    #[test]
    fn test_missing_count_label_is_drift() {
        let err = classify_signals(&signals("sunset", true, None), ANIMATED).unwrap_err();
        assert_eq!(err.kind(), "StructuralDriftError");
    }

    #[test]
    fn test_parse_count_strips_separators() {
        assert_eq!(parse_count(" 1,234 ").unwrap(), 1234);
        assert!(parse_count("0").is_err());
        assert!(parse_count("").is_err());
    }
}

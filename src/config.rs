use crate::harvest::retry::{Backoff, RetryPolicy};
use crate::{HarvestError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub selectors: SelectorConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    pub chrome_path: Option<PathBuf>,
    #[serde(default = "default_headless")]
    pub headless: bool,
    pub user_data_dir: Option<PathBuf>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Where the collection lives and how it is paginated.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectionConfig {
    /// Site root; visited again at the end of a run to refresh the session.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Id-less collection URL that redirects to the signed-in user's collection.
    #[serde(default = "default_legacy_bookmark_url")]
    pub legacy_bookmark_url: String,
    /// Fixed page size of the remote listing (6 columns x 8 rows).
    #[serde(default = "default_items_per_page")]
    pub items_per_page: u32,
    #[serde(default = "default_page_query_param")]
    pub page_query_param: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "default_popup_click_attempts")]
    pub popup_click_attempts: u32,
    #[serde(default = "default_click_retry_delay")]
    pub click_retry_delay_ms: u64,
    #[serde(default = "default_stabilize_attempts")]
    pub stabilize_attempts: u32,
    #[serde(default = "default_stabilize_delay")]
    pub stabilize_delay_ms: u64,
    #[serde(default = "default_selector_wait_attempts")]
    pub selector_wait_attempts: u32,
    #[serde(default = "default_selector_wait_delay")]
    pub selector_wait_delay_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

/// A metadata location on the item page: element text, or one of its attributes.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FieldSpec {
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl FieldSpec {
    pub fn text(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            attribute: None,
        }
    }

    pub fn attribute(selector: &str, attribute: &str) -> Self {
        Self {
            selector: selector.to_string(),
            attribute: Some(attribute.to_string()),
        }
    }
}

/// Every piece of remote markup the engine relies on.
///
/// Defaults describe the gallery's bookmark listing and artwork pages; the
/// harvester itself only ever sees the element handles these resolve to.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectorConfig {
    #[serde(default = "default_collection_marker")]
    pub collection_marker: String,
    #[serde(default = "default_item_anchor")]
    pub item_anchor: String,
    #[serde(default = "default_item_image")]
    pub item_image: String,
    #[serde(default = "default_item_thumbnail")]
    pub item_thumbnail: String,
    /// Suffix of the thumbnail's alt text that marks an animated item.
    #[serde(default = "default_animated_marker")]
    pub animated_marker: String,
    #[serde(default = "default_multi_marker")]
    pub multi_marker: String,
    #[serde(default = "default_multi_count")]
    pub multi_count: String,
    #[serde(default = "default_total_count")]
    pub total_count: String,
    #[serde(default = "default_content_warning_button")]
    pub content_warning_button: String,
    #[serde(default = "default_content_warning_label")]
    pub content_warning_label: String,
    #[serde(default = "default_asset_anchor")]
    pub asset_anchor: String,
    /// `{index}` is replaced with the 1-based sub-asset number.
    #[serde(default = "default_sub_asset_anchor")]
    pub sub_asset_anchor: String,
    #[serde(default = "default_full_image")]
    pub full_image: String,
    #[serde(default = "default_title")]
    pub title: FieldSpec,
    #[serde(default = "default_author")]
    pub author: FieldSpec,
    #[serde(default = "default_author_page")]
    pub author_page: FieldSpec,
    #[serde(default = "default_posting_date")]
    pub posting_date: FieldSpec,
    #[serde(default = "default_description")]
    pub description: FieldSpec,
    #[serde(default = "default_tag_list")]
    pub tag_list: String,
    #[serde(default = "default_tag_text")]
    pub tag_text: String,
}

impl SelectorConfig {
    pub fn sub_asset_anchor(&self, index: u32) -> String {
        self.sub_asset_anchor.replace("{index}", &index.to_string())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default = "default_json_pretty")]
    pub json_pretty: bool,
}

fn default_headless() -> bool {
    true
}
fn default_window_width() -> u32 {
    700
}
fn default_window_height() -> u32 {
    1070
}
fn default_request_timeout() -> u64 {
    crate::timeouts::secs::REQUEST
}
fn default_base_url() -> String {
    "https://www.pixiv.net/".to_string()
}
fn default_legacy_bookmark_url() -> String {
    "https://www.pixiv.net/bookmark.php".to_string()
}
fn default_items_per_page() -> u32 {
    6 * 8
}
fn default_page_query_param() -> String {
    "p".to_string()
}
fn default_storage_root() -> PathBuf {
    PathBuf::from("./")
}
fn default_popup_click_attempts() -> u32 {
    20
}
fn default_click_retry_delay() -> u64 {
    100
}
fn default_stabilize_attempts() -> u32 {
    50
}
fn default_stabilize_delay() -> u64 {
    200
}
fn default_selector_wait_attempts() -> u32 {
    25
}
fn default_selector_wait_delay() -> u64 {
    200
}
fn default_max_backoff() -> u64 {
    5000
}
fn default_json_pretty() -> bool {
    false
}
fn default_collection_marker() -> String {
    "div[type=illust]".to_string()
}
fn default_item_anchor() -> String {
    "div[type=illust] a".to_string()
}
fn default_item_image() -> String {
    "div[type=illust] a img".to_string()
}
fn default_item_thumbnail() -> String {
    "img".to_string()
}
fn default_animated_marker() -> String {
    "うごイラ".to_string()
}
fn default_multi_marker() -> String {
    "svg".to_string()
}
fn default_multi_count() -> String {
    "span:nth-child(2)".to_string()
}
fn default_total_count() -> String {
    "h2+div>div>span".to_string()
}
fn default_content_warning_button() -> String {
    "main figure button".to_string()
}
fn default_content_warning_label() -> String {
    "表示".to_string()
}
fn default_asset_anchor() -> String {
    r#"div[role="presentation"]>a"#.to_string()
}
fn default_sub_asset_anchor() -> String {
    r#"div[id="{index}"] + div[role="presentation"]>a"#.to_string()
}
fn default_full_image() -> String {
    "img".to_string()
}
fn default_title() -> FieldSpec {
    FieldSpec::text("figcaption h1")
}
fn default_author() -> FieldSpec {
    FieldSpec::text("main div h2 a+a div")
}
fn default_author_page() -> FieldSpec {
    FieldSpec::attribute("main div h2 a", "href")
}
fn default_posting_date() -> FieldSpec {
    FieldSpec::text(r#"figcaption div[title="投稿日時"]"#)
}
fn default_description() -> FieldSpec {
    FieldSpec::text("#expandable-paragraph-0")
}
fn default_tag_list() -> String {
    "figcaption footer ul li".to_string()
}
fn default_tag_text() -> String {
    "a".to_string()
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: default_headless(),
            user_data_dir: None,
            window_width: default_window_width(),
            window_height: default_window_height(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            legacy_bookmark_url: default_legacy_bookmark_url(),
            items_per_page: default_items_per_page(),
            page_query_param: default_page_query_param(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_storage_root(),
        }
    }
}

impl StorageConfig {
    pub fn asset_dir(&self) -> PathBuf {
        self.root.join("img")
    }

    pub fn metadata_dir(&self) -> PathBuf {
        self.root.join("img-info")
    }

    pub fn cookie_dir(&self) -> PathBuf {
        self.root.join("cookie")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }

    pub fn checkpoint_path(&self) -> PathBuf {
        self.log_dir().join("last-saved-illust.json")
    }

    pub fn required_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.asset_dir(),
            self.metadata_dir(),
            self.cookie_dir(),
            self.log_dir(),
        ]
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            popup_click_attempts: default_popup_click_attempts(),
            click_retry_delay_ms: default_click_retry_delay(),
            stabilize_attempts: default_stabilize_attempts(),
            stabilize_delay_ms: default_stabilize_delay(),
            selector_wait_attempts: default_selector_wait_attempts(),
            selector_wait_delay_ms: default_selector_wait_delay(),
            backoff: Backoff::default(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    pub fn popup_policy(&self) -> RetryPolicy {
        self.policy(self.popup_click_attempts, self.click_retry_delay_ms)
    }

    pub fn stabilize_policy(&self) -> RetryPolicy {
        self.policy(self.stabilize_attempts, self.stabilize_delay_ms)
    }

    pub fn selector_policy(&self) -> RetryPolicy {
        self.policy(self.selector_wait_attempts, self.selector_wait_delay_ms)
    }

    fn policy(&self, max_attempts: u32, delay_ms: u64) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            delay: Duration::from_millis(delay_ms),
            backoff: self.backoff,
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            collection_marker: default_collection_marker(),
            item_anchor: default_item_anchor(),
            item_image: default_item_image(),
            item_thumbnail: default_item_thumbnail(),
            animated_marker: default_animated_marker(),
            multi_marker: default_multi_marker(),
            multi_count: default_multi_count(),
            total_count: default_total_count(),
            content_warning_button: default_content_warning_button(),
            content_warning_label: default_content_warning_label(),
            asset_anchor: default_asset_anchor(),
            sub_asset_anchor: default_sub_asset_anchor(),
            full_image: default_full_image(),
            title: default_title(),
            author: default_author(),
            author_page: default_author_page(),
            posting_date: default_posting_date(),
            description: default_description(),
            tag_list: default_tag_list(),
            tag_text: default_tag_text(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json_pretty: default_json_pretty(),
        }
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    default_config_dir().map(|p| p.join("config.toml"))
}

pub fn default_config_dir() -> Result<PathBuf> {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|home| PathBuf::from(home).join(".config"))
        })
        .map(|p| p.join("bookmark-harvester"))
        .ok_or_else(|| HarvestError::ConfigError("Could not determine config directory".into()))
}

pub const PROJECT_CONFIG_FILE: &str = ".bookmark-harvester.toml";

fn read_layer(path: &Path) -> Result<toml::Table> {
    tracing::debug!("Reading config layer {}", path.display());
    let content = std::fs::read_to_string(path)?;
    Ok(content.parse::<toml::Table>()?)
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(table)) => {
                merge_tables(existing, table);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let mut layers = Vec::new();

        let global_path = default_config_path()?;
        if global_path.exists() {
            layers.push(read_layer(&global_path)?);
        }

        let project_path = PathBuf::from(PROJECT_CONFIG_FILE);
        if project_path.exists() {
            layers.push(read_layer(&project_path)?);
        }

        let mut config = Self::from_layers(layers)?;
        config.load_from_env();

        Ok(config)
    }

    /// Builds a config from TOML documents, later ones winning key by key.
    ///
    /// A key a layer leaves out keeps the value of the layer below it, and
    /// the built-in default when no layer sets it.
    pub fn from_layers(layers: impl IntoIterator<Item = toml::Table>) -> Result<Self> {
        let mut merged = toml::Table::new();
        for layer in layers {
            merge_tables(&mut merged, layer);
        }
        Ok(merged.try_into()?)
    }

    pub fn load_with_overrides(&self, cli_overrides: ConfigOverrides) -> Self {
        let mut config = self.clone();

        if let Some(headless) = cli_overrides.headless {
            config.browser.headless = headless;
        }
        if let Some(json) = cli_overrides.json {
            config.output.json_pretty = json;
        }
        if let Some(chrome_path) = cli_overrides.chrome_path {
            config.browser.chrome_path = Some(chrome_path);
        }
        if let Some(root) = cli_overrides.root {
            config.storage.root = root;
        }

        config
    }

    fn load_from_env(&mut self) {
        if let Ok(headless) = std::env::var("HARVEST_HEADLESS") {
            self.browser.headless = headless == "true" || headless == "1";
        }
        if let Ok(path) = std::env::var("HARVEST_CHROME_PATH") {
            self.browser.chrome_path = Some(PathBuf::from(path));
        }
        if let Ok(root) = std::env::var("HARVEST_ROOT") {
            self.storage.root = PathBuf::from(root);
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection.items_per_page == 0 {
            return Err(HarvestError::ConfigError(
                "items_per_page must be greater than 0".into(),
            ));
        }

        if self.collection.page_query_param.is_empty() {
            return Err(HarvestError::ConfigError(
                "page_query_param must not be empty".into(),
            ));
        }

        for url in [
            &self.collection.base_url,
            &self.collection.legacy_bookmark_url,
        ] {
            url::Url::parse(url).map_err(|e| HarvestError::InvalidUrl(format!("{}: {}", url, e)))?;
        }

        if self.retry.popup_click_attempts == 0
            || self.retry.stabilize_attempts == 0
            || self.retry.selector_wait_attempts == 0
        {
            return Err(HarvestError::ConfigError(
                "retry attempt bounds must be greater than 0".into(),
            ));
        }

        if !self.selectors.sub_asset_anchor.contains("{index}") {
            return Err(HarvestError::ConfigError(
                "selectors.sub_asset_anchor must contain an {index} placeholder".into(),
            ));
        }

        if let Some(ref path) = self.browser.chrome_path
            && !path.exists()
        {
            return Err(HarvestError::ConfigError(format!(
                "Chrome path does not exist: {}",
                path.display()
            )));
        }

        Ok(())
    }

    pub fn show(&self) -> String {
        format!(
            r#"Browser:
  Chrome Path: {}
  Headless: {}
  Window: {}x{}

Collection:
  Site: {}
  Legacy Collection URL: {}
  Items Per Page: {}

Storage:
  Root: {}
  Checkpoint: {}

Retry:
  Popup Click Attempts: {}
  Stabilize Attempts: {} ({}ms, {:?})
"#,
            self.browser
                .chrome_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "auto-detect".into()),
            self.browser.headless,
            self.browser.window_width,
            self.browser.window_height,
            self.collection.base_url,
            self.collection.legacy_bookmark_url,
            self.collection.items_per_page,
            self.storage.root.display(),
            self.storage.checkpoint_path().display(),
            self.retry.popup_click_attempts,
            self.retry.stabilize_attempts,
            self.retry.stabilize_delay_ms,
            self.retry.backoff,
        )
    }
}

#[derive(Debug, Default)]
pub struct ConfigOverrides {
    pub headless: Option<bool>,
    pub json: Option<bool>,
    pub chrome_path: Option<PathBuf>,
    pub root: Option<PathBuf>,
}

//! In-memory gallery used to drive the harvester without a browser.
//!
//! Markup is matched against the default selector strings, so tests must run
//! with `SelectorConfig::default()`.

#![allow(dead_code)]

use bookmark_harvester::chrome::{
    BrowserSurfaces, CapturedResponse, ClickOptions, ClickTarget, ElementHandle,
    InteractionContext, MouseButton, PageClient, SessionCookie, SessionStore,
};
use bookmark_harvester::config::SelectorConfig;
use bookmark_harvester::harvest::{
    Collaborators, CollectionDriver, FileCheckpointStore, FsArtifactStore, HarvestFailure,
    HarvestSummary, ResumeCheckpoint,
};
use bookmark_harvester::run_log::RunLog;
use bookmark_harvester::{Config, HarvestError, Result, utils};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use tempfile::TempDir;

pub const SITE_ROOT: &str = "https://fake.test/";
pub const LEGACY_URL: &str = "https://fake.test/bookmark.php";
pub const COLLECTION_URL: &str = "https://fake.test/users/1/bookmarks";
const ITEM_PREFIX: &str = "https://fake.test/artworks/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeKind {
    Single,
    Multi(u32),
    Animated,
    /// Multi-asset marker with a count label that is not a number.
    BadCount,
}

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub id: u64,
    pub kind: FakeKind,
    pub tags: Vec<String>,
    pub description: Option<String>,
}

impl FakeItem {
    fn new(id: u64, kind: FakeKind) -> Self {
        Self {
            id,
            kind,
            tags: vec!["landscape".to_string(), "original".to_string()],
            description: None,
        }
    }

    pub fn single(id: u64) -> Self {
        Self::new(id, FakeKind::Single)
    }

    pub fn multi(id: u64, count: u32) -> Self {
        Self::new(id, FakeKind::Multi(count))
    }

    pub fn animated(id: u64) -> Self {
        Self::new(id, FakeKind::Animated)
    }

    pub fn bad_count(id: u64) -> Self {
        Self::new(id, FakeKind::BadCount)
    }

    pub fn url(&self) -> String {
        item_url(self.id)
    }

    fn sub_assets(&self) -> u32 {
        match self.kind {
            FakeKind::Multi(n) => n,
            _ => 1,
        }
    }
}

pub fn item_url(id: u64) -> String {
    format!("{}{}", ITEM_PREFIX, id)
}

pub fn asset_url(id: u64, sub_index: u32) -> String {
    format!("https://img.fake.test/img-original/{}_p{}.png", id, sub_index)
}

/// Remote state plus everything the harvester did to it.
#[derive(Debug, Default)]
pub struct SiteState {
    /// `pages[0]` is page 1, the newest.
    pub pages: Vec<Vec<FakeItem>>,
    pub total_label: Option<String>,
    /// Middle clicks that fail before one succeeds.
    pub click_failures: u32,
    pub unstable_pages: HashSet<u32>,
    /// Image queries that come back short before the listing settles.
    pub unsettled_polls: u32,
    pub redirect_response: bool,
    pub content_warning: bool,
    /// Sub-asset every popup shows, whatever link was clicked.
    pub popup_sub_index: Option<u32>,
    /// Cookie the server sets whenever the site root is visited.
    pub rotated_cookie: Option<SessionCookie>,

    pub jar: Vec<SessionCookie>,
    pub listing_navigations: Vec<String>,
    pub item_visits: Vec<String>,
    pub middle_clicks: Vec<String>,
    pub warnings_dismissed: u32,
    pub galleries_opened: u32,
    pub contexts_opened: Vec<Vec<SessionCookie>>,
    pub contexts_closed: u32,
    pub popups_opened: u32,
    pub popups_closed: u32,
}

impl SiteState {
    fn find(&self, id: u64) -> Option<FakeItem> {
        self.pages.iter().flatten().find(|item| item.id == id).cloned()
    }

    fn total(&self) -> String {
        self.total_label.clone().unwrap_or_else(|| {
            let total: usize = self.pages.iter().map(Vec::len).sum();
            total.to_string()
        })
    }

    fn upsert_cookies(&mut self, cookies: &[SessionCookie]) {
        for cookie in cookies {
            self.jar.retain(|c| c.name != cookie.name);
            self.jar.push(cookie.clone());
        }
    }
}

struct Shared {
    state: Mutex<SiteState>,
    selectors: SelectorConfig,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SiteState> {
        self.state.lock().unwrap()
    }
}

pub struct FakeSite {
    shared: Arc<Shared>,
    listing: FakeSurface,
}

impl FakeSite {
    pub fn new(pages: Vec<Vec<FakeItem>>) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(SiteState {
                pages,
                ..Default::default()
            }),
            selectors: SelectorConfig::default(),
        });
        let listing = FakeSurface::new(shared.clone(), Role::Listing, "about:blank");
        Self { shared, listing }
    }

    pub fn listing(&self) -> &FakeSurface {
        &self.listing
    }

    pub fn state(&self) -> MutexGuard<'_, SiteState> {
        self.shared.state()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Listing,
    Item,
    Popup,
}

#[derive(Debug, Clone)]
enum Node {
    Marker,
    Anchor(FakeItem),
    Image,
    Thumbnail(String),
    MultiMarker,
    CountLabel(String),
    TotalCount,
    WarningButton,
    AssetAnchor,
    Text(String),
    Link(String),
    TagEntry(Option<String>),
    TagLink(String),
    FullImage,
}

#[derive(Default)]
struct SurfaceState {
    url: String,
    nodes: Vec<Node>,
    revealed: bool,
    gallery_open: bool,
    pending_popup: Option<String>,
}

pub struct FakeSurface {
    shared: Arc<Shared>,
    role: Role,
    inner: Mutex<SurfaceState>,
}

impl FakeSurface {
    fn new(shared: Arc<Shared>, role: Role, url: &str) -> Self {
        Self {
            shared,
            role,
            inner: Mutex::new(SurfaceState {
                url: url.to_string(),
                ..Default::default()
            }),
        }
    }

    fn inner(&self) -> MutexGuard<'_, SurfaceState> {
        self.inner.lock().unwrap()
    }

    fn node(&self, handle: ElementHandle) -> Result<Node> {
        self.inner()
            .nodes
            .get(handle.id() as usize)
            .cloned()
            .ok_or_else(|| HarvestError::Browser(format!("stale element {}", handle.id())))
    }

    fn register(&self, nodes: Vec<Node>) -> Vec<ElementHandle> {
        let mut inner = self.inner();
        nodes
            .into_iter()
            .map(|node| {
                inner.nodes.push(node);
                ElementHandle::new(inner.nodes.len() as u64 - 1)
            })
            .collect()
    }

    fn listing_page(&self) -> Option<u32> {
        let url = url::Url::parse(&self.inner().url).ok()?;
        if !url.as_str().starts_with(COLLECTION_URL) {
            return None;
        }
        Some(
            url.query_pairs()
                .find(|(key, _)| key == "p")
                .and_then(|(_, value)| value.parse().ok())
                .unwrap_or(1),
        )
    }

    fn shown_item(&self) -> Option<FakeItem> {
        let url = self.inner().url.clone();
        let id = url.strip_prefix(ITEM_PREFIX)?.parse().ok()?;
        self.shared.state().find(id)
    }

    fn listing_nodes(&self, selector: &str) -> Vec<Node> {
        let sel = &self.shared.selectors;
        let Some(page) = self.listing_page() else {
            return Vec::new();
        };

        if selector == sel.total_count {
            return vec![Node::TotalCount];
        }

        let mut state = self.shared.state();
        let items = (page as usize)
            .checked_sub(1)
            .and_then(|index| state.pages.get(index))
            .cloned()
            .unwrap_or_default();

        if selector == sel.collection_marker {
            if items.is_empty() { vec![] } else { vec![Node::Marker] }
        } else if selector == sel.item_anchor {
            items.into_iter().map(Node::Anchor).collect()
        } else if selector == sel.item_image {
            let mut images = items.len();
            if state.unstable_pages.contains(&page) {
                images = images.saturating_sub(1);
            } else if state.unsettled_polls > 0 {
                state.unsettled_polls -= 1;
                images = images.saturating_sub(1);
            }
            vec![Node::Image; images]
        } else {
            Vec::new()
        }
    }

    fn item_nodes(&self, selector: &str) -> Vec<Node> {
        let sel = &self.shared.selectors;
        let Some(item) = self.shown_item() else {
            return Vec::new();
        };
        let content_warning = self.shared.state().content_warning;
        let (revealed, gallery_open) = {
            let inner = self.inner();
            (inner.revealed, inner.gallery_open)
        };
        let hidden = content_warning && !revealed;

        if selector == sel.asset_anchor {
            return if hidden { vec![] } else { vec![Node::AssetAnchor] };
        }
        if selector == sel.content_warning_button {
            return if hidden { vec![Node::WarningButton] } else { vec![] };
        }
        if (1..=item.sub_assets()).any(|k| selector == sel.sub_asset_anchor(k)) {
            return if !hidden && gallery_open {
                vec![Node::AssetAnchor]
            } else {
                vec![]
            };
        }
        if selector == sel.title.selector {
            return vec![Node::Text(format!("Title {}", item.id))];
        }
        if selector == sel.author.selector {
            return vec![Node::Text(format!("Author {}", item.id))];
        }
        if selector == sel.author_page.selector {
            return vec![Node::Link(format!("/users/{}", item.id * 10))];
        }
        if selector == sel.posting_date.selector {
            return vec![Node::Text("2024年1月2日 03:04".to_string())];
        }
        if selector == sel.description.selector {
            return item.description.clone().map(Node::Text).into_iter().collect();
        }
        if selector == sel.tag_list {
            let mut entries: Vec<Node> = item
                .tags
                .iter()
                .map(|tag| Node::TagEntry(Some(tag.clone())))
                .collect();
            entries.push(Node::TagEntry(None));
            return entries;
        }
        Vec::new()
    }

    /// Which sub-asset a popup-producing selector points at.
    fn sub_index_for(&self, selector: &str, item: &FakeItem) -> Option<u32> {
        let sel = &self.shared.selectors;
        if selector == sel.asset_anchor {
            return Some(0);
        }
        (1..=item.sub_assets())
            .find(|k| selector == sel.sub_asset_anchor(*k))
            .map(|k| k - 1)
    }

    fn take_popup(&self) -> Option<String> {
        self.inner().pending_popup.take()
    }
}

#[async_trait::async_trait]
impl PageClient for FakeSurface {
    async fn navigate(&self, url: &str) -> Result<()> {
        let landed = if url == LEGACY_URL { COLLECTION_URL } else { url };

        {
            let mut state = self.shared.state();
            match self.role {
                Role::Listing => state.listing_navigations.push(landed.to_string()),
                Role::Item => state.item_visits.push(landed.to_string()),
                Role::Popup => {}
            }
            if self.role == Role::Listing
                && landed == SITE_ROOT
                && let Some(cookie) = state.rotated_cookie.clone()
            {
                state.upsert_cookies(&[cookie]);
            }
        }

        let mut inner = self.inner();
        *inner = SurfaceState {
            url: landed.to_string(),
            ..Default::default()
        };
        Ok(())
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let nodes = match self.role {
            Role::Listing => self.listing_nodes(selector),
            Role::Item => self.item_nodes(selector),
            Role::Popup if selector == self.shared.selectors.full_image => vec![Node::FullImage],
            Role::Popup => Vec::new(),
        };
        Ok(self.register(nodes))
    }

    async fn query_one(&self, selector: &str) -> Result<Option<ElementHandle>> {
        Ok(self.query(selector).await?.into_iter().next())
    }

    async fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        let sel = &self.shared.selectors;
        let nodes = match self.node(scope)? {
            Node::Anchor(item) => {
                if selector == sel.item_thumbnail {
                    let alt = match item.kind {
                        FakeKind::Animated => format!("Title {} {}", item.id, sel.animated_marker),
                        _ => format!("Title {}", item.id),
                    };
                    vec![Node::Thumbnail(alt)]
                } else if selector == sel.multi_marker {
                    match item.kind {
                        FakeKind::Multi(_) | FakeKind::BadCount => vec![Node::MultiMarker],
                        _ => vec![],
                    }
                } else if selector == sel.multi_count {
                    match item.kind {
                        FakeKind::Multi(n) => vec![Node::CountLabel(n.to_string())],
                        FakeKind::BadCount => vec![Node::CountLabel("many".to_string())],
                        _ => vec![],
                    }
                } else {
                    vec![]
                }
            }
            Node::TagEntry(Some(tag)) if selector == sel.tag_text => vec![Node::TagLink(tag)],
            _ => vec![],
        };
        Ok(self.register(nodes))
    }

    async fn click(&self, target: ClickTarget<'_>, options: ClickOptions) -> Result<()> {
        let item = self
            .shown_item()
            .ok_or_else(|| HarvestError::Browser("nothing to click".to_string()))?;

        let selector = match target {
            ClickTarget::Element(handle) => {
                if let Node::WarningButton = self.node(handle)? {
                    self.inner().revealed = true;
                    self.shared.state().warnings_dismissed += 1;
                }
                return Ok(());
            }
            ClickTarget::Selector(selector) => selector,
        };

        if self.item_nodes(selector).is_empty() {
            return Err(HarvestError::ElementNotFound {
                selector: selector.to_string(),
            });
        }

        match options.button {
            MouseButton::Left => {
                self.inner().gallery_open = true;
                self.shared.state().galleries_opened += 1;
            }
            MouseButton::Middle => {
                {
                    let mut state = self.shared.state();
                    state.middle_clicks.push(selector.to_string());
                    if state.click_failures > 0 {
                        state.click_failures -= 1;
                        return Err(HarvestError::Browser("click intercepted".to_string()));
                    }
                }
                let sub_index = self
                    .sub_index_for(selector, &item)
                    .ok_or_else(|| HarvestError::Browser(format!("no link at {}", selector)))?;
                let sub_index = self.shared.state().popup_sub_index.unwrap_or(sub_index);
                self.inner().pending_popup = Some(asset_url(item.id, sub_index));
            }
        }
        Ok(())
    }

    async fn focus(&self, element: ElementHandle) -> Result<()> {
        self.node(element).map(|_| ())
    }

    async fn read_text(&self, element: ElementHandle) -> Result<Option<String>> {
        Ok(match self.node(element)? {
            Node::TotalCount => Some(self.shared.state().total()),
            Node::CountLabel(label) => Some(label),
            Node::Text(text) | Node::TagLink(text) => Some(text),
            Node::WarningButton => Some(self.shared.selectors.content_warning_label.clone()),
            _ => None,
        })
    }

    async fn read_attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        Ok(match (self.node(element)?, name) {
            (Node::Anchor(item), "href") => Some(format!("/artworks/{}", item.id)),
            (Node::Thumbnail(alt), "alt") => Some(alt),
            (Node::Link(href), "href") => Some(href),
            _ => None,
        })
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.inner().url.clone())
    }

    async fn reload(&self) -> Result<CapturedResponse> {
        let url = self.inner().url.clone();
        self.inner().nodes.clear();

        let redirected = self.role == Role::Popup && self.shared.state().redirect_response;
        let response_url = if redirected {
            "https://img.fake.test/error/403.png".to_string()
        } else {
            url
        };
        Ok(CapturedResponse {
            body: format!("bytes of {}", response_url).into_bytes(),
            url: response_url,
        })
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>> {
        match self.role {
            Role::Listing => Ok(self.shared.state().jar.clone()),
            _ => Ok(Vec::new()),
        }
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()> {
        if self.role == Role::Listing {
            self.shared.state().upsert_cookies(cookies);
        }
        Ok(())
    }
}

pub struct FakeContext {
    primary: FakeSurface,
}

#[async_trait::async_trait]
impl InteractionContext for FakeContext {
    type Surface = FakeSurface;

    fn primary(&self) -> &FakeSurface {
        &self.primary
    }

    async fn wait_for_popup(&self) -> Result<FakeSurface> {
        let url = self
            .primary
            .take_popup()
            .ok_or_else(|| HarvestError::Browser("no popup opened".to_string()))?;
        self.primary.shared.state().popups_opened += 1;
        Ok(FakeSurface::new(self.primary.shared.clone(), Role::Popup, &url))
    }

    async fn close_surface(&self, _surface: FakeSurface) -> Result<()> {
        self.primary.shared.state().popups_closed += 1;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.primary.shared.state().contexts_closed += 1;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BrowserSurfaces for FakeSite {
    type Context = FakeContext;

    async fn open_context(&self, cookies: &[SessionCookie]) -> Result<FakeContext> {
        self.state().contexts_opened.push(cookies.to_vec());
        Ok(FakeContext {
            primary: FakeSurface::new(self.shared.clone(), Role::Item, "about:blank"),
        })
    }
}

pub fn session_cookie(name: &str, value: &str) -> SessionCookie {
    SessionCookie {
        name: name.to_string(),
        value: value.to_string(),
        domain: ".fake.test".to_string(),
        path: "/".to_string(),
        expires: 1_900_000_000.0,
        http_only: true,
        secure: true,
        same_site: None,
    }
}

/// A storage root in a temp dir plus a config aimed at [`FakeSite`].
pub struct Harness {
    _temp: TempDir,
    pub config: Config,
}

impl Harness {
    pub fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.root = temp.path().to_path_buf();
        config.collection.base_url = SITE_ROOT.to_string();
        config.collection.legacy_bookmark_url = LEGACY_URL.to_string();
        config.collection.items_per_page = 2;
        config.retry.click_retry_delay_ms = 0;
        config.retry.stabilize_attempts = 5;
        config.retry.stabilize_delay_ms = 0;
        config.retry.selector_wait_attempts = 3;
        config.retry.selector_wait_delay_ms = 0;

        utils::ensure_dirs(&config.storage.required_dirs()).unwrap();
        Self {
            _temp: temp,
            config,
        }
    }

    pub fn artifacts(&self) -> FsArtifactStore {
        let storage = &self.config.storage;
        FsArtifactStore::new(storage.asset_dir(), storage.metadata_dir())
    }

    pub fn checkpoints(&self) -> FileCheckpointStore {
        FileCheckpointStore::new(self.config.storage.checkpoint_path())
    }

    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.config.storage.cookie_dir())
    }

    pub fn run_log(&self) -> RunLog {
        RunLog::for_today(self.config.storage.log_dir())
    }

    pub fn asset_path(&self, file_name: &str) -> PathBuf {
        self.config.storage.asset_dir().join(file_name)
    }

    pub fn metadata_path(&self, base_name: &str) -> PathBuf {
        self.config
            .storage
            .metadata_dir()
            .join(format!("{}.json", base_name))
    }

    pub fn checkpoint(&self) -> Option<ResumeCheckpoint> {
        use bookmark_harvester::harvest::CheckpointStore;
        self.checkpoints().load().unwrap()
    }

    pub fn run_log_text(&self) -> String {
        std::fs::read_to_string(self.run_log().path()).unwrap_or_default()
    }

    pub async fn run(
        &self,
        site: &FakeSite,
    ) -> std::result::Result<HarvestSummary, HarvestFailure> {
        let artifacts = self.artifacts();
        let checkpoints = self.checkpoints();
        let sessions = self.sessions();
        let run_log = self.run_log();

        CollectionDriver::new(
            Collaborators {
                listing: site.listing(),
                surfaces: site,
                artifacts: &artifacts,
                checkpoints: &checkpoints,
                sessions: &sessions,
                run_log: &run_log,
            },
            &self.config,
        )
        .run()
        .await
    }
}

use super::{BrowserSurfaces, ChromePageClient, InteractionContext, PageClient, SessionCookie};
use crate::{
    HarvestError, Result,
    config::Config,
    timeouts::{ms, secs},
};
use chromiumoxide::cdp::browser_protocol::target::CloseTargetParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileKind {
    Listing,
    Item,
}

impl ProfileKind {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Listing => "listing-profile",
            Self::Item => "item-profile",
        }
    }
}

struct LaunchedBrowser {
    browser: Browser,
    handler: JoinHandle<()>,
    page: Arc<Page>,
}

/// Owns the long-lived listing browser and launches the short-lived item
/// browsers on demand.
pub struct BrowserSessionManager {
    config: Arc<Config>,
    chrome_path: String,
    browser: Browser,
    handler: JoinHandle<()>,
    listing: ChromePageClient,
}

impl BrowserSessionManager {
    pub async fn launch(config: Arc<Config>) -> Result<Self> {
        let chrome_path = config
            .browser
            .chrome_path
            .clone()
            .map(Ok)
            .unwrap_or_else(crate::utils::find_chrome_executable)?
            .to_string_lossy()
            .to_string();

        tracing::info!("Launching Chrome from {}", chrome_path);

        let launched = launch_browser(&config, &chrome_path, ProfileKind::Listing).await?;
        let listing = ChromePageClient::new(launched.page, navigation_timeout(&config));

        Ok(Self {
            config,
            chrome_path,
            browser: launched.browser,
            handler: launched.handler,
            listing,
        })
    }

    pub fn listing(&self) -> &ChromePageClient {
        &self.listing
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| HarvestError::Browser(format!("Failed to close browser: {}", e)))?;
        self.browser.wait().await.ok();
        self.handler.abort();
        Ok(())
    }
}

#[async_trait::async_trait]
impl BrowserSurfaces for BrowserSessionManager {
    type Context = ChromeContext;

    async fn open_context(&self, cookies: &[SessionCookie]) -> Result<ChromeContext> {
        let launched = launch_browser(&self.config, &self.chrome_path, ProfileKind::Item).await?;
        let primary = ChromePageClient::new(launched.page, navigation_timeout(&self.config));
        primary.set_cookies(cookies).await?;

        Ok(ChromeContext {
            browser: launched.browser,
            handler: launched.handler,
            primary,
            known_targets: Mutex::new(Vec::new()),
            navigation_timeout: navigation_timeout(&self.config),
        })
    }
}

/// An isolated browser process dedicated to one item.
pub struct ChromeContext {
    browser: Browser,
    handler: JoinHandle<()>,
    primary: ChromePageClient,
    known_targets: Mutex<Vec<String>>,
    navigation_timeout: Duration,
}

#[async_trait::async_trait]
impl InteractionContext for ChromeContext {
    type Surface = ChromePageClient;

    fn primary(&self) -> &ChromePageClient {
        &self.primary
    }

    async fn wait_for_popup(&self) -> Result<ChromePageClient> {
        let primary_id = self.primary.target_id();
        let deadline = tokio::time::Instant::now() + Duration::from_secs(secs::POPUP_OPEN);

        loop {
            let pages = self
                .browser
                .pages()
                .await
                .map_err(|e| HarvestError::Browser(format!("Failed to list pages: {}", e)))?;

            let popup = {
                let known = self.known_targets.lock().await;
                pages.into_iter().find(|page| {
                    let id = page.target_id().inner();
                    *id != primary_id && !known.contains(id)
                })
            };

            if let Some(page) = popup {
                self.known_targets
                    .lock()
                    .await
                    .push(page.target_id().inner().to_string());

                let timeout = self.navigation_timeout;
                tokio::time::timeout(timeout, page.wait_for_navigation())
                    .await
                    .map_err(|_| HarvestError::NavigationTimeout(timeout.as_secs()))?
                    .map_err(|e| HarvestError::Browser(format!("Popup failed to load: {}", e)))?;

                return Ok(ChromePageClient::new(Arc::new(page), self.navigation_timeout));
            }

            if tokio::time::Instant::now() >= deadline {
                return Err(HarvestError::Browser(format!(
                    "No popup opened within {}s",
                    secs::POPUP_OPEN
                )));
            }

            tokio::time::sleep(Duration::from_millis(ms::POPUP_POLL)).await;
        }
    }

    async fn close_surface(&self, surface: ChromePageClient) -> Result<()> {
        let target_id = surface.page().target_id().clone();
        surface
            .page()
            .execute(CloseTargetParams::new(target_id))
            .await
            .map_err(|e| HarvestError::Browser(format!("Failed to close popup: {}", e)))?;
        Ok(())
    }

    async fn close(self) -> Result<()> {
        let Self {
            mut browser,
            handler,
            ..
        } = self;

        let closed = browser
            .close()
            .await
            .map_err(|e| HarvestError::Browser(format!("Failed to close item browser: {}", e)));
        browser.wait().await.ok();
        handler.abort();
        closed.map(|_| ())
    }
}

fn navigation_timeout(config: &Config) -> Duration {
    Duration::from_secs(config.browser.request_timeout_secs.max(secs::NAVIGATION))
}

fn profile_dir(config: &Config, kind: ProfileKind) -> PathBuf {
    config
        .browser
        .user_data_dir
        .clone()
        .unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("/tmp"))
                .join("bookmark-harvester")
        })
        .join(kind.dir_name())
}

async fn launch_browser(
    config: &Config,
    chrome_path: &str,
    kind: ProfileKind,
) -> Result<LaunchedBrowser> {
    let user_data = profile_dir(config, kind);
    std::fs::create_dir_all(&user_data)
        .map_err(|e| HarvestError::resource("browser profile directory", e))?;

    // A crashed previous run leaves this behind and Chrome refuses to start.
    let lock_file = user_data.join("SingletonLock");
    if lock_file.exists() || lock_file.is_symlink() {
        std::fs::remove_file(&lock_file).ok();
    }

    let width = config.browser.window_width;
    let height = config.browser.window_height;
    let x_offset = match kind {
        ProfileKind::Listing => 0,
        ProfileKind::Item => width,
    };

    let mut builder = BrowserConfig::builder()
        .chrome_executable(chrome_path)
        .user_data_dir(&user_data)
        .window_size(width, height)
        .arg(format!("--window-position={},5", x_offset))
        .request_timeout(Duration::from_secs(config.browser.request_timeout_secs));

    if !config.browser.headless {
        builder = builder.with_head();
    }

    let browser_config = builder.build().map_err(HarvestError::LaunchFailed)?;

    let (mut browser, mut handler) = Browser::launch(browser_config)
        .await
        .map_err(|e| HarvestError::LaunchFailed(e.to_string()))?;

    let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });

    // The startup tab is only visible to pages() once targets are fetched.
    if let Err(e) = browser.fetch_targets().await {
        tracing::debug!("Target discovery failed: {}", e);
    }

    let page = match browser.pages().await.ok().and_then(|p| p.into_iter().next()) {
        Some(page) => page,
        None => browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::LaunchFailed(e.to_string()))?,
    };

    tracing::debug!("Chrome ready ({:?} profile at {})", kind, user_data.display());

    Ok(LaunchedBrowser {
        browser,
        handler,
        page: Arc::new(page),
    })
}

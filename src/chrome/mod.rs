pub mod cookies;
pub mod page_client;
pub mod session_manager;

use crate::Result;

pub use cookies::{SessionCookie, SessionStore};
pub use page_client::ChromePageClient;
pub use session_manager::{BrowserSessionManager, ChromeContext};

/// Opaque reference to an element on one surface.
///
/// Handles are only meaningful to the surface that returned them and are
/// invalidated by the next navigation or reload of that surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(u64);

impl ElementHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickTarget<'a> {
    Element(ElementHandle),
    Selector(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseButton {
    #[default]
    Left,
    /// Opens links on a new surface instead of navigating in place.
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClickOptions {
    pub button: MouseButton,
}

impl ClickOptions {
    pub fn middle() -> Self {
        Self {
            button: MouseButton::Middle,
        }
    }
}

/// Main-document response captured while reloading a surface.
#[derive(Debug, Clone)]
pub struct CapturedResponse {
    pub url: String,
    pub body: Vec<u8>,
}

/// Everything the harvester needs from one browsing surface.
#[async_trait::async_trait]
pub trait PageClient: Send + Sync {
    /// Navigates and waits for the load to complete.
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>>;
    async fn query_one(&self, selector: &str) -> Result<Option<ElementHandle>>;
    async fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>>;

    async fn query_one_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Option<ElementHandle>> {
        Ok(self.query_within(scope, selector).await?.into_iter().next())
    }

    async fn click(&self, target: ClickTarget<'_>, options: ClickOptions) -> Result<()>;
    async fn focus(&self, element: ElementHandle) -> Result<()>;
    async fn read_text(&self, element: ElementHandle) -> Result<Option<String>>;
    async fn read_attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>>;
    async fn current_url(&self) -> Result<String>;
    /// Reloads the surface and returns the response for its main document.
    async fn reload(&self) -> Result<CapturedResponse>;
    async fn cookies(&self) -> Result<Vec<SessionCookie>>;
    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()>;
}

/// A short-lived, isolated browsing context used to extract one item.
#[async_trait::async_trait]
pub trait InteractionContext: Send + Sync + Sized {
    type Surface: PageClient;

    fn primary(&self) -> &Self::Surface;

    /// Waits for the surface opened by the last popup-producing click.
    async fn wait_for_popup(&self) -> Result<Self::Surface>;
    async fn close_surface(&self, surface: Self::Surface) -> Result<()>;
    async fn close(self) -> Result<()>;
}

#[async_trait::async_trait]
pub trait BrowserSurfaces: Send + Sync {
    type Context: InteractionContext;

    /// Opens a fresh context already carrying the given session cookies.
    async fn open_context(&self, cookies: &[SessionCookie]) -> Result<Self::Context>;
}

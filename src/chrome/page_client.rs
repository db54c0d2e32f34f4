use super::{
    CapturedResponse, ClickOptions, ClickTarget, ElementHandle, MouseButton, PageClient,
    SessionCookie,
};
use crate::{HarvestError, Result, timeouts::ms};
use base64::Engine;
use chromiumoxide::Page;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton as CdpMouseButton,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, EventLoadingFinished, EventResponseReceived,
    GetCookiesParams, GetResponseBodyParams, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::ReloadParams;
use chromiumoxide::element::Element;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// [`PageClient`] over one Chrome tab.
///
/// Element handles map to entries of an in-memory registry which is dropped
/// whenever the document changes.
pub struct ChromePageClient {
    page: Arc<Page>,
    elements: Mutex<HashMap<u64, Arc<Element>>>,
    next_id: AtomicU64,
    navigation_timeout: Duration,
}

impl ChromePageClient {
    pub fn new(page: Arc<Page>, navigation_timeout: Duration) -> Self {
        Self {
            page,
            elements: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            navigation_timeout,
        }
    }

    pub fn page(&self) -> &Arc<Page> {
        &self.page
    }

    pub fn target_id(&self) -> String {
        self.page.target_id().inner().to_string()
    }

    async fn register(&self, found: Vec<Element>) -> Vec<ElementHandle> {
        let mut elements = self.elements.lock().await;
        found
            .into_iter()
            .map(|element| {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                elements.insert(id, Arc::new(element));
                ElementHandle::new(id)
            })
            .collect()
    }

    async fn forget_elements(&self) {
        self.elements.lock().await.clear();
    }

    async fn click_element(&self, element: &Element, options: ClickOptions) -> Result<()> {
        element
            .scroll_into_view()
            .await
            .map_err(|e| HarvestError::Browser(format!("Scroll failed: {}", e)))?;

        match options.button {
            MouseButton::Left => {
                element
                    .click()
                    .await
                    .map_err(|e| HarvestError::Browser(format!("Click failed: {}", e)))?;
            }
            MouseButton::Middle => {
                let point = element
                    .clickable_point()
                    .await
                    .map_err(|e| HarvestError::Browser(format!("Element not clickable: {}", e)))?;

                for event_type in [
                    DispatchMouseEventType::MousePressed,
                    DispatchMouseEventType::MouseReleased,
                ] {
                    let params = DispatchMouseEventParams::builder()
                        .r#type(event_type)
                        .x(point.x)
                        .y(point.y)
                        .button(CdpMouseButton::Middle)
                        .click_count(1)
                        .build()
                        .map_err(|e| {
                            HarvestError::Browser(format!("Failed to build mouse event: {}", e))
                        })?;

                    self.page.execute(params).await.map_err(|e| {
                        HarvestError::Browser(format!("Middle click failed: {}", e))
                    })?;
                }
            }
        }

        Ok(())
    }

    async fn element(&self, handle: ElementHandle) -> Result<Arc<Element>> {
        self.elements
            .lock()
            .await
            .get(&handle.id())
            .cloned()
            .ok_or_else(|| HarvestError::Browser(format!("Stale element handle #{}", handle.id())))
    }
}

fn browser_err(context: &str) -> impl Fn(chromiumoxide::error::CdpError) -> HarvestError + '_ {
    move |e| HarvestError::Browser(format!("{}: {}", context, e))
}

#[async_trait::async_trait]
impl PageClient for ChromePageClient {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.forget_elements().await;

        tokio::time::timeout(self.navigation_timeout, self.page.goto(url))
            .await
            .map_err(|_| HarvestError::NavigationTimeout(self.navigation_timeout.as_secs()))?
            .map_err(browser_err("Navigation failed"))?;

        tracing::debug!("Loaded {}", url);
        Ok(())
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let found = self
            .page
            .find_elements(selector)
            .await
            .map_err(browser_err("Query failed"))?;
        Ok(self.register(found).await)
    }

    async fn query_one(&self, selector: &str) -> Result<Option<ElementHandle>> {
        Ok(self.query(selector).await?.into_iter().next())
    }

    async fn query_within(
        &self,
        scope: ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        let found = self
            .element(scope)
            .await?
            .find_elements(selector)
            .await
            .map_err(browser_err("Scoped query failed"))?;
        Ok(self.register(found).await)
    }

    async fn click(&self, target: ClickTarget<'_>, options: ClickOptions) -> Result<()> {
        let element = match target {
            ClickTarget::Element(handle) => self.element(handle).await?,
            ClickTarget::Selector(selector) => {
                Arc::new(self.page.find_element(selector).await.map_err(|_| {
                    HarvestError::ElementNotFound {
                        selector: selector.to_string(),
                    }
                })?)
            }
        };

        let timeout = Duration::from_millis(ms::CDP_ACTION);
        tokio::time::timeout(timeout, self.click_element(&element, options))
            .await
            .map_err(|_| HarvestError::Browser("Click timed out".to_string()))?
    }

    async fn focus(&self, element: ElementHandle) -> Result<()> {
        self.element(element)
            .await?
            .focus()
            .await
            .map_err(browser_err("Focus failed"))?;
        Ok(())
    }

    async fn read_text(&self, element: ElementHandle) -> Result<Option<String>> {
        self.element(element)
            .await?
            .inner_text()
            .await
            .map_err(browser_err("Read text failed"))
    }

    async fn read_attribute(&self, element: ElementHandle, name: &str) -> Result<Option<String>> {
        let el = self.element(element).await?;

        // Properties resolve relative href/src values against the document.
        if let Ok(Some(value)) = el.property(name).await
            && let Some(resolved) = value.as_str()
        {
            return Ok(Some(resolved.to_string()));
        }

        el.attribute(name)
            .await
            .map_err(browser_err("Read attribute failed"))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(browser_err("Failed to read URL"))?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn reload(&self) -> Result<CapturedResponse> {
        self.forget_elements().await;

        let enable = NetworkEnableParams::builder()
            .max_total_buffer_size(i64::from(i32::MAX))
            .max_resource_buffer_size(i64::from(i32::MAX))
            .build();
        self.page
            .execute(enable)
            .await
            .map_err(browser_err("Failed to enable Network domain"))?;

        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .map_err(browser_err("Failed to attach response listener"))?;
        let mut finished = self
            .page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(browser_err("Failed to attach loading listener"))?;

        self.page
            .execute(ReloadParams::builder().ignore_cache(true).build())
            .await
            .map_err(browser_err("Reload failed"))?;

        let wait = Duration::from_millis(ms::RESPONSE_WAIT);
        let timed_out = |_| HarvestError::NavigationTimeout(wait.as_secs());

        let response = tokio::time::timeout(wait, async {
            while let Some(event) = responses.next().await {
                if event.r#type == ResourceType::Document {
                    return Ok(event);
                }
            }
            Err(HarvestError::Browser("Response stream closed".to_string()))
        })
        .await
        .map_err(timed_out)??;

        let request_id = response.request_id.clone();
        tokio::time::timeout(wait, async {
            while let Some(event) = finished.next().await {
                if event.request_id == request_id {
                    return Ok(());
                }
            }
            Err(HarvestError::Browser("Loading stream closed".to_string()))
        })
        .await
        .map_err(timed_out)??;

        let body = self
            .page
            .execute(GetResponseBodyParams::new(request_id))
            .await
            .map_err(browser_err("Failed to read response body"))?;

        let bytes = if body.base64_encoded {
            base64::engine::general_purpose::STANDARD
                .decode(&body.body)
                .map_err(|e| HarvestError::Browser(format!("Invalid response body: {}", e)))?
        } else {
            body.body.clone().into_bytes()
        };

        Ok(CapturedResponse {
            url: response.response.url.clone(),
            body: bytes,
        })
    }

    async fn cookies(&self) -> Result<Vec<SessionCookie>> {
        let response = self
            .page
            .execute(GetCookiesParams::default())
            .await
            .map_err(browser_err("Failed to get cookies"))?;

        Ok(response
            .cookies
            .clone()
            .into_iter()
            .map(SessionCookie::from)
            .collect())
    }

    async fn set_cookies(&self, cookies: &[SessionCookie]) -> Result<()> {
        for cookie in cookies {
            tracing::debug!("Setting cookie {}", cookie.name);
            self.page
                .execute(cookie.to_params()?)
                .await
                .map_err(browser_err("Failed to set cookie"))?;
        }
        Ok(())
    }
}

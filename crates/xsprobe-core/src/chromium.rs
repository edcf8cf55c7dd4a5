//! Chromium engine driver.
//!
//! Drives a headless Chromium instance over CDP (`chromiumoxide`).
//! Each render opens a fresh page, installs a Fetch-domain
//! interception rule that attaches a freshly minted identity assertion
//! to same-origin requests, auto-dismisses any JavaScript dialog the
//! untrusted content raises, navigates to the application's rendering
//! surface, and holds the page open for the observation window before
//! tearing it down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, ContinueRequestParams, EventRequestPaused, HeaderEntry,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventJavascriptDialogOpening, HandleJavaScriptDialogParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assertion::AssertionIssuer;
use crate::config::PoolConfig;
use crate::engine::{EngineSession, RenderEngine};
use crate::error::{EngineError, RenderError};
use crate::task::RenderTask;

/// How long a context is held open after navigation settles, so
/// delayed script execution has a chance to occur. A policy constant,
/// not user-configurable: it trades verification latency against
/// thoroughness.
const OBSERVATION_WINDOW: Duration = Duration::from_secs(5);

/// Production engine: launches headless Chromium.
pub struct ChromiumEngine {
    target_app_url: String,
    render_timeout: Duration,
    headful: bool,
    issuer: Arc<dyn AssertionIssuer>,
}

impl ChromiumEngine {
    /// Build a driver from pool configuration and an assertion issuer.
    pub fn new(
        config: &PoolConfig,
        issuer: Arc<dyn AssertionIssuer>,
    ) -> Result<Self, EngineError> {
        // Validated here as well as in config, since the engine can be
        // constructed directly.
        url::Url::parse(&config.target_app_url)
            .map_err(|e| EngineError::InvalidConfig(format!("target_app_url: {e}")))?;
        Ok(Self {
            target_app_url: config.target_app_url.trim_end_matches('/').to_string(),
            render_timeout: config.render_timeout(),
            headful: config.headful,
            issuer,
        })
    }
}

#[async_trait]
impl RenderEngine for ChromiumEngine {
    async fn launch(&self) -> Result<Arc<dyn EngineSession>, EngineError> {
        let mut builder = BrowserConfig::builder().args(vec!["--no-sandbox"]);
        if self.headful {
            builder = builder.with_head();
        }
        let browser_config = builder.build().map_err(EngineError::InvalidConfig)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| EngineError::LaunchFailed(e.to_string()))?;

        // The handler pumps CDP messages for the whole browser; it ends
        // when the connection drops.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        info!("rendering engine launched");

        Ok(Arc::new(ChromiumSession {
            browser: tokio::sync::Mutex::new(browser),
            handler_task,
            target_app_url: self.target_app_url.clone(),
            render_timeout: self.render_timeout,
            issuer: Arc::clone(&self.issuer),
        }))
    }
}

struct ChromiumSession {
    browser: tokio::sync::Mutex<Browser>,
    handler_task: JoinHandle<()>,
    target_app_url: String,
    render_timeout: Duration,
    issuer: Arc<dyn AssertionIssuer>,
}

#[async_trait]
impl EngineSession for ChromiumSession {
    async fn render(&self, task: &RenderTask) -> Result<(), RenderError> {
        let page = {
            let browser = self.browser.lock().await;
            browser
                .new_page("about:blank")
                .await
                .map_err(|e| RenderError::ContextClosed(e.to_string()))?
        };

        let result = self.drive(&page, task).await;

        // Always tear the context down, success or not.
        if let Err(err) = page.close().await {
            debug!(error = %err, "failed to close rendering context");
        }

        result
    }

    async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if let Err(err) = browser.close().await {
            debug!(error = %err, "engine close reported an error");
        }
        if let Err(err) = browser.wait().await {
            debug!(error = %err, "engine process wait reported an error");
        }
        self.handler_task.abort();
        info!("rendering engine closed");
    }
}

impl ChromiumSession {
    async fn drive(&self, page: &Page, task: &RenderTask) -> Result<(), RenderError> {
        let dialog_task = self.dismiss_dialogs(page).await?;
        let intercept_task = self.inject_credentials(page, task).await?;

        let surface = rendering_surface_url(&self.target_app_url);
        let timeout_ms = u64::try_from(self.render_timeout.as_millis()).unwrap_or(u64::MAX);

        let navigation = async {
            page.goto(surface.as_str())
                .await
                .map_err(|e| RenderError::Navigation(e.to_string()))?;
            // Let in-flight requests settle before observing.
            page.wait_for_navigation()
                .await
                .map_err(|e| RenderError::Navigation(e.to_string()))?;
            Ok::<(), RenderError>(())
        };

        let outcome = match tokio::time::timeout(self.render_timeout, navigation).await {
            Ok(Ok(())) => {
                // Hold the context open so delayed execution can occur.
                tokio::time::sleep(OBSERVATION_WINDOW).await;
                Ok(())
            }
            Ok(Err(err)) => Err(err),
            Err(_) => Err(RenderError::NavigationTimeout(timeout_ms)),
        };

        intercept_task.abort();
        dialog_task.abort();
        outcome
    }

    /// Auto-dismiss any native dialog the page raises; untrusted
    /// content may trigger alerts/confirms/prompts as a side effect of
    /// executing, and these must never block the render.
    async fn dismiss_dialogs(&self, page: &Page) -> Result<JoinHandle<()>, RenderError> {
        let mut dialogs = page
            .event_listener::<EventJavascriptDialogOpening>()
            .await
            .map_err(|e| RenderError::Interception(e.to_string()))?;

        let dialog_page = page.clone();
        Ok(tokio::spawn(async move {
            while let Some(dialog) = dialogs.next().await {
                debug!(message = %dialog.message, "dismissing page dialog");
                let _ = dialog_page
                    .execute(HandleJavaScriptDialogParams::new(false))
                    .await;
            }
        }))
    }

    /// Install the per-context interception rule: requests whose URL is
    /// under `target_app_url` are continued with a freshly minted
    /// identity assertion for the impersonated sender; everything else
    /// passes through unmodified.
    async fn inject_credentials(
        &self,
        page: &Page,
        task: &RenderTask,
    ) -> Result<JoinHandle<()>, RenderError> {
        page.execute(fetch::EnableParams::default())
            .await
            .map_err(|e| RenderError::Interception(e.to_string()))?;

        let mut requests = page
            .event_listener::<EventRequestPaused>()
            .await
            .map_err(|e| RenderError::Interception(e.to_string()))?;

        let intercept_page = page.clone();
        let target = self.target_app_url.clone();
        let issuer = Arc::clone(&self.issuer);
        let sender = task.sender.clone();

        Ok(tokio::spawn(async move {
            while let Some(event) = requests.next().await {
                let mut params = ContinueRequestParams::new(event.request_id.clone());
                if event.request.url.starts_with(&target) {
                    // Mint a fresh assertion per request.
                    let cookie = format!("token={}", issuer.issue(&sender));
                    let existing = serde_json::to_value(&event.request.headers)
                        .unwrap_or(serde_json::Value::Null);
                    params.headers = Some(merge_cookie_header(&existing, &cookie));
                }
                if let Err(err) = intercept_page.execute(params).await {
                    warn!(error = %err, "failed to continue intercepted request");
                }
            }
        }))
    }
}

/// The application's task-rendering surface.
fn rendering_surface_url(target_app_url: &str) -> String {
    format!("{}/app", target_app_url.trim_end_matches('/'))
}

/// Rebuild a request's header list with the forged cookie attached,
/// replacing any cookie the request already carried.
fn merge_cookie_header(existing: &serde_json::Value, cookie: &str) -> Vec<HeaderEntry> {
    let mut headers: Vec<HeaderEntry> = Vec::new();
    if let serde_json::Value::Object(map) = existing {
        for (name, value) in map {
            if name.eq_ignore_ascii_case("cookie") {
                continue;
            }
            if let Some(value) = value.as_str() {
                headers.push(HeaderEntry {
                    name: name.clone(),
                    value: value.to_string(),
                });
            }
        }
    }
    headers.push(HeaderEntry {
        name: "cookie".to_string(),
        value: cookie.to_string(),
    });
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assertion::HmacAssertionIssuer;

    #[test]
    fn surface_url_joins_without_double_slash() {
        assert_eq!(
            rendering_surface_url("http://localhost:3000"),
            "http://localhost:3000/app"
        );
        assert_eq!(
            rendering_surface_url("http://localhost:3000/"),
            "http://localhost:3000/app"
        );
    }

    #[test]
    fn merge_replaces_existing_cookie() {
        let existing = serde_json::json!({
            "User-Agent": "test",
            "Cookie": "token=stale",
        });
        let headers = merge_cookie_header(&existing, "token=fresh");

        let cookies: Vec<_> = headers
            .iter()
            .filter(|h| h.name.eq_ignore_ascii_case("cookie"))
            .collect();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0].value, "token=fresh");
        assert!(headers.iter().any(|h| h.name == "User-Agent"));
    }

    #[test]
    fn merge_handles_missing_headers() {
        let headers = merge_cookie_header(&serde_json::Value::Null, "token=t");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers[0].name, "cookie");
    }

    #[test]
    fn engine_rejects_invalid_target_url() {
        let mut config = PoolConfig::default();
        config.target_app_url = "not a url".into();
        let issuer = Arc::new(HmacAssertionIssuer::new(b"secret".to_vec(), 60));
        assert!(ChromiumEngine::new(&config, issuer).is_err());
    }

    #[test]
    fn engine_normalizes_trailing_slash() {
        let mut config = PoolConfig::default();
        config.target_app_url = "http://localhost:3000/".into();
        let issuer = Arc::new(HmacAssertionIssuer::new(b"secret".to_vec(), 60));
        let engine = ChromiumEngine::new(&config, issuer).unwrap();
        assert_eq!(engine.target_app_url, "http://localhost:3000");
    }
}

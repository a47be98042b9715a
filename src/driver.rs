use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, SetBlockedUrLsParams,
};
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, Viewport};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt as _;
use serde::Deserialize;
use tokio::task::JoinHandle;

use crate::config::{CaptureConfig, SelectorSet};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Failure taxonomy for one capture run. Callers branch on these, so they
/// are typed instead of flattened into `anyhow`.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// No target URL supplied; rejected before any browser work begins.
    #[error("url query parameter is required")]
    MissingParameter,

    /// The end-of-region marker never appeared. Recoverable in the sense
    /// that a full-page diagnostic shot of whatever did render rides along.
    #[error("capture region did not appear: {details}")]
    ContentTimeout {
        details: String,
        debug_screenshot: Option<String>,
    },

    /// The browser process could not start. Fatal, no image exists.
    #[error("failed to launch browser: {0}")]
    Launch(String),

    /// Anything else that went wrong mid-navigation or mid-capture.
    #[error("capture failed: {0}")]
    Failed(String),
}

/// On-screen rectangle of a DOM element, as reported by
/// `getBoundingClientRect`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Clip rectangle spanning the two region markers: x/y/width come from the
/// start element, height runs to the bottom edge of the end element.
pub fn clip_from_boxes(start: BoundingBox, end: BoundingBox) -> BoundingBox {
    BoundingBox {
        x: start.x,
        y: start.y,
        width: start.width,
        height: (end.y + end.height) - start.y,
    }
}

/// One isolated browser process and the single page driven in it.
///
/// The hard lifetime rule of this module: whoever launches a session must
/// call [`BrowserSession::close`] on every exit path, including the
/// diagnostic ones. The pipeline in `capture.rs` is the only launcher.
pub struct BrowserSession {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

impl BrowserSession {
    pub async fn launch(config: &CaptureConfig) -> Result<Self, CaptureError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(config.viewport_width, config.viewport_height);
        if let Some(chrome) = std::env::var("QUESTCARD_CHROME")
            .ok()
            .filter(|v| !v.trim().is_empty())
        {
            builder = builder.chrome_executable(chrome);
        }
        let browser_config = builder.build().map_err(CaptureError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| CaptureError::Launch(err.to_string()))?;

        // The handler must be pumped for the whole session or every CDP call
        // stalls. It ends when the browser connection drops.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                let failed = CaptureError::Failed(format!("open page: {err}"));
                close_browser(browser, handler_task).await;
                return Err(failed);
            }
        };

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Mobile emulation plus request filtering, applied before navigation.
    pub async fn prepare(&self, config: &CaptureConfig) -> Result<(), CaptureError> {
        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(i64::from(config.viewport_width))
            .height(i64::from(config.viewport_height))
            .device_scale_factor(2.0)
            .mobile(true)
            .build()
            .map_err(CaptureError::Failed)?;
        self.page
            .execute(metrics)
            .await
            .map_err(|err| CaptureError::Failed(format!("set viewport: {err}")))?;

        let user_agent = SetUserAgentOverrideParams::builder()
            .user_agent(config.user_agent.clone())
            .accept_language(config.accept_language.clone())
            .build()
            .map_err(CaptureError::Failed)?;
        self.page
            .execute(user_agent)
            .await
            .map_err(|err| CaptureError::Failed(format!("set user agent: {err}")))?;

        if !config.blocked_url_patterns.is_empty() {
            self.page
                .execute(NetworkEnableParams::default())
                .await
                .map_err(|err| CaptureError::Failed(format!("enable network domain: {err}")))?;
            self.page
                .execute(SetBlockedUrLsParams::new(
                    config.blocked_url_patterns.clone(),
                ))
                .await
                .map_err(|err| CaptureError::Failed(format!("set blocked urls: {err}")))?;
        }

        Ok(())
    }

    /// Loads the target URL, bounded by the configured navigation timeout.
    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), CaptureError> {
        let nav = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };
        match tokio::time::timeout(timeout, nav).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CaptureError::Failed(format!("navigate to {url}: {err}"))),
            Err(_) => Err(CaptureError::Failed(format!(
                "navigation to {url} timed out after {}s",
                timeout.as_secs()
            ))),
        }
    }

    /// Drives the page's language dropdown, if present. Best-effort: the
    /// control missing or the switch failing must not abort the capture.
    pub async fn select_language(&self, selectors: &SelectorSet, reload_timeout: Duration) {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.value = {val};
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_string(&selectors.language_control),
            val = js_string(&selectors.language_value),
        );

        match self.eval_value::<bool>(&js).await {
            Ok(true) => {
                tracing::debug!(value = %selectors.language_value, "language selected");
                // The site sometimes fully reloads after the switch. Wait
                // for that, bounded, and carry on regardless.
                let wait = tokio::time::timeout(reload_timeout, self.page.wait_for_navigation());
                match wait.await {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => {
                        tracing::debug!(?err, "navigation wait failed after language switch");
                    }
                    Err(_) => tracing::debug!("no navigation after language switch"),
                }
            }
            Ok(false) => {
                tracing::debug!(
                    selector = %selectors.language_control,
                    "language control not found; continuing"
                );
            }
            Err(err) => {
                tracing::debug!(?err, "language switch failed; continuing");
            }
        }
    }

    /// Waits for the end-of-region marker, measures both markers, and
    /// captures the clipped region. Falls back to a full-page shot when the
    /// markers are present but unmeasurable, and to a full-page *diagnostic*
    /// shot (inside the error) when the end marker never appears.
    pub async fn capture_region(
        &self,
        selectors: &SelectorSet,
        content_timeout: Duration,
    ) -> Result<String, CaptureError> {
        if !self
            .wait_for_selector(&selectors.region_end, content_timeout)
            .await
        {
            let debug_screenshot = match self.screenshot_full_page().await {
                Ok(image) => Some(image),
                Err(err) => {
                    tracing::warn!(?err, "diagnostic screenshot failed");
                    None
                }
            };
            return Err(CaptureError::ContentTimeout {
                details: format!(
                    "end marker '{}' not found within {}s",
                    selectors.region_end,
                    content_timeout.as_secs()
                ),
                debug_screenshot,
            });
        }

        let start_box = self.bounding_box(&selectors.region_start).await?;
        let end_box = self.bounding_box(&selectors.region_end).await?;

        match (start_box, end_box) {
            (Some(start), Some(end)) => {
                let clip = clip_from_boxes(start, end);
                self.screenshot_clipped(clip).await
            }
            _ => {
                // Never fail the request just because the crop coordinates
                // could not be computed.
                tracing::warn!(
                    start = %selectors.region_start,
                    end = %selectors.region_end,
                    "region marker unmeasurable; taking full page screenshot"
                );
                self.screenshot_full_page().await
            }
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let js = format!(
                "document.querySelector({}) !== null",
                js_string(selector)
            );
            match self.eval_value::<bool>(&js).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => tracing::debug!(?err, selector, "selector probe failed"),
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    /// `None` when the element is missing or has no box.
    async fn bounding_box(&self, selector: &str) -> Result<Option<BoundingBox>, CaptureError> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const r = el.getBoundingClientRect();
                if (r.width === 0 && r.height === 0) return null;
                return JSON.stringify({{ x: r.x, y: r.y, width: r.width, height: r.height }});
            }})()"#,
            sel = js_string(selector),
        );

        let raw = self.eval_value::<Option<String>>(&js).await?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let rect = serde_json::from_str(&raw)
            .map_err(|err| CaptureError::Failed(format!("parse bounding box: {err}")))?;
        Ok(Some(rect))
    }

    async fn screenshot_clipped(&self, clip: BoundingBox) -> Result<String, CaptureError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .clip(Viewport {
                x: clip.x,
                y: clip.y,
                width: clip.width,
                height: clip.height,
                scale: 1.0,
            })
            .build();
        let bytes = self
            .page
            .screenshot(params)
            .await
            .map_err(|err| CaptureError::Failed(format!("clipped screenshot: {err}")))?;
        Ok(BASE64.encode(bytes))
    }

    pub async fn screenshot_full_page(&self) -> Result<String, CaptureError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        let bytes = self
            .page
            .screenshot(params)
            .await
            .map_err(|err| CaptureError::Failed(format!("full page screenshot: {err}")))?;
        Ok(BASE64.encode(bytes))
    }

    /// Reads the element's direct text content, `None` when absent.
    pub async fn inner_text(&self, selector: &str) -> Result<Option<String>, CaptureError> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? el.innerText : null;
            }})()"#,
            sel = js_string(selector),
        );
        self.eval_value(&js).await
    }

    pub async fn attribute(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Option<String>, CaptureError> {
        let js = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? el.getAttribute({attr}) : null;
            }})()"#,
            sel = js_string(selector),
            attr = js_string(attribute),
        );
        self.eval_value(&js).await
    }

    /// The page's URL after navigation and any language-switch reload.
    pub async fn current_url(&self) -> Result<String, CaptureError> {
        self.page
            .url()
            .await
            .map_err(|err| CaptureError::Failed(format!("read page url: {err}")))?
            .ok_or_else(|| CaptureError::Failed("page has no url".to_string()))
    }

    async fn eval_value<T: serde::de::DeserializeOwned>(
        &self,
        js: &str,
    ) -> Result<T, CaptureError> {
        self.page
            .evaluate(js)
            .await
            .map_err(|err| CaptureError::Failed(format!("evaluate script: {err}")))?
            .into_value()
            .map_err(|err| CaptureError::Failed(format!("decode script result: {err}")))
    }

    /// Releases the browser process. Must run on every exit path.
    pub async fn close(self) {
        close_browser(self.browser, self.handler_task).await;
    }
}

async fn close_browser(mut browser: Browser, handler_task: JoinHandle<()>) {
    if let Err(err) = browser.close().await {
        tracing::debug!(?err, "browser close failed");
    }
    if let Err(err) = browser.wait().await {
        tracing::debug!(?err, "browser wait failed");
    }
    handler_task.abort();
}

/// Quotes a string as a JS literal; selectors come from operator config and
/// must not be able to break out of the script.
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

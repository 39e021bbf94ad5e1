//! Chrome/Chromium-backed [`BrowserLauncher`] over `chromiumoxide`.
//!
//! One [`ChromeSession`] owns one browser process, the task draining its CDP
//! handler, and a single page. Every CDP call is bounded by the navigation
//! timeout so a wedged renderer cannot hang the capture loop.

use super::{scripts, BrowserLauncher, BrowserSession, StabilityMeasurement};
use crate::config::{BrowserConfig, ControlIntent};
use crate::error::ExtractError;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, BrowserConfig as CdpBrowserConfig, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Launches a local Chrome/Chromium per session.
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher;

impl ChromeLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn open(
        &self,
        url: &str,
        config: &BrowserConfig,
    ) -> Result<Box<dyn BrowserSession>, ExtractError> {
        let executable = resolve_executable(config)?;
        let cdp_config = build_config(config, &executable)?;

        info!("Launching browser: {}", executable.display());
        let (browser, handler) = Browser::launch(cdp_config)
            .await
            .map_err(|e| ExtractError::Launch {
                reason: e.to_string(),
            })?;

        let mut session = ChromeSession {
            browser: Some(browser),
            handler: Some(spawn_handler(handler)),
            page: None,
            op_timeout: config.navigation_timeout,
            full_page: config.full_page,
        };

        match session.navigate(url).await {
            Ok(()) => Ok(Box::new(session)),
            Err(e) => {
                if let Err(close_err) = session.close().await {
                    warn!("Failed to close browser after navigation error: {}", close_err);
                }
                Err(e)
            }
        }
    }
}

/// A live browser with one navigated page.
pub struct ChromeSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: Option<Page>,
    op_timeout: Duration,
    full_page: bool,
}

#[derive(Debug, Deserialize)]
struct PageMetrics {
    height: u64,
    elements: u64,
}

impl ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), ExtractError> {
        let browser = self.browser.as_ref().ok_or_else(|| ExtractError::Navigation {
            url: url.to_string(),
            reason: "browser already closed".into(),
        })?;

        let start = Instant::now();
        let nav = async {
            let page = browser.new_page("about:blank").await?;
            page.goto(url).await?;
            Ok::<Page, chromiumoxide::error::CdpError>(page)
        };
        let page = tokio::time::timeout(self.op_timeout, nav)
            .await
            .map_err(|_| ExtractError::NavigationTimeout {
                url: url.to_string(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            })?
            .map_err(|e| ExtractError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        self.page = Some(page);

        let status: i64 = self
            .eval("navigation status", scripts::NAV_STATUS)
            .await
            .map_err(|e| ExtractError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        match status {
            -1 => Err(ExtractError::Navigation {
                url: url.to_string(),
                reason: "browser showed a network error page".into(),
            }),
            s if s >= 400 => Err(ExtractError::Navigation {
                url: url.to_string(),
                reason: format!("HTTP {s}"),
            }),
            s => {
                debug!(
                    "Loaded {} (HTTP {}) in {}ms",
                    url,
                    if s == 0 { "unknown".to_string() } else { s.to_string() },
                    start.elapsed().as_millis()
                );
                Ok(())
            }
        }
    }

    fn page(&self, operation: &'static str) -> Result<&Page, ExtractError> {
        self.page
            .as_ref()
            .ok_or_else(|| ExtractError::capture(operation, "page is closed"))
    }

    /// Run `fut` under the per-operation timeout.
    async fn bounded<T, E: std::fmt::Display>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T, E>>,
    ) -> Result<T, ExtractError> {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| {
                ExtractError::capture(
                    operation,
                    format!("timed out after {}ms", self.op_timeout.as_millis()),
                )
            })?
            .map_err(|e| ExtractError::capture(operation, e))
    }

    /// Evaluate a script expression and deserialize its return value.
    async fn eval<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        script: &str,
    ) -> Result<T, ExtractError> {
        let page = self.page(operation)?;
        let params = EvaluateParams::builder()
            .expression(script)
            .return_by_value(true)
            .await_promise(true)
            .build()
            .map_err(|e| ExtractError::capture(operation, e))?;
        let result = self
            .bounded(operation, page.evaluate_expression(params))
            .await?;
        result
            .into_value::<T>()
            .map_err(|e| ExtractError::capture(operation, e))
    }
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn scroll_to_bottom(&mut self) -> Result<bool, ExtractError> {
        self.eval("scroll", scripts::SCROLL_BOTTOM).await
    }

    async fn scroll_by_viewport(&mut self) -> Result<bool, ExtractError> {
        self.eval("scroll", scripts::SCROLL_VIEWPORT).await
    }

    async fn click_if_present(&mut self, intent: &ControlIntent) -> Result<bool, ExtractError> {
        if intent.is_empty() {
            return Ok(false);
        }
        let script =
            scripts::click_control(intent).map_err(|e| ExtractError::capture("click", e))?;
        self.eval("click", &script).await
    }

    async fn screenshot(&mut self) -> Result<Vec<u8>, ExtractError> {
        let page = self.page("screenshot")?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(self.full_page)
            .build();
        let png = self.bounded("screenshot", page.screenshot(params)).await?;
        debug!("Screenshot: {} bytes", png.len());
        Ok(png)
    }

    async fn measure(&mut self) -> Result<StabilityMeasurement, ExtractError> {
        let metrics: PageMetrics = self.eval("measure", scripts::MEASURE).await?;
        let png = self.screenshot().await?;
        Ok(StabilityMeasurement {
            page_height: metrics.height,
            element_count: metrics.elements,
            screenshot_hash: StabilityMeasurement::hash_screenshot(&png),
        })
    }

    async fn close(&mut self) -> Result<(), ExtractError> {
        if let Some(page) = self.page.take() {
            if let Err(e) = tokio::time::timeout(self.op_timeout, page.close()).await {
                debug!("Page close timed out: {}", e);
            }
        }

        if let Some(mut browser) = self.browser.take() {
            let closed = tokio::time::timeout(self.op_timeout, browser.close()).await;
            match closed {
                Ok(Ok(_)) => {
                    if tokio::time::timeout(self.op_timeout, browser.wait())
                        .await
                        .is_err()
                    {
                        warn!("Browser did not exit after close; killing");
                        kill(&mut browser).await;
                    }
                }
                Ok(Err(e)) => {
                    warn!("Browser close command failed ({}); killing", e);
                    kill(&mut browser).await;
                }
                Err(_) => {
                    warn!("Browser close timed out; killing");
                    kill(&mut browser).await;
                }
            }
        }

        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        Ok(())
    }

    fn abort(&mut self) {
        self.page = None;
        // Dropping the Browser kills its child process.
        if self.browser.take().is_some() {
            debug!("Browser process dropped");
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        self.abort();
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn resolve_executable(config: &BrowserConfig) -> Result<PathBuf, ExtractError> {
    if let Some(ref path) = config.chrome_executable {
        return Ok(path.clone());
    }
    chrome_probe::locate_chrome().map_err(|e| ExtractError::Launch {
        reason: e.to_string(),
    })
}

fn build_config(config: &BrowserConfig, executable: &Path) -> Result<CdpBrowserConfig, ExtractError> {
    let viewport = Viewport {
        width: config.viewport_width,
        height: config.viewport_height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: config.viewport_width >= config.viewport_height,
        has_touch: false,
    };

    let builder = CdpBrowserConfig::builder()
        .chrome_executable(executable)
        .window_size(config.viewport_width, config.viewport_height)
        .viewport(viewport)
        .request_timeout(config.navigation_timeout)
        .arg("--hide-scrollbars")
        .arg("--disable-dev-shm-usage")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio");

    let builder = if config.headless {
        builder
    } else {
        builder.with_head()
    };

    builder
        .build()
        .map_err(|reason| ExtractError::Launch { reason })
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                debug!("chromiumoxide handler error: {err}");
            }
        }
    })
}

async fn kill(browser: &mut Browser) {
    match browser.kill().await {
        Some(Err(e)) => warn!("Failed to kill browser process: {}", e),
        Some(Ok(())) => debug!("Browser process killed"),
        None => debug!("Browser process was not owned by this session"),
    }
}

//! Chromium-based renderer using chromiumoxide.

use super::script::{self, succeeded};
use super::{DownloadedFile, NavigationResult, RenderContext, Renderer, Target, TimedOut};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Find the Chromium binary path.
pub fn find_chromium() -> Option<PathBuf> {
    // 1. REPORT_SYNC_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("REPORT_SYNC_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. ~/.report-sync/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".report-sync/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".report-sync/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".report-sync/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".report-sync/chromium/chrome-linux64/chrome"),
                home.join(".report-sync/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Browser launch settings.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
        }
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Arc<Mutex<Browser>>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance.
    pub async fn new(options: &LaunchOptions) -> Result<Self> {
        let chrome_path = find_chromium()
            .context("Chromium not found. Set REPORT_SYNC_CHROMIUM_PATH or install Chrome.")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(options.window_width, options.window_height)
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!(
                "--window-size={},{}",
                options.window_width, options.window_height
            ));
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // Spawn the handler task
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        info!(headless = options.headless, "Chromium launched");
        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        Ok(Box::new(ChromiumContext {
            page,
            browser: Arc::clone(&self.browser),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await.context("failed to close Chromium")?;
        let _ = browser.wait().await;
        Ok(())
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    browser: Arc<Mutex<Browser>>,
}

impl ChromiumContext {
    async fn run_action(&self, js: String, what: &str, target: &Target) -> Result<()> {
        let result = self.execute_js(&js).await?;
        if !succeeded(&result) {
            bail!("{what} failed on {target}: {result}");
        }
        Ok(())
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result =
            tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url)).await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => Err(TimedOut {
                what: format!("navigation to {url}"),
                timeout_ms,
            }
            .into()),
        }
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn is_visible(&self, target: &Target) -> Result<bool> {
        let result = self.execute_js(&script::visibility_script(target)).await?;
        Ok(result
            .get("visible")
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    async fn click(&mut self, target: &Target) -> Result<()> {
        self.run_action(script::click_script(target), "click", target)
            .await
    }

    async fn fill(&mut self, target: &Target, value: &str) -> Result<()> {
        self.run_action(script::fill_script(target, value), "fill", target)
            .await
    }

    async fn press_key(&mut self, key: &str) -> Result<()> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key(key)
                .code(key)
                .build()
                .map_err(|e| anyhow!("invalid key event: {e}"))?;
            self.page
                .execute(params)
                .await
                .with_context(|| format!("failed to press {key}"))?;
        }
        Ok(())
    }

    async fn download(
        &mut self,
        trigger: &Target,
        dir: &Path,
        timeout: Duration,
    ) -> Result<DownloadedFile> {
        let (mut will_begin, mut progress) = {
            let browser = self.browser.lock().await;
            let behavior = SetDownloadBehaviorParams::builder()
                .behavior(SetDownloadBehaviorBehavior::AllowAndName)
                .download_path(dir.to_string_lossy().into_owned())
                .events_enabled(true)
                .build()
                .map_err(|e| anyhow!("invalid download behavior: {e}"))?;
            browser
                .execute(behavior)
                .await
                .context("failed to enable downloads")?;
            (
                browser.event_listener::<EventDownloadWillBegin>().await?,
                browser.event_listener::<EventDownloadProgress>().await?,
            )
        };

        self.click(trigger).await?;

        let wait = async {
            let begin = will_begin
                .next()
                .await
                .context("download event stream closed")?;
            debug!(guid = %begin.guid, name = %begin.suggested_filename, "download started");

            while let Some(event) = progress.next().await {
                if event.guid != begin.guid {
                    continue;
                }
                match event.state {
                    DownloadProgressState::Completed => {
                        return Ok::<_, anyhow::Error>((
                            begin.guid.clone(),
                            begin.suggested_filename.clone(),
                        ));
                    }
                    DownloadProgressState::Canceled => bail!("download was canceled"),
                    DownloadProgressState::InProgress => {}
                }
            }
            bail!("download progress stream closed")
        };

        let (guid, suggested_name) = tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| TimedOut::new("download", timeout))??;

        // AllowAndName stores the file under its guid.
        let path = dir.join(&suggested_name);
        tokio::fs::rename(dir.join(&guid), &path)
            .await
            .with_context(|| format!("failed to move download to {}", path.display()))?;
        let bytes = tokio::fs::metadata(&path).await?.len();

        Ok(DownloadedFile {
            suggested_name,
            path,
            bytes,
        })
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.page
            .save_screenshot(ScreenshotParams::builder().full_page(true).build(), path)
            .await
            .with_context(|| format!("failed to write screenshot {}", path.display()))?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        let _ = self.page.close().await;
        Ok(())
    }
}

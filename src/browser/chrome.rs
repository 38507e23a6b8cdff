// spider_chrome re-exports chromiumoxide API
use crate::error::{Result, SamplerError};
use crate::sampler::MetricSource;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide_fetcher::{BrowserFetcher, BrowserFetcherOptions};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How long to wait for a page's load event before giving up on a navigation.
const NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Interval between DOM polls while waiting for metric elements to appear.
const METRIC_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct ChromeDriver {
    browser: Browser,
    temp_dir: Option<PathBuf>,
}

/// Connection mode for Chrome browser
pub enum ConnectionMode {
    /// Sandboxed mode - launches Chrome using system installation
    Sandboxed {
        chrome_path: Option<String>,
        no_sandbox: bool,
        headless: bool,
    },
    /// Advanced mode - connects to existing Chrome on debug port
    DebugPort(u16),
}

impl ChromeDriver {
    /// Create new ChromeDriver with specified connection mode
    pub async fn new(mode: ConnectionMode) -> Result<Self> {
        let (browser, temp_dir) = match mode {
            ConnectionMode::Sandboxed {
                chrome_path,
                no_sandbox,
                headless,
            } => {
                // Unique user data directory per instance so parallel runs
                // never share profile data
                let unique_id = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap()
                    .as_nanos();
                let temp_dir = std::env::temp_dir().join(format!("dash-sampler-{}", unique_id));
                std::fs::create_dir_all(&temp_dir).map_err(|e| {
                    SamplerError::LaunchFailed(format!("Failed to create temp directory: {}", e))
                })?;

                let mut config = if headless {
                    BrowserConfig::builder()
                } else {
                    BrowserConfig::builder().with_head()
                };

                config = config.user_data_dir(&temp_dir);

                // Linux AppArmor / container workaround
                if no_sandbox {
                    config = config.arg("--no-sandbox");
                }

                // Use custom Chrome path if provided, otherwise try auto-download
                if let Some(path) = chrome_path {
                    config = config.chrome_executable(path);
                } else {
                    match Self::ensure_chrome_installed().await {
                        Ok(path) => {
                            config = config.chrome_executable(path);
                        }
                        Err(e) => {
                            // If auto-download fails, let chromiumoxide try to find system Chrome
                            log::warn!("Chrome auto-download failed ({}), trying system Chrome", e);
                        }
                    }
                }

                let config = config.build().map_err(|e| {
                    SamplerError::LaunchFailed(format!(
                        "{}. Chrome not found; install Chrome/Chromium or pass --chrome-path. \
                         Linux sandbox issue? Try --no-sandbox.",
                        e
                    ))
                })?;

                let (browser, mut handler) = Browser::launch(config).await.map_err(|e| {
                    SamplerError::LaunchFailed(format!(
                        "{}. Chrome not found; install Chrome/Chromium or pass --chrome-path. \
                         Linux sandbox issue? Try --no-sandbox.",
                        e
                    ))
                })?;

                // Drain browser events for the lifetime of the connection
                tokio::spawn(async move { while (handler.next().await).is_some() {} });

                (browser, Some(temp_dir))
            }
            ConnectionMode::DebugPort(port) => {
                let url = format!("http://localhost:{}", port);
                let (browser, mut handler) = Browser::connect(&url).await.map_err(|e| {
                    SamplerError::ConnectionFailed(format!(
                        "Failed to connect to Chrome on port {}. \
                         Make sure Chrome is running with --remote-debugging-port={}: {}",
                        port, port, e
                    ))
                })?;

                tokio::spawn(async move { while (handler.next().await).is_some() {} });

                (browser, None)
            }
        };

        Ok(Self { browser, temp_dir })
    }

    /// The current active page, excluding Chrome's own chrome:// pages
    async fn active_page(&self) -> Result<chromiumoxide::page::Page> {
        let pages = self.browser.pages().await?;

        for page in pages.iter() {
            if let Ok(Some(url)) = page.url().await {
                if !url.starts_with("chrome://") {
                    return Ok(page.clone());
                }
            }
        }

        // No non-chrome page found, use whatever exists
        if let Some(page) = pages.last() {
            return Ok(page.clone());
        }

        self.browser
            .new_page("about:blank")
            .await
            .map_err(|e| SamplerError::Other(format!("Failed to create page: {}", e)))
    }

    /// Navigate to a URL and wait for the page load event.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        use chromiumoxide::cdp::browser_protocol::page::{EventLoadEventFired, NavigateParams};

        // Normalize URL - add https:// if no protocol specified
        let normalized_url = if !url.starts_with("http://")
            && !url.starts_with("https://")
            && !url.starts_with("file://")
            && !url.starts_with("about:")
            && !url.starts_with("data:")
        {
            log::debug!("Normalizing URL: {} -> https://{}", url, url);
            format!("https://{}", url)
        } else {
            url.to_string()
        };

        log::info!("Navigating to {}", normalized_url);

        let page = self.active_page().await?;

        // Subscribe before navigating so the load event cannot be missed
        let mut load_events = page
            .event_listener::<EventLoadEventFired>()
            .await
            .map_err(|e| SamplerError::NavigationFailed(e.to_string()))?;

        let params = NavigateParams::builder()
            .url(&normalized_url)
            .build()
            .map_err(|e| {
                SamplerError::NavigationFailed(format!("Invalid URL {}: {}", normalized_url, e))
            })?;

        let response = page.execute(params).await.map_err(|e| {
            let error_str = e.to_string();

            // "oneshot canceled" means the browser connection is dead
            if error_str.contains("oneshot canceled") {
                SamplerError::NavigationFailed(
                    "Browser connection lost. The browser may have been closed or crashed."
                        .to_string(),
                )
            } else {
                SamplerError::NavigationFailed(format!(
                    "Failed to navigate to {}: {}",
                    normalized_url, e
                ))
            }
        })?;

        if let Some(error_text) = response.result.error_text {
            return Err(SamplerError::NavigationFailed(format!(
                "Navigation error: {}",
                error_text
            )));
        }

        match tokio::time::timeout(NAVIGATION_TIMEOUT, load_events.next()).await {
            Ok(Some(_)) => log::debug!("Page load event fired"),
            Ok(None) => log::warn!("Load event stream ended before the load event arrived"),
            Err(_) => {
                return Err(SamplerError::NavigationFailed(format!(
                    "Timed out after {:?} waiting for {} to load",
                    NAVIGATION_TIMEOUT, normalized_url
                )));
            }
        }

        // Small settle delay for page state to stabilize
        tokio::time::sleep(Duration::from_millis(500)).await;

        Ok(())
    }

    /// Current text of the element with the given DOM id.
    ///
    /// An element that exists but renders no text reads as an empty string;
    /// whatever the page displays at this instant is what gets captured.
    pub async fn element_text(&self, id: &str) -> Result<String> {
        let page = self.active_page().await?;
        let selector = format!("#{}", id);

        let text = page
            .find_element(selector)
            .await
            .map_err(|_e| SamplerError::ElementNotFound(id.to_string()))?
            .inner_text()
            .await
            .map_err(|_e| SamplerError::ElementNotFound(id.to_string()))?
            .unwrap_or_default();

        Ok(text)
    }

    /// Poll the page until every listed element id exists in the DOM.
    ///
    /// Fails with the names of the still-missing elements once `timeout` elapses.
    pub async fn wait_for_metrics(&self, ids: &[&str], timeout: Duration) -> Result<()> {
        let id_list = serde_json::to_string(ids)
            .map_err(|e| SamplerError::Other(format!("Failed to encode element ids: {}", e)))?;
        let probe = format!(
            "(() => {{ const ids = {}; return ids.filter((id) => document.getElementById(id) === null); }})()",
            id_list
        );

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let missing: Vec<String> = self.execute_script_typed(&probe).await?;
            if missing.is_empty() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SamplerError::ElementNotFound(missing.join(", ")));
            }
            log::debug!("Waiting for metric elements: {}", missing.join(", "));
            tokio::time::sleep(METRIC_POLL_INTERVAL).await;
        }
    }

    /// Execute JavaScript and return a specific type
    pub async fn execute_script_typed<T: serde::de::DeserializeOwned>(
        &self,
        script: &str,
    ) -> Result<T> {
        let page = self.active_page().await?;

        let result = page
            .evaluate(script)
            .await
            .map_err(|e| SamplerError::Other(format!("Script execution failed: {}", e)))?;

        result
            .into_value()
            .map_err(|e| SamplerError::Other(format!("Failed to deserialize result: {}", e)))
    }

    /// Close the browser connection
    pub async fn close(mut self) -> Result<()> {
        self.browser
            .close()
            .await
            .map_err(|e| SamplerError::Other(e.to_string()))?;
        Ok(())
    }

    /// Ensure Chrome is installed, downloading if necessary
    async fn ensure_chrome_installed() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| SamplerError::Other("Cannot determine cache directory".to_string()))?
            .join("dash-sampler")
            .join("chrome");

        tokio::fs::create_dir_all(&cache_dir)
            .await
            .map_err(|e| SamplerError::Other(format!("Failed to create cache dir: {}", e)))?;

        // Check if Chrome already downloaded
        let revision_info_path = cache_dir.join(".downloaded");
        if revision_info_path.exists() {
            if let Some(executable) = Self::find_chrome_in_cache(&cache_dir).await {
                return Ok(executable);
            }
        }

        log::info!("Downloading Chrome for Testing (first time only, ~150MB)...");
        let fetcher = BrowserFetcher::new(
            BrowserFetcherOptions::builder()
                .with_path(&cache_dir)
                .build()
                .map_err(|e| SamplerError::Other(format!("Fetcher config failed: {}", e)))?,
        );

        let info = fetcher
            .fetch()
            .await
            .map_err(|e| SamplerError::Other(format!("Chrome download failed: {}", e)))?;

        tokio::fs::write(&revision_info_path, "downloaded")
            .await
            .map_err(|e| SamplerError::Other(format!("Failed to write marker: {}", e)))?;

        log::info!("Chrome downloaded successfully");

        Ok(info.executable_path)
    }

    /// Find Chrome executable in cache directory
    async fn find_chrome_in_cache(cache_dir: &Path) -> Option<PathBuf> {
        let possible_paths = vec![
            cache_dir.join("chrome"),
            cache_dir.join("chrome.exe"),
            cache_dir.join("Google Chrome.app/Contents/MacOS/Google Chrome"),
            cache_dir.join("chrome-linux/chrome"),
            cache_dir.join("chrome-mac/Chromium.app/Contents/MacOS/Chromium"),
            cache_dir.join("chrome-win/chrome.exe"),
        ];

        possible_paths.into_iter().find(|path| path.exists())
    }
}

impl MetricSource for ChromeDriver {
    async fn navigate(&self, url: &str) -> Result<()> {
        ChromeDriver::navigate(self, url).await
    }

    async fn wait_for_metrics(&self, ids: &[&str], timeout: Duration) -> Result<()> {
        ChromeDriver::wait_for_metrics(self, ids, timeout).await
    }

    async fn element_text(&self, id: &str) -> Result<String> {
        ChromeDriver::element_text(self, id).await
    }
}

impl Drop for ChromeDriver {
    fn drop(&mut self) {
        // Clean up temporary profile directory if it exists
        if let Some(temp_dir) = &self.temp_dir {
            if temp_dir.exists() {
                let _ = std::fs::remove_dir_all(temp_dir);
            }
        }
    }
}

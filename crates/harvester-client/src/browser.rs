use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use harvester_core::error::AppError;
use harvester_core::traits::{BrowserPage, Locator, PageLauncher};
use serde::de::DeserializeOwned;

/// Launches Chromium over the Chrome DevTools Protocol and opens one tab.
///
/// Headless by default. `slow_mo` inserts a pause before every page
/// interaction, which helps when watching a headed run.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    headless: bool,
    slow_mo: Duration,
    navigation_timeout: Duration,
}

impl Default for ChromiumLauncher {
    fn default() -> Self {
        Self {
            headless: true,
            slow_mo: Duration::ZERO,
            navigation_timeout: Duration::from_secs(30),
        }
    }
}

impl ChromiumLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    pub fn with_slow_mo(mut self, slow_mo: Duration) -> Self {
        self.slow_mo = slow_mo;
        self
    }

    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        self.navigation_timeout = timeout;
        self
    }

    /// Tries to locate the real Chrome/Chromium binary.
    ///
    /// `CHROME_BIN` wins when it points at an existing file. Snap-packaged
    /// Chromium is looked up inside the snap because its wrapper strips
    /// unknown flags. Returns `None` to let `chromiumoxide` do its own lookup.
    fn find_chrome_binary() -> Option<PathBuf> {
        let candidates: &[&str] = &[
            "/snap/chromium/current/usr/lib/chromium-browser/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
        ];

        if let Ok(p) = std::env::var("CHROME_BIN") {
            let path = PathBuf::from(&p);
            if path.exists() {
                return Some(path);
            }
        }

        candidates.iter().map(PathBuf::from).find(|p| p.exists())
    }

    fn browser_config(&self) -> Result<BrowserConfig, AppError> {
        let mut builder = BrowserConfig::builder().no_sandbox().disable_default_args();

        if let Some(bin) = Self::find_chrome_binary() {
            tracing::info!("Using Chrome binary: {}", bin.display());
            builder = builder.chrome_executable(bin);
        }
        if self.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }

        builder
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-popup-blocking")
            .arg("--disable-translate")
            .arg("--no-first-run")
            .build()
            .map_err(|e| AppError::BrowserError(format!("Browser config error: {e}")))
    }
}

impl PageLauncher for ChromiumLauncher {
    type Page = ChromiumPage;

    async fn launch(&self) -> Result<ChromiumPage, AppError> {
        let config = self.browser_config()?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to launch browser: {e}")))?;

        // The CDP handler must be polled continuously for the connection to work.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    tracing::warn!("Browser CDP handler error: {event:?}");
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| AppError::BrowserError(format!("Failed to open tab: {e}")))?;

        tracing::info!(headless = self.headless, "Browser launched");
        Ok(ChromiumPage {
            _browser: Arc::new(browser),
            page,
            slow_mo: self.slow_mo,
            navigation_timeout: self.navigation_timeout,
        })
    }
}

/// One Chromium tab. Element queries run as page scripts over
/// `querySelectorAll`, so a [`Locator`]'s text filter matches on
/// `innerText` substrings.
pub struct ChromiumPage {
    // Keeps the browser process alive for as long as the tab is in use.
    _browser: Arc<Browser>,
    page: Page,
    slow_mo: Duration,
    navigation_timeout: Duration,
}

impl ChromiumPage {
    async fn pace(&self) {
        if !self.slow_mo.is_zero() {
            tokio::time::sleep(self.slow_mo).await;
        }
    }

    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, AppError> {
        self.page
            .evaluate(script)
            .await
            .map_err(|e| AppError::BrowserError(format!("Script evaluation failed: {e}")))?
            .into_value()
            .map_err(|e| AppError::BrowserError(format!("Unexpected script result: {e}")))
    }
}

/// JS expression yielding the array of elements matching `locator`.
fn matching_elements(locator: &Locator) -> String {
    let css = serde_json::Value::from(locator.css.as_str());
    let text = serde_json::Value::from(locator.text.as_deref());
    format!(
        "Array.from(document.querySelectorAll({css})).filter(n => {text} === null || \
         (n.innerText || n.textContent || '').includes({text}))"
    )
}

impl BrowserPage for ChromiumPage {
    async fn navigate(&self, url: &str) -> Result<(), AppError> {
        self.pace().await;
        match tokio::time::timeout(self.navigation_timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(AppError::BrowserError(format!(
                "Failed to navigate to {url}: {e}"
            ))),
            Err(_) => Err(AppError::Timeout(self.navigation_timeout.as_secs())),
        }
    }

    async fn count(&self, locator: &Locator) -> Result<usize, AppError> {
        self.eval(format!("{}.length", matching_elements(locator)))
            .await
    }

    async fn attribute_values(
        &self,
        locator: &Locator,
        attribute: &str,
    ) -> Result<Vec<String>, AppError> {
        let attribute = serde_json::Value::from(attribute);
        self.eval(format!(
            "{}.map(n => n.getAttribute({attribute})).filter(v => v !== null)",
            matching_elements(locator)
        ))
        .await
    }

    async fn click(&self, locator: &Locator) -> Result<bool, AppError> {
        self.pace().await;
        self.eval(format!(
            "(() => {{ const n = {}[0]; if (!n) return false; \
             n.scrollIntoView({{block: 'center'}}); n.click(); return true; }})()",
            matching_elements(locator)
        ))
        .await
    }
}

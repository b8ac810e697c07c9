//! Chrome backend over the DevTools protocol (uses the `headless_chrome` crate).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use headless_chrome::browser::tab::Tab;
use headless_chrome::types::PrintToPdfOptions;
use headless_chrome::{Browser, LaunchOptions};
use log::{debug, warn};

use crate::{BrowserBackend, BrowserPage, Error, Navigation, PdfOptions, Result, Viewport};

/// How long the network must stay quiet before a page counts as idle.
const NETWORK_QUIET: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Chrome shuts itself down after this long without DevTools traffic.
const BROWSER_IDLE_LIMIT: Duration = Duration::from_secs(60 * 60 * 24 * 365);

const DECORATE_TITLE: &str = r#"
(function(url) {
    const title = document.getElementById("title");
    if (!title) { return null; }
    const color = window.getComputedStyle(title).color;
    const text = title.textContent;
    const link = document.createElement("a");
    link.href = url;
    link.style.color = color;
    link.style.textDecoration = "none";
    link.textContent = text;
    title.replaceChildren(link);
    return text;
})"#;

/// One headless Chrome process shared by every render.
pub struct CdpBrowser {
    browser: Browser,
}

impl CdpBrowser {
    pub fn launch(viewport: Viewport, chrome_path: Option<PathBuf>, sandbox: bool) -> Result<Self> {
        let launch_options = LaunchOptions::default_builder()
            .headless(true)
            .sandbox(sandbox)
            .window_size(Some((viewport.width, viewport.height)))
            .path(chrome_path)
            .idle_browser_timeout(BROWSER_IDLE_LIMIT)
            .build()
            .map_err(|e| Error::InitializationError(format!("Failed to build launch options: {}", e)))?;

        let browser = Browser::new(launch_options)
            .map_err(|e| Error::InitializationError(format!("Failed to launch browser: {}", e)))?;
        debug!("Chrome launched");

        Ok(Self { browser })
    }

    /// Shut the browser process down.
    pub fn close(self) -> Result<()> {
        drop(self.browser);
        Ok(())
    }
}

impl BrowserBackend for CdpBrowser {
    type Page = CdpPage;

    fn open_page(&self) -> Result<CdpPage> {
        let tab = self
            .browser
            .new_tab()
            .map_err(|e| Error::InitializationError(format!("Failed to create tab: {}", e)))?;
        Ok(CdpPage {
            tab,
            closed: AtomicBool::new(false),
        })
    }
}

/// A single Chrome tab.
pub struct CdpPage {
    tab: Arc<Tab>,
    closed: AtomicBool,
}

impl CdpPage {
    fn evaluate(&self, expression: &str) -> Result<Option<serde_json::Value>> {
        let remote = self
            .tab
            .evaluate(expression, false)
            .map_err(|e| Error::RenderError(format!("Evaluation failed: {}", e)))?;
        Ok(remote.value)
    }

    /// Wait for `document.readyState == "complete"`, then for the resource
    /// count to stop growing for `NETWORK_QUIET`. False if `deadline` passes.
    fn wait_for_idle(&self, deadline: Instant) -> Result<bool> {
        loop {
            let state = self.evaluate("document.readyState")?;
            if state.as_ref().and_then(|v| v.as_str()) == Some("complete") {
                break;
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }

        let mut last_count = None;
        let mut quiet_since = Instant::now();
        loop {
            let count = self
                .evaluate("performance.getEntriesByType('resource').length")?
                .and_then(|v| v.as_u64());
            if count != last_count {
                last_count = count;
                quiet_since = Instant::now();
            } else if quiet_since.elapsed() >= NETWORK_QUIET {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

fn is_timeout_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("timed out") || message.contains("timeout") || message.contains("never came")
}

impl BrowserPage for CdpPage {
    fn navigate(&self, url: &str, soft_timeout: Duration) -> Result<Navigation> {
        let deadline = Instant::now() + soft_timeout;
        self.tab.set_default_timeout(soft_timeout);

        if let Err(e) = self.tab.navigate_to(url) {
            return Err(Error::LoadError(format!("Navigation failed: {}", e)));
        }
        if let Err(e) = self.tab.wait_until_navigated() {
            let message = e.to_string();
            if is_timeout_message(&message) {
                return Ok(Navigation::SoftTimeout);
            }
            return Err(Error::LoadError(format!("Wait for navigation failed: {}", message)));
        }

        match self.wait_for_idle(deadline) {
            Ok(true) => Ok(Navigation::Settled),
            Ok(false) => Ok(Navigation::SoftTimeout),
            Err(e) => {
                warn!("Readiness check on {} failed: {}", url, e);
                Ok(Navigation::SoftTimeout)
            }
        }
    }

    fn decorate_title(&self, url: &str) -> Result<Option<String>> {
        let url = serde_json::to_string(url)?;
        let value = self.evaluate(&format!("{}({})", DECORATE_TITLE, url))?;
        Ok(value.and_then(|v| v.as_str().map(str::to_string)))
    }

    fn print_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        let pdf_options = PrintToPdfOptions {
            display_header_footer: Some(true),
            print_background: Some(options.print_background),
            margin_top: Some(options.margins.top),
            margin_bottom: Some(options.margins.bottom),
            margin_left: Some(options.margins.left),
            margin_right: Some(options.margins.right),
            header_template: Some(options.header_template.clone()),
            footer_template: Some(options.footer_template.clone()),
            ..Default::default()
        };

        self.tab
            .print_to_pdf(Some(pdf_options))
            .map_err(|e| Error::RenderError(format!("PDF export failed: {}", e)))
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.tab
            .close(true)
            .map(|_| ())
            .map_err(|e| Error::RenderError(format!("Failed to close tab: {}", e)))
    }
}

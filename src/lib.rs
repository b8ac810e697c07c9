//! Batchprint
//!
//! Converts web pages into branded PDF documents through a headless browser,
//! either one page at a time or as a whole ordered batch that is packaged into
//! a downloadable archive while progress is streamed back to the caller.
//!
//! # Features
//!
//! - **CDP Backend** (default): Uses Chrome DevTools Protocol via headless Chrome
//! - **Bounded Parallelism**: A fixed-size worker pool shares one browser process
//! - **Two-tier Timeouts**: Soft navigation timeout degrades, hard timeout kills
//!
//! # Example
//!
//! ```no_run
//! # #[cfg(feature = "cdp")]
//! # async fn demo() -> batchprint::Result<()> {
//! use std::sync::Arc;
//! use batchprint::{BrandingTable, PageRenderer, RenderConfig, RenderTask, Viewport};
//! use batchprint::cdp::CdpBrowser;
//!
//! let browser = Arc::new(CdpBrowser::launch(Viewport::default(), None, true)?);
//! let renderer = PageRenderer::new(browser, Arc::new(BrandingTable::default()), RenderConfig::default());
//! let outcome = renderer.render(RenderTask::new("https://bio.libretexts.org/Page")).await;
//! println!("{:?}", outcome.output_path());
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

pub mod error;
pub use error::{Error, Result};

pub mod artwork;
pub mod branding;
pub mod config;
pub mod dispatcher;
pub mod filename;
pub mod intake;
pub mod logging;
pub mod packager;
pub mod progress;
pub mod renderer;
pub mod server;

#[cfg(feature = "cdp")]
pub mod cdp;

pub use branding::{BrandingLookup, BrandingTable};
pub use dispatcher::{BatchJob, BatchReport, Dispatcher};
pub use packager::{Archive, Packager};
pub use progress::{ProgressEstimator, ProgressSnapshot};
pub use renderer::PageRenderer;

/// Number of pages rendered at once within a batch.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Rendering configuration shared by every task of the service
///
/// The defaults mirror the production layout: pages land under `./PDF`,
/// navigation gives up softly after 30 seconds and a task is killed after
/// 40 seconds no matter what it is doing.
///
/// # Examples
///
/// ```
/// let cfg = batchprint::RenderConfig::default();
/// assert!(cfg.hard_timeout > cfg.soft_timeout);
/// ```
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Base directory every output path is resolved against
    pub output_dir: PathBuf,
    /// Navigation budget; exceeding it is logged and rendering continues
    pub soft_timeout: Duration,
    /// Absolute upper bound on a task's browser work
    pub hard_timeout: Duration,
    /// Page margins applied to every export
    pub margins: PdfMargins,
    /// Accent color used when the branding table has no entry
    pub default_color: String,
    /// Optional credit line shown at the left of the footer
    pub attribution: Option<String>,
    /// Site the header's master logo links to
    pub home_url: String,
    /// Registrable domain library subdomains hang off (`bio` + this)
    pub site_domain: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./PDF"),
            soft_timeout: Duration::from_secs(30),
            hard_timeout: Duration::from_secs(40),
            margins: PdfMargins::default(),
            default_color: "#127BC4".to_string(),
            attribution: None,
            home_url: "https://libretexts.org".to_string(),
            site_domain: "libretexts.org".to_string(),
        }
    }
}

/// Page margins in inches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PdfMargins {
    pub top: f64,
    pub bottom: f64,
    pub left: f64,
    pub right: f64,
}

impl PdfMargins {
    /// Convert CSS pixels (96 per inch) to inches.
    pub fn px(px: f64) -> f64 {
        px / 96.0
    }
}

impl Default for PdfMargins {
    fn default() -> Self {
        Self {
            top: Self::px(90.0),
            bottom: Self::px(60.0),
            left: 0.75,
            right: 0.75,
        }
    }
}

/// Browser window dimensions
#[derive(Debug, Clone, Copy)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// One page to render. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTask {
    /// Page URL
    pub url: String,
    /// Sub-directory of the output base, if any
    pub output_directory: Option<String>,
}

impl RenderTask {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output_directory: None,
        }
    }

    pub fn in_directory(url: impl Into<String>, directory: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            output_directory: Some(directory.into()),
        }
    }
}

/// Terminal result of one task
#[derive(Debug)]
pub struct RenderOutcome {
    pub task: RenderTask,
    /// Path of the written PDF, or the reason nothing was written
    pub result: Result<PathBuf>,
    pub elapsed: Duration,
}

impl RenderOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.result.as_ref().ok().map(PathBuf::as_path)
    }

    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }

    pub fn elapsed_millis(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// How navigation ended. Only hard failures are reported as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    /// Load, DOM-ready and network-idle all fired in time
    Settled,
    /// The soft timeout elapsed first; whatever loaded is still usable
    SoftTimeout,
}

/// Options handed to the browser's PDF export
#[derive(Debug, Clone)]
pub struct PdfOptions {
    pub header_template: String,
    pub footer_template: String,
    pub print_background: bool,
    pub margins: PdfMargins,
}

/// A shared browser process able to hand out pages (tabs).
///
/// Implementations are synchronous; the renderer drives them from tokio's
/// blocking pool, the same way an async facade wraps a blocking engine.
pub trait BrowserBackend: Send + Sync + 'static {
    type Page: BrowserPage;

    /// Open a fresh page. This is the scarce resource the dispatcher bounds.
    fn open_page(&self) -> Result<Self::Page>;
}

/// One browser page owned by exactly one task.
///
/// `close` may be called from another thread while a call is blocked on the
/// page (the hard-kill path) and must be idempotent.
pub trait BrowserPage: Send + Sync + 'static {
    /// Navigate and wait for readiness for at most `soft_timeout`.
    fn navigate(&self, url: &str, soft_timeout: Duration) -> Result<Navigation>;

    /// Wrap the `#title` element in a link to `url` and return its text.
    fn decorate_title(&self, url: &str) -> Result<Option<String>>;

    /// Export the current document as PDF bytes.
    fn print_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>>;

    /// Close the page.
    fn close(&self) -> Result<()>;
}

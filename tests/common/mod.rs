//! Scripted in-process browser used by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batchprint::{
    BrandingTable, BrowserBackend, BrowserPage, Error, Navigation, PageRenderer, PdfOptions,
    RenderConfig, Result,
};

pub const FAKE_PDF: &[u8] = b"%PDF-1.4 fake";
/// base64 of the PNG signature, enough to spot a logo in a template
pub const BIO_LOGO: &str = "iVBORw==";
pub const MASTER_LOGO: &str = "TUFTVEVS";

/// What a page does when navigated to a given URL
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    pub delay: Duration,
    pub title: Option<String>,
    pub fail: bool,
    pub soft_timeout: bool,
    /// Block until the page is closed from elsewhere
    pub hang: bool,
    /// Panic inside the browser call
    pub panic: bool,
}

impl Behavior {
    pub fn titled(title: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            ..Self::default()
        }
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Default)]
pub struct Stats {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub navigated: Mutex<Vec<String>>,
    pub printed: Mutex<Vec<PdfOptions>>,
}

impl Stats {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn navigated(&self) -> Vec<String> {
        self.navigated.lock().unwrap().clone()
    }

    pub fn last_printed(&self) -> Option<PdfOptions> {
        self.printed.lock().unwrap().last().cloned()
    }
}

#[derive(Default)]
pub struct FakeBackend {
    behaviors: Arc<HashMap<String, Behavior>>,
    pub stats: Arc<Stats>,
}

impl FakeBackend {
    pub fn new(behaviors: impl IntoIterator<Item = (String, Behavior)>) -> Self {
        Self {
            behaviors: Arc::new(behaviors.into_iter().collect()),
            stats: Arc::new(Stats::default()),
        }
    }

    /// Every URL behaves normally.
    pub fn plain() -> Self {
        Self::new(Vec::new())
    }
}

impl BrowserBackend for FakeBackend {
    type Page = FakePage;

    fn open_page(&self) -> Result<FakePage> {
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        let now = self.stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Ok(FakePage {
            behaviors: Arc::clone(&self.behaviors),
            stats: Arc::clone(&self.stats),
            current: Mutex::new(None),
            closed: AtomicBool::new(false),
        })
    }
}

pub struct FakePage {
    behaviors: Arc<HashMap<String, Behavior>>,
    stats: Arc<Stats>,
    current: Mutex<Option<Behavior>>,
    closed: AtomicBool,
}

impl BrowserPage for FakePage {
    fn navigate(&self, url: &str, _soft_timeout: Duration) -> Result<Navigation> {
        self.stats.navigated.lock().unwrap().push(url.to_string());
        let behavior = self.behaviors.get(url).cloned().unwrap_or_default();
        *self.current.lock().unwrap() = Some(behavior.clone());

        if behavior.panic {
            panic!("renderer crashed on {}", url);
        }
        if behavior.hang {
            while !self.closed.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(5));
            }
            return Err(Error::LoadError("Target closed".into()));
        }
        std::thread::sleep(behavior.delay);
        if behavior.fail {
            return Err(Error::LoadError("net::ERR_NAME_NOT_RESOLVED".into()));
        }
        if behavior.soft_timeout {
            return Ok(Navigation::SoftTimeout);
        }
        Ok(Navigation::Settled)
    }

    fn decorate_title(&self, _url: &str) -> Result<Option<String>> {
        Ok(self.current.lock().unwrap().as_ref().and_then(|b| b.title.clone()))
    }

    fn print_pdf(&self, options: &PdfOptions) -> Result<Vec<u8>> {
        self.stats.printed.lock().unwrap().push(options.clone());
        Ok(FAKE_PDF.to_vec())
    }

    fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
            self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Short timeouts so hard-kill tests finish quickly.
pub fn test_config(output_dir: &Path) -> RenderConfig {
    RenderConfig {
        output_dir: output_dir.to_path_buf(),
        soft_timeout: Duration::from_millis(200),
        hard_timeout: Duration::from_millis(500),
        ..RenderConfig::default()
    }
}

pub fn branding() -> BrandingTable {
    let mut table = BrandingTable::new();
    table.insert("default", Some(MASTER_LOGO.to_string()), None);
    table.insert("bio", Some(BIO_LOGO.to_string()), Some("#00b224".to_string()));
    table
}

pub fn renderer(backend: FakeBackend, output_dir: &Path) -> (PageRenderer<FakeBackend>, Arc<Stats>) {
    let stats = Arc::clone(&backend.stats);
    let renderer = PageRenderer::new(Arc::new(backend), Arc::new(branding()), test_config(output_dir));
    (renderer, stats)
}

pub fn behaviors(entries: &[(&str, Behavior)]) -> Vec<(String, Behavior)> {
    entries
        .iter()
        .map(|(url, b)| (url.to_string(), b.clone()))
        .collect()
}

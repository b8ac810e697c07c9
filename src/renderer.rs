//! Page renderer: one URL in, one branded PDF on disk out.
//!
//! Browser calls are blocking, so each task's browser work runs on tokio's
//! blocking pool while the async side owns the hard-kill timer. When the
//! timer fires the page is closed from here, which makes the blocked call
//! return with an error and frees the worker thread.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::artwork::Artwork;
use crate::branding::{Branding, BrandingLookup};
use crate::filename::{page_stem, split_title};
use crate::{
    BrowserBackend, BrowserPage, Error, Navigation, PdfOptions, RenderConfig, RenderOutcome,
    RenderTask, Result,
};

/// What the browser produced for one page, before it is written out
struct Capture {
    title: Option<String>,
    pdf: Vec<u8>,
}

/// Renders single pages through a shared browser backend.
pub struct PageRenderer<B: BrowserBackend> {
    backend: Arc<B>,
    branding: Arc<dyn BrandingLookup>,
    config: RenderConfig,
}

impl<B: BrowserBackend> PageRenderer<B> {
    pub fn new(backend: Arc<B>, branding: Arc<dyn BrandingLookup>, config: RenderConfig) -> Self {
        Self {
            backend,
            branding,
            config,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.backend
    }

    /// Directory a task's PDF is written into.
    pub fn output_dir_for(&self, task: &RenderTask) -> PathBuf {
        match task.output_directory.as_deref() {
            Some(dir) => self.config.output_dir.join(dir),
            None => self.config.output_dir.clone(),
        }
    }

    /// Render one task. Never panics and never returns early without
    /// closing the page it opened; every problem becomes a failed outcome.
    pub async fn render(&self, task: RenderTask) -> RenderOutcome {
        let start = Instant::now();
        info!("NEW {}", task.url);

        let mut name = page_stem(None, &task.url);
        let result = match self.capture(&task).await {
            Ok(capture) => {
                name = page_stem(capture.title.as_deref(), &task.url);
                self.write_output(&task, &name, capture.pdf).await
            }
            Err(e) => Err(e),
        };

        let elapsed = start.elapsed();
        match &result {
            Ok(_) => info!("RENDERED {}s {}", seconds(elapsed), name),
            Err(e) => error!("FAILED {}s {}: {}", seconds(elapsed), name, e),
        }

        RenderOutcome {
            task,
            result,
            elapsed,
        }
    }

    async fn capture(&self, task: &RenderTask) -> Result<Capture> {
        let backend = Arc::clone(&self.backend);
        let page = tokio::task::spawn_blocking(move || backend.open_page())
            .await
            .map_err(|e| Error::RenderError(format!("Opening page panicked: {}", e)))??;
        let page = Arc::new(page);

        let worker_page = Arc::clone(&page);
        let branding = Arc::clone(&self.branding);
        let config = self.config.clone();
        let url = task.url.clone();
        let work = tokio::task::spawn_blocking(move || {
            capture_page(&*worker_page, &url, &*branding, &config)
        });

        let hard_timeout = self.config.hard_timeout;
        let result = match tokio::time::timeout(hard_timeout, work).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(Error::RenderError(format!(
                "Render worker panicked: {}",
                join_err
            ))),
            Err(_) => {
                warn!("Hard timeout reached, closing page for {}", task.url);
                Err(Error::Timeout(hard_timeout.as_millis() as u64))
            }
        };

        let closing = Arc::clone(&page);
        match tokio::task::spawn_blocking(move || closing.close()).await {
            Ok(Err(e)) => warn!("Failed to close page for {}: {}", task.url, e),
            Err(e) => warn!("Closing page for {} panicked: {}", task.url, e),
            Ok(Ok(())) => {}
        }

        result
    }

    async fn write_output(&self, task: &RenderTask, name: &str, pdf: Vec<u8>) -> Result<PathBuf> {
        let dir = self.output_dir_for(task);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(format!("{}.pdf", name));
        write_atomic(&path, pdf).await?;
        Ok(path)
    }
}

/// Steps 3 to 6 of a render: navigate, inspect the title, brand, export.
fn capture_page<P: BrowserPage + ?Sized>(
    page: &P,
    url: &str,
    branding: &dyn BrandingLookup,
    config: &RenderConfig,
) -> Result<Capture> {
    if page.navigate(url, config.soft_timeout)? == Navigation::SoftTimeout {
        warn!("Timeout Exceeded {}", url);
    }

    let title = page.decorate_title(url)?;
    let prefix = title.as_deref().and_then(|t| split_title(t).0);

    let branding = Branding::resolve(branding, url, &config.default_color);
    let artwork = Artwork::compose(&branding, prefix, config);

    let pdf = page.print_pdf(&PdfOptions {
        header_template: artwork.header,
        footer_template: artwork.footer,
        print_background: true,
        margins: config.margins,
    })?;
    if pdf.is_empty() {
        return Err(Error::RenderError("Browser returned an empty PDF".into()));
    }

    Ok(Capture { title, pdf })
}

/// Write through a uniquely named sibling temp file so readers never see a
/// partial PDF, even when several renders target the same path at once.
async fn write_atomic(path: &Path, bytes: Vec<u8>) -> Result<()> {
    let shown = path.display().to_string();
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::Builder::new()
            .prefix(".")
            .suffix(".pdf.part")
            .tempfile_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    })
    .await
    .map_err(|e| Error::RenderError(format!("Writing {} panicked: {}", shown, e)))?
}

/// Elapsed seconds with one decimal, as printed in the render log.
pub fn seconds(elapsed: Duration) -> f64 {
    (elapsed.as_millis() as f64 / 100.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_round_to_one_decimal() {
        assert_eq!(seconds(Duration::from_millis(3249)), 3.2);
        assert_eq!(seconds(Duration::from_millis(3250)), 3.3);
        assert_eq!(seconds(Duration::ZERO), 0.0);
    }

    #[tokio::test]
    async fn atomic_write_leaves_no_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Intro.pdf");
        write_atomic(&path, b"%PDF-1.4".to_vec()).await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"%PDF-1.4");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("Intro.pdf")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn overlapping_writes_to_one_path_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Intro.pdf");
        let body = vec![b'x'; 4 * 1024 * 1024];

        let mut writers = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let path = path.clone();
            let body = body.clone();
            writers.spawn(async move { write_atomic(&path, body).await });
        }
        while let Some(joined) = writers.join_next().await {
            joined.unwrap().unwrap();
        }
        assert_eq!(std::fs::read(&path).unwrap().len(), body.len());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}

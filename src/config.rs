//! Service configuration and command-line interface.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::LevelFilter;

use crate::intake::BATCH_SUBDIR;
use crate::{Error, RenderConfig, Result, Viewport, DEFAULT_CONCURRENCY};

/// Configuration of the whole service
///
/// `Default` matches the production deployment: port 80, pages under
/// `./PDF`, static files and archives under `./public`.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address the HTTP server binds to
    pub bind: SocketAddr,
    /// Static file root; archives go to its `ZIP` sub-directory
    pub public_dir: PathBuf,
    /// Origins and single-page hosts must be this domain or below it
    pub allowed_origin_suffix: String,
    /// Concurrent renders per batch
    pub concurrency_limit: usize,
    /// Optional branding table (JSON)
    pub branding_table: Option<PathBuf>,
    /// Chrome binary; auto-detected when unset
    pub chrome_path: Option<PathBuf>,
    /// Run Chrome with its sandbox enabled
    pub sandbox: bool,
    /// Browser window size
    pub viewport: Viewport,
    /// Per-page rendering settings
    pub render: RenderConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 80)),
            public_dir: PathBuf::from("./public"),
            allowed_origin_suffix: "libretexts.org".to_string(),
            concurrency_limit: DEFAULT_CONCURRENCY,
            branding_table: None,
            chrome_path: None,
            sandbox: true,
            viewport: Viewport::default(),
            render: RenderConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Where a batch's pages are rendered.
    pub fn batch_dir(&self, archive_name: &str) -> PathBuf {
        self.render.output_dir.join(BATCH_SUBDIR).join(archive_name)
    }

    /// Where archives are published.
    pub fn archive_dir(&self) -> PathBuf {
        self.public_dir.join("ZIP")
    }

    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::ConfigError("concurrency must be at least 1".into()));
        }
        if self.render.hard_timeout <= self.render.soft_timeout {
            return Err(Error::ConfigError(format!(
                "hard timeout ({:?}) must exceed the navigation timeout ({:?})",
                self.render.hard_timeout, self.render.soft_timeout
            )));
        }
        if self.allowed_origin_suffix.trim().is_empty() {
            return Err(Error::ConfigError("allowed origin suffix is empty".into()));
        }
        Ok(())
    }
}

/// Command-line arguments; every flag can also come from the environment.
#[derive(Debug, Parser)]
#[command(name = "batchprint", version, about = "Render web pages and page trees to branded PDFs")]
pub struct Cli {
    /// Address to listen on
    #[arg(long, env = "BATCHPRINT_BIND", default_value = "0.0.0.0:80")]
    pub bind: SocketAddr,

    /// Directory rendered PDFs are written to
    #[arg(long, env = "BATCHPRINT_PDF_DIR", default_value = "./PDF")]
    pub pdf_dir: PathBuf,

    /// Static file root (archives go to its ZIP sub-directory)
    #[arg(long, env = "BATCHPRINT_PUBLIC_DIR", default_value = "./public")]
    pub public_dir: PathBuf,

    /// Allowed origin / target domain suffix
    #[arg(long, env = "BATCHPRINT_ALLOWED_ORIGIN", default_value = "libretexts.org")]
    pub allowed_origin: String,

    /// Concurrent renders per batch
    #[arg(long, env = "BATCHPRINT_CONCURRENCY", default_value_t = DEFAULT_CONCURRENCY)]
    pub concurrency: usize,

    /// Soft navigation timeout in seconds
    #[arg(long, env = "BATCHPRINT_NAV_TIMEOUT", default_value_t = 30)]
    pub nav_timeout_secs: u64,

    /// Hard per-page timeout in seconds
    #[arg(long, env = "BATCHPRINT_HARD_TIMEOUT", default_value_t = 40)]
    pub hard_timeout_secs: u64,

    /// Branding table (JSON)
    #[arg(long, env = "BATCHPRINT_BRANDING")]
    pub branding: Option<PathBuf>,

    /// Fallback accent color
    #[arg(long, env = "BATCHPRINT_DEFAULT_COLOR", default_value = "#127BC4")]
    pub default_color: String,

    /// Footer credit line
    #[arg(long, env = "BATCHPRINT_ATTRIBUTION")]
    pub attribution: Option<String>,

    /// Chrome binary path
    #[arg(long, env = "CHROME_PATH")]
    pub chrome_path: Option<PathBuf>,

    /// Disable Chrome's sandbox (needed when running as root in containers)
    #[arg(long, env = "BATCHPRINT_NO_SANDBOX")]
    pub no_sandbox: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "BATCHPRINT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Also append logs to this file
    #[arg(long, env = "BATCHPRINT_LOG_FILE")]
    pub log_file: Option<PathBuf>,
}

impl Cli {
    pub fn level(&self) -> Result<LevelFilter> {
        self.log_level
            .parse()
            .map_err(|_| Error::ConfigError(format!("Unknown log level {}", self.log_level)))
    }

    /// Build and validate the service configuration.
    pub fn into_config(self) -> Result<ServiceConfig> {
        let defaults = ServiceConfig::default();
        let config = ServiceConfig {
            bind: self.bind,
            public_dir: self.public_dir,
            allowed_origin_suffix: self.allowed_origin,
            concurrency_limit: self.concurrency,
            branding_table: self.branding,
            chrome_path: self.chrome_path,
            sandbox: !self.no_sandbox,
            viewport: defaults.viewport,
            render: RenderConfig {
                output_dir: self.pdf_dir,
                soft_timeout: Duration::from_secs(self.nav_timeout_secs),
                hard_timeout: Duration::from_secs(self.hard_timeout_secs),
                default_color: self.default_color,
                attribution: self.attribution,
                ..defaults.render
            },
        };
        config.validate()?;
        Ok(config)
    }
}

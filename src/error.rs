//! Error types for the batch rendering service

use thiserror::Error;

/// Result type alias for rendering operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while rendering, dispatching or packaging
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to start the browser or another long-lived resource
    #[error("Initialization failed: {0}")]
    InitializationError(String),

    /// Navigation failed outright (not a soft timeout)
    #[error("Failed to load URL: {0}")]
    LoadError(String),

    /// Title inspection or PDF export failed
    #[error("Rendering failed: {0}")]
    RenderError(String),

    /// The hard-kill timer fired before the page finished
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    /// Filesystem error while writing output
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Building the batch archive failed
    #[error("Packaging failed: {0}")]
    PackageError(String),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error came from the hard-kill timer.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::PackageError(err.to_string())
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Other(format!("JSON error: {}", err))
    }
}

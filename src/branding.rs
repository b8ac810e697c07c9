//! Branding lookup: subdomain → logo image and accent color.
//!
//! The table itself is opaque keyed data supplied by the deployment. It is
//! loaded from a JSON file of the form
//!
//! ```json
//! {
//!   "default": { "logoFile": "logos/libretexts.png" },
//!   "bio":     { "logoFile": "logos/bio.png", "color": "#00b224" },
//!   "chem":    { "logo": "iVBORw0KGgo...", "color": "#00bfff" }
//! }
//! ```
//!
//! `logo` holds base64 PNG data; `logoFile` is a path (relative to the table
//! file) that is read and encoded at load time. The `default` entry's logo is
//! the master logo drawn at the left of every header.

use std::collections::HashMap;
use std::path::Path;

use base64::Engine as Base64Engine;
use serde::Deserialize;
use url::Url;

use crate::{Error, Result};

/// Key of the entry holding the master logo.
pub const DEFAULT_KEY: &str = "default";

/// Keyed branding data. Absent entries are not an error.
pub trait BrandingLookup: Send + Sync {
    /// Base64 PNG logo for `key`
    fn logo(&self, key: &str) -> Option<&str>;

    /// CSS color for `key`
    fn color(&self, key: &str) -> Option<&str>;

    /// Logo shown for every library, next to the per-library one
    fn master_logo(&self) -> Option<&str> {
        self.logo(DEFAULT_KEY)
    }
}

/// Branding resolved for one page, with defaults applied
#[derive(Debug, Clone, PartialEq)]
pub struct Branding {
    /// Lookup key, i.e. the URL's first host label
    pub key: String,
    pub logo: Option<String>,
    pub master_logo: Option<String>,
    pub color: String,
}

impl Branding {
    /// Resolve branding for `url`, falling back to no logo and
    /// `default_color` when the table has nothing.
    pub fn resolve(lookup: &dyn BrandingLookup, url: &str, default_color: &str) -> Self {
        let key = branding_key(url).unwrap_or_default();
        Self {
            logo: lookup.logo(&key).map(str::to_string),
            master_logo: lookup.master_logo().map(str::to_string),
            color: lookup
                .color(&key)
                .unwrap_or(default_color)
                .to_string(),
            key,
        }
    }
}

/// First label of the URL's host: `https://bio.libretexts.org/x` → `bio`.
pub fn branding_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    host.split('.')
        .next()
        .filter(|label| !label.is_empty())
        .map(str::to_ascii_lowercase)
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Entry {
    logo: Option<String>,
    color: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEntry {
    logo: Option<String>,
    logo_file: Option<String>,
    color: Option<String>,
}

/// In-memory branding table
#[derive(Debug, Clone, Default)]
pub struct BrandingTable {
    entries: HashMap<String, Entry>,
}

impl BrandingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an entry.
    pub fn insert(&mut self, key: impl Into<String>, logo: Option<String>, color: Option<String>) {
        self.entries.insert(key.into(), Entry { logo, color });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a table from JSON. `logoFile` entries are resolved against
    /// `base_dir`.
    pub fn from_json_str(json: &str, base_dir: &Path) -> Result<Self> {
        let raw: HashMap<String, RawEntry> = serde_json::from_str(json)
            .map_err(|e| Error::ConfigError(format!("Invalid branding table: {}", e)))?;

        let mut table = Self::new();
        for (key, entry) in raw {
            let logo = match (entry.logo, entry.logo_file) {
                (Some(data), _) => Some(data),
                (None, Some(file)) => {
                    let path = base_dir.join(&file);
                    let bytes = std::fs::read(&path).map_err(|e| {
                        Error::ConfigError(format!("Cannot read logo {}: {}", path.display(), e))
                    })?;
                    Some(base64::engine::general_purpose::STANDARD.encode(bytes))
                }
                (None, None) => None,
            };
            table.insert(key.to_ascii_lowercase(), logo, entry.color);
        }
        Ok(table)
    }

    /// Load a table from a JSON file on disk.
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Cannot read {}: {}", path.display(), e)))?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let table = Self::from_json_str(&json, base_dir)?;
        log::info!("Loaded {} branding entries from {}", table.len(), path.display());
        Ok(table)
    }
}

impl BrandingLookup for BrandingTable {
    fn logo(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|e| e.logo.as_deref())
    }

    fn color(&self, key: &str) -> Option<&str> {
        self.entries.get(key).and_then(|e| e.color.as_deref())
    }
}

//! Request parsing for single-page and batch jobs.

use indexmap::IndexMap;
use serde::Deserialize;
use url::Url;

use crate::dispatcher::BatchJob;
use crate::filename::sanitize;
use crate::RenderTask;

/// Sub-directory of the PDF base that batch pages are written under.
pub const BATCH_SUBDIR: &str = "libretexts";

/// Body of a batch request
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    #[serde(rename = "batchName")]
    pub batch_name: String,
    pub root: String,
    #[serde(default)]
    pub subpages: PageTree,
}

/// Children of a page. Clients send either a list or an object keyed by
/// arbitrary ids; object order is kept as sent.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PageTree {
    List(Vec<PageNode>),
    Keyed(IndexMap<String, PageNode>),
}

impl Default for PageTree {
    fn default() -> Self {
        PageTree::List(Vec::new())
    }
}

/// One page and its sub-pages
#[derive(Debug, Clone, Deserialize)]
pub struct PageNode {
    pub link: String,
    #[serde(default)]
    pub children: PageTree,
}

impl PageTree {
    /// Direct children in order.
    pub fn nodes(&self) -> Vec<&PageNode> {
        match self {
            PageTree::List(nodes) => nodes.iter().collect(),
            PageTree::Keyed(nodes) => nodes.values().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            PageTree::List(nodes) => nodes.is_empty(),
            PageTree::Keyed(nodes) => nodes.is_empty(),
        }
    }

    /// Pre-order links: each node, then its own subtree, siblings in order.
    pub fn links(&self) -> Vec<String> {
        let mut links = Vec::new();
        let mut stack: Vec<&PageNode> = self.nodes().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            links.push(node.link.clone());
            stack.extend(node.children.nodes().into_iter().rev());
        }
        links
    }
}

impl BatchRequest {
    /// Sanitized name used for the batch directory and the archive.
    pub fn archive_name(&self) -> String {
        sanitize(&self.batch_name)
    }

    /// Root first, then the flattened sub-page tree.
    pub fn urls(&self) -> Vec<String> {
        let mut urls = vec![self.root.clone()];
        urls.extend(self.subpages.links());
        urls
    }

    /// Directory, relative to the PDF base, this batch renders into.
    pub fn output_directory(&self) -> String {
        format!("{}/{}", BATCH_SUBDIR, self.archive_name())
    }

    pub fn into_job(self, concurrency_limit: usize) -> BatchJob {
        let directory = self.output_directory();
        let tasks = self
            .urls()
            .into_iter()
            .map(|url| RenderTask::in_directory(url, directory.clone()))
            .collect();
        BatchJob::new(self.archive_name(), tasks).with_concurrency_limit(concurrency_limit)
    }
}

/// Whether `host` is `suffix` itself or a subdomain of it.
pub fn host_matches(host: &str, suffix: &str) -> bool {
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    let suffix = suffix.trim_start_matches('.').to_ascii_lowercase();
    host == suffix || host.ends_with(&format!(".{}", suffix))
}

/// Whether a request `Origin` header belongs to the allowed domain family.
pub fn origin_allowed(origin: Option<&str>, suffix: &str) -> bool {
    origin
        .and_then(|o| Url::parse(o).ok())
        .and_then(|u| u.host_str().map(|h| host_matches(h, suffix)))
        .unwrap_or(false)
}

/// A parsed single-page request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleTarget {
    pub url: String,
    pub bypass_cache: bool,
}

/// Why a single-page target was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetError {
    Empty,
    InvalidUrl(String),
    ForeignHost(String),
}

impl std::fmt::Display for TargetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetError::Empty => write!(f, "No target URL"),
            TargetError::InvalidUrl(url) => write!(f, "Invalid URL {}", url),
            TargetError::ForeignHost(host) => write!(f, "Host {} is not allowed", host),
        }
    }
}

/// Parse the raw target from a single-page path plus its query string.
/// A trailing `.pdf` is stripped; `nocache` or `no-cache` bypasses caches.
pub fn parse_single_target(
    raw: &str,
    query: Option<&str>,
    allowed_suffix: &str,
) -> Result<SingleTarget, TargetError> {
    let raw = raw.trim();
    let raw = raw.strip_suffix(".pdf").unwrap_or(raw);
    if raw.is_empty() {
        return Err(TargetError::Empty);
    }

    let url = Url::parse(raw).map_err(|_| TargetError::InvalidUrl(raw.to_string()))?;
    let host = url.host_str().unwrap_or_default();
    if !host_matches(host, allowed_suffix) {
        return Err(TargetError::ForeignHost(host.to_string()));
    }

    let bypass_cache = query
        .map(|q| {
            q.split('&')
                .map(|pair| pair.split('=').next().unwrap_or(""))
                .any(|key| key == "nocache" || key == "no-cache")
        })
        .unwrap_or(false);

    Ok(SingleTarget {
        url: raw.to_string(),
        bypass_cache,
    })
}

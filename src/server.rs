//! HTTP boundary.
//!
//! Routes, with an optional `/print` prefix:
//!
//! - `GET /url={target}[?nocache]` renders one page and returns the PDF.
//! - `OPTIONS /Libretext=...` answers the CORS preflight for batches.
//! - `PUT /Libretext=...` runs a batch and streams newline-delimited JSON:
//!   one `progress` object per finished page, then exactly one `complete`
//!   or `error` object.
//! - anything else is served from the public directory.

use std::collections::HashSet;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use futures::StreamExt;
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceExt;
use tower_http::services::{ServeDir, ServeFile};

use crate::branding::BrandingLookup;
use crate::config::ServiceConfig;
use crate::dispatcher::{BatchJob, BatchReport, Dispatcher};
use crate::intake::{origin_allowed, parse_single_target, BatchRequest};
use crate::packager::Packager;
use crate::progress::ProgressSnapshot;
use crate::renderer::{seconds, PageRenderer};
use crate::{BrowserBackend, RenderTask};

const MAX_BATCH_BODY: usize = 16 * 1024 * 1024;

/// One line of a batch response stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "message", rename_all = "lowercase")]
pub enum StreamMessage {
    Progress {
        percent: f64,
        eta: String,
    },
    Complete {
        filename: String,
        #[serde(rename = "timeTaken")]
        time_taken: f64,
    },
    Error {
        text: String,
    },
}

impl StreamMessage {
    pub fn progress(snapshot: &ProgressSnapshot) -> Self {
        StreamMessage::Progress {
            percent: snapshot.percent,
            eta: snapshot.eta_display(),
        }
    }

    /// Terminal message for a batch that did not fully succeed.
    pub fn failure(report: &BatchReport) -> Self {
        let text = match report.first_failure() {
            Some(outcome) => match outcome.error() {
                Some(e) => format!("{} failed: {}", outcome.task.url, e),
                None => format!("{} failed", outcome.task.url),
            },
            None => format!(
                "Batch {} stopped after {} of {} pages",
                report.archive_name,
                report.outcomes.len(),
                report.total
            ),
        };
        StreamMessage::Error { text }
    }

    fn to_line(&self) -> Bytes {
        let mut line = serde_json::to_vec(self).unwrap_or_else(|e| {
            format!(r#"{{"message":"error","text":"serialization failed: {}"}}"#, e).into_bytes()
        });
        line.push(b'\n');
        Bytes::from(line)
    }
}

/// Shared service state. The browser lives here, not in a global.
pub struct AppState<B: BrowserBackend> {
    dispatcher: Dispatcher<B>,
    packager: Packager,
    config: Arc<ServiceConfig>,
    active_batches: Arc<Mutex<HashSet<String>>>,
}

impl<B: BrowserBackend> Clone for AppState<B> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: self.dispatcher.clone(),
            packager: self.packager.clone(),
            config: Arc::clone(&self.config),
            active_batches: Arc::clone(&self.active_batches),
        }
    }
}

impl<B: BrowserBackend> AppState<B> {
    pub fn new(backend: Arc<B>, branding: Arc<dyn BrandingLookup>, config: ServiceConfig) -> Self {
        let renderer = Arc::new(PageRenderer::new(backend, branding, config.render.clone()));
        Self {
            dispatcher: Dispatcher::new(renderer),
            packager: Packager::new(config.archive_dir()),
            config: Arc::new(config),
            active_batches: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher<B> {
        &self.dispatcher
    }
}

/// Build the service router.
pub fn router<B: BrowserBackend>(state: AppState<B>) -> Router {
    Router::new().fallback(dispatch::<B>).with_state(state)
}

async fn dispatch<B: BrowserBackend>(State(state): State<AppState<B>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let route = path
        .strip_prefix("/print")
        .filter(|rest| rest.starts_with('/'))
        .unwrap_or(&path);

    if let Some(target) = route.strip_prefix("/url=") {
        info!("{} GET {}", client(&request), target);
        let query = request.uri().query().map(str::to_string);
        return render_single(state, target, query.as_deref()).await;
    }
    if route.starts_with("/Libretext=") {
        info!("{} {} {}", client(&request), request.method(), route);
        return batch(state, request).await;
    }
    serve_static(&state.config.public_dir, request).await
}

/// Peer address, when the server was started with connect info.
fn client(request: &Request) -> String {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// Short plain-text rejection.
fn reject(status: StatusCode, message: impl std::fmt::Display) -> Response {
    let body = if status.is_client_error() {
        format!("Bad Request\n{}", message)
    } else {
        message.to_string()
    };
    (status, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

async fn render_single<B: BrowserBackend>(state: AppState<B>, raw: &str, query: Option<&str>) -> Response {
    let target = match parse_single_target(raw, query, &state.config.allowed_origin_suffix) {
        Ok(target) => target,
        Err(e) => return reject(StatusCode::BAD_REQUEST, e),
    };
    if target.bypass_cache {
        debug!("Cache bypass requested for {}", target.url);
    }

    let outcome = state
        .dispatcher
        .renderer()
        .render(RenderTask::new(target.url))
        .await;
    match outcome.result {
        Ok(path) => serve_pdf(&path).await,
        Err(e) => reject(StatusCode::INTERNAL_SERVER_ERROR, format!("Server \n{}", e)),
    }
}

async fn serve_pdf(path: &Path) -> Response {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) => return reject(StatusCode::INTERNAL_SERVER_ERROR, e),
    };
    let name: String = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_graphic() || c == ' ' { c } else { '_' })
        .map(|c| if c == '"' { '_' } else { c })
        .collect();
    (
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, format!("inline; filename=\"{}\"", name)),
        ],
        bytes,
    )
        .into_response()
}

async fn batch<B: BrowserBackend>(state: AppState<B>, request: Request) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    if !origin_allowed(origin.as_deref(), &state.config.allowed_origin_suffix) {
        return reject(
            StatusCode::FORBIDDEN,
            format!("CORS Error {}", origin.unwrap_or_default()),
        );
    }

    let method = request.method().clone();
    if method == Method::OPTIONS {
        return (
            StatusCode::OK,
            [
                (header::ACCESS_CONTROL_ALLOW_ORIGIN, origin.unwrap_or_default()),
                (header::ACCESS_CONTROL_ALLOW_METHODS, "PUT".to_string()),
                (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type".to_string()),
            ],
        )
            .into_response();
    }
    if method != Method::PUT {
        return reject(StatusCode::NOT_ACCEPTABLE, format!("{} Not Acceptable", method));
    }

    let body = match axum::body::to_bytes(request.into_body(), MAX_BATCH_BODY).await {
        Ok(body) => body,
        Err(e) => return reject(StatusCode::BAD_REQUEST, format!("Unreadable body: {}", e)),
    };
    let request: BatchRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return reject(StatusCode::BAD_REQUEST, format!("Invalid batch request: {}", e)),
    };
    if request.root.trim().is_empty() {
        return reject(StatusCode::BAD_REQUEST, "Batch has no root page");
    }

    start_batch(state, request)
}

fn start_batch<B: BrowserBackend>(state: AppState<B>, request: BatchRequest) -> Response {
    let job = request.into_job(state.config.concurrency_limit);
    let Some(guard) = BatchGuard::claim(&state.active_batches, &job.archive_name) else {
        return reject(
            StatusCode::CONFLICT,
            format!("Batch {} is already running", job.archive_name),
        );
    };

    let (tx, rx) = mpsc::channel::<Bytes>(64);
    tokio::spawn(run_batch(state, job, tx, guard));

    let stream = ReceiverStream::new(rx).map(Ok::<_, Infallible>);
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "PUT"),
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn send(out: &mpsc::Sender<Bytes>, message: &StreamMessage) {
    if out.send(message.to_line()).await.is_err() {
        debug!("Client went away; dropping {:?}", message);
    }
}

/// Render, stream progress, then package. Runs detached from the request so
/// a disconnecting client does not leave a half-rendered batch behind.
async fn run_batch<B: BrowserBackend>(
    state: AppState<B>,
    job: BatchJob,
    out: mpsc::Sender<Bytes>,
    _guard: BatchGuard,
) {
    let name = job.archive_name.clone();
    let started = job.started_at;
    let source = state.config.batch_dir(&name);
    info!("BATCH {} ({} pages)", name, job.len());

    if let Err(e) = clear_batch_dir(&source).await {
        error!("Cannot prepare {}: {}", source.display(), e);
        send(&out, &StreamMessage::Error { text: e.to_string() }).await;
        return;
    }

    let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressSnapshot>(64);
    let dispatcher = state.dispatcher.clone();
    let run = async move {
        let report = dispatcher.run(job, &progress_tx).await;
        drop(progress_tx);
        report
    };
    let forward = async {
        while let Some(snapshot) = progress_rx.recv().await {
            send(&out, &StreamMessage::progress(&snapshot)).await;
        }
    };
    let (report, ()) = tokio::join!(run, forward);

    let terminal = if report.is_success() {
        match state.packager.package_async(source, name.clone()).await {
            Ok(archive) => {
                let time_taken = seconds(started.elapsed());
                info!("COMPLETE {} in {}s", archive.file_name(), time_taken);
                StreamMessage::Complete {
                    filename: archive.file_name(),
                    time_taken,
                }
            }
            Err(e) => {
                error!("Packaging {} failed: {}", name, e);
                StreamMessage::Error { text: e.to_string() }
            }
        }
    } else {
        error!(
            "Batch {} failed after {} of {} pages",
            name,
            report.outcomes.len(),
            report.total
        );
        StreamMessage::failure(&report)
    };
    send(&out, &terminal).await;
}

/// Start every batch from an empty directory so the archive only holds pages
/// from this run. Callers must hold the batch's guard.
async fn clear_batch_dir(dir: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    tokio::fs::create_dir_all(dir).await
}

/// Marks a batch name as in use until dropped.
struct BatchGuard {
    active: Arc<Mutex<HashSet<String>>>,
    name: String,
}

impl BatchGuard {
    fn claim(active: &Arc<Mutex<HashSet<String>>>, name: &str) -> Option<Self> {
        let mut names = active.lock().unwrap_or_else(PoisonError::into_inner);
        if !names.insert(name.to_string()) {
            return None;
        }
        Some(Self {
            active: Arc::clone(active),
            name: name.to_string(),
        })
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

async fn serve_static(public_dir: &Path, request: Request) -> Response {
    let service = ServeDir::new(public_dir).not_found_service(ServeFile::new(public_dir.join("404.html")));
    match service.oneshot(request).await {
        Ok(response) => response.map(Body::new).into_response(),
        Err(never) => match never {},
    }
}

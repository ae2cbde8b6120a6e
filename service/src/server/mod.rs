//! HTTP server implementation.

mod archive;
mod handlers;
mod layers;
mod page;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, StatusCode, header};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use dirserve::vfs::DirVfs;
use dirserve_core::policy::ServeConfig;

/// Request header carrying the percent-encoded destination of an upload.
pub const UPLOAD_PATH_HEADER: &str = "upload-path";

/// Body of every failed request. Which check failed is only logged, so
/// clients learn nothing about the layout of the served tree.
const ERROR_BODY: &str = "error";
const OK_BODY: &str = "ok";

#[derive(Clone)]
struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    vfs: Arc<DirVfs>,
    config: ServeConfig,
    prefix: String,
    io_concurrency: Arc<Semaphore>,
    archive_concurrency: Arc<Semaphore>,
}

impl AppState {
    async fn io_permit(&self) -> Result<OwnedSemaphorePermit, Response> {
        acquire(&self.inner.io_concurrency).await
    }

    async fn archive_permit(&self) -> Result<OwnedSemaphorePermit, Response> {
        acquire(&self.inner.archive_concurrency).await
    }
}

async fn acquire(semaphore: &Arc<Semaphore>) -> Result<OwnedSemaphorePermit, Response> {
    semaphore.clone().acquire_owned().await.map_err(|_| {
        tracing::warn!("concurrency limiter closed");
        text(StatusCode::SERVICE_UNAVAILABLE, ERROR_BODY)
    })
}

fn text(status: StatusCode, body: &'static str) -> Response {
    (
        status,
        [(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        )],
        body,
    )
        .into_response()
}

fn ok() -> Response {
    text(StatusCode::OK, OK_BODY)
}

fn map_err(err: dirserve_core::Error) -> Response {
    let code = err.code();
    let status = match code {
        "invalid_path" | "invalid_policy" => StatusCode::BAD_REQUEST,
        "policy_denied" => StatusCode::FORBIDDEN,
        "not_found" => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    if status.is_server_error() {
        tracing::error!(code, err = %err, "request failed");
    } else {
        tracing::debug!(code, err = %err, "request rejected");
    }
    text(status, ERROR_BODY)
}

/// Normalizes a mount prefix to `/` or `/a/b/`.
///
/// Segments are limited to unreserved URL characters so the prefix matches
/// request paths byte for byte.
pub fn normalize_prefix(prefix: &str) -> anyhow::Result<String> {
    let mut segments = Vec::new();
    for seg in prefix.trim().split('/').filter(|seg| !seg.is_empty()) {
        if seg == "." || seg == ".." {
            anyhow::bail!("prefix must not contain {seg:?} segments");
        }
        if !seg
            .bytes()
            .all(|byte| byte.is_ascii_alphanumeric() || b"-_.~".contains(&byte))
        {
            anyhow::bail!("prefix segment {seg:?} must use only [A-Za-z0-9-_.~]");
        }
        segments.push(seg);
    }
    if segments.is_empty() {
        return Ok("/".to_string());
    }
    Ok(format!("/{}/", segments.join("/")))
}

/// Request path relative to the mount prefix, keeping its leading slash.
/// `None` when the request is outside the prefix.
fn strip_prefix<'a>(prefix: &str, path: &'a str) -> Option<&'a str> {
    if prefix == "/" {
        return Some(path);
    }
    let base = prefix.trim_end_matches('/');
    if path == base {
        return Some("/");
    }
    path.strip_prefix(base).filter(|rest| rest.starts_with('/'))
}

pub fn build_app(root: PathBuf, config: ServeConfig, prefix: &str) -> anyhow::Result<Router> {
    config.validate().map_err(anyhow::Error::msg)?;
    let prefix = normalize_prefix(prefix)?;
    let vfs = DirVfs::new(&root, config.policy).map_err(anyhow::Error::msg)?;
    let upload_limit = usize::try_from(config.limits.max_upload_bytes).unwrap_or(usize::MAX);

    let state = AppState {
        inner: Arc::new(AppInner {
            vfs: Arc::new(vfs),
            io_concurrency: Arc::new(Semaphore::new(config.limits.max_concurrency_io)),
            archive_concurrency: Arc::new(Semaphore::new(config.limits.max_concurrency_archive)),
            config,
            prefix: prefix.clone(),
        }),
    };

    let base = prefix.trim_end_matches('/');
    let app = Router::new()
        .route(&format!("{base}/zip"), get(handlers::zip))
        .route(&format!("{base}/rpc"), post(handlers::rpc))
        .route(
            &format!("{base}/post"),
            post(handlers::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .fallback(handlers::browse);

    Ok(app
        .layer(middleware::from_fn(layers::request_id_middleware))
        .with_state(state))
}

use axum::body::{Body, Bytes};
use axum::extract::multipart::{Field, MultipartRejection};
use axum::extract::rejection::{BytesRejection, QueryRejection};
use axum::extract::{Multipart, Query, State};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;

use dirserve::vfs::{Browse, RpcCommand};
use dirserve_core::Error;
use dirserve_core::path::decode_percent;

use super::runner::run_blocking;
use super::{
    AppState, ERROR_BODY, UPLOAD_PATH_HEADER, archive, map_err, ok, page, strip_prefix, text,
};

/// GET/HEAD on anything that is not an endpoint: list a directory or send a file.
/// Requests outside the mount prefix are sent to it.
pub(super) async fn browse(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return text(StatusCode::METHOD_NOT_ALLOWED, ERROR_BODY);
    }
    let Some(relative) = strip_prefix(&state.inner.prefix, uri.path()) else {
        return Redirect::temporary(&state.inner.prefix).into_response();
    };
    let virtual_path = match decode_percent(relative) {
        Ok(path) => path,
        Err(err) => return map_err(err),
    };

    let _permit = match state.io_permit().await {
        Ok(permit) => permit,
        Err(resp) => return resp,
    };
    let vfs = state.inner.vfs.clone();
    let found = match run_blocking(move || vfs.browse(&virtual_path)).await {
        Ok(found) => found,
        Err(err) => return map_err(err),
    };

    match found {
        Browse::Directory { path, entries } => {
            // Relative links in the page only work from the canonical URL.
            let canonical = page::dir_href(&state.inner.prefix, &path);
            if uri.path() != canonical {
                return Redirect::permanent(&canonical).into_response();
            }
            Html(page::render_listing(&path, &entries)).into_response()
        }
        Browse::File { path, file, len } => {
            tracing::debug!(path = %path, len, "sending file");
            let content_type = page::content_type(path.name().unwrap_or_default());
            let body = Body::from_stream(ReaderStream::new(tokio::fs::File::from_std(file)));
            (
                [
                    (header::CONTENT_TYPE, content_type),
                    (header::CONTENT_LENGTH, HeaderValue::from(len)),
                ],
                body,
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ZipQuery {
    #[serde(rename = "zipPath")]
    zip_path: String,
    #[serde(rename = "zipName", default)]
    zip_name: Option<String>,
}

pub(super) async fn zip(
    State(state): State<AppState>,
    query: Result<Query<ZipQuery>, QueryRejection>,
) -> Response {
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            tracing::debug!(err = %rejection, "bad zip query");
            return text(StatusCode::BAD_REQUEST, ERROR_BODY);
        }
    };

    let permit = match state.archive_permit().await {
        Ok(permit) => permit,
        Err(resp) => return resp,
    };
    let vfs = state.inner.vfs.clone();
    let zip_path = query.zip_path.clone();
    let dir = match run_blocking(move || vfs.archive_dir(&zip_path)).await {
        Ok(dir) => dir,
        Err(err) => return map_err(err),
    };

    let name = archive::archive_name(query.zip_name.as_deref(), &dir);
    let disposition = match HeaderValue::from_str(&archive::content_disposition(&name)) {
        Ok(value) => value,
        Err(err) => return map_err(Error::InvalidPath(format!("zip name: {err}"))),
    };
    let body = archive::stream_zip(
        state.inner.vfs.clone(),
        dir,
        state.inner.config.limits.archive_chunk_bytes,
        permit,
    );
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        body,
    )
        .into_response()
}

pub(super) async fn rpc(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(err = %rejection, "unreadable rpc body");
            return text(StatusCode::BAD_REQUEST, ERROR_BODY);
        }
    };
    let command = match RpcCommand::from_json(&body) {
        Ok(command) => command,
        Err(err) => return map_err(err),
    };

    let _permit = match state.io_permit().await {
        Ok(permit) => permit,
        Err(resp) => return resp,
    };
    let vfs = state.inner.vfs.clone();
    match run_blocking(move || vfs.dispatch(&command).map(|()| command)).await {
        Ok(command) => {
            tracing::info!(call = command.name(), command = ?command, "rpc applied");
            ok()
        }
        Err(err) => map_err(err),
    }
}

/// Stores the first multipart field at the path named by the upload header.
pub(super) async fn upload(
    State(state): State<AppState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let Some(raw) = headers
        .get(UPLOAD_PATH_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return map_err(Error::InvalidPath(format!(
            "missing or non-ascii {UPLOAD_PATH_HEADER} header"
        )));
    };
    let virtual_path = match decode_percent(raw) {
        Ok(path) => path,
        Err(err) => return map_err(err),
    };
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            tracing::debug!(err = %rejection, "upload is not multipart");
            return text(StatusCode::BAD_REQUEST, ERROR_BODY);
        }
    };
    let field = match multipart.next_field().await {
        Ok(Some(field)) => field,
        Ok(None) => return map_err(Error::InvalidPath("upload has no file part".to_string())),
        Err(err) => return map_err(Error::Io(format!("read upload body: {err}"))),
    };

    let _permit = match state.io_permit().await {
        Ok(permit) => permit,
        Err(resp) => return resp,
    };
    let vfs = state.inner.vfs.clone();
    let (staged, file) = match run_blocking(move || vfs.create_upload(&virtual_path)).await {
        Ok(created) => created,
        Err(err) => return map_err(err),
    };

    let vfs = state.inner.vfs.clone();
    match write_field(field, tokio::fs::File::from_std(file)).await {
        Ok(bytes) => {
            let path = staged.target().to_string();
            match run_blocking(move || vfs.commit_upload(staged)).await {
                Ok(()) => {
                    tracing::info!(path, bytes, "upload stored");
                    ok()
                }
                Err(err) => map_err(err),
            }
        }
        Err(err) => {
            let path = staged.target().to_string();
            if let Err(cleanup) = run_blocking(move || {
                vfs.discard_upload(staged);
                Ok(())
            })
            .await
            {
                tracing::warn!(path, err = %cleanup, "partial upload cleanup did not run");
            }
            map_err(err)
        }
    }
}

async fn write_field(mut field: Field<'_>, mut file: tokio::fs::File) -> dirserve::Result<u64> {
    let mut written = 0u64;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| Error::Io(format!("read upload body: {err}")))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|err| Error::from_io("write upload", err))?;
        written += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|err| Error::from_io("write upload", err))?;
    Ok(written)
}

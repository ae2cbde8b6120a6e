use std::io::{self, Write};
use std::sync::Arc;

use axum::body::{Body, Bytes};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::{OwnedSemaphorePermit, mpsc};

use dirserve::vfs::{DirVfs, ResolvedPath};

/// RFC 5987 `attr-char`, everything else is encoded in `filename*`.
const ATTR_CHAR: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'!')
    .remove(b'#')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'-')
    .remove(b'.')
    .remove(b'^')
    .remove(b'_')
    .remove(b'`')
    .remove(b'|')
    .remove(b'~');

/// Chunks in flight between the archive walker and the response body.
const CHANNEL_DEPTH: usize = 4;

/// Buffers zip output and hands it to the response body in fixed-size chunks.
///
/// Writes fail once the body is dropped, which stops the walk.
struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: Vec<u8>,
    chunk_bytes: usize,
}

impl ChannelWriter {
    fn new(tx: mpsc::Sender<io::Result<Bytes>>, chunk_bytes: usize) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(chunk_bytes),
            chunk_bytes,
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = std::mem::replace(&mut self.buf, Vec::with_capacity(self.chunk_bytes));
        self.tx
            .blocking_send(Ok(Bytes::from(chunk)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "archive receiver dropped"))
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= self.chunk_bytes {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Streams `dir` as a zip archive. The permit is held until the walk ends.
pub(super) fn stream_zip(
    vfs: Arc<DirVfs>,
    dir: ResolvedPath,
    chunk_bytes: usize,
    permit: OwnedSemaphorePermit,
) -> Body {
    let (tx, rx) = mpsc::channel::<io::Result<Bytes>>(CHANNEL_DEPTH);
    let span = tracing::Span::current();

    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        let _permit = permit;
        let mut writer = ChannelWriter::new(tx.clone(), chunk_bytes);
        let result = vfs.write_zip(&dir, &mut writer).and_then(|summary| {
            writer
                .flush()
                .map_err(|err| dirserve::Error::from_io("archive stream", err))?;
            Ok(summary)
        });

        match result {
            Ok(summary) => tracing::info!(
                dir = %dir,
                files = summary.files,
                bytes = summary.bytes,
                skipped = summary.skipped,
                "archive sent"
            ),
            Err(err) => {
                tracing::warn!(dir = %dir, code = err.code(), err = %err, "archive aborted");
                // Fails the body so the client sees a truncated transfer, not a valid zip.
                let _ = tx.blocking_send(Err(io::Error::other(err.to_string())));
            }
        }
    });

    Body::from_stream(futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|item| (item, rx))
    }))
}

/// `Content-Disposition` for a download named `<name>.zip`.
pub(super) fn content_disposition(name: &str) -> String {
    let file_name = format!("{name}.zip");
    let fallback: String = file_name
        .chars()
        .map(|ch| {
            if (ch.is_ascii_graphic() && ch != '"' && ch != '\\') || ch == ' ' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{}",
        utf8_percent_encode(&file_name, ATTR_CHAR)
    )
}

/// Download name: the caller's `zipName` without separators, else the
/// directory name, else `archive` for the root.
pub(super) fn archive_name(requested: Option<&str>, dir: &ResolvedPath) -> String {
    let cleaned = requested.map(|name| {
        name.chars()
            .filter(|ch| !ch.is_control() && *ch != '/' && *ch != '\\')
            .collect::<String>()
            .trim()
            .trim_end_matches(".zip")
            .to_string()
    });
    match cleaned {
        Some(name) if !name.is_empty() && name != "." && name != ".." => name,
        _ => dir.name().unwrap_or("archive").to_string(),
    }
}

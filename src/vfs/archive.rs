use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use zip::CompressionMethod;
use zip::ZipWriter;
use zip::result::ZipError;
use zip::write::SimpleFileOptions;

use dirserve_core::path::Traversal;
use dirserve_core::policy::{Intent, Need};
use dirserve_core::{Error, Result};

use super::{DirVfs, ResolvedPath};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub files: u64,
    pub bytes: u64,
    /// Entries left out by policy or because they could not be read.
    pub skipped: u64,
}

fn zip_err(err: ZipError) -> Error {
    match err {
        ZipError::Io(err) => Error::from_io("write archive", err),
        other => Error::Io(format!("write archive: {other}")),
    }
}

pub(super) fn archive_dir(vfs: &DirVfs, virtual_path: &str) -> Result<ResolvedPath> {
    let dir = vfs.checked(virtual_path, Traversal::Clamp, Intent::Read, Need::Existing)?;
    if !dir.is_dir() {
        return Err(Error::InvalidPath(format!("{dir} is not a directory")));
    }
    Ok(dir)
}

/// Writes a zip of the admitted files below `dir` to `out`.
///
/// Directories are read one at a time as the walk reaches them, and `out`
/// only needs `Write`, so the archive can be sent while it is produced. A
/// failing write (e.g. the client went away) stops the walk.
pub(super) fn write_zip<W: Write>(
    vfs: &DirVfs,
    dir: &ResolvedPath,
    out: W,
) -> Result<ArchiveSummary> {
    let mut zip = ZipWriter::new_stream(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut summary = ArchiveSummary::default();

    let mut visited = HashSet::<PathBuf>::new();
    visited.insert(dir.real().to_path_buf());
    let mut pending = vec![(dir.clone(), String::new())];

    while let Some((current, prefix)) = pending.pop() {
        let reader = match fs::read_dir(current.real()) {
            Ok(reader) => reader,
            Err(err) if current.segments() == dir.segments() => {
                return Err(Error::from_io(&dir.to_string(), err));
            }
            Err(err) => {
                tracing::debug!(dir = %current, err = %err, "skipping unreadable directory");
                summary.skipped += 1;
                continue;
            }
        };

        let mut names = Vec::new();
        for item in reader {
            match item {
                Ok(item) => match item.file_name().into_string() {
                    Ok(name) => names.push(name),
                    Err(raw) => {
                        tracing::debug!(dir = %current, name = ?raw, "skipping non UTF-8 entry name");
                        summary.skipped += 1;
                    }
                },
                Err(err) => {
                    tracing::debug!(dir = %current, err = %err, "skipping unreadable directory entry");
                    summary.skipped += 1;
                }
            }
        }
        names.sort();

        for name in names {
            // A denied child prunes its whole subtree.
            let child = match vfs.child(&current, &name) {
                Ok(child) => child,
                Err(err) => {
                    tracing::debug!(dir = %current, name, code = err.code(), "entry left out of archive");
                    summary.skipped += 1;
                    continue;
                }
            };
            let Some(meta) = child.metadata() else {
                continue;
            };
            let entry_name = if prefix.is_empty() {
                name
            } else {
                format!("{prefix}/{name}")
            };

            if meta.is_dir() {
                if visited.insert(child.real().to_path_buf()) {
                    pending.push((child, entry_name));
                }
                continue;
            }
            if !meta.is_file() {
                summary.skipped += 1;
                continue;
            }

            let mut file = match File::open(child.real()) {
                Ok(file) => file,
                Err(err) => {
                    tracing::debug!(path = %child, err = %err, "skipping unreadable file");
                    summary.skipped += 1;
                    continue;
                }
            };
            let options = options.large_file(meta.len() >= u64::from(u32::MAX));
            zip.start_file(entry_name, options).map_err(zip_err)?;
            let copied = io::copy(&mut file, &mut zip)
                .map_err(|err| Error::from_io("write archive", err))?;
            summary.files += 1;
            summary.bytes = summary.bytes.saturating_add(copied);
        }
    }

    zip.finish().map_err(zip_err)?;
    Ok(summary)
}

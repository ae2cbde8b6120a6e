use std::fs;

use serde::{Deserialize, Serialize};

use dirserve_core::path::encode_segment;
use dirserve_core::{Error, Result};

use super::util::system_time_ms;
use super::{DirVfs, ResolvedPath};

/// Directories sort before files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Directory,
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Raw name, for display.
    pub name: String,
    /// Percent-encoded name, for use as a relative link.
    pub href: String,
    pub kind: EntryKind,
    pub size_bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified_ms: Option<u64>,
    pub is_symlink: bool,
}

pub(super) fn list(vfs: &DirVfs, dir: &ResolvedPath) -> Result<Vec<DirEntry>> {
    if !dir.is_dir() {
        return Err(Error::InvalidPath(format!("{dir} is not a directory")));
    }
    let reader = fs::read_dir(dir.real()).map_err(|err| Error::from_io(&dir.to_string(), err))?;

    let mut entries = Vec::new();
    for item in reader {
        let item = match item {
            Ok(item) => item,
            Err(err) => {
                tracing::debug!(dir = %dir, err = %err, "skipping unreadable directory entry");
                continue;
            }
        };
        let file_name = item.file_name();
        let Some(name) = file_name.to_str() else {
            tracing::debug!(dir = %dir, name = ?file_name, "skipping non UTF-8 entry name");
            continue;
        };

        // A single hidden or unreachable child must not break the listing.
        let child = match vfs.child(dir, name) {
            Ok(child) => child,
            Err(err) => {
                tracing::debug!(dir = %dir, name, code = err.code(), "entry omitted from listing");
                continue;
            }
        };
        let Some(meta) = child.metadata() else {
            continue;
        };
        let kind = if meta.is_dir() {
            EntryKind::Directory
        } else if meta.is_file() {
            EntryKind::File
        } else {
            continue;
        };

        entries.push(DirEntry {
            name: name.to_string(),
            href: encode_segment(name),
            kind,
            size_bytes: if kind == EntryKind::File { meta.len() } else { 0 },
            modified_ms: meta.modified().ok().and_then(system_time_ms),
            is_symlink: child.is_symlink(),
        });
    }

    entries.sort_by(|a, b| a.kind.cmp(&b.kind).then_with(|| a.name.cmp(&b.name)));
    Ok(entries)
}

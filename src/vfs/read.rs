use std::fs::File;

use dirserve_core::path::Traversal;
use dirserve_core::policy::{Intent, Need};
use dirserve_core::{Error, Result};

use super::{DirEntry, DirVfs, ResolvedPath};

/// What a GET navigation found.
#[derive(Debug)]
pub enum Browse {
    Directory {
        path: ResolvedPath,
        entries: Vec<DirEntry>,
    },
    File {
        path: ResolvedPath,
        file: File,
        len: u64,
    },
}

pub(super) fn browse(vfs: &DirVfs, virtual_path: &str) -> Result<Browse> {
    let path = vfs.checked(virtual_path, Traversal::Clamp, Intent::Read, Need::Existing)?;

    if path.is_dir() {
        let entries = vfs.list(&path)?;
        return Ok(Browse::Directory { path, entries });
    }
    // FIFOs and devices would block or never end.
    if !path.is_file() {
        return Err(Error::PolicyDenied(format!("{path} is not a regular file")));
    }

    let file = File::open(path.real()).map_err(|err| Error::from_io(&path.to_string(), err))?;
    let len = file
        .metadata()
        .map_err(|err| Error::from_io(&path.to_string(), err))?
        .len();
    Ok(Browse::File { path, file, len })
}

use std::fs;
use std::time::{SystemTime, UNIX_EPOCH};

use dirserve_core::{Error, Result};

use super::ResolvedPath;

pub(super) fn system_time_ms(time: SystemTime) -> Option<u64> {
    time.duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_millis().min(u128::from(u64::MAX)) as u64)
}

pub(super) fn ensure_not_root(path: &ResolvedPath, op: &str) -> Result<()> {
    if path.is_root() {
        return Err(Error::InvalidPath(format!("{op} cannot target the served root")));
    }
    Ok(())
}

/// The directory that will hold `path` must already exist.
pub(super) fn require_parent_dir(path: &ResolvedPath) -> Result<()> {
    let parent = path
        .entry()
        .parent()
        .ok_or_else(|| Error::InvalidPath(format!("{path} has no parent")))?;
    match fs::metadata(parent) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(Error::NotFound(format!("parent of {path} is not a directory"))),
        Err(err) => Err(Error::from_io(&format!("parent of {path}"), err)),
    }
}

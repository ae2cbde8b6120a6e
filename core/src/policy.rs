use serde::{Deserialize, Serialize};

use crate::Error;
use crate::Result;

/// The three access switches, fixed for the life of the process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Disables mkdirp, mv, rm and upload.
    #[serde(default)]
    pub read_only: bool,
    /// Makes `.`-prefixed entries listable and reachable.
    #[serde(default)]
    pub show_hidden: bool,
    /// Allows traversal through symbolic links whose targets stay inside the root.
    #[serde(default)]
    pub show_symlinks: bool,
}

/// Whether an operation reads the tree or changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Read,
    Write,
}

/// Whether the target of an operation must already exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Need {
    Existing,
    /// The final component may be absent (mkdirp, mv destination, upload).
    Creatable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Limits {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
    /// Max in-flight blocking filesystem requests (browse/fetch/rpc/upload).
    #[serde(default = "default_max_concurrency_io")]
    pub max_concurrency_io: usize,
    /// Max archives being generated at once.
    #[serde(default = "default_max_concurrency_archive")]
    pub max_concurrency_archive: usize,
    /// Size of each chunk handed from the archive writer to the response body.
    #[serde(default = "default_archive_chunk_bytes")]
    pub archive_chunk_bytes: usize,
}

const fn default_max_upload_bytes() -> u64 {
    1024 * 1024 * 1024
}

const fn default_max_concurrency_io() -> usize {
    16
}

const fn default_max_concurrency_archive() -> usize {
    4
}

const fn default_archive_chunk_bytes() -> usize {
    64 * 1024
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            max_concurrency_io: default_max_concurrency_io(),
            max_concurrency_archive: default_max_concurrency_archive(),
            archive_chunk_bytes: default_archive_chunk_bytes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ServeConfig {
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub limits: Limits,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<()> {
        const MAX_UPLOAD_BYTES: u64 = 64 * 1024 * 1024 * 1024;
        const MIN_CHUNK_BYTES: usize = 4 * 1024;
        const MAX_CHUNK_BYTES: usize = 8 * 1024 * 1024;

        if self.limits.max_upload_bytes == 0 {
            return Err(Error::InvalidPolicy(
                "limits.max_upload_bytes must be > 0".to_string(),
            ));
        }
        if self.limits.max_upload_bytes > MAX_UPLOAD_BYTES {
            return Err(Error::InvalidPolicy(format!(
                "limits.max_upload_bytes is too large (max {} bytes)",
                MAX_UPLOAD_BYTES
            )));
        }
        if self.limits.max_concurrency_io == 0 {
            return Err(Error::InvalidPolicy(
                "limits.max_concurrency_io must be > 0".to_string(),
            ));
        }
        if self.limits.max_concurrency_archive == 0 {
            return Err(Error::InvalidPolicy(
                "limits.max_concurrency_archive must be > 0".to_string(),
            ));
        }
        if !(MIN_CHUNK_BYTES..=MAX_CHUNK_BYTES).contains(&self.limits.archive_chunk_bytes) {
            return Err(Error::InvalidPolicy(format!(
                "limits.archive_chunk_bytes must be between {MIN_CHUNK_BYTES} and {MAX_CHUNK_BYTES}"
            )));
        }
        Ok(())
    }
}

mod archive;
mod gate;
mod listing;
mod read;
mod resolve;
mod rpc;
mod upload;
mod util;

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use dirserve_core::path::Traversal;
use dirserve_core::policy::{Intent, Need, PolicyConfig};
use dirserve_core::{Error, Result};

pub use archive::ArchiveSummary;
pub use gate::PolicyGate;
pub use listing::{DirEntry, EntryKind};
pub use read::Browse;
pub use resolve::ResolvedPath;
pub use rpc::{RpcCommand, RpcRequest};
pub use upload::StagedUpload;

/// A directory tree served under a fixed policy.
///
/// All paths handed to the public methods are untrusted virtual paths
/// (already percent-decoded). Each one is resolved against the canonical root
/// and admitted by the [`PolicyGate`] before any filesystem call is made.
#[derive(Debug, Clone)]
pub struct DirVfs {
    root: PathBuf,
    gate: PolicyGate,
}

impl DirVfs {
    pub fn new(root: impl AsRef<Path>, policy: PolicyConfig) -> Result<Self> {
        let root = fs::canonicalize(root.as_ref())
            .map_err(|err| Error::InvalidPolicy(format!("cannot open served root: {err}")))?;
        if !root.is_dir() {
            return Err(Error::InvalidPolicy(
                "served root must be a directory".to_string(),
            ));
        }
        Ok(Self {
            root,
            gate: PolicyGate::new(policy),
        })
    }

    /// Canonical path of the served root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn policy(&self) -> &PolicyConfig {
        self.gate.policy()
    }

    pub fn resolve(&self, virtual_path: &str, traversal: Traversal) -> Result<ResolvedPath> {
        resolve::resolve(&self.root, virtual_path, traversal)
    }

    pub fn admit(&self, path: &ResolvedPath, intent: Intent, need: Need) -> Result<()> {
        self.gate.admit(path, intent, need)
    }

    fn checked(
        &self,
        virtual_path: &str,
        traversal: Traversal,
        intent: Intent,
        need: Need,
    ) -> Result<ResolvedPath> {
        let path = self.resolve(virtual_path, traversal)?;
        self.admit(&path, intent, need)?;
        Ok(path)
    }

    /// Resolves and read-admits a direct child of `dir`, or explains why not.
    fn child(&self, dir: &ResolvedPath, name: &str) -> Result<ResolvedPath> {
        let child = resolve::resolve_child(&self.root, dir, name)?;
        self.admit(&child, Intent::Read, Need::Existing)?;
        Ok(child)
    }

    /// Lists a directory or opens a file for a GET navigation.
    ///
    /// Uses clamping traversal: excess `..` lands on the root.
    pub fn browse(&self, virtual_path: &str) -> Result<Browse> {
        read::browse(self, virtual_path)
    }

    pub fn list(&self, dir: &ResolvedPath) -> Result<Vec<DirEntry>> {
        listing::list(self, dir)
    }

    /// Resolves and admits the directory an archive will be built from.
    pub fn archive_dir(&self, virtual_path: &str) -> Result<ResolvedPath> {
        archive::archive_dir(self, virtual_path)
    }

    pub fn write_zip<W: Write>(&self, dir: &ResolvedPath, out: W) -> Result<ArchiveSummary> {
        archive::write_zip(self, dir, out)
    }

    pub fn dispatch(&self, command: &RpcCommand) -> Result<()> {
        rpc::dispatch(self, command)
    }

    pub fn mkdirp(&self, path: &str) -> Result<()> {
        rpc::mkdirp(self, path)
    }

    pub fn mv(&self, src: &str, dst: &str) -> Result<()> {
        rpc::mv(self, src, dst)
    }

    pub fn rm(&self, path: &str) -> Result<()> {
        rpc::rm(self, path)
    }

    /// Admits an upload destination and opens a staged file beside it.
    pub fn create_upload(&self, virtual_path: &str) -> Result<(StagedUpload, File)> {
        upload::create_upload(self, virtual_path)
    }

    /// Replaces the destination with the staged file in one rename.
    pub fn commit_upload(&self, staged: StagedUpload) -> Result<()> {
        upload::commit_upload(staged)
    }

    /// Drops a staged upload; the destination keeps its previous content.
    pub fn discard_upload(&self, staged: StagedUpload) {
        upload::discard_upload(staged)
    }

    pub fn upload<R: Read>(&self, virtual_path: &str, content: R) -> Result<u64> {
        upload::upload(self, virtual_path, content)
    }
}

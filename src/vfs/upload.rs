use std::fs::File;
use std::io::{self, Read, Write};

use tempfile::TempPath;

use dirserve_core::path::Traversal;
use dirserve_core::policy::{Intent, Need};
use dirserve_core::{Error, Result};

use super::util::{ensure_not_root, require_parent_dir};
use super::{DirVfs, ResolvedPath};

/// An upload being written next to its destination.
///
/// The destination is untouched until [`DirVfs::commit_upload`] renames the
/// staged file over it. Dropping or discarding removes the staged file.
#[derive(Debug)]
pub struct StagedUpload {
    target: ResolvedPath,
    temp: TempPath,
}

impl StagedUpload {
    pub fn target(&self) -> &ResolvedPath {
        &self.target
    }
}

pub(super) fn create_upload(vfs: &DirVfs, virtual_path: &str) -> Result<(StagedUpload, File)> {
    // Strict like every other mutation; the parent is not created on demand.
    let target = vfs.checked(virtual_path, Traversal::Strict, Intent::Write, Need::Creatable)?;
    ensure_not_root(&target, "upload")?;
    if target.is_dir() {
        return Err(Error::Io(format!("{target} is a directory")));
    }
    require_parent_dir(&target)?;
    let dir = target
        .real()
        .parent()
        .ok_or_else(|| Error::InvalidPath(format!("{target} has no parent")))?;

    // Same directory as the destination, so the final rename cannot cross filesystems.
    let mut builder = tempfile::Builder::new();
    builder.prefix(".upload-").suffix(".part");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(std::fs::Permissions::from_mode(0o644));
    }
    let (file, temp) = builder
        .tempfile_in(dir)
        .map_err(|err| Error::from_io(&target.to_string(), err))?
        .into_parts();

    // An overwrite keeps the mode of the file it replaces.
    if let Some(meta) = target.metadata() {
        file.set_permissions(meta.permissions())
            .map_err(|err| Error::from_io(&target.to_string(), err))?;
    }
    Ok((StagedUpload { target, temp }, file))
}

pub(super) fn commit_upload(staged: StagedUpload) -> Result<()> {
    let StagedUpload { target, temp } = staged;
    temp.persist(target.real())
        .map_err(|err| Error::from_io(&target.to_string(), err.error))
}

pub(super) fn discard_upload(staged: StagedUpload) {
    let StagedUpload { target, temp } = staged;
    if let Err(err) = temp.close()
        && err.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %target, err = %err, "failed to remove partial upload");
    }
}

pub(super) fn upload<R: Read>(vfs: &DirVfs, virtual_path: &str, mut content: R) -> Result<u64> {
    let (staged, mut file) = create_upload(vfs, virtual_path)?;
    let written = io::copy(&mut content, &mut file).and_then(|written| {
        file.flush()?;
        Ok(written)
    });
    drop(file);

    match written {
        Ok(written) => {
            commit_upload(staged)?;
            Ok(written)
        }
        Err(err) => {
            let what = staged.target().to_string();
            discard_upload(staged);
            Err(Error::from_io(&what, err))
        }
    }
}

use std::fmt;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};

use dirserve_core::path::{Traversal, join_segments, normalize_virtual_path};
use dirserve_core::{Error, Result};

/// A virtual path that has been mapped onto the real tree and proven to stay
/// inside the served root.
///
/// Only [`super::DirVfs`] constructs these, so holding one means resolution
/// succeeded; it says nothing yet about policy.
#[derive(Debug, Clone)]
pub struct ResolvedPath {
    segments: Vec<String>,
    /// Every symlink followed.
    real: PathBuf,
    /// Parent resolved, final component left as named.
    entry: PathBuf,
    via_symlink: bool,
    is_link: bool,
    meta: Option<Metadata>,
}

impl ResolvedPath {
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Normalized virtual path without a leading slash; empty for the root.
    pub fn virtual_path(&self) -> String {
        join_segments(&self.segments)
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn real(&self) -> &Path {
        &self.real
    }

    pub fn entry(&self) -> &Path {
        &self.entry
    }

    /// True if any component on the way here was a symbolic link.
    pub fn via_symlink(&self) -> bool {
        self.via_symlink
    }

    /// True if the final component itself is a symbolic link.
    pub fn is_symlink(&self) -> bool {
        self.is_link
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.meta.as_ref()
    }

    pub fn exists(&self) -> bool {
        self.meta.is_some()
    }

    pub fn is_dir(&self) -> bool {
        self.meta.as_ref().is_some_and(Metadata::is_dir)
    }

    pub fn is_file(&self) -> bool {
        self.meta.as_ref().is_some_and(Metadata::is_file)
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.virtual_path())
    }
}

struct Cursor<'a> {
    root: &'a Path,
    real: PathBuf,
    entry: PathBuf,
    via_symlink: bool,
    is_link: bool,
    missing: bool,
}

impl<'a> Cursor<'a> {
    fn at(root: &'a Path, real: PathBuf, via_symlink: bool) -> Self {
        Self {
            root,
            entry: real.clone(),
            real,
            via_symlink,
            is_link: false,
            missing: false,
        }
    }

    fn step(&mut self, seg: &str) -> Result<()> {
        let next = self.real.join(seg);
        self.entry = next.clone();
        self.is_link = false;

        if self.missing {
            self.real = next;
            return Ok(());
        }

        match fs::symlink_metadata(&next) {
            Ok(meta) if meta.file_type().is_symlink() => {
                self.via_symlink = true;
                self.is_link = true;
                let target = fs::canonicalize(&next).map_err(|err| {
                    if is_missing(&err) {
                        Error::InvalidPath(format!("symlink {seg:?} has no reachable target"))
                    } else {
                        Error::from_io("resolve symlink", err)
                    }
                })?;
                if !target.starts_with(self.root) {
                    return Err(Error::InvalidPath(format!(
                        "symlink {seg:?} points outside the served root"
                    )));
                }
                self.real = target;
            }
            Ok(_) => self.real = next,
            Err(err) if is_missing(&err) => {
                self.missing = true;
                self.real = next;
            }
            Err(err) => return Err(Error::from_io("stat", err)),
        }
        Ok(())
    }

    fn finish(self, segments: Vec<String>) -> Result<ResolvedPath> {
        // Each hop is checked as it is taken; this guards the literal tail.
        if !self.real.starts_with(self.root) || !self.entry.starts_with(self.root) {
            return Err(Error::InvalidPath(
                "path escapes the served root".to_string(),
            ));
        }

        let meta = if self.missing {
            None
        } else {
            match fs::metadata(&self.real) {
                Ok(meta) => Some(meta),
                Err(err) if is_missing(&err) => None,
                Err(err) => return Err(Error::from_io("stat", err)),
            }
        };

        Ok(ResolvedPath {
            segments,
            real: self.real,
            entry: self.entry,
            via_symlink: self.via_symlink,
            is_link: self.is_link,
            meta,
        })
    }
}

fn is_missing(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
    )
}

/// Maps `input` onto `root`, which must already be canonical.
pub(super) fn resolve(root: &Path, input: &str, traversal: Traversal) -> Result<ResolvedPath> {
    let segments = normalize_virtual_path(input, traversal)?;
    let mut cursor = Cursor::at(root, root.to_path_buf(), false);
    for seg in &segments {
        cursor.step(seg)?;
    }
    cursor.finish(segments)
}

/// Resolves a single directory entry below an already resolved directory.
pub(super) fn resolve_child(root: &Path, parent: &ResolvedPath, name: &str) -> Result<ResolvedPath> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(Error::InvalidPath(format!("invalid entry name {name:?}")));
    }
    // Such names could never be requested back, so they are not offered.
    if name.chars().any(char::is_control) || (cfg!(windows) && name.contains('\\')) {
        return Err(Error::InvalidPath(format!("unaddressable entry name {name:?}")));
    }
    let mut cursor = Cursor::at(root, parent.real.clone(), parent.via_symlink);
    cursor.step(name)?;
    let mut segments = parent.segments.clone();
    segments.push(name.to_string());
    cursor.finish(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let root = fs::canonicalize(dir.path()).expect("canonicalize");
        (dir, root)
    }

    #[test]
    fn root_resolves_to_itself() {
        let (_dir, root) = canonical_tempdir();
        let resolved = resolve(&root, "/", Traversal::Clamp).unwrap();
        assert!(resolved.is_root());
        assert!(resolved.is_dir());
        assert_eq!(resolved.real(), root);
        assert_eq!(resolved.to_string(), "/");
    }

    #[test]
    fn missing_tail_is_appended_literally() {
        let (_dir, root) = canonical_tempdir();
        fs::create_dir(root.join("a")).unwrap();
        let resolved = resolve(&root, "a/b/c", Traversal::Strict).unwrap();
        assert!(!resolved.exists());
        assert_eq!(resolved.real(), root.join("a/b/c"));
        assert_eq!(resolved.entry(), root.join("a/b/c"));
        assert_eq!(resolved.name(), Some("c"));
    }

    #[test]
    fn segments_below_a_file_do_not_exist() {
        let (_dir, root) = canonical_tempdir();
        fs::write(root.join("f"), b"x").unwrap();
        let resolved = resolve(&root, "f/x", Traversal::Clamp).unwrap();
        assert!(!resolved.exists());
    }

    #[test]
    fn excess_parent_segments_land_on_root() {
        let (_dir, root) = canonical_tempdir();
        let resolved = resolve(&root, "../../..", Traversal::Clamp).unwrap();
        assert!(resolved.is_root());
        assert_eq!(resolved.real(), root);
    }

    #[cfg(unix)]
    #[test]
    fn symlink_inside_root_is_followed_and_flagged() {
        let (_dir, root) = canonical_tempdir();
        fs::create_dir(root.join("target")).unwrap();
        std::os::unix::fs::symlink(root.join("target"), root.join("link")).unwrap();

        let resolved = resolve(&root, "link/new", Traversal::Strict).unwrap();
        assert!(resolved.via_symlink());
        assert!(!resolved.is_symlink());
        assert_eq!(resolved.real(), root.join("target/new"));

        let link = resolve(&root, "link", Traversal::Strict).unwrap();
        assert!(link.is_symlink());
        assert_eq!(link.entry(), root.join("link"));
        assert_eq!(link.real(), root.join("target"));
    }

    #[cfg(unix)]
    #[test]
    fn symlink_escaping_root_is_rejected() {
        let (_dir, root) = canonical_tempdir();
        let (_outside_dir, outside) = canonical_tempdir();
        std::os::unix::fs::symlink(&outside, root.join("escape")).unwrap();

        for input in ["escape", "escape/anything"] {
            assert!(matches!(
                resolve(&root, input, Traversal::Clamp),
                Err(Error::InvalidPath(_))
            ));
        }
    }

    #[cfg(unix)]
    #[test]
    fn dangling_symlink_is_rejected() {
        let (_dir, root) = canonical_tempdir();
        std::os::unix::fs::symlink("/nonexistent/target", root.join("dangling")).unwrap();
        assert!(matches!(
            resolve(&root, "dangling", Traversal::Strict),
            Err(Error::InvalidPath(_))
        ));
    }

    #[test]
    fn child_names_cannot_carry_separators() {
        let (_dir, root) = canonical_tempdir();
        let parent = resolve(&root, "", Traversal::Clamp).unwrap();
        for name in ["", ".", "..", "a/b", "a\nb", "tab\there"] {
            assert!(resolve_child(&root, &parent, name).is_err(), "{name:?}");
        }
    }
}

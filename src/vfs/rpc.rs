use std::fs;

use serde::{Deserialize, Serialize};

use dirserve_core::path::Traversal;
use dirserve_core::policy::{Intent, Need};
use dirserve_core::{Error, Result};

use super::DirVfs;
use super::util::{ensure_not_root, require_parent_dir};

/// Wire form of a mutation call: `{"call": "mv", "args": ["/a", "/b"]}`.
///
/// Arguments are plain virtual paths; they are not percent-decoded again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    pub call: String,
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcCommand {
    Mkdirp { path: String },
    Mv { src: String, dst: String },
    Rm { path: String },
}

impl RpcCommand {
    /// Parses a request body. Anything malformed is reported as `InvalidPath`.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let request: RpcRequest = serde_json::from_slice(body)
            .map_err(|err| Error::InvalidPath(format!("malformed rpc request: {err}")))?;
        Self::try_from(request)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RpcCommand::Mkdirp { .. } => "mkdirp",
            RpcCommand::Mv { .. } => "mv",
            RpcCommand::Rm { .. } => "rm",
        }
    }
}

impl TryFrom<RpcRequest> for RpcCommand {
    type Error = Error;

    fn try_from(request: RpcRequest) -> Result<Self> {
        let RpcRequest { call, args } = request;
        let argc = args.len();
        let mut args = args.into_iter();
        match (call.as_str(), args.next(), args.next(), args.next()) {
            ("mkdirp", Some(path), None, None) => Ok(RpcCommand::Mkdirp { path }),
            ("rm", Some(path), None, None) => Ok(RpcCommand::Rm { path }),
            ("mv", Some(src), Some(dst), None) => Ok(RpcCommand::Mv { src, dst }),
            ("mkdirp" | "rm" | "mv", ..) => Err(Error::InvalidPath(format!(
                "wrong number of arguments for {call} ({argc})"
            ))),
            _ => Err(Error::InvalidPath(format!("unknown rpc call {call:?}"))),
        }
    }
}

pub(super) fn dispatch(vfs: &DirVfs, command: &RpcCommand) -> Result<()> {
    match command {
        RpcCommand::Mkdirp { path } => mkdirp(vfs, path),
        RpcCommand::Mv { src, dst } => mv(vfs, src, dst),
        RpcCommand::Rm { path } => rm(vfs, path),
    }
}

// Every argument below is resolved with `Traversal::Strict`: a `..` segment
// fails the call instead of being clamped as it is for browsing.

pub(super) fn mkdirp(vfs: &DirVfs, path: &str) -> Result<()> {
    let target = vfs.checked(path, Traversal::Strict, Intent::Write, Need::Creatable)?;
    if let Some(meta) = target.metadata() {
        if meta.is_dir() {
            return Ok(());
        }
        return Err(Error::Io(format!("{target} exists and is not a directory")));
    }
    fs::create_dir_all(target.real()).map_err(|err| Error::from_io(&target.to_string(), err))
}

pub(super) fn mv(vfs: &DirVfs, src: &str, dst: &str) -> Result<()> {
    let from = vfs.checked(src, Traversal::Strict, Intent::Write, Need::Existing)?;
    let to = vfs.checked(dst, Traversal::Strict, Intent::Write, Need::Creatable)?;
    ensure_not_root(&from, "mv")?;
    ensure_not_root(&to, "mv")?;
    require_parent_dir(&to)?;

    // A single rename: it lands whole or not at all. A symlink is moved, not its target.
    fs::rename(from.entry(), to.entry())
        .map_err(|err| Error::from_io(&format!("mv {from} {to}"), err))
}

pub(super) fn rm(vfs: &DirVfs, path: &str) -> Result<()> {
    let target = vfs.checked(path, Traversal::Strict, Intent::Write, Need::Existing)?;
    ensure_not_root(&target, "rm")?;

    let meta = fs::symlink_metadata(target.entry())
        .map_err(|err| Error::from_io(&target.to_string(), err))?;
    let removed = if meta.is_dir() {
        fs::remove_dir_all(target.entry())
    } else {
        fs::remove_file(target.entry())
    };
    removed.map_err(|err| Error::from_io(&target.to_string(), err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_call_with_its_arity() {
        assert_eq!(
            RpcCommand::from_json(br#"{"call":"mkdirp","args":["/AAA"]}"#).unwrap(),
            RpcCommand::Mkdirp {
                path: "/AAA".to_string()
            }
        );
        assert_eq!(
            RpcCommand::from_json(br#"{"call":"mv","args":["/AAA", "/hols/AAA"]}"#).unwrap(),
            RpcCommand::Mv {
                src: "/AAA".to_string(),
                dst: "/hols/AAA".to_string()
            }
        );
        assert_eq!(
            RpcCommand::from_json(
                "{\"call\":\"rm\",\"args\":[\"/\u{1112}\u{1161} \u{1112}\u{1161}\"]}".as_bytes()
            )
            .unwrap(),
            RpcCommand::Rm {
                path: "/\u{1112}\u{1161} \u{1112}\u{1161}".to_string()
            }
        );
    }

    #[test]
    fn rejects_wrong_arity() {
        for body in [
            r#"{"call":"mkdirp","args":[]}"#,
            r#"{"call":"mkdirp","args":["/a","/b"]}"#,
            r#"{"call":"mv","args":["/a"]}"#,
            r#"{"call":"mv","args":["/a","/b","/c"]}"#,
            r#"{"call":"rm"}"#,
        ] {
            assert!(
                matches!(RpcCommand::from_json(body.as_bytes()), Err(Error::InvalidPath(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn rejects_unknown_calls_and_bad_json() {
        for body in [
            r#"{"call":"chmod","args":["/a"]}"#,
            r#"{"args":["/a"]}"#,
            r#"{"call":"rm","args":"/a"}"#,
            "{",
            "",
        ] {
            assert!(
                matches!(RpcCommand::from_json(body.as_bytes()), Err(Error::InvalidPath(_))),
                "{body}"
            );
        }
    }

    #[test]
    fn names_match_wire_calls() {
        let mv = RpcCommand::Mv {
            src: "a".to_string(),
            dst: "b".to_string(),
        };
        assert_eq!(mv.name(), "mv");
    }
}

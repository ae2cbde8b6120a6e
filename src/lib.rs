#![forbid(unsafe_code)]

//! `dirserve` maps untrusted virtual paths onto a real directory tree under a
//! fixed policy.
//!
//! - `vfs`: path resolution, policy admission, listing, zip archives and the
//!   mkdirp/mv/rm/upload mutations

pub mod vfs;

pub use dirserve_core::{Error, Result};

#![forbid(unsafe_code)]

//! Shared types for `dirserve`: the error taxonomy, virtual path handling and
//! the policy/limits configuration. Nothing here touches the filesystem.

mod error;

pub mod path;
pub mod policy;

pub use error::{Error, Result};

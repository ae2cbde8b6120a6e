use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid policy: {0}")]
    InvalidPolicy(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("denied by policy: {0}")]
    PolicyDenied(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn code(&self) -> &'static str {
        match self {
            Error::InvalidPolicy(_) => "invalid_policy",
            Error::InvalidPath(_) => "invalid_path",
            Error::PolicyDenied(_) => "policy_denied",
            Error::NotFound(_) => "not_found",
            Error::Io(_) => "io",
        }
    }

    /// Maps an I/O failure on `what`, keeping `NotFound` distinct from other failures.
    pub fn from_io(what: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound(what.to_string()),
            _ => Error::Io(format!("{what}: {err}")),
        }
    }
}

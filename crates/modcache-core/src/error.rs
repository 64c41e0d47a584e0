//! Error types for modcache-core operations.
//!
//! All public functions return `Result<T, Error>`. Errors carry enough
//! structure that the dispatcher can map them onto the right HTTP status
//! without string matching — in particular `VersionNotFound` is a distinct
//! variant rather than a generic "not found" so a missing version can be told
//! apart from a missing module.

use thiserror::Error;

/// The error type returned by every fallible operation in this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Filesystem operation failed (cache directory, lock file, archive I/O).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A request to the upstream backend or default proxy failed.
    ///
    /// Connection and timeout failures are typically recoverable; 4xx
    /// responses surfaced via [`reqwest::Error::status`] are not.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Reading or rewriting a module archive failed.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// Configuration file is malformed or fails validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The requested module has no such version.
    ///
    /// Matched structurally (not by string) at the dispatcher to produce a
    /// 404 instead of a 500.
    #[error("version not found: {module} {version}")]
    VersionNotFound {
        /// Module path that was queried.
        module: String,
        /// Version string that does not exist.
        version: String,
    },

    /// The backend has no commit for the requested tag or revision.
    #[error("commit not found for {0}")]
    CommitNotFound(String),

    /// Another writer currently holds the materialization lock.
    #[error("{0} {1} is currently locked")]
    Locked(String, String),

    /// A backend method was called before `parametrize` bound it to a module.
    #[error("source not parametrized")]
    NotParametrized,

    /// A URL could not be parsed against the module-proxy grammar.
    #[error("invalid URL: {0}")]
    BadUrl(String),

    /// JSON (de)serialization failed outside of config loading.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Uncategorized failure, or a third-party error with no dedicated variant.
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl Error {
    /// Whether retrying the operation might succeed without intervention.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(e) => e.is_timeout() || e.is_connect(),
            Self::Locked(..) => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::Interrupted
            ),
            _ => false,
        }
    }

    /// A short, stable category label for metrics and log fields.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Network(_) => "network",
            Self::Zip(_) => "zip",
            Self::Config(_) => "config",
            Self::VersionNotFound { .. } => "version_not_found",
            Self::CommitNotFound(_) => "commit_not_found",
            Self::Locked(..) => "locked",
            Self::NotParametrized => "not_parametrized",
            Self::BadUrl(_) => "bad_url",
            Self::Serialization(_) => "serialization",
            Self::Other(_) => "other",
        }
    }
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;

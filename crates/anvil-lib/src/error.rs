use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type shared by every public entry point of the crate.
#[derive(Debug, Error)]
pub enum InstallError {
    // ── Lookup ──────────────────────────────────────────
    #[error("Not found: {0}")]
    NotFound(String),

    // ── Network ─────────────────────────────────────────
    #[error("HTTP request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Download failed for {url}: HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    // ── Integrity ───────────────────────────────────────
    #[error("SHA-1 mismatch for {path:?}: expected {expected}, got {actual}")]
    Sha1Mismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Size mismatch for {path:?}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    // ── Filesystem ──────────────────────────────────────
    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt {what}: {reason}")]
    Corrupt { what: String, reason: String },

    #[error("Timed out after {waited:?} waiting for lock on {path:?}")]
    LockTimeout { path: PathBuf, waited: Duration },

    // ── Patch pipeline ──────────────────────────────────
    #[error("Processor {tool} exited with {code:?}: {stderr}")]
    Processor {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Missing tool: {0}")]
    MissingTool(String),

    #[error("Invalid {what}: {reason}")]
    Validation { what: String, reason: String },

    // ── Control ─────────────────────────────────────────
    #[error("Operation cancelled")]
    Cancelled,
}

/// The failure categories callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Network,
    Verification,
    Io,
    LockTimeout,
    Processor,
    MissingTool,
    Validation,
    Cancelled,
}

/// Convenience alias used throughout the crate.
pub type InstallResult<T> = Result<T, InstallError>;

impl InstallError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InstallError::NotFound(_) => ErrorKind::NotFound,
            InstallError::Network { .. } | InstallError::HttpStatus { .. } => ErrorKind::Network,
            InstallError::Sha1Mismatch { .. } | InstallError::SizeMismatch { .. } => {
                ErrorKind::Verification
            }
            InstallError::Io { .. } | InstallError::Corrupt { .. } => ErrorKind::Io,
            InstallError::LockTimeout { .. } => ErrorKind::LockTimeout,
            InstallError::Processor { .. } => ErrorKind::Processor,
            InstallError::MissingTool(_) => ErrorKind::MissingTool,
            InstallError::Validation { .. } => ErrorKind::Validation,
            InstallError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// A user-initiated stop rather than a failure to report.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, InstallError::Cancelled)
    }

    pub(crate) fn network(url: &str, source: reqwest::Error) -> Self {
        InstallError::Network {
            url: url.to_string(),
            source,
        }
    }

    pub(crate) fn corrupt(what: impl Into<String>, reason: impl ToString) -> Self {
        InstallError::Corrupt {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn validation(what: impl Into<String>, reason: impl ToString) -> Self {
        InstallError::Validation {
            what: what.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for InstallError {
    fn from(source: std::io::Error) -> Self {
        InstallError::Io {
            path: PathBuf::new(),
            source,
        }
    }
}

/// Attach the offending path to filesystem errors.
pub trait IoResultExt<T> {
    fn at(self, path: &Path) -> InstallResult<T>;
}

impl<T> IoResultExt<T> for Result<T, std::io::Error> {
    fn at(self, path: &Path) -> InstallResult<T> {
        self.map_err(|source| InstallError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

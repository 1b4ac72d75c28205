use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FindError {
    // Traversal
    #[error("No such file or directory")]
    NotFound(PathBuf),

    #[error("Permission denied")]
    PermissionDenied(PathBuf),

    #[error("{source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Resource ceilings
    #[error("memory limit of {limit} bytes exceeded, not descending further")]
    MemoryLimit { path: PathBuf, limit: usize },

    #[error("depth limit of {limit} reached, not descending further")]
    DepthLimit { path: PathBuf, limit: usize },

    // Config
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // Runtime
    #[error("cannot create cancellation pipe: {0}")]
    Signal(#[source] std::io::Error),

    #[error("cannot start worker thread: {0}")]
    Thread(String),
}

impl FindError {
    /// Classify an I/O failure while reading the directory at `path`.
    ///
    /// `NotFound` is reserved for a missing scan root; a directory that
    /// vanishes mid-walk stays an ordinary `Io` error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// The path this error occurred at, if applicable.
    /// Callers use this to print `<path>: <message>` without matching on variants.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(p)
            | Self::PermissionDenied(p)
            | Self::Io { path: p, .. }
            | Self::MemoryLimit { path: p, .. }
            | Self::DepthLimit { path: p, .. } => Some(p),
            _ => None,
        }
    }

    /// Whether the scan can continue after this error.
    ///
    /// Everything that happens at one directory (unreadable, vanished,
    /// resource ceiling hit) only narrows the walk. Configuration and startup
    /// failures end it.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied(_)
                | Self::Io { .. }
                | Self::MemoryLimit { .. }
                | Self::DepthLimit { .. }
        )
    }
}

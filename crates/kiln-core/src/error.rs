//! Error types for kiln-core.
//!
//! Ordinary compile failures are not errors: backends return them as
//! diagnostics. This enum covers configuration, I/O and worker pool failures.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for kiln-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in kiln-core.
#[derive(Debug, Error)]
pub enum Error {
    /// The requested character encoding is not supported.
    #[error("unsupported source encoding '{0}', an alternate encoding is needed")]
    UnsupportedEncoding(String),

    /// No usable compiler toolchain was found.
    #[error("compiler toolchain unavailable: {0}")]
    ToolchainUnavailable(String),

    /// A backend operation was called before the state it depends on exists.
    #[error("backend not ready: {0}")]
    NotConfigured(String),

    /// IO error on a known path.
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// IO error without path context.
    #[error("IO error: {0}")]
    Stream(#[from] std::io::Error),

    /// Failed to read a jar archive.
    #[error("archive error in {}: {message}", path.display())]
    Archive { path: PathBuf, message: String },

    /// The worker thread running a job went away before reporting completion.
    #[error("worker thread lost before completing '{0}'")]
    WorkerLost(String),

    /// Work was submitted to a pool that has been shut down.
    #[error("worker pool '{0}' has been shut down")]
    PoolShutdown(String),

    /// The worker pool threads could not be created.
    #[error("failed to start worker pool: {0}")]
    PoolBuild(String),
}

impl Error {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true for errors caused by bad configuration rather than I/O.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedEncoding(_) | Self::ToolchainUnavailable(_) | Self::NotConfigured(_)
        )
    }
}

//! # Splice Core Kernel Errors
//!
//! Defines the aggregate [`Error`] returned by the public API.
//!
//! Each subsystem owns a typed error ([`PluginSystemError`], [`ArtifactError`],
//! [`ChannelError`]) that converts into [`Error`] through `#[from]`, so callers
//! can use `?` across module boundaries and still match on the precise cause.
use std::path::PathBuf;
use std::process::ExitStatus;
use std::result::Result as StdResult;

use crate::artifact::error::ArtifactError;
use crate::ipc::error::ChannelError;
use crate::plugin_system::error::PluginSystemError;
use thiserror::Error as ThisError;

#[derive(Debug, ThisError)]
pub enum Error {
    /// Graph, stub or build problem
    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    /// Native loading problem detected in-process
    #[error("Artifact error: {0}")]
    Artifact(#[from] ArtifactError),

    /// Controller/worker transport failure, including cancellation
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Configuration error in '{}': {message}", path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "<defaults>".into()))]
    Config {
        path: Option<PathBuf>,
        message: String,
    },

    #[error("I/O error during operation '{operation}' on '{}': {source}", path.display())]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The worker answered a load operation or the final call with an error description
    #[error("Worker reported a failure for '{}': {message}", target.display())]
    RemoteFailure { target: PathBuf, message: String },

    #[error("Worker process exited unsuccessfully: {status}")]
    WorkerExited { status: ExitStatus },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl Error {
    pub fn io(source: std::io::Error, operation: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    pub fn config(path: Option<PathBuf>, message: impl Into<String>) -> Self {
        Error::Config {
            path,
            message: message.into(),
        }
    }

    /// True when the request was abandoned because its minion was banished
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Channel(ChannelError::Cancelled { .. }))
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

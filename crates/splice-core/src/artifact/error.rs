//! # Splice Core Artifact Errors
//!
//! [`ArtifactError`] is what the native-side loader reports. On a worker these
//! are rendered with `Display` and sent back to the controller as the reply to
//! the operation in flight.
use std::path::PathBuf;
use thiserror::Error;

use crate::artifact::state::ArtifactPhase;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Failed to open artifact '{}': {message}", path.display())]
    LoadError { path: PathBuf, message: String },

    #[error("Artifact '{}' does not export entry point '{symbol}': {message}", path.display())]
    MissingEntryPoint {
        path: PathBuf,
        symbol: String,
        message: String,
    },

    #[error("Artifact '{}' requires '{}' to be {required} but it is {actual}", artifact.display(), dependency.display())]
    DependencyNotReady {
        artifact: PathBuf,
        dependency: PathBuf,
        required: ArtifactPhase,
        actual: ArtifactPhase,
    },

    #[error("Function index {index} is outside the function table of '{}' ({table_len} entries)", path.display())]
    InvalidFunctionIndex {
        path: PathBuf,
        index: usize,
        table_len: usize,
    },

    #[error("Artifact '{}' is {actual}; functions are only callable once it is final", path.display())]
    NotFinal { path: PathBuf, actual: ArtifactPhase },

    #[error("FFI error in artifact '{}' during '{operation}': {message}", path.display())]
    FfiError {
        path: PathBuf,
        operation: String,
        message: String,
    },

    #[error("Artifact '{}' was never loaded", path.display())]
    UnknownArtifact { path: PathBuf },
}

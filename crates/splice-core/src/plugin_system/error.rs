//! # Splice Core Plugin System Errors
//!
//! [`PluginSystemError`] covers everything that can go wrong before a single
//! native module is touched: unresolved references, hard-dependency cycles,
//! requests for non-executable plugins or unknown functions, malformed stub
//! indexes and build failures. All of them are fatal to the request and are
//! never retried.
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PluginSystemError {
    #[error("Configuration error for '{plugin_id}': {message}")]
    Configuration {
        plugin_id: String,
        message: String,
    },

    #[error("Hard dependency cycle detected: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    #[error("Unknown plugin '{plugin_id}'{}", referenced_by.as_deref().map(|r| format!(" referenced by '{}'", r)).unwrap_or_default())]
    UnknownPlugin {
        plugin_id: String,
        referenced_by: Option<String>,
    },

    #[error("Plugin '{plugin_id}' cannot be executed: executable flag not set")]
    NotExecutable { plugin_id: String },

    #[error("Plugin '{plugin_id}' exports no function named '{function}'")]
    UnknownFunction { plugin_id: String, function: String },

    #[error("Stub index error for '{path}': {message}")]
    ManifestError {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Build failed for '{plugin_id}': {message}")]
    BuildError { plugin_id: String, message: String },

    #[error("No builder registered for language '{0}'")]
    UnsupportedLanguage(String),
}

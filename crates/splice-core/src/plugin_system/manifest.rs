use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use semver::Version;
use serde::Deserialize;
use tokio::fs;

use crate::kernel::error::{Error as KernelError, Result as KernelResult};
use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::graph::DependencyGraph;
use crate::plugin_system::stub::{Language, PluginId, PluginStub};

/// Supplies fully populated, immutable stubs to the core
pub trait StubSource: Send + Sync {
    /// Every known stub in a stable order
    fn stubs(&self) -> Vec<Arc<PluginStub>>;

    fn resolve(&self, id: &PluginId) -> Option<Arc<PluginStub>>;

    /// Builds the dependency graph over every stub of this source
    fn graph(&self) -> Result<DependencyGraph, PluginSystemError> {
        DependencyGraph::new(self.stubs())
    }
}

// --- Intermediate structs for deserialization ---

#[derive(Deserialize, Debug)]
struct RawStubIndex {
    #[serde(default)]
    plugins: Vec<RawStubEntry>,
}

#[derive(Deserialize, Debug)]
struct RawStubEntry {
    id: String,
    #[serde(default)]
    version: Option<String>,
    language: String,
    #[serde(default)]
    depends: Vec<String>,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    executable: bool,
    artifact: PathBuf,
    #[serde(default)]
    functions: BTreeMap<String, usize>,
}

// --- End Intermediate structs ---

/// Stub index read from a JSON file produced by the discovery step.
///
/// ```json
/// { "plugins": [ { "id": "demo.leaf", "language": "c", "artifact": "out/libleaf.so",
///                  "functions": { "start": 0 }, "executable": true } ] }
/// ```
/// Relative artifact paths are resolved against the directory holding the index.
#[derive(Debug, Clone, Default)]
pub struct StubIndex {
    stubs: Vec<Arc<PluginStub>>,
    source_path: Option<PathBuf>,
}

impl StubIndex {
    /// Index over stubs constructed in code
    pub fn from_stubs<I>(stubs: I) -> Self
    where
        I: IntoIterator<Item = PluginStub>,
    {
        Self {
            stubs: stubs.into_iter().map(Arc::new).collect(),
            source_path: None,
        }
    }

    /// Load an index file asynchronously
    pub async fn load<P: AsRef<Path>>(path: P) -> KernelResult<Self> {
        let path_ref = path.as_ref();
        let content = fs::read_to_string(path_ref)
            .await
            .map_err(|e| KernelError::io(e, "read_stub_index", path_ref))?;

        let base_dir = path_ref.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        let mut index = Self::parse(&content, &base_dir, path_ref)?;
        index.source_path = Some(path_ref.to_path_buf());
        log::info!("Loaded {} stub(s) from {}", index.stubs.len(), path_ref.display());
        Ok(index)
    }

    /// Parse index JSON, resolving relative artifact paths against `base_dir`
    pub fn from_json_str(content: &str, base_dir: &Path) -> Result<Self, PluginSystemError> {
        Self::parse(content, base_dir, Path::new("<inline>"))
    }

    fn parse(content: &str, base_dir: &Path, origin: &Path) -> Result<Self, PluginSystemError> {
        let raw: RawStubIndex = serde_json::from_str(content).map_err(|e| PluginSystemError::ManifestError {
            path: origin.to_path_buf(),
            message: format!("Failed to parse stub index JSON: {}", e),
            source: Some(Box::new(e)),
        })?;

        let mut stubs = Vec::with_capacity(raw.plugins.len());
        for entry in raw.plugins {
            let version = match entry.version.as_deref() {
                Some(v) => Version::parse(v).map_err(|e| PluginSystemError::ManifestError {
                    path: origin.to_path_buf(),
                    message: format!("Invalid version '{}' for plugin '{}': {}", v, entry.id, e),
                    source: Some(Box::new(e)),
                })?,
                None => Version::new(0, 1, 0),
            };
            let artifact = if entry.artifact.is_absolute() {
                entry.artifact
            } else {
                base_dir.join(entry.artifact)
            };

            stubs.push(Arc::new(PluginStub {
                id: PluginId::new(entry.id),
                version,
                language: Language::new(entry.language),
                depends: entry.depends.into_iter().map(PluginId::new).collect(),
                imports: entry.imports.into_iter().map(PluginId::new).collect(),
                executable: entry.executable,
                artifact,
                functions: entry.functions,
            }));
        }

        Ok(Self {
            stubs,
            source_path: None,
        })
    }

    /// File the index was loaded from, if any
    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.stubs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stubs.is_empty()
    }
}

impl StubSource for StubIndex {
    fn stubs(&self) -> Vec<Arc<PluginStub>> {
        self.stubs.clone()
    }

    fn resolve(&self, id: &PluginId) -> Option<Arc<PluginStub>> {
        self.stubs.iter().find(|s| &s.id == id).cloned()
    }
}

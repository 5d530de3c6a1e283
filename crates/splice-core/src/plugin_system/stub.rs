use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};

/// Namespace-qualified plugin identity, e.g. `demo.graphics.window`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Everything before the last `.`, or the empty string for unqualified ids
    pub fn namespace(&self) -> &str {
        self.0.rsplit_once('.').map(|(ns, _)| ns).unwrap_or("")
    }

    /// The last dotted segment
    pub fn short_name(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, name)| name).unwrap_or(&self.0)
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PluginId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Source-language tag of a plugin. Tags are compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Language(String);

impl Language {
    pub fn new(tag: impl AsRef<str>) -> Self {
        Self(tag.as_ref().trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Language {
    fn from(tag: String) -> Self {
        Self::new(tag)
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.0
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Discovery-time description of one plugin.
///
/// Stubs are produced by a [`StubSource`](super::manifest::StubSource), wrapped in
/// an `Arc` and never mutated afterwards. Dependency and import references are
/// ids; the [`DependencyGraph`](super::graph::DependencyGraph) resolves them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginStub {
    pub id: PluginId,
    pub version: Version,
    pub language: Language,
    /// Hard dependencies, initialized before this plugin, in declaration order
    pub depends: Vec<PluginId>,
    /// Soft imports, wired after initialization, may be cyclic
    pub imports: Vec<PluginId>,
    /// Whether the plugin may be the target of an execute request
    pub executable: bool,
    /// Resolved path of the built shared artifact
    pub artifact: PathBuf,
    /// Exported function name -> index into the artifact's function table
    pub functions: BTreeMap<String, usize>,
}

impl PluginStub {
    /// Minimal stub with no edges, not executable, no functions
    pub fn new(id: impl Into<PluginId>, language: Language, artifact: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            version: Version::new(0, 1, 0),
            language,
            depends: Vec::new(),
            imports: Vec::new(),
            executable: false,
            artifact: artifact.into(),
            functions: BTreeMap::new(),
        }
    }

    pub fn with_depends<I, S>(mut self, depends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PluginId>,
    {
        self.depends = depends.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_imports<I, S>(mut self, imports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<PluginId>,
    {
        self.imports = imports.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_function(mut self, name: impl Into<String>, index: usize) -> Self {
        self.functions.insert(name.into(), index);
        self
    }

    pub fn executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }

    pub fn artifact_path(&self) -> &Path {
        &self.artifact
    }

    pub fn function_index(&self, name: &str) -> Option<usize> {
        self.functions.get(name).copied()
    }

    /// Number of slots the artifact's function table must hold
    pub fn function_table_len(&self) -> usize {
        self.functions.values().max().map_or(0, |max| max + 1)
    }
}

impl fmt::Display for PluginStub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} v{} ({})", self.id, self.version, self.language)
    }
}

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use crate::plugin_system::error::PluginSystemError;
use crate::plugin_system::stub::{Language, PluginStub};

/// Build step for one source language: turns a stub into its output artifact path
pub trait Builder: Send + Sync + Debug {
    fn build(&self, stub: &PluginStub) -> Result<PathBuf, PluginSystemError>;
}

/// Accepts artifacts compiled ahead of time; only checks that the file exists
#[derive(Debug, Default, Clone, Copy)]
pub struct PrebuiltBuilder;

impl Builder for PrebuiltBuilder {
    fn build(&self, stub: &PluginStub) -> Result<PathBuf, PluginSystemError> {
        if stub.artifact.is_file() {
            Ok(stub.artifact.clone())
        } else {
            Err(PluginSystemError::BuildError {
                plugin_id: stub.id.to_string(),
                message: format!("artifact '{}' does not exist", stub.artifact.display()),
            })
        }
    }
}

/// Explicit language tag -> builder lookup table
#[derive(Debug, Default, Clone)]
pub struct BuilderRegistry {
    builders: HashMap<Language, Arc<dyn Builder>>,
    fallback: Option<Arc<dyn Builder>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that treats every language as prebuilt
    pub fn prebuilt() -> Self {
        Self::new().with_fallback(Arc::new(PrebuiltBuilder))
    }

    pub fn register(&mut self, language: Language, builder: Arc<dyn Builder>) {
        self.builders.insert(language, builder);
    }

    /// Builder used for languages without a dedicated entry
    pub fn with_fallback(mut self, builder: Arc<dyn Builder>) -> Self {
        self.fallback = Some(builder);
        self
    }

    pub fn builder_for(&self, language: &Language) -> Result<Arc<dyn Builder>, PluginSystemError> {
        self.builders
            .get(language)
            .or(self.fallback.as_ref())
            .cloned()
            .ok_or_else(|| PluginSystemError::UnsupportedLanguage(language.to_string()))
    }

    /// Builds every stub in order, stopping at the first failure
    pub fn build_all<'a, I>(&self, stubs: I) -> Result<Vec<PathBuf>, PluginSystemError>
    where
        I: IntoIterator<Item = &'a Arc<PluginStub>>,
    {
        let mut outputs = Vec::new();
        for stub in stubs {
            let builder = self.builder_for(&stub.language)?;
            log::debug!("Building '{}' with {:?}", stub.id, builder);
            outputs.push(builder.build(stub)?);
        }
        Ok(outputs)
    }
}

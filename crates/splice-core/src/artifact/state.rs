use std::fmt;
use std::path::{Path, PathBuf};

use crate::artifact::handle::OpaqueHandle;
use crate::plugin_system::plan::LoadPhase;

/// Where an artifact currently stands inside one worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactPhase {
    Unloaded,
    InMemory,
    Inited,
    Final,
}

impl From<LoadPhase> for ArtifactPhase {
    fn from(phase: LoadPhase) -> Self {
        match phase {
            LoadPhase::InMemory => ArtifactPhase::InMemory,
            LoadPhase::Inited => ArtifactPhase::Inited,
            LoadPhase::Final => ArtifactPhase::Final,
        }
    }
}

impl fmt::Display for ArtifactPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactPhase::Unloaded => "unloaded",
            ArtifactPhase::InMemory => "in-memory",
            ArtifactPhase::Inited => "inited",
            ArtifactPhase::Final => "final",
        };
        f.write_str(name)
    }
}

/// Per-artifact record kept by the loader. Phases only move forward.
#[derive(Debug)]
pub struct ArtifactLoadState<M> {
    path: PathBuf,
    instance: Option<OpaqueHandle>,
    module: Option<M>,
    finalized: bool,
}

impl<M> ArtifactLoadState<M> {
    pub(crate) fn new(path: PathBuf, module: M) -> Self {
        Self {
            path,
            instance: None,
            module: Some(module),
            finalized: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn phase(&self) -> ArtifactPhase {
        if self.finalized {
            ArtifactPhase::Final
        } else if self.instance.is_some() {
            ArtifactPhase::Inited
        } else if self.module.is_some() {
            ArtifactPhase::InMemory
        } else {
            ArtifactPhase::Unloaded
        }
    }

    pub(crate) fn module(&self) -> Option<&M> {
        self.module.as_ref()
    }

    pub fn instance(&self) -> Option<&OpaqueHandle> {
        self.instance.as_ref()
    }

    pub(crate) fn set_instance(&mut self, handle: OpaqueHandle) {
        self.instance = Some(handle);
    }

    pub(crate) fn mark_final(&mut self) {
        self.finalized = true;
    }
}

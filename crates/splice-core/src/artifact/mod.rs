//! # Splice Core Artifacts
//!
//! The native side of loading, used inside a worker process.
//!
//! An artifact is a compiled module exposing two fixed entry points
//! (`__splice_extern_init` and `__splice_extern_init_imports`). The
//! [`ArtifactLoader`] drives each artifact through `in-memory`, `inited` and
//! `final`, passing arrays of [`OpaqueHandle`]s in the order the load plan
//! names them. How a module is opened is delegated to a [`ModuleOpener`]:
//! [`DynamicLibraryOpener`] for shared libraries, [`StaticModuleOpener`] for
//! entry points linked into the host.
pub mod error;
pub mod handle;
pub mod loader;
pub mod native;
pub mod state;

pub use error::ArtifactError;
pub use handle::OpaqueHandle;
pub use loader::{ArtifactLoader, ExportedFunction};
pub use native::{
    DynamicLibraryOpener, DynamicModule, ExportedFn, InitEntryPoint, InitImportsEntryPoint, ModuleOpener,
    NativeModule, StaticModule, StaticModuleOpener,
};
pub use state::{ArtifactLoadState, ArtifactPhase};

#[cfg(test)]
pub(crate) mod tests;

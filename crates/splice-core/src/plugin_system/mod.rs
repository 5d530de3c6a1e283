//! # Splice Core Plugin System
//!
//! The static side of loading: what plugins exist, how they relate and in
//! which order their artifacts must be brought up.
//!
//! ## Key Submodules and Responsibilities:
//!
//! - **[`stub`]**: [`PluginStub`], the immutable discovery record (id, language,
//!   hard dependencies, imports, artifact path, function table).
//! - **[`graph`]**: [`DependencyGraph`], validated once, then queried for the
//!   recursive hard-dependency closure and the import set.
//! - **[`plan`]**: [`LoadPlanBuilder`], which turns a target into a deduplicated
//!   sequence of [`LoadOperation`]s across the `in-memory`, `inited` and `final`
//!   phases, tolerating import cycles.
//! - **[`manifest`]**: the [`StubSource`] seam and the JSON-backed [`StubIndex`].
//! - **[`builder`]**: the per-language [`Builder`] capability and its registry.
//! - **[`error`]**: [`PluginSystemError`](error::PluginSystemError).
pub mod builder;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod plan;
pub mod stub;

pub use builder::{Builder, BuilderRegistry, PrebuiltBuilder};
pub use error::PluginSystemError;
pub use graph::DependencyGraph;
pub use manifest::{StubIndex, StubSource};
pub use plan::{LoadOperation, LoadPhase, LoadPlan, LoadPlanBuilder};
pub use stub::{Language, PluginId, PluginStub};
// Test module declaration
#[cfg(test)]
mod tests;

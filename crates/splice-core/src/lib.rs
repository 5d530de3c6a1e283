//! # Splice Core
//!
//! Loads independently built native plugin artifacts into a worker process in
//! dependency order and calls into them.
//!
//! The pieces, leaf first:
//!
//! - [`plugin_system`]: stubs, the dependency graph and the load plan builder.
//! - [`artifact`]: the per-artifact `in-memory -> inited -> final` state machine
//!   behind the native module seam.
//! - [`ipc`]: framed messages and the cancellable poll-with-retry channel.
//! - [`worker`]: applies load operations received over a channel.
//! - [`daemon`]: the controller side, the executer minion and its client.
//! - [`config`] and [`kernel`]: configuration, errors, constants and the
//!   component lifecycle.
pub mod artifact;
pub mod config;
pub mod daemon;
pub mod ipc;
pub mod kernel;
pub mod plugin_system;
pub mod worker;

// Re-export key public types for the binary
pub use artifact::{ArtifactError, ArtifactLoader, ArtifactPhase, DynamicLibraryOpener, StaticModuleOpener};
pub use config::SpliceConfig;
pub use daemon::{submit, Controller, DaemonContext, ExecuterMinion};
pub use ipc::{CancellationFlag, ExecuteRequest, ExecuteResponse};
pub use kernel::error::{Error as KernelError, Result as KernelResult};
pub use plugin_system::{DependencyGraph, LoadPlan, LoadPlanBuilder, PluginId, PluginStub, StubIndex, StubSource};
pub use worker::{connect_and_serve, InProcessLauncher, ProcessLauncher, WorkerLauncher};

//! # Splice Core Daemon
//!
//! The long-running side of splice. A [`DaemonContext`] holds everything shared
//! by one daemon instance (settings, port allocator, dependency graph, worker
//! launcher) and owns its minions. The only minion today is the
//! [`ExecuterMinion`], which accepts execute requests on a control port and runs
//! each one through a [`Controller`] against a freshly launched worker.
//!
//! [`submit`] is the client side of the control port.
pub mod client;
pub mod context;
pub mod controller;
pub mod executer;

pub use client::submit;
pub use context::{DaemonContext, PortAllocator};
pub use controller::{Controller, ExecutionTarget};
pub use executer::{ExecuterMinion, EXECUTER_IDENTITY};

#[cfg(test)]
mod tests;

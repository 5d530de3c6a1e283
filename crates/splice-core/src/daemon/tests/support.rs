#![cfg(test)]
//! Graphs and launchers shared by the daemon tests

use crate::artifact::tests::fixtures::{FAILING, LEAF, MID, PEER_A};
use crate::plugin_system::graph::DependencyGraph;
use crate::plugin_system::stub::{Language, PluginStub};
use crate::worker::{WorkerHandle, WorkerLauncher, WorkerOutcome};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

pub const POLL: Duration = Duration::from_millis(5);

/// leaf <- mid, a failing plugin and a library that cannot be executed
pub fn fixture_graph() -> Arc<DependencyGraph> {
    let rust = Language::new("rust");
    let stubs = vec![
        PluginStub::new("demo.leaf", rust.clone(), LEAF)
            .with_function("start", 0)
            .with_function("boom", 1)
            .executable(true),
        PluginStub::new("demo.mid", rust.clone(), MID)
            .with_depends(["demo.leaf"])
            .with_function("noop", 0)
            .executable(true),
        PluginStub::new("demo.failing", rust.clone(), FAILING)
            .with_function("start", 0)
            .executable(true),
        PluginStub::new("demo.library", rust, PEER_A).with_function("noop", 0),
    ];
    Arc::new(DependencyGraph::new(stubs.into_iter().map(Arc::new)).unwrap())
}

/// Starts a worker task that never connects back
#[derive(Debug)]
pub struct SilentLauncher;

#[async_trait]
impl WorkerLauncher for SilentLauncher {
    async fn launch(&self, _addr: SocketAddr) -> crate::kernel::error::Result<WorkerHandle> {
        Ok(WorkerHandle::Task(Some(tokio::spawn(std::future::pending()))))
    }
}

/// Starts a worker task that exits without ever connecting
#[derive(Debug)]
pub struct VanishingLauncher;

#[async_trait]
impl WorkerLauncher for VanishingLauncher {
    async fn launch(&self, _addr: SocketAddr) -> crate::kernel::error::Result<WorkerHandle> {
        Ok(WorkerHandle::Task(Some(tokio::spawn(async { Ok(WorkerOutcome::Disconnected) }))))
    }
}
